//! Unified error type for consul-ingress.
//!
//! [`IngressError`] covers every failure the pipeline can hit: reading
//! inputs at startup, talking to Consul, rendering templates, and
//! submitting documents to the Caddy admin API. Whether an error is fatal
//! is decided by the caller: watchers reconnect, the pipeline keeps the
//! previously applied configuration, and only startup errors end the
//! process.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IngressError {
    #[error("Invalid setting '{name}': {message}")]
    InvalidSetting { name: &'static str, message: String },

    #[error("Failed to read base document {}: {source}", path.display())]
    BaseDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to render template {template}: {source}")]
    Render {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("Registry request to {endpoint} failed: {source}")]
    Registry {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Registry returned status {status} for {endpoint}")]
    RegistryStatus {
        endpoint: String,
        status: hyper::StatusCode,
    },

    #[error("Unexpected registry response from {endpoint}: {message}")]
    RegistryResponse { endpoint: String, message: String },

    #[error("Caddy rejected configuration via {endpoint} with status {status}: {body}")]
    ControlPlaneRejected {
        endpoint: String,
        status: hyper::StatusCode,
        body: String,
    },

    #[error("Failed to adapt configuration: {message}")]
    Adapt { message: String },

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Status check failed with status {0}")]
    StatusCheckFailed(hyper::StatusCode),
}
