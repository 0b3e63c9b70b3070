//! Caddy admin API control plane.
//!
//! Documents are POSTed to `/load` as `text/caddyfile` and Caddy adapts
//! them itself. In adapt mode the text is first sent to `/adapt` and the
//! resulting JSON config is loaded instead, which surfaces adapter
//! warnings and errors separately from load errors. Restarting loads a
//! JSON config holding only the admin listener, which stops every app
//! and listener while keeping the admin API on the address we talk to.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::ControlPlane;
use crate::error::IngressError;
use crate::server::{self, HttpClient};

const CADDYFILE_CONTENT_TYPE: &str = "text/caddyfile";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Deserialize)]
struct AdaptResponse {
    result: serde_json::Value,
    #[serde(default)]
    warnings: Vec<serde_json::Value>,
}

pub struct AdminApi {
    base: String,
    adapt: bool,
    restart_config: Bytes,
    client: HttpClient,
}

impl AdminApi {
    #[must_use]
    pub fn new(address: &str, adapt: bool) -> Self {
        Self {
            base: address.trim_end_matches('/').to_string(),
            adapt,
            restart_config: restart_config(address),
            client: server::build_http_client(),
        }
    }

    async fn post(
        &self,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes), IngressError> {
        let url = format!("{}{path}", self.base);
        let uri: hyper::Uri = url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| IngressError::UriParse {
                source: Box::new(e),
            },
        )?;

        let req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri(uri)
            .header(hyper::header::CONTENT_TYPE, content_type)
            .body(Full::new(body))
            .map_err(|e| IngressError::HttpRequest {
                source: Box::new(e),
            })?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| IngressError::HttpRequest {
                source: Box::new(e),
            })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| IngressError::HttpRequest {
                source: Box::new(e),
            })?
            .to_bytes();

        Ok((status, body))
    }

    async fn post_checked(
        &self,
        path: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<Bytes, IngressError> {
        let (status, response) = self.post(path, content_type, body).await?;
        if status.is_success() {
            Ok(response)
        } else {
            Err(IngressError::ControlPlaneRejected {
                endpoint: path.to_string(),
                status,
                body: String::from_utf8_lossy(&response).trim().to_string(),
            })
        }
    }

    /// Translates a Caddyfile into Caddy's native JSON config.
    pub async fn adapt(&self, document: &str) -> Result<Bytes, IngressError> {
        let response = self
            .post_checked(
                "/adapt",
                CADDYFILE_CONTENT_TYPE,
                Bytes::copy_from_slice(document.as_bytes()),
            )
            .await
            .map_err(|e| IngressError::Adapt {
                message: e.to_string(),
            })?;

        let adapted: AdaptResponse =
            serde_json::from_slice(&response).map_err(|e| IngressError::Adapt {
                message: format!("invalid /adapt response: {e}"),
            })?;
        for warning in &adapted.warnings {
            tracing::warn!(warning = %warning, "Caddyfile adapter warning");
        }

        serde_json::to_vec(&adapted.result)
            .map(Bytes::from)
            .map_err(|e| IngressError::Adapt {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ControlPlane for AdminApi {
    fn name(&self) -> &str {
        &self.base
    }

    async fn load(&self, document: &str) -> Result<(), IngressError> {
        if self.adapt {
            let config = self.adapt(document).await?;
            self.post_checked("/load", JSON_CONTENT_TYPE, config).await?;
        } else {
            self.post_checked(
                "/load",
                CADDYFILE_CONTENT_TYPE,
                Bytes::copy_from_slice(document.as_bytes()),
            )
            .await?;
        }
        Ok(())
    }

    async fn restart(&self) -> Result<(), IngressError> {
        self.post_checked("/load", JSON_CONTENT_TYPE, self.restart_config.clone())
            .await?;
        Ok(())
    }
}

/// An otherwise empty config that pins `admin.listen` to `address`.
///
/// Loading plain `{}` would move the admin API back to Caddy's default
/// listener, leaving the follow-up load unable to reach it.
fn restart_config(address: &str) -> Bytes {
    let listen = url::Url::parse(address).ok().and_then(|url| {
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(format!("{host}:{port}"))
    });

    match listen {
        Some(listen) => Bytes::from(json!({ "admin": { "listen": listen } }).to_string()),
        None => Bytes::from_static(b"{}"),
    }
}
