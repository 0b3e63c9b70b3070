//! `consul-ingress health`: query the status endpoint of a running instance.
//!
//! Sends a `GET /health` request to the specified URL and displays the
//! response as formatted text or raw JSON.

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::IngressError;
use crate::health::{HealthResponse, SourceHealth};

pub async fn execute(args: HealthArgs) -> Result<(), IngressError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let uri: hyper::Uri =
        url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| IngressError::UriParse {
                source: Box::new(e),
            },
        )?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| IngressError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), client.request(req))
        .await
        .map_err(|_| IngressError::HttpRequest {
            source: "status check timed out after 10s".into(),
        })?
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

    if !status.is_success() {
        return Err(IngressError::StatusCheckFailed(status));
    }

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => {
            println!("\u{2713} consul-ingress is healthy ({})", args.url);
            println!(
                "  version:        {} ({})",
                health.version, health.git
            );
            println!("  uptime:         {}", format_uptime(health.uptime_seconds));
            println!("  catalog:        {}", format_source(&health.sources.catalog));
            match &health.sources.kv {
                Some(kv) => println!("  kv:             {}", format_source(kv)),
                None => println!("  kv:             disabled"),
            }
            match &health.applied {
                Some(applied) => println!(
                    "  applied:        {} ({}s ago)",
                    applied.hash, applied.applied_ago_seconds
                ),
                None => println!("  applied:        nothing yet"),
            }
            println!(
                "  updates:        {} applied, {} unchanged, {} failed",
                health.stats.applied, health.stats.unchanged, health.stats.failed
            );
        }
        Err(e) => {
            eprintln!("Failed to parse status response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}

fn format_source(source: &SourceHealth) -> String {
    format!(
        "index {}, {} routes, {} updates",
        source.index, source.routes, source.updates
    )
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}
