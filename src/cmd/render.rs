//! `consul-ingress render`: print the Caddyfile for the current registry.
//!
//! Reads the catalog and KV prefix once without blocking, aggregates and
//! renders exactly as `run` would, and writes the document to stdout or a
//! file. Nothing is sent to Caddy.

use std::time::Duration;

use crate::cli::RenderArgs;
use crate::config::DiscoveryConfig;
use crate::error::IngressError;
use crate::registry::{BlockingQuery, ConsulClient, Source};
use crate::routes::AggregateResult;

pub async fn execute(args: RenderArgs) -> Result<(), IngressError> {
    let config = DiscoveryConfig::from_args(&args.discovery)?;
    let renderer = config.renderer().await?;
    let client = ConsulClient::new(&config.consul_address, &config.consul_token)?;

    let query = BlockingQuery {
        index: 0,
        wait: Duration::ZERO,
    };

    let catalog = Source::Catalog
        .read(&client, &query, &config.parser, &config.aggregator)
        .await?
        .value;
    let kv = match &config.kv_prefix {
        Some(prefix) => {
            Source::Kv {
                prefix: prefix.clone(),
            }
            .read(&client, &query, &config.parser, &config.aggregator)
            .await?
            .value
        }
        None => AggregateResult::default(),
    };

    let document = renderer.render(&catalog, &kv).await?;

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &document).await?;
            eprintln!(
                "Wrote {} ({} routes)",
                path.display(),
                catalog.route_count() + kv.route_count()
            );
        }
        None => println!("{document}"),
    }

    Ok(())
}
