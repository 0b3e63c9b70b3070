//! `consul-ingress run`: watch Consul and keep Caddy configured.
//!
//! Validates settings, reads the base Caddyfile, then spawns one watcher
//! per registry source and the pipeline task that renders and applies.
//! Optionally serves the status endpoint. Runs until SIGTERM / Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::apply::{self, AdminApi, Applier};
use crate::cli::RunArgs;
use crate::config::DiscoveryConfig;
use crate::error::IngressError;
use crate::logging;
use crate::pipeline::Pipeline;
use crate::registry::{Source, Watcher};
use crate::routes::AggregateResult;
use crate::server::{self, AppState};

pub async fn execute(args: RunArgs) -> Result<(), IngressError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(
        logging::resolve_level(&args.log_level, args.verbose),
        log_format,
    );

    let config = DiscoveryConfig::from_args(&args.discovery)?;
    let renderer = config.renderer().await?;

    if args.polling_interval == 0 {
        return Err(IngressError::InvalidSetting {
            name: "polling-interval",
            message: "must be at least 1 second".into(),
        });
    }
    let wait = Duration::from_secs(args.polling_interval);

    let status_addr: Option<SocketAddr> = args
        .status_addr
        .as_deref()
        .map(str::parse::<SocketAddr>)
        .transpose()?;

    let autosave = args.autosave.clone().or_else(apply::default_autosave_path);
    if autosave.is_none() {
        tracing::warn!("no config directory found, Caddyfile autosave disabled");
    }

    let control_plane = AdminApi::new(&args.admin_address, args.adapt);
    let applier = Applier::new(Box::new(control_plane), autosave).with_restart(args.restart);

    let state = Arc::new(AppState::new(config.kv_prefix.is_some()));
    let parser = Arc::new(config.parser.clone());
    let aggregator = Arc::new(config.aggregator.clone());

    let (catalog_tx, catalog_rx) = watch::channel(Arc::new(AggregateResult::default()));
    let catalog_watcher = Watcher::new(
        Source::Catalog,
        &config.consul_address,
        &config.consul_token,
        wait,
        Arc::clone(&parser),
        Arc::clone(&aggregator),
        catalog_tx,
        Arc::clone(&state.catalog),
    );
    let mut tasks = vec![tokio::spawn(catalog_watcher.run())];

    let kv_rx = match (&config.kv_prefix, &state.kv) {
        (Some(prefix), Some(kv_status)) => {
            let (kv_tx, kv_rx) = watch::channel(Arc::new(AggregateResult::default()));
            let kv_watcher = Watcher::new(
                Source::Kv {
                    prefix: prefix.clone(),
                },
                &config.consul_address,
                &config.consul_token,
                wait,
                Arc::clone(&parser),
                Arc::clone(&aggregator),
                kv_tx,
                Arc::clone(kv_status),
            );
            tasks.push(tokio::spawn(kv_watcher.run()));
            Some(kv_rx)
        }
        _ => {
            tracing::info!("KV path empty, watching the catalog only");
            None
        }
    };

    let pipeline = Pipeline::new(renderer, applier, Arc::clone(&state)).verbose(args.verbose);
    tasks.push(tokio::spawn(pipeline.run(catalog_rx, kv_rx)));

    tracing::info!(
        consul = %config.consul_address,
        admin = %args.admin_address,
        kv = config.kv_prefix.as_deref().unwrap_or(""),
        wildcard_domains = ?config.wildcard_domains,
        polling_interval_secs = args.polling_interval,
        "consul-ingress started"
    );

    match status_addr {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!(addr = %addr, "status endpoint listening");
            axum::serve(listener, server::build_router(state))
                .with_graceful_shutdown(server::shutdown_signal())
                .await?;
        }
        None => server::shutdown_signal().await,
    }

    // Watchers have no cancellation point other than process shutdown
    for task in &tasks {
        task.abort();
    }

    tracing::info!("consul-ingress stopped");
    Ok(())
}
