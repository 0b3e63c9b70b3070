//! The single consumer that turns registry snapshots into applied config.
//!
//! Watchers publish their latest [`AggregateResult`] on `watch` channels.
//! [`Pipeline::run`] owns the renderer and applier outright, so every
//! render → hash → apply pass is serialized without a lock: whichever
//! source changes, the pass always uses the newest snapshot of both.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::Instrument;

use crate::apply::{Applier, ApplyOutcome};
use crate::error::IngressError;
use crate::render::Renderer;
use crate::routes::AggregateResult;
use crate::server::{AppState, AppliedRecord};

pub type SnapshotReceiver = watch::Receiver<Arc<AggregateResult>>;

pub struct Pipeline {
    renderer: Renderer,
    applier: Applier,
    state: Arc<AppState>,
    verbose: bool,
}

impl Pipeline {
    #[must_use]
    pub fn new(renderer: Renderer, applier: Applier, state: Arc<AppState>) -> Self {
        Self {
            renderer,
            applier,
            state,
            verbose: false,
        }
    }

    /// Logs every rendered document at debug level.
    #[must_use]
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Applies a new document each time either source publishes, until both watchers are gone.
    pub async fn run(mut self, mut catalog: SnapshotReceiver, mut kv: Option<SnapshotReceiver>) {
        let span = tracing::info_span!("pipeline");
        async move {
            loop {
                let changed = tokio::select! {
                    changed = catalog.changed() => changed,
                    changed = next_change(&mut kv) => changed,
                };
                if changed.is_err() {
                    tracing::info!("registry watchers stopped, pipeline exiting");
                    return;
                }

                let catalog_routes = Arc::clone(&catalog.borrow_and_update());
                let kv_routes = kv
                    .as_mut()
                    .map_or_else(|| Arc::new(AggregateResult::default()), |rx| {
                        Arc::clone(&rx.borrow_and_update())
                    });

                // Errors are logged inside update(); keep serving the previous config.
                let _ = self.update(&catalog_routes, &kv_routes).await;
            }
        }
        .instrument(span)
        .await;
    }

    /// One render → diff → apply pass.
    pub async fn update(
        &mut self,
        catalog: &AggregateResult,
        kv: &AggregateResult,
    ) -> Result<ApplyOutcome, IngressError> {
        let document = match self.renderer.render(catalog, kv).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, "failed to render Caddyfile, keeping current configuration");
                self.state.stats.failed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        if self.verbose {
            tracing::debug!(document = %document, "rendered Caddyfile");
        }

        match self.applier.apply(&document).await {
            Ok(ApplyOutcome::Unchanged) => {
                self.state.stats.unchanged.fetch_add(1, Ordering::Relaxed);
                Ok(ApplyOutcome::Unchanged)
            }
            Ok(ApplyOutcome::Applied { hash }) => {
                self.state.stats.applied.fetch_add(1, Ordering::Relaxed);
                *self.state.applied.write().await = Some(AppliedRecord {
                    hash: hash.clone(),
                    applied_at: Instant::now(),
                });
                Ok(ApplyOutcome::Applied { hash })
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to update the Caddyfile");
                tracing::error!(document = %document, "rejected Caddyfile");
                self.state.stats.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

async fn next_change(
    rx: &mut Option<SnapshotReceiver>,
) -> Result<(), watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}
