//! Long-poll watcher loop for one registry source.
//!
//! Each watcher cycles through connecting, polling, and reconnecting for
//! the lifetime of the process. A read that returns a newer index
//! replaces the source's snapshot by publishing it on a `watch` channel;
//! the channel holds only the latest value, so a slow consumer sees the
//! newest snapshot rather than a backlog.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use super::{BlockingQuery, ConsulClient, Indexed, Source};
use crate::error::IngressError;
use crate::routes::{AggregateResult, Aggregator, TagParser};
use crate::server::SourceStatus;

pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// What a read's index means relative to the last one seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStep {
    /// Data changed; adopt the new index and publish.
    Advance(u64),
    /// Wait time elapsed without a change.
    Unchanged,
    /// The registry went backwards (e.g. restored from snapshot); restart from zero.
    Reset,
}

#[must_use]
pub const fn index_step(last_seen: u64, returned: u64) -> IndexStep {
    if returned > last_seen {
        IndexStep::Advance(returned)
    } else if returned < last_seen {
        IndexStep::Reset
    } else {
        IndexStep::Unchanged
    }
}

pub struct Watcher {
    source: Source,
    address: String,
    token: String,
    wait: Duration,
    backoff: Duration,
    parser: Arc<TagParser>,
    aggregator: Arc<Aggregator>,
    publisher: watch::Sender<Arc<AggregateResult>>,
    status: Arc<SourceStatus>,
}

impl Watcher {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Source,
        address: &str,
        token: &str,
        wait: Duration,
        parser: Arc<TagParser>,
        aggregator: Arc<Aggregator>,
        publisher: watch::Sender<Arc<AggregateResult>>,
        status: Arc<SourceStatus>,
    ) -> Self {
        Self {
            source,
            address: address.to_string(),
            token: token.to_string(),
            wait,
            backoff: RECONNECT_BACKOFF,
            parser,
            aggregator,
            publisher,
            status,
        }
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs the watcher forever. Errors are logged and retried after the backoff.
    pub async fn run(self) {
        let span = tracing::info_span!("watcher", source = self.source.name());
        self.watch().instrument(span).await;
    }

    async fn watch(&self) {
        tracing::info!(source = %self.source, "watching for registry changes");

        let mut query = BlockingQuery {
            index: 0,
            wait: self.wait,
        };

        loop {
            let client = match ConsulClient::new(&self.address, &self.token) {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!(error = %e, address = %self.address, "failed to create Consul client");
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            let e = self.poll(&client, &mut query).await;
            tracing::error!(error = %e, "failed to read from Consul");

            tracing::warn!(
                backoff_secs = self.backoff.as_secs(),
                "connection to Consul lost, attempting reconnection"
            );
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// Polls until a read fails, returning that error.
    async fn poll(&self, client: &ConsulClient, query: &mut BlockingQuery) -> IngressError {
        loop {
            let read = self
                .source
                .read(client, query, &self.parser, &self.aggregator)
                .await;

            match read {
                Ok(snapshot) => self.observe(query, snapshot),
                Err(e) => return e,
            }
        }
    }

    fn observe(&self, query: &mut BlockingQuery, snapshot: Indexed<AggregateResult>) {
        match index_step(query.index, snapshot.index) {
            IndexStep::Advance(index) => {
                query.index = index;
                let routes = snapshot.value.route_count();
                self.status.record(index, routes);
                tracing::info!(index, routes, "registry changed");
                self.publisher.send_replace(Arc::new(snapshot.value));
            }
            IndexStep::Reset => {
                tracing::warn!(
                    last_seen = query.index,
                    returned = snapshot.index,
                    "registry index went backwards, resetting"
                );
                query.index = 0;
            }
            IndexStep::Unchanged => {
                tracing::trace!(index = query.index, "no registry change");
            }
        }
    }
}
