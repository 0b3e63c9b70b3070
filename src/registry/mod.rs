//! Registry discovery: the Consul client and the long-poll watchers.
//!
//! Two sources are watched independently: the service catalog, whose
//! tags carry routing metadata, and an optional KV prefix holding
//! free-form route lines. Each watcher publishes a freshly aggregated
//! [`AggregateResult`](crate::routes::AggregateResult) whenever its
//! source changes.

pub mod consul;
pub mod watcher;

use std::fmt;

pub use consul::{BlockingQuery, ConsulClient, Indexed, KvPair};
pub use watcher::Watcher;

use crate::error::IngressError;
use crate::routes::{AggregateResult, Aggregator, TagParser};

/// Which part of the registry a watcher reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Catalog,
    Kv { prefix: String },
}

impl Source {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Kv { .. } => "kv",
        }
    }

    /// Performs one blocking read and aggregates the result.
    pub async fn read(
        &self,
        client: &ConsulClient,
        query: &BlockingQuery,
        parser: &TagParser,
        aggregator: &Aggregator,
    ) -> Result<Indexed<AggregateResult>, IngressError> {
        match self {
            Self::Catalog => {
                let services = client.catalog_services(query).await?;
                Ok(Indexed {
                    index: services.index,
                    value: aggregator.from_catalog(parser, &services.value),
                })
            }
            Self::Kv { prefix } => {
                let pairs = client.kv_list(prefix, query).await?;
                let texts: Vec<String> = pairs
                    .value
                    .iter()
                    .map(|pair| String::from_utf8_lossy(&pair.value).into_owned())
                    .collect();
                Ok(Indexed {
                    index: pairs.index,
                    value: aggregator.from_kv(parser, texts.iter().map(String::as_str)),
                })
            }
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Catalog => f.write_str("catalog"),
            Self::Kv { prefix } => write!(f, "kv:{prefix}"),
        }
    }
}
