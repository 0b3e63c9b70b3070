//! Route data model derived from registry metadata.
//!
//! A [`RouteEntry`] is one routable upstream together with the public
//! hostnames that should reach it. Raw registry data is turned into
//! partial entries by the tag grammar in [`tags`] and folded into an
//! [`AggregateResult`] by [`aggregate`], which also sorts hostnames into
//! [`WildcardGroup`]s. Every registry change produces a fresh result;
//! nothing is mutated incrementally.

pub mod aggregate;
pub mod tags;

use std::collections::BTreeMap;

use serde::Serialize;

pub use aggregate::Aggregator;
pub use tags::TagParser;

/// Whether the upstream is dialed as-is or resolved by the proxy at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// A literal `http://` or `https://` URL.
    Direct,
    /// A `<service>.service.<domain>` SRV record.
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination_kind: DestinationKind,
    pub upstream: String,
    /// Empty for [`DestinationKind::Direct`].
    pub service_name: String,
    pub use_https: bool,
    pub skip_tls_verify: bool,
    /// Unique, in first-seen order.
    pub hostnames: Vec<String>,
}

impl RouteEntry {
    /// A copy of the destination with no flags set and no hostnames attached.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            destination_kind: self.destination_kind,
            upstream: self.upstream.clone(),
            service_name: self.service_name.clone(),
            use_https: false,
            skip_tls_verify: false,
            hostnames: Vec::new(),
        }
    }

    /// OR-combines the TLS flags of `other` into `self`.
    pub fn absorb_flags(&mut self, other: &Self) {
        self.use_https |= other.use_https;
        self.skip_tls_verify |= other.skip_tls_verify;
    }

    /// Appends `hostname` unless it is already present.
    pub fn add_hostname(&mut self, hostname: &str) {
        if !self.hostnames.iter().any(|h| h == hostname) {
            self.hostnames.push(hostname.to_string());
        }
    }
}

/// All routes that live under one configured wildcard domain such as `*.example.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardGroup {
    pub domain: String,
    /// Catch-all for the wildcard, set when a hostname equals the pattern itself.
    pub default_route: Option<RouteEntry>,
    /// Sorted ascending by upstream.
    pub members: Vec<RouteEntry>,
}

impl WildcardGroup {
    #[must_use]
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            default_route: None,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default_route.is_none() && self.members.is_empty()
    }
}

/// Output of one aggregation pass over a single registry source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateResult {
    /// Sorted ascending by upstream. Entries never have empty hostnames.
    pub direct_routes: Vec<RouteEntry>,
    pub wildcard_groups: BTreeMap<String, WildcardGroup>,
}

impl AggregateResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.direct_routes.is_empty() && self.wildcard_groups.is_empty()
    }

    /// Number of direct routes plus wildcard group members and defaults.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.direct_routes.len()
            + self
                .wildcard_groups
                .values()
                .map(|g| g.members.len() + usize::from(g.default_route.is_some()))
                .sum::<usize>()
    }
}
