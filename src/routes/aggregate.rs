//! Merging of partial route entries and wildcard-domain classification.
//!
//! Partial entries are grouped by upstream and each partial's hostname is
//! checked against the configured wildcard domains by replacing its
//! first DNS label with `*`: a hostname equal to the pattern becomes the
//! group's default route, any other match becomes a group member, and
//! the rest stay on the direct route. TLS flags are OR-ed only across the
//! partials that land in the same bucket, and hostnames keep first-seen
//! order. Output ordering is sorted by
//! upstream so identical registry content always renders identically.

use std::collections::BTreeMap;

use super::{AggregateResult, RouteEntry, TagParser, WildcardGroup};

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    wildcard_domains: Vec<String>,
}

impl Aggregator {
    #[must_use]
    pub fn new(wildcard_domains: &[String]) -> Self {
        Self {
            wildcard_domains: wildcard_domains
                .iter()
                .filter(|d| !d.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Aggregates a catalog snapshot of service name to tag list.
    ///
    /// Services are visited in name order so hostname order within a
    /// merged entry never depends on how the registry listed them.
    #[must_use]
    pub fn from_catalog(
        &self,
        parser: &TagParser,
        services: &BTreeMap<String, Vec<String>>,
    ) -> AggregateResult {
        let partials = services.iter().flat_map(|(service, tags)| {
            tags.iter().filter_map(move |tag| {
                let entry = parser.parse_tag(service, tag)?;
                tracing::debug!(service = %service, hostname = %entry.hostnames[0], "found service URL");
                Some(entry)
            })
        });
        self.aggregate(partials)
    }

    /// Aggregates the raw text of KV values, one route per line.
    #[must_use]
    pub fn from_kv<'a>(
        &self,
        parser: &TagParser,
        values: impl IntoIterator<Item = &'a str>,
    ) -> AggregateResult {
        let partials = values
            .into_iter()
            .flat_map(str::lines)
            .filter_map(|line| {
                let entry = parser.parse_line(line)?;
                tracing::debug!(upstream = %entry.upstream, hostname = %entry.hostnames[0], "found static URL");
                Some(entry)
            });
        self.aggregate(partials)
    }

    pub fn aggregate(&self, partials: impl IntoIterator<Item = RouteEntry>) -> AggregateResult {
        let mut by_upstream: BTreeMap<String, Vec<RouteEntry>> = BTreeMap::new();
        for partial in partials {
            by_upstream
                .entry(partial.upstream.clone())
                .or_default()
                .push(partial);
        }

        let mut result = AggregateResult::default();

        // BTreeMap iteration keeps every list below sorted by upstream
        for (upstream, partials) in &by_upstream {
            let mut direct = partials[0].detached();
            let mut members: BTreeMap<&str, RouteEntry> = BTreeMap::new();

            // Flags follow each tag into the bucket its hostname lands in
            for partial in partials {
                for hostname in &partial.hostnames {
                    let Some(domain) = self.wildcard_domain_for(hostname) else {
                        direct.absorb_flags(partial);
                        direct.add_hostname(hostname);
                        continue;
                    };

                    if hostname == domain {
                        let group = result
                            .wildcard_groups
                            .entry(domain.to_string())
                            .or_insert_with(|| WildcardGroup::new(domain));
                        match &mut group.default_route {
                            None => {
                                tracing::debug!(domain = %domain, upstream = %upstream, "service URL is for wildcard domain");
                                let mut default_route = partial.detached();
                                default_route.absorb_flags(partial);
                                group.default_route = Some(default_route);
                            }
                            Some(existing) if existing.upstream == *upstream => {
                                existing.absorb_flags(partial);
                            }
                            Some(_) => {
                                tracing::debug!(
                                    domain = %domain,
                                    ignored = %upstream,
                                    "wildcard domain already has a default route"
                                );
                            }
                        }
                    } else {
                        let member = members
                            .entry(domain)
                            .or_insert_with(|| partial.detached());
                        member.absorb_flags(partial);
                        member.add_hostname(hostname);
                    }
                }
            }

            if !direct.hostnames.is_empty() {
                result.direct_routes.push(direct);
            }

            for (domain, member) in members {
                result
                    .wildcard_groups
                    .entry(domain.to_string())
                    .or_insert_with(|| WildcardGroup::new(domain))
                    .members
                    .push(member);
            }
        }

        result.direct_routes.sort_by(|a, b| a.upstream.cmp(&b.upstream));
        for group in result.wildcard_groups.values_mut() {
            group.members.sort_by(|a, b| a.upstream.cmp(&b.upstream));
        }
        result.wildcard_groups.retain(|_, group| !group.is_empty());

        result
    }

    /// Returns the configured wildcard domain `hostname` falls under, if any.
    ///
    /// Only the first label is replaced, so `a.b.example.com` never matches `*.example.com`.
    #[must_use]
    pub fn wildcard_domain_for(&self, hostname: &str) -> Option<&str> {
        if self.wildcard_domains.is_empty() {
            return None;
        }

        let candidate = match hostname.split_once('.') {
            Some((_, rest)) => format!("*.{rest}"),
            None => "*".to_string(),
        };

        self.wildcard_domains
            .iter()
            .find(|domain| **domain == candidate)
            .map(String::as_str)
    }
}
