//! Tag grammar for catalog tags and KV route lines.
//!
//! A catalog tag looks like `urlprefix-api.example.com proto=https`: the
//! configured prefix, a hostname, then optional space-separated modifiers.
//! A KV line looks like `api.example.com backend proto=https`: hostname,
//! destination, modifiers. Anything that does not fit the grammar yields
//! `None` and is skipped without affecting sibling tags or lines.

use super::{DestinationKind, RouteEntry};

const MODIFIER_HTTPS: &str = "proto=https";
const MODIFIER_SKIP_VERIFY: &str = "tlsskipverify=true";

#[derive(Debug, Clone)]
pub struct TagParser {
    url_prefix: String,
    registry_domain: String,
}

impl TagParser {
    #[must_use]
    pub fn new(url_prefix: &str, registry_domain: &str) -> Self {
        Self {
            url_prefix: url_prefix.to_string(),
            registry_domain: registry_domain.to_string(),
        }
    }

    /// Parses one catalog tag attached to `service`.
    ///
    /// Tags without the URL prefix are not routing metadata and return `None`.
    #[must_use]
    pub fn parse_tag(&self, service: &str, tag: &str) -> Option<RouteEntry> {
        if !tag.starts_with(&self.url_prefix) {
            return None;
        }

        let mut fields = tag.split_whitespace();
        let hostname = fields.next()?.strip_prefix(&self.url_prefix)?;
        if hostname.is_empty() {
            return None;
        }

        Some(self.entry(service, hostname, fields))
    }

    /// Parses one `<hostname> <destination> [modifier ...]` line from a KV value.
    #[must_use]
    pub fn parse_line(&self, line: &str) -> Option<RouteEntry> {
        let mut fields = line.split_whitespace();
        let hostname = fields.next()?;
        let destination = fields.next()?;

        Some(self.entry(destination, hostname, fields))
    }

    /// Resolves a service identifier to its destination kind, upstream and service name.
    #[must_use]
    pub fn destination(&self, identifier: &str) -> (DestinationKind, String, String) {
        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            (DestinationKind::Direct, identifier.to_string(), String::new())
        } else {
            (
                DestinationKind::Dynamic,
                format!("{identifier}.service.{}", self.registry_domain),
                identifier.to_string(),
            )
        }
    }

    fn entry<'a>(
        &self,
        identifier: &str,
        hostname: &str,
        modifiers: impl Iterator<Item = &'a str>,
    ) -> RouteEntry {
        let (destination_kind, upstream, service_name) = self.destination(identifier);
        let mut entry = RouteEntry {
            destination_kind,
            upstream,
            service_name,
            use_https: false,
            skip_tls_verify: false,
            hostnames: vec![hostname.to_string()],
        };

        for modifier in modifiers {
            match modifier {
                MODIFIER_HTTPS => entry.use_https = true,
                MODIFIER_SKIP_VERIFY => entry.skip_tls_verify = true,
                // Unknown modifiers are reserved for future use
                _ => {}
            }
        }

        entry
    }
}
