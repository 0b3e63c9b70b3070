//! Validated discovery settings shared by `run` and `render`.
//!
//! [`DiscoveryConfig::from_args`] checks the raw CLI/env values once at
//! startup and builds the parser, aggregator, and template source every
//! pass reuses. Anything rejected here is a startup error; nothing is
//! re-validated while the watchers run.

use std::path::PathBuf;

use url::Url;

use crate::cli::DiscoveryArgs;
use crate::error::IngressError;
use crate::render::{Renderer, TemplateSource};
use crate::routes::{Aggregator, TagParser};

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub consul_address: String,
    pub consul_token: String,
    /// `None` when KV watching is disabled.
    pub kv_prefix: Option<String>,
    pub wildcard_domains: Vec<String>,
    pub parser: TagParser,
    pub aggregator: Aggregator,
    pub template: TemplateSource,
    pub caddyfile: Option<PathBuf>,
}

impl DiscoveryConfig {
    pub fn from_args(args: &DiscoveryArgs) -> Result<Self, IngressError> {
        validate_address(&args.consul_address).map_err(|message| IngressError::InvalidSetting {
            name: "consul-address",
            message,
        })?;

        if args.registry_domain.trim().is_empty() {
            return Err(IngressError::InvalidSetting {
                name: "registry-domain",
                message: "cannot be empty".into(),
            });
        }

        let wildcard_domains: Vec<String> = args
            .wildcard_domains
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        for domain in &wildcard_domains {
            validate_wildcard_domain(domain).map_err(|message| IngressError::InvalidSetting {
                name: "wildcard-domains",
                message,
            })?;
        }

        let kv_prefix = Some(args.kv_path.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self {
            consul_address: args.consul_address.clone(),
            consul_token: args.consul_token.clone(),
            kv_prefix,
            parser: TagParser::new(&args.url_prefix, args.registry_domain.trim()),
            aggregator: Aggregator::new(&wildcard_domains),
            wildcard_domains,
            template: args
                .template
                .clone()
                .map_or(TemplateSource::Builtin, TemplateSource::File),
            caddyfile: args.caddyfile.clone(),
        })
    }

    /// Builds the renderer, reading the base Caddyfile if one is configured.
    pub async fn renderer(&self) -> Result<Renderer, IngressError> {
        let base_document = match &self.caddyfile {
            Some(path) => Some(Renderer::load_base_document(path).await?),
            None => None,
        };
        Ok(Renderer::new(self.template.clone(), base_document))
    }
}

/// Validate an http(s) service address. Returns `Ok(())` or a human-readable error.
pub fn validate_address(address: &str) -> Result<(), String> {
    match Url::parse(address) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!(
            "'{address}' is not a valid URL (did you mean 'http://{address}'?)"
        )),
    }
}

/// Validate a wildcard domain pattern such as `*.example.com`.
pub fn validate_wildcard_domain(domain: &str) -> Result<(), String> {
    match domain.strip_prefix("*.") {
        Some(rest) if !rest.is_empty() && !rest.contains('*') => Ok(()),
        _ => Err(format!(
            "'{domain}' must replace exactly the first label with '*' (e.g. '*.example.com')"
        )),
    }
}
