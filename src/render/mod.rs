//! Caddyfile rendering from aggregated routes.
//!
//! The document is the base Caddyfile (if any) followed by one template
//! evaluation per catalog direct route, one per KV direct route, and one
//! per wildcard group, each block separated by a newline. Wildcard groups
//! present in both sources are merged: members are concatenated catalog
//! first, and a KV default route takes precedence over a catalog one.
//!
//! Templates use Jinja syntax via `minijinja`. A direct route is rendered
//! with the fields of [`RouteContext`]; a wildcard group additionally gets
//! `domain`, `members`, `has_default` and `default_route`, with the
//! default route's fields also available at the top level.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment};
use serde::Serialize;

use crate::error::IngressError;
use crate::routes::{AggregateResult, DestinationKind, RouteEntry};

pub const BUILTIN_TEMPLATE: &str = include_str!("templates/route.tmpl");
const BUILTIN_TEMPLATE_NAME: &str = "route.tmpl";

#[derive(Debug, Clone, Serialize)]
pub struct RouteContext<'a> {
    pub destination_kind: DestinationKind,
    pub upstream: &'a str,
    pub service_name: &'a str,
    /// Space separated.
    pub hostnames: String,
    pub use_https: bool,
    pub skip_tls_verify: bool,
}

impl<'a> From<&'a RouteEntry> for RouteContext<'a> {
    fn from(entry: &'a RouteEntry) -> Self {
        Self {
            destination_kind: entry.destination_kind,
            upstream: &entry.upstream,
            service_name: &entry.service_name,
            hostnames: entry.hostnames.join(" "),
            use_https: entry.use_https,
            skip_tls_verify: entry.skip_tls_verify,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupContext<'a> {
    #[serde(flatten)]
    pub fields: Option<RouteContext<'a>>,
    pub domain: &'a str,
    pub has_default: bool,
    pub default_route: Option<RouteContext<'a>>,
    pub members: Vec<RouteContext<'a>>,
}

#[derive(Default)]
struct MergedGroup<'a> {
    default_route: Option<&'a RouteEntry>,
    members: Vec<&'a RouteEntry>,
}

/// Where the per-route template comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Builtin,
    /// Re-read on every render so edits apply on the next registry change.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Renderer {
    template: TemplateSource,
    base_document: Option<String>,
}

impl Renderer {
    #[must_use]
    pub const fn new(template: TemplateSource, base_document: Option<String>) -> Self {
        Self {
            template,
            base_document,
        }
    }

    /// Reads the base Caddyfile. Called once at startup.
    pub async fn load_base_document(path: &Path) -> Result<String, IngressError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| IngressError::BaseDocument {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Renders the full document from the latest catalog and KV results.
    pub async fn render(
        &self,
        catalog: &AggregateResult,
        kv: &AggregateResult,
    ) -> Result<String, IngressError> {
        match &self.template {
            TemplateSource::Builtin => {
                self.render_with(BUILTIN_TEMPLATE_NAME, BUILTIN_TEMPLATE, catalog, kv)
            }
            TemplateSource::File(path) => {
                let source = tokio::fs::read_to_string(path).await.map_err(|source| {
                    IngressError::TemplateRead {
                        path: path.clone(),
                        source,
                    }
                })?;
                // The full path names the template in render errors
                self.render_with(&path.display().to_string(), &source, catalog, kv)
            }
        }
    }

    /// Renders with an already loaded template. Any compile or evaluation
    /// failure aborts the whole document.
    pub fn render_with(
        &self,
        name: &str,
        source: &str,
        catalog: &AggregateResult,
        kv: &AggregateResult,
    ) -> Result<String, IngressError> {
        let render_err = |source: minijinja::Error| IngressError::Render {
            template: name.to_string(),
            source,
        };

        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(name, source).map_err(render_err)?;
        let template = env.get_template(name).map_err(render_err)?;

        let mut blocks: Vec<String> = Vec::new();
        if let Some(base) = &self.base_document {
            blocks.push(base.clone());
        }

        if catalog.direct_routes.is_empty() && kv.direct_routes.is_empty() {
            tracing::info!("no services found");
        }

        for entry in catalog.direct_routes.iter().chain(&kv.direct_routes) {
            let block = template
                .render(RouteContext::from(entry))
                .map_err(render_err)?;
            blocks.push(block);
        }

        for (domain, group) in merge_groups(catalog, kv) {
            let default_route = group.default_route.map(RouteContext::from);
            let context = GroupContext {
                fields: default_route.clone(),
                domain,
                has_default: default_route.is_some(),
                default_route,
                members: group.members.into_iter().map(RouteContext::from).collect(),
            };
            blocks.push(template.render(context).map_err(render_err)?);
        }

        Ok(blocks.join("\n"))
    }
}

fn merge_groups<'a>(
    catalog: &'a AggregateResult,
    kv: &'a AggregateResult,
) -> BTreeMap<&'a str, MergedGroup<'a>> {
    let mut merged: BTreeMap<&str, MergedGroup<'_>> = BTreeMap::new();

    for group in catalog.wildcard_groups.values().chain(kv.wildcard_groups.values()) {
        let slot = merged.entry(group.domain.as_str()).or_default();
        if let Some(default_route) = &group.default_route {
            slot.default_route = Some(default_route);
        }
        slot.members.extend(group.members.iter());
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{Aggregator, TagParser};

    fn parser() -> TagParser {
        TagParser::new("urlprefix-", "consul")
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(&["*.example.com".to_string()])
    }

    fn kv(lines: &str) -> AggregateResult {
        aggregator().from_kv(&parser(), [lines])
    }

    #[test]
    fn direct_route_uses_dynamic_srv() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let routes = kv("web.example.org web proto=https tlsskipverify=true");
        let doc = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &routes, &AggregateResult::default())
            .unwrap();

        assert!(doc.starts_with("web.example.org {"));
        assert!(doc.contains("dynamic srv web.service.consul"));
        assert!(doc.contains("transport http"));
        assert!(doc.contains("tls_insecure_skip_verify"));
    }

    #[test]
    fn direct_url_uses_to() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let routes = kv("nas.example.org http://10.0.0.2:5000");
        let doc = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &AggregateResult::default(), &routes)
            .unwrap();

        assert!(doc.contains("to http://10.0.0.2:5000"));
        assert!(!doc.contains("dynamic srv"));
        assert!(!doc.contains("transport http"));
    }

    #[test]
    fn wildcard_group_renders_members_and_default() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let routes = kv("*.example.com fallback\napi.example.com api\nweb.example.com web");
        let doc = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &routes, &AggregateResult::default())
            .unwrap();

        assert!(doc.starts_with("*.example.com {"));
        assert!(doc.contains("@route1 host api.example.com"));
        assert!(doc.contains("@route2 host web.example.com"));
        assert!(doc.contains("dynamic srv fallback.service.consul"));
        assert!(doc.find("api.service.consul") < doc.find("web.service.consul"));
    }

    #[test]
    fn base_document_comes_first_then_catalog_then_kv() {
        let renderer = Renderer::new(TemplateSource::Builtin, Some("{\n    admin localhost:2019\n}".into()));
        let catalog = kv("b.example.org zeta");
        let from_kv = kv("a.example.org alpha");
        let doc = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &catalog, &from_kv)
            .unwrap();

        assert!(doc.starts_with("{\n    admin localhost:2019\n}\n"));
        let catalog_pos = doc.find("zeta.service.consul").unwrap();
        let kv_pos = doc.find("alpha.service.consul").unwrap();
        assert!(catalog_pos < kv_pos);
    }

    #[test]
    fn blocks_are_newline_separated() {
        let renderer = Renderer::new(TemplateSource::Builtin, Some("BASE".into()));
        let routes = kv("a.example.org a\nb.example.org b");
        let doc = renderer
            .render_with("t", "{{ hostnames }}", &routes, &AggregateResult::default())
            .unwrap();
        assert_eq!(doc, "BASE\na.example.org\nb.example.org");
    }

    #[test]
    fn empty_routes_render_base_document_only() {
        let renderer = Renderer::new(TemplateSource::Builtin, Some("BASE".into()));
        let doc = renderer
            .render_with(
                "route.tmpl",
                BUILTIN_TEMPLATE,
                &AggregateResult::default(),
                &AggregateResult::default(),
            )
            .unwrap();
        assert_eq!(doc, "BASE");
    }

    #[test]
    fn groups_merge_across_sources_with_kv_default_winning() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let catalog = kv("*.example.com catalog-default\nb.example.com bravo");
        let from_kv = kv("*.example.com kv-default\na.example.com alpha");
        let template = "{{ domain }}|{{ upstream }}|{% for m in members %}{{ m.upstream }},{% endfor %}";
        let doc = renderer
            .render_with("t", template, &catalog, &from_kv)
            .unwrap();

        assert_eq!(
            doc,
            "*.example.com|kv-default.service.consul|bravo.service.consul,alpha.service.consul,"
        );
    }

    #[test]
    fn group_default_from_catalog_is_kept_when_kv_has_none() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let catalog = kv("*.example.com catalog-default");
        let from_kv = kv("a.example.com alpha");
        let doc = renderer
            .render_with("t", "{% if has_default %}{{ default_route.upstream }}{% endif %}", &catalog, &from_kv)
            .unwrap();
        assert_eq!(doc, "catalog-default.service.consul");
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = Renderer::new(TemplateSource::Builtin, Some("BASE".into()));
        let catalog = kv("x.example.org x\n*.example.com d\nm.example.com m");
        let from_kv = kv("y.example.org http://10.0.0.1");
        let first = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &catalog, &from_kv)
            .unwrap();
        let second = renderer
            .render_with("route.tmpl", BUILTIN_TEMPLATE, &catalog, &from_kv)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn template_syntax_error_is_a_render_error() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let routes = kv("a.example.org a");
        let err = renderer
            .render_with("broken.tmpl", "{% if %}", &routes, &AggregateResult::default())
            .unwrap_err();
        assert!(matches!(err, IngressError::Render { ref template, .. } if template == "broken.tmpl"));
    }

    #[test]
    fn template_evaluation_error_is_a_render_error() {
        let renderer = Renderer::new(TemplateSource::Builtin, None);
        let routes = kv("a.example.org a");
        let err = renderer
            .render_with("t", "{{ hostnames|no_such_filter }}", &routes, &AggregateResult::default())
            .unwrap_err();
        assert!(matches!(err, IngressError::Render { .. }));
    }

    #[tokio::test]
    async fn missing_template_file_is_reported() {
        let path = std::env::temp_dir().join("consul-ingress-missing-template.tmpl");
        let renderer = Renderer::new(TemplateSource::File(path.clone()), None);
        let err = renderer
            .render(&AggregateResult::default(), &AggregateResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngressError::TemplateRead { path: ref p, .. } if *p == path));
    }

    #[tokio::test]
    async fn render_error_names_the_template_path() {
        let path = std::env::temp_dir().join(format!(
            "consul-ingress-broken-{}.tmpl",
            std::process::id()
        ));
        tokio::fs::write(&path, "{% if %}").await.unwrap();
        let renderer = Renderer::new(TemplateSource::File(path.clone()), None);

        let err = renderer
            .render(&kv("a.example.org a"), &AggregateResult::default())
            .await
            .unwrap_err();
        let _ = tokio::fs::remove_file(&path).await;

        let expected = path.display().to_string();
        assert!(matches!(err, IngressError::Render { ref template, .. } if *template == expected));
        assert!(err.to_string().contains(&expected));
    }

    #[tokio::test]
    async fn template_file_is_read_on_each_render() {
        let path = std::env::temp_dir().join(format!(
            "consul-ingress-template-{}.tmpl",
            std::process::id()
        ));
        let renderer = Renderer::new(TemplateSource::File(path.clone()), None);
        let routes = kv("a.example.org a");

        tokio::fs::write(&path, "first {{ hostnames }}").await.unwrap();
        let first = renderer.render(&routes, &AggregateResult::default()).await.unwrap();
        tokio::fs::write(&path, "second {{ hostnames }}").await.unwrap();
        let second = renderer.render(&routes, &AggregateResult::default()).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(first, "first a.example.org");
        assert_eq!(second, "second a.example.org");
    }
}
