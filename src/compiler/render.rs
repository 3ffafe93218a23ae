//! Active resource set → complete proxy configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compiler::document::{Document, Section, SectionKind};
use crate::compiler::escape::{arg, comment, format_arg, ident, quote};
use crate::compiler::rules::{
    backend_name, path_acl_name, path_acls, path_rewrites, server_name, use_backend,
};
use crate::compiler::{CompileError, Fingerprint};
use crate::config::CompilerConfig;
use crate::model::{Resource, ResourceId, Upstream};

const CORS_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const CORS_HEADERS: &str = "Content-Type, Authorization";

/// What to do with a resource that cannot be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Leave it out and record a warning.
    #[default]
    Skip,
    /// Emit a backend whose only server fails its health check.
    Degrade,
    /// Refuse to produce a document.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileWarning {
    pub resource_id: ResourceId,
    pub slug: String,
    pub reason: String,
    pub degraded: bool,
}

/// Result of one compilation.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub text: String,
    pub fingerprint: Fingerprint,
    /// Slugs that received a backend, in output order.
    pub backends: Vec<String>,
    pub warnings: Vec<CompileWarning>,
}

/// Pure renderer from resources to configuration text.
#[derive(Debug, Clone)]
pub struct ConfigCompiler {
    settings: CompilerConfig,
    control_socket: Option<PathBuf>,
}

impl ConfigCompiler {
    pub fn new(settings: CompilerConfig, control_socket: Option<PathBuf>) -> Self {
        Self {
            settings,
            control_socket,
        }
    }

    pub fn settings(&self) -> &CompilerConfig {
        &self.settings
    }

    /// Render every active resource in ascending id order.
    ///
    /// Inactive entries are ignored. A resource whose slug or path was
    /// already rendered is treated as malformed.
    pub fn compile(&self, resources: &[Resource]) -> Result<Compiled, CompileError> {
        let mut active: Vec<&Resource> = resources.iter().filter(|r| r.is_active).collect();
        active.sort_by_key(|r| r.id);

        let mut acl_lines = Vec::new();
        let mut routing_lines = Vec::new();
        let mut backends = Vec::new();
        let mut rendered = Vec::new();
        let mut warnings = Vec::new();
        let mut seen_slugs = HashSet::new();
        let mut seen_paths = HashSet::new();

        for resource in active {
            let backend = if !seen_slugs.insert(ident(&resource.slug))
                || !seen_paths.insert(resource.proxy_path.as_str())
            {
                // a second block with the same name would invalidate the whole file
                self.reject(resource, "duplicate slug or proxy path".to_string(), false)?;
                warnings.push(self.warning(resource, "duplicate slug or proxy path", false));
                continue;
            } else {
                match resource.upstream() {
                    Ok(upstream) => self.backend(resource, &upstream),
                    Err(e) => {
                        let reason = e.to_string();
                        let degrade = self.settings.malformed_policy == MalformedPolicy::Degrade;
                        self.reject(resource, reason.clone(), degrade)?;
                        warnings.push(self.warning(resource, &reason, degrade));
                        if !degrade {
                            continue;
                        }
                        self.degraded_backend(resource, &reason)
                    }
                }
            };

            acl_lines.extend(path_acls(resource));
            routing_lines.push(use_backend(
                &resource.slug,
                &[path_acl_name(&resource.slug)],
            ));
            backends.push(backend);
            rendered.push(resource.slug.clone());
        }

        let mut doc = Document::new()
            .preamble("Generated by libproxy-gateway. Manual edits are overwritten.");
        doc.push(self.global());
        doc.push(self.defaults());
        doc.push(self.stats_listener());
        doc.push(self.frontend(acl_lines, routing_lines));
        doc.push(self.default_backend());
        for backend in backends {
            doc.push(backend);
        }

        let text = doc.render();
        let fingerprint = Fingerprint::of(&text);
        tracing::debug!(
            backends = rendered.len(),
            warnings = warnings.len(),
            fingerprint = %fingerprint,
            "Compiled proxy configuration"
        );

        Ok(Compiled {
            text,
            fingerprint,
            backends: rendered,
            warnings,
        })
    }

    /// Log a rejected resource; fail only under the abort policy.
    fn reject(&self, resource: &Resource, reason: String, degraded: bool) -> Result<(), CompileError> {
        if self.settings.malformed_policy == MalformedPolicy::Abort {
            return Err(CompileError::Malformed {
                id: resource.id,
                slug: resource.slug.clone(),
                reason,
            });
        }
        tracing::warn!(
            resource_id = resource.id,
            slug = %resource.slug,
            reason = %reason,
            degraded,
            "Resource cannot be rendered"
        );
        Ok(())
    }

    fn warning(&self, resource: &Resource, reason: &str, degraded: bool) -> CompileWarning {
        CompileWarning {
            resource_id: resource.id,
            slug: resource.slug.clone(),
            reason: reason.to_string(),
            degraded,
        }
    }

    fn global(&self) -> Section {
        let mut section = Section::new(SectionKind::Global)
            .directive("daemon")
            .directive("log stdout local0");
        if let Some(socket) = &self.control_socket {
            section.push(format!(
                "stats socket {} mode 660 level admin",
                arg(&socket.to_string_lossy())
            ));
        }
        section.directive("stats timeout 30s")
    }

    fn defaults(&self) -> Section {
        Section::new(SectionKind::Defaults).directives([
            "mode http",
            "log global",
            "option httplog",
            "option dontlognull",
            "option forwardfor",
            "timeout connect 5s",
            "timeout client 50s",
            "timeout server 50s",
        ])
    }

    fn stats_listener(&self) -> Section {
        Section::named(SectionKind::Listen, "stats")
            .directive(format!("bind *:{}", self.settings.stats_port))
            .directive("stats enable")
            .directive(format!("stats uri {}", arg(&self.settings.stats_uri)))
            .directive("stats refresh 30s")
    }

    fn cors_headers(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "http-after-response set-header Access-Control-Allow-Origin {}",
                format_arg(&self.settings.cors_origin)
            ),
            format!(
                "http-after-response set-header Access-Control-Allow-Methods {}",
                format_arg(CORS_METHODS)
            ),
            format!(
                "http-after-response set-header Access-Control-Allow-Headers {}",
                format_arg(CORS_HEADERS)
            ),
        ];
        // credentials are not allowed with a wildcard origin
        if self.settings.cors_origin != "*" {
            lines.push("http-after-response set-header Access-Control-Allow-Credentials true".into());
        }
        lines
    }

    fn frontend(&self, acl_lines: Vec<String>, routing_lines: Vec<String>) -> Section {
        Section::named(SectionKind::Frontend, ident(&self.settings.frontend_name))
            .directive(format!("bind *:{}", self.settings.frontend_port))
            .blank()
            .comment("CORS headers for all responses")
            .directives(self.cors_headers())
            .blank()
            .comment("Preflight and favicon short-circuits")
            .directive("acl is_options method OPTIONS")
            .directive("http-request return status 200 if is_options")
            .directive("acl is_favicon path /favicon.ico")
            .directive("http-request return status 204 if is_favicon")
            .blank()
            .comment("Resource routes")
            .directives(acl_lines)
            .directives(routing_lines)
            .blank()
            .directive(format!(
                "default_backend {}",
                ident(&self.settings.default_backend_name)
            ))
    }

    fn default_backend(&self) -> Section {
        Section::named(SectionKind::Backend, ident(&self.settings.default_backend_name))
            .directive("balance roundrobin")
            .directive(format!(
                "option httpchk GET {}",
                arg(&self.settings.default_health_path)
            ))
            .directive("http-check expect status 200")
            .directive(format!(
                "server libproxy_api {} check",
                arg(&self.settings.default_backend_address)
            ))
    }

    fn backend_head(&self, resource: &Resource) -> Section {
        Section::named(SectionKind::Backend, backend_name(&resource.slug))
            .directive(format!("description {}", quote(&resource.name)))
            .directive("mode http")
            .directive("balance roundrobin")
            .directive("option httpchk GET /")
            .directive("http-check expect status 200")
    }

    fn backend(&self, resource: &Resource, upstream: &Upstream) -> Section {
        let mut section = self
            .backend_head(resource)
            .directives(path_rewrites(resource))
            .directives(self.cors_headers())
            .directive(format!("timeout server {}s", resource.timeout_secs));

        for (name, value) in &resource.custom_headers {
            section.push(format!(
                "http-response set-header {} {}",
                arg(name),
                format_arg(value)
            ));
        }

        let tls = if upstream.secure { " ssl verify none" } else { "" };
        section.directive(format!(
            "server {} {} check{}",
            server_name(&resource.slug),
            arg(&upstream.to_string()),
            tls
        ))
    }

    fn degraded_backend(&self, resource: &Resource, reason: &str) -> Section {
        self.backend_head(resource)
            .header_comment(format!("degraded: {}", comment(reason)))
            .directive(format!(
                "server {} 0.0.0.0:1 check",
                server_name(&resource.slug)
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewResource;

    fn compiler(policy: MalformedPolicy) -> ConfigCompiler {
        let settings = CompilerConfig {
            malformed_policy: policy,
            ..CompilerConfig::default()
        };
        ConfigCompiler::new(settings, Some(PathBuf::from("/run/haproxy/admin.sock")))
    }

    fn resource(id: u64, slug: &str, url: &str) -> Resource {
        NewResource::new(format!("{slug} journal"), slug, slug, url).into_resource(id, 0)
    }

    fn count(text: &str, needle: &str) -> usize {
        text.lines().filter(|l| l.trim_start().starts_with(needle)).count()
    }

    #[test]
    fn test_acme_backend() {
        let out = compiler(MalformedPolicy::Skip)
            .compile(&[resource(1, "acme", "https://upstream.example:443")])
            .unwrap();

        assert!(out.text.contains("    acl is_acme path_beg /acme/\n"));
        assert!(out.text.contains("    use_backend acme_backend if is_acme\n"));
        assert!(out.text.contains("backend acme_backend\n"));
        assert!(out
            .text
            .contains("    server acme_server upstream.example:443 check ssl verify none\n"));
        assert!(out.text.contains("    option httpchk GET /\n"));
        assert!(out.text.contains("    http-check expect status 200\n"));
        assert!(out.text.contains("    timeout server 30s\n"));
        assert!(out.text.contains("    description 'acme journal'\n"));
        assert!(out
            .text
            .contains("    stats socket /run/haproxy/admin.sock mode 660 level admin\n"));
        assert_eq!(out.backends, vec!["acme"]);
    }

    #[test]
    fn test_plain_http_has_no_tls() {
        let out = compiler(MalformedPolicy::Skip)
            .compile(&[resource(1, "plain", "http://10.0.0.5")])
            .unwrap();
        assert!(out.text.contains("    server plain_server 10.0.0.5:80 check\n"));
    }

    #[test]
    fn test_frontend_shape() {
        let out = compiler(MalformedPolicy::Skip).compile(&[]).unwrap();
        let text = &out.text;
        assert!(text.contains("frontend libproxy_frontend\n    bind *:80\n"));
        assert!(text.contains("    http-request return status 200 if is_options\n"));
        assert!(text.contains("    http-request return status 204 if is_favicon\n"));
        assert!(text.contains("    default_backend libproxy_backend\n"));
        assert!(text.contains("listen stats\n    bind *:8404\n"));
        assert!(text.contains("    server libproxy_api backend:5000 check\n"));
        assert_eq!(count(text, "backend "), 1);
    }

    #[test]
    fn test_id_order_and_inactive_filtered() {
        let mut hidden = resource(2, "hidden", "https://h.example");
        hidden.is_active = false;
        let input = vec![
            resource(3, "gamma", "https://g.example"),
            hidden,
            resource(1, "alpha", "https://a.example"),
        ];
        let out = compiler(MalformedPolicy::Skip).compile(&input).unwrap();
        assert_eq!(out.backends, vec!["alpha", "gamma"]);

        let alpha = out.text.find("use_backend alpha_backend").unwrap();
        let gamma = out.text.find("use_backend gamma_backend").unwrap();
        assert!(alpha < gamma);
        assert!(!out.text.contains("hidden"));
    }

    #[test]
    fn test_deterministic() {
        let input = vec![
            resource(1, "alpha", "https://a.example"),
            resource(2, "beta", "http://b.example:8080"),
        ];
        let c = compiler(MalformedPolicy::Skip);
        let a = c.compile(&input).unwrap();
        let mut reversed = input.clone();
        reversed.reverse();
        let b = c.compile(&reversed).unwrap();
        assert_eq!(a.text, b.text);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_custom_headers_sorted_and_escaped() {
        let mut r = resource(1, "acme", "https://upstream.example");
        r.custom_headers.insert("X-Zeta".into(), "last".into());
        r.custom_headers.insert("X-Alpha".into(), "it's 100%".into());
        let out = compiler(MalformedPolicy::Skip).compile(&[r]).unwrap();

        let alpha = out
            .text
            .find("    http-response set-header X-Alpha 'it'\\''s 100%%'\n")
            .unwrap();
        let zeta = out.text.find("    http-response set-header X-Zeta last\n").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_name_injection_is_quoted() {
        let mut r = resource(1, "acme", "https://upstream.example");
        r.name = "Evil'\nbackend pwned".into();
        let out = compiler(MalformedPolicy::Skip).compile(&[r]).unwrap();
        assert!(!out.text.contains("\nbackend pwned"));
        assert_eq!(count(&out.text, "backend "), 2);
    }

    #[test]
    fn test_malformed_skip() {
        let input = vec![
            resource(1, "good", "https://good.example"),
            resource(2, "bad", "not a url"),
        ];
        let out = compiler(MalformedPolicy::Skip).compile(&input).unwrap();
        assert_eq!(out.backends, vec!["good"]);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].slug, "bad");
        assert!(!out.warnings[0].degraded);
        assert!(!out.text.contains("bad_backend"));
    }

    #[test]
    fn test_malformed_degrade() {
        let input = vec![resource(2, "bad", "not a url")];
        let out = compiler(MalformedPolicy::Degrade).compile(&input).unwrap();
        assert_eq!(out.backends, vec!["bad"]);
        assert!(out.warnings[0].degraded);
        assert!(out.text.contains("# degraded: invalid base URL"));
        assert!(out.text.contains("    server bad_server 0.0.0.0:1 check\n"));
        assert!(out.text.contains("    use_backend bad_backend if is_bad\n"));
    }

    #[test]
    fn test_malformed_abort() {
        let input = vec![
            resource(1, "good", "https://good.example"),
            resource(2, "bad", "not a url"),
        ];
        let err = compiler(MalformedPolicy::Abort).compile(&input).unwrap_err();
        assert!(matches!(err, CompileError::Malformed { id: 2, .. }));
    }

    #[test]
    fn test_duplicate_path_skipped() {
        let a = resource(1, "alpha", "https://a.example");
        let mut b = resource(2, "beta", "https://b.example");
        b.proxy_path = "alpha".into();
        let out = compiler(MalformedPolicy::Degrade).compile(&[a, b]).unwrap();
        assert_eq!(out.backends, vec!["alpha"]);
        assert_eq!(out.warnings.len(), 1);
    }
}
