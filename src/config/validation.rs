//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid and distinct)
//! - Check addresses and identifiers that end up in the compiled document
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ConfigViolation>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// One rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigViolation {}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ConfigViolation>> {
    let mut errors = Vec::new();
    let mut fail = |field: &'static str, message: &str| {
        errors.push(ConfigViolation {
            field,
            message: message.to_string(),
        })
    };

    if config.admin.bind_address.parse::<SocketAddr>().is_err() {
        fail("admin.bind_address", "must be a socket address");
    }
    if config.admin.api_key.trim().is_empty() {
        fail("admin.api_key", "must not be empty");
    }
    if config.admin.request_timeout_secs == 0 {
        fail("admin.request_timeout_secs", "must be greater than zero");
    }

    if config.haproxy.config_path.as_os_str().is_empty() {
        fail("haproxy.config_path", "must not be empty");
    }
    if config.haproxy.socket_path.as_os_str().is_empty() {
        fail("haproxy.socket_path", "must not be empty");
    }
    if config.haproxy.socket_timeout_ms == 0 {
        fail("haproxy.socket_timeout_ms", "must be greater than zero");
    }
    if config.haproxy.exec_timeout_ms == 0 {
        fail("haproxy.exec_timeout_ms", "must be greater than zero");
    }
    if config.haproxy.response_limit_bytes == 0 {
        fail("haproxy.response_limit_bytes", "must be greater than zero");
    }
    if config.haproxy.reload_ack.is_empty() {
        fail("haproxy.reload_ack", "must not be empty");
    }

    let compiler = &config.compiler;
    if compiler.frontend_port == 0 {
        fail("compiler.frontend_port", "must be a valid port");
    }
    if compiler.stats_port == 0 {
        fail("compiler.stats_port", "must be a valid port");
    }
    if compiler.frontend_port == compiler.stats_port {
        fail("compiler.stats_port", "must differ from frontend_port");
    }
    if !compiler.stats_uri.starts_with('/') {
        fail("compiler.stats_uri", "must start with '/'");
    }
    if !compiler.default_health_path.starts_with('/') {
        fail("compiler.default_health_path", "must start with '/'");
    }
    if !is_identifier(&compiler.frontend_name) {
        fail("compiler.frontend_name", "must be letters, digits, '_', '-' or '.'");
    }
    if !is_identifier(&compiler.default_backend_name) {
        fail("compiler.default_backend_name", "must be letters, digits, '_', '-' or '.'");
    }
    if !is_identifier(&compiler.subject_header) {
        fail("compiler.subject_header", "must be a plain header name");
    }
    if !is_host_port(&compiler.default_backend_address) {
        fail("compiler.default_backend_address", "must be host:port");
    }

    if config.grants.default_ttl_secs == 0 {
        fail("grants.default_ttl_secs", "must be greater than zero");
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        fail("observability.metrics_address", "must be a socket address");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.compiler.stats_port = config.compiler.frontend_port;
        config.haproxy.socket_timeout_ms = 0;
        config.compiler.default_backend_address = "backend".into();
        config.compiler.subject_header = "X User".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "haproxy.socket_timeout_ms",
                "compiler.stats_port",
                "compiler.subject_header",
                "compiler.default_backend_address",
            ]
        );
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = GatewayConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_err());

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
