//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compiler::MalformedPolicy;

/// Root configuration for the gateway daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Admin API listener and credentials.
    pub admin: AdminConfig,

    /// Where the proxy lives and how to reach it.
    pub haproxy: HaproxyConfig,

    /// Rendering settings for the compiled document.
    pub compiler: CompilerConfig,

    /// Grant lifecycle defaults.
    pub grants: GrantConfig,

    /// Record persistence.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Request timeout for admin calls in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Live proxy process settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Path the compiled document is published to.
    pub config_path: PathBuf,

    /// Local control socket.
    pub socket_path: PathBuf,

    /// Proxy binary, invoked with `-c -f <config_path>` to validate.
    pub binary: String,

    /// Service manager binary, invoked as `<manager> reload <service>`.
    pub service_manager: String,

    /// Unit name passed to the service manager.
    pub service_name: String,

    /// Optional directory for per-grant side files.
    pub grant_artifact_dir: Option<PathBuf>,

    /// Connect + read bound for control socket calls.
    pub socket_timeout_ms: u64,

    /// Bound for each validation / reload subprocess.
    pub exec_timeout_ms: u64,

    /// Maximum bytes read from one control socket response.
    pub response_limit_bytes: usize,

    /// Substring expected in the reload response (case-insensitive).
    pub reload_ack: String,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/haproxy/haproxy.cfg"),
            socket_path: PathBuf::from("/run/haproxy/admin.sock"),
            binary: "haproxy".to_string(),
            service_manager: "systemctl".to_string(),
            service_name: "haproxy".to_string(),
            grant_artifact_dir: None,
            socket_timeout_ms: 2_000,
            exec_timeout_ms: 10_000,
            response_limit_bytes: 64 * 1024,
            reload_ack: "reload".to_string(),
        }
    }
}

/// Settings that shape the compiled document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Name of the single shared frontend.
    pub frontend_name: String,

    /// Port the shared frontend listens on.
    pub frontend_port: u16,

    /// Port of the stats listener.
    pub stats_port: u16,

    /// URI of the stats page.
    pub stats_uri: String,

    /// Fallback backend (the gateway's own API).
    pub default_backend_name: String,

    /// `host:port` of the fallback backend.
    pub default_backend_address: String,

    /// Health check path of the fallback backend.
    pub default_health_path: String,

    /// Value of `Access-Control-Allow-Origin`.
    pub cors_origin: String,

    /// Header carrying the subject id in grant rules.
    pub subject_header: String,

    /// Handling of resources that cannot be rendered.
    pub malformed_policy: MalformedPolicy,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            frontend_name: "libproxy_frontend".to_string(),
            frontend_port: 80,
            stats_port: 8404,
            stats_uri: "/stats".to_string(),
            default_backend_name: "libproxy_backend".to_string(),
            default_backend_address: "backend:5000".to_string(),
            default_health_path: "/api/health".to_string(),
            cors_origin: "*".to_string(),
            subject_header: "X-User-ID".to_string(),
            malformed_policy: MalformedPolicy::Skip,
        }
    }
}

/// Grant lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GrantConfig {
    /// Lifetime of a subject's access grant in seconds.
    pub default_ttl_secs: u64,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file; records are memory-only when unset.
    pub snapshot_path: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
