//! Library-access gateway daemon.
//!
//! ```text
//!   admin API ──▶ Gateway ──▶ ConfigCompiler ──▶ haproxy.cfg (atomic rename)
//!      ▲             │                                │
//!      │             ├──▶ GrantManager                ▼
//!   gateway-cli      └──▶ StatsReporter ◀── control socket ──▶ HAProxy
//! ```
//!
//! Usage: `libproxy-gateway [config.toml]` (or `GATEWAY_CONFIG`).

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;

use libproxy_gateway::admin::AdminState;
use libproxy_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use libproxy_gateway::lifecycle::{signals::spawn_signal_handler, startup::build_gateway};
use libproxy_gateway::observability::{logging, metrics};
use libproxy_gateway::{AdminServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path: Option<PathBuf> = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("GATEWAY_CONFIG").map(PathBuf::from));

    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!("libproxy-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file given, using defaults"),
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = build_gateway(&config)?;

    // bring the live proxy in line with the persisted state
    let outcome = gateway.publisher().publish("startup").await;
    if let Some(warning) = outcome.warning() {
        tracing::warn!(%warning, "Initial publish incomplete");
    }

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone(), gateway.clone())?;

    // keep the watcher handle alive for the life of the process
    let _watcher = match &config_path {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.compiler.clone());
            let handle = watcher.run()?;
            let gw = gateway.clone();
            tokio::spawn(async move {
                while let Some(settings) = updates.recv().await {
                    if gw.apply_compiler_settings(&settings) {
                        tracing::info!("Compiler settings changed, republishing");
                        gw.publisher().publish("config reloaded").await;
                    }
                }
            });
            Some(handle)
        }
        None => None,
    };

    let listener = TcpListener::bind(&config.admin.bind_address).await?;
    let state = AdminState::new(gateway.clone(), &config.admin.api_key);
    AdminServer::new(&config.admin, state)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
