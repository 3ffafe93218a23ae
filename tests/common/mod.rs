//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use libproxy_gateway::config::GatewayConfig;
use libproxy_gateway::lifecycle::startup::build_gateway_with_clock;
use libproxy_gateway::model::{ManualClock, NewResource};
use libproxy_gateway::Gateway;

pub const T0: u64 = 1_700_000_000;

pub const STAT_CSV: &str = "# pxname,svname,qcur,scur,status,\n\
                            stats,FRONTEND,,0,OPEN,\n\
                            acme_backend,acme_server,0,2,UP,\n\
                            acme_backend,BACKEND,0,2,UP,\n";

/// Fresh directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gw-{}-{}", tag, uuid::Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Config pointing every path into `dir`. `true` stands in for both the
/// proxy binary and the service manager, so the fallback reload succeeds.
pub fn test_config(dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.haproxy.config_path = dir.join("haproxy.cfg");
    config.haproxy.socket_path = dir.join("admin.sock");
    config.haproxy.binary = "true".into();
    config.haproxy.service_manager = "true".into();
    config.haproxy.grant_artifact_dir = Some(dir.join("grants"));
    config.haproxy.socket_timeout_ms = 500;
    config.admin.api_key = "test-key".into();
    config.observability.metrics_enabled = false;
    config
}

pub struct Harness {
    pub dir: PathBuf,
    pub config: GatewayConfig,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<Gateway>,
}

impl Harness {
    pub fn new(tag: &str) -> Self {
        let dir = scratch_dir(tag);
        Self::with_config(dir.clone(), test_config(&dir))
    }

    pub fn with_config(dir: PathBuf, config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let gateway = build_gateway_with_clock(&config, clock.clone()).unwrap();
        Self {
            dir,
            config,
            clock,
            gateway,
        }
    }

    pub fn published(&self) -> String {
        std::fs::read_to_string(&self.config.haproxy.config_path).unwrap()
    }

    pub fn artifact(&self, config_name: &str) -> PathBuf {
        self.dir.join("grants").join(format!("{}.cfg", config_name))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub fn acme() -> NewResource {
    NewResource::new("Acme Journal", "acme", "acme", "https://upstream.example:443")
}

/// Mock control socket. Answers `reload` with `reload_reply` and
/// `show stat` with [`STAT_CSV`]; records every command received.
pub fn start_mock_control_socket(path: &Path, reload_reply: &'static str) -> Arc<Mutex<Vec<String>>> {
    let listener = UnixListener::bind(path).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut line = String::new();
                if BufReader::new(read).read_line(&mut line).await.is_err() {
                    return;
                }
                let command = line.trim().to_string();
                let reply = match command.as_str() {
                    "reload" => reload_reply,
                    "show stat" => STAT_CSV,
                    _ => "Unknown command.\n",
                };
                log.lock().unwrap().push(command);
                let _ = write.write_all(reply.as_bytes()).await;
                let _ = write.shutdown().await;
            });
        }
    });

    seen
}
