//! Live proxy reload.
//!
//! # Protocol
//! 1. Control socket: send `reload`, expect the ack token in the reply.
//! 2. Socket missing or refusing connections: validate the published file
//!    with `<binary> -c -f <config_path>`, then `<manager> reload <service>`.
//!    A failed validation never touches the running process.
//!
//! Every step is bounded by a timeout and nothing is retried. All failures
//! collapse into [`ReloadFailed`].

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time;

use crate::config::HaproxyConfig;
use crate::control::socket::ControlSocket;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reload failed: {cause}")]
pub struct ReloadFailed {
    pub cause: String,
}

impl ReloadFailed {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Which path delivered a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPath {
    Socket,
    ServiceManager,
}

#[derive(Debug, Clone)]
pub struct Reloader {
    socket: ControlSocket,
    config_path: PathBuf,
    binary: String,
    service_manager: String,
    service_name: String,
    exec_timeout: Duration,
    ack: String,
}

impl Reloader {
    pub fn new(settings: &HaproxyConfig) -> Self {
        Self {
            socket: ControlSocket::new(
                &settings.socket_path,
                Duration::from_millis(settings.socket_timeout_ms),
                settings.response_limit_bytes,
            ),
            config_path: settings.config_path.clone(),
            binary: settings.binary.clone(),
            service_manager: settings.service_manager.clone(),
            service_name: settings.service_name.clone(),
            exec_timeout: Duration::from_millis(settings.exec_timeout_ms),
            ack: settings.reload_ack.to_lowercase(),
        }
    }

    pub fn socket(&self) -> &ControlSocket {
        &self.socket
    }

    pub async fn reload(&self) -> Result<ReloadPath, ReloadFailed> {
        match self.socket.send("reload").await {
            Ok(reply) => {
                if reply.to_lowercase().contains(&self.ack) {
                    tracing::debug!("Reload acknowledged on control socket");
                    Ok(ReloadPath::Socket)
                } else {
                    Err(ReloadFailed::new(format!(
                        "control socket did not acknowledge reload: {:?}",
                        reply.trim()
                    )))
                }
            }
            Err(e) if e.is_unreachable() => {
                tracing::debug!(error = %e, "Control socket unavailable, using service manager");
                self.reload_via_service_manager().await
            }
            Err(e) => Err(ReloadFailed::new(e.to_string())),
        }
    }

    async fn reload_via_service_manager(&self) -> Result<ReloadPath, ReloadFailed> {
        let config_path = self.config_path.to_string_lossy();
        let check = self
            .run(&self.binary, &["-c", "-f", config_path.as_ref()])
            .await?;
        if !check.status.success() {
            return Err(ReloadFailed::new(format!(
                "config validation failed ({}): {}",
                check.status,
                String::from_utf8_lossy(&check.stderr).trim()
            )));
        }

        let reload = self
            .run(&self.service_manager, &["reload", self.service_name.as_str()])
            .await?;
        if !reload.status.success() {
            return Err(ReloadFailed::new(format!(
                "{} reload {} failed ({}): {}",
                self.service_manager,
                self.service_name,
                reload.status,
                String::from_utf8_lossy(&reload.stderr).trim()
            )));
        }

        Ok(ReloadPath::ServiceManager)
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Output, ReloadFailed> {
        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match time::timeout(self.exec_timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ReloadFailed::new(format!("cannot run {}: {}", program, e))),
            Err(_) => Err(ReloadFailed::new(format!(
                "{} did not finish within {:?}",
                program, self.exec_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(binary: &str, manager: &str) -> HaproxyConfig {
        HaproxyConfig {
            socket_path: std::env::temp_dir()
                .join(format!("gw-missing-{}.sock", uuid::Uuid::new_v4().simple())),
            config_path: PathBuf::from("/tmp/unused.cfg"),
            binary: binary.to_string(),
            service_manager: manager.to_string(),
            exec_timeout_ms: 5_000,
            ..HaproxyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fallback_succeeds() {
        let reloader = Reloader::new(&settings("true", "true"));
        assert_eq!(reloader.reload().await, Ok(ReloadPath::ServiceManager));
    }

    #[tokio::test]
    async fn test_fallback_validation_failure_skips_reload() {
        let reloader = Reloader::new(&settings("false", "true"));
        let err = reloader.reload().await.unwrap_err();
        assert!(err.cause.starts_with("config validation failed"));
    }

    #[tokio::test]
    async fn test_fallback_manager_failure() {
        let reloader = Reloader::new(&settings("true", "false"));
        let err = reloader.reload().await.unwrap_err();
        assert!(err.cause.contains("reload haproxy failed"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let reloader = Reloader::new(&settings("/nonexistent/haproxy", "true"));
        let err = reloader.reload().await.unwrap_err();
        assert!(err.cause.starts_with("cannot run /nonexistent/haproxy"));
        assert!(err.to_string().starts_with("reload failed: "));
    }
}
