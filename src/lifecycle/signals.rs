//! OS signal handling.
//!
//! - SIGTERM / SIGINT trigger graceful shutdown; a second one exits at once
//! - SIGHUP republishes the proxy configuration from the current store, in its
//!   own task so a slow reload never delays a shutdown signal

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::gateway::Gateway;
use crate::lifecycle::Shutdown;

pub fn spawn_signal_handler(
    shutdown: Arc<Shutdown>,
    gateway: Arc<Gateway>,
) -> std::io::Result<JoinHandle<()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = term.recv() => stop(&shutdown, "SIGTERM"),
                _ = int.recv() => stop(&shutdown, "SIGINT"),
                _ = hup.recv() => {
                    tracing::info!("SIGHUP received, republishing proxy configuration");
                    spawn_republish(gateway.clone(), "SIGHUP");
                }
            }
        }
    }))
}

/// Publish in the background. Overlapping requests queue on the publisher.
pub fn spawn_republish(gateway: Arc<Gateway>, reason: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = gateway.publisher().publish(reason).await;
        if let Some(warning) = outcome.warning() {
            tracing::warn!(%warning, reason, "Republish incomplete");
        }
    })
}

fn stop(shutdown: &Shutdown, name: &str) {
    if shutdown.trigger() {
        tracing::info!(signal = name, "Shutdown signal received");
    } else {
        tracing::warn!(signal = name, "Second shutdown signal, exiting immediately");
        std::process::exit(1);
    }
}
