//! Serialized compile → write → reload pipeline.
//!
//! Every trigger (resource mutation, global grant, SIGHUP, admin reload) goes
//! through [`Publisher::publish`]. One async mutex guards the whole sequence so
//! two publishes never interleave. Status readers only touch `arc-swap` cells
//! and never wait on that mutex.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::compiler::{CompileError, CompileWarning, Compiled, ConfigCompiler, Fingerprint};
use crate::control::{write_atomic, ReloadFailed, ReloadPath, Reloader};
use crate::model::{AppliedRecord, Clock};
use crate::observability::metrics;
use crate::store::ResourceRegistry;

/// Why a publish did not reach the live proxy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Reload(#[from] ReloadFailed),
}

impl Serialize for PublishError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of one publish attempt. Never an error: persisted state stays
/// authoritative and a failure here only means the live proxy may be stale.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub reason: String,
    /// `None` when compilation was refused.
    pub fingerprint: Option<Fingerprint>,
    pub backends: Vec<String>,
    pub warnings: Vec<CompileWarning>,
    pub reload_path: Option<ReloadPath>,
    pub failure: Option<PublishError>,
}

impl PublishOutcome {
    pub fn is_applied(&self) -> bool {
        self.failure.is_none()
    }

    /// Text surfaced to the caller next to an otherwise successful response.
    pub fn warning(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .warnings
            .iter()
            .map(|w| {
                let action = if w.degraded { "degraded" } else { "skipped" };
                format!("resource {} {}: {}", w.slug, action, w.reason)
            })
            .collect();
        if let Some(failure) = &self.failure {
            parts.push(format!("live proxy may be stale: {}", failure));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }
}

/// Staleness view for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PublishStatus {
    pub last_applied: Option<AppliedRecord>,
    /// Fingerprint of what the current active set compiles to.
    pub current: Option<Fingerprint>,
    pub stale: bool,
    pub last_failure: Option<String>,
}

pub struct Publisher {
    registry: Arc<dyn ResourceRegistry>,
    compiler: ArcSwap<ConfigCompiler>,
    reloader: Reloader,
    config_path: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
    last_outcome: ArcSwapOption<PublishOutcome>,
}

impl Publisher {
    pub fn new(
        registry: Arc<dyn ResourceRegistry>,
        compiler: ConfigCompiler,
        reloader: Reloader,
        config_path: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            compiler: ArcSwap::from_pointee(compiler),
            reloader,
            config_path,
            clock,
            lock: Mutex::new(()),
            last_outcome: ArcSwapOption::empty(),
        }
    }

    pub fn compiler(&self) -> Arc<ConfigCompiler> {
        self.compiler.load_full()
    }

    /// Swap compiler settings; takes effect on the next publish.
    pub fn set_compiler(&self, compiler: ConfigCompiler) {
        self.compiler.store(Arc::new(compiler));
    }

    pub fn reloader(&self) -> &Reloader {
        &self.reloader
    }

    /// Compile the current active set without publishing it.
    pub fn preview(&self) -> Result<Compiled, CompileError> {
        self.compiler().compile(&self.registry.list_active())
    }

    pub async fn publish(&self, reason: &str) -> PublishOutcome {
        let _guard = self.lock.lock().await;

        let resources = self.registry.list_active();
        let outcome = match self.compiler().compile(&resources) {
            Ok(compiled) => self.apply(reason, compiled).await,
            Err(e) => {
                tracing::warn!(reason, error = %e, "Compilation refused, live proxy left untouched");
                metrics::record_publish("compile_failed");
                PublishOutcome {
                    reason: reason.to_string(),
                    fingerprint: None,
                    backends: Vec::new(),
                    warnings: Vec::new(),
                    reload_path: None,
                    failure: Some(e.into()),
                }
            }
        };

        self.last_outcome.store(Some(Arc::new(outcome.clone())));
        outcome
    }

    async fn apply(&self, reason: &str, compiled: Compiled) -> PublishOutcome {
        metrics::record_compiled_backends(compiled.backends.len());
        for w in &compiled.warnings {
            tracing::warn!(
                resource_id = w.resource_id,
                slug = %w.slug,
                degraded = w.degraded,
                reason = %w.reason,
                "Resource not rendered normally"
            );
        }

        let result = match self.write(compiled.text).await {
            Ok(()) => self.reloader.reload().await,
            Err(e) => Err(e),
        };

        let (reload_path, failure) = match result {
            Ok(path) => {
                let record = AppliedRecord {
                    fingerprint: compiled.fingerprint,
                    applied_at: self.clock.now(),
                    reload_path: path,
                };
                if let Err(e) = self.registry.record_applied(record) {
                    tracing::warn!(error = %e, "Cannot persist applied fingerprint");
                }
                tracing::info!(
                    reason,
                    fingerprint = %compiled.fingerprint,
                    backends = compiled.backends.len(),
                    via = ?path,
                    "Published proxy configuration"
                );
                metrics::record_publish("applied");
                (Some(path), None)
            }
            Err(e) => {
                tracing::warn!(
                    reason,
                    fingerprint = %compiled.fingerprint,
                    cause = %e.cause,
                    "Proxy reload failed, persisted state kept"
                );
                metrics::record_publish("reload_failed");
                metrics::record_reload_failure();
                (None, Some(PublishError::Reload(e)))
            }
        };

        PublishOutcome {
            reason: reason.to_string(),
            fingerprint: Some(compiled.fingerprint),
            backends: compiled.backends,
            warnings: compiled.warnings,
            reload_path,
            failure,
        }
    }

    async fn write(&self, text: String) -> Result<(), ReloadFailed> {
        let path = self.config_path.clone();
        let display = path.display().to_string();
        match tokio::task::spawn_blocking(move || write_atomic(&path, text.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ReloadFailed::new(format!("cannot write {}: {}", display, e))),
            Err(e) => Err(ReloadFailed::new(format!("write task failed: {}", e))),
        }
    }

    /// Read from the store, so a restarted process still knows what is live.
    pub fn last_applied(&self) -> Option<AppliedRecord> {
        self.registry.last_applied()
    }

    pub fn last_outcome(&self) -> Option<Arc<PublishOutcome>> {
        self.last_outcome.load_full()
    }

    /// Compare the live fingerprint with what the active set compiles to now.
    pub fn status(&self) -> PublishStatus {
        let last_applied = self.last_applied();
        let current = self.preview().ok().map(|c| c.fingerprint);
        let stale = match (&last_applied, current) {
            (Some(applied), Some(current)) => applied.fingerprint != current,
            _ => true,
        };
        let last_failure = self
            .last_outcome()
            .and_then(|o| o.failure.as_ref().map(ToString::to_string));

        PublishStatus {
            last_applied,
            current,
            stale,
            last_failure,
        }
    }
}
