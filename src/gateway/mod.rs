//! Control-plane handle.
//!
//! # Data Flow
//! ```text
//! admin API / signals
//!     → Gateway (explicit context, built once in main or per test)
//!         ├─ resources.rs  persist → publisher.publish
//!         ├─ grants::GrantManager  persist → (global only) publisher.publish
//!         ├─ publisher.rs  compile → write → reload, serialized
//!         └─ control::StatsReporter  read-only, never locks
//! ```
//!
//! # Design Decisions
//! - No process-wide singleton: stores and clock are injected
//! - Persisted state is authoritative; publish failures are warnings
//! - Staleness is queryable via the last-applied fingerprint

pub mod error;
pub mod publisher;
pub mod resources;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::compiler::ConfigCompiler;
use crate::config::{CompilerConfig, GatewayConfig};
use crate::control::{ControlSocket, Reloader, StatsReport, StatsReporter};
use crate::grants::GrantManager;
use crate::model::{Clock, Resource, ResourceId};
use crate::store::{GrantStore, ResourceRegistry};

pub use error::{GatewayError, GatewayResult};
pub use crate::model::AppliedRecord;
pub use publisher::{PublishError, PublishOutcome, PublishStatus, Publisher};
pub use resources::{Mutation, ResourceManager};

/// Combined view served by `/admin/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub publish: PublishStatus,
    pub active_resources: usize,
    pub active_grants: usize,
    pub socket_available: bool,
    pub config_path: PathBuf,
    pub grant_artifact_dir: Option<PathBuf>,
    pub stats: StatsReport,
}

pub struct Gateway {
    pub resources: ResourceManager,
    pub grants: GrantManager,
    registry: Arc<dyn ResourceRegistry>,
    publisher: Arc<Publisher>,
    stats: StatsReporter,
    config_path: PathBuf,
    artifact_dir: Option<PathBuf>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        registry: Arc<dyn ResourceRegistry>,
        grant_store: Arc<dyn GrantStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let haproxy = &config.haproxy;
        let reloader = Reloader::new(haproxy);
        let compiler = Self::build_compiler(&config.compiler, &reloader);
        let publisher = Arc::new(Publisher::new(
            registry.clone(),
            compiler,
            reloader,
            haproxy.config_path.clone(),
            clock.clone(),
        ));

        let stats = StatsReporter::new(ControlSocket::new(
            &haproxy.socket_path,
            Duration::from_millis(haproxy.socket_timeout_ms),
            haproxy.response_limit_bytes,
        ));

        Self {
            resources: ResourceManager::new(registry.clone(), publisher.clone(), clock.clone()),
            grants: GrantManager::new(
                registry.clone(),
                grant_store,
                publisher.clone(),
                clock,
                config.grants.default_ttl_secs,
                haproxy.grant_artifact_dir.clone(),
            ),
            registry,
            publisher,
            stats,
            config_path: haproxy.config_path.clone(),
            artifact_dir: haproxy.grant_artifact_dir.clone(),
        }
    }

    /// The emitted `stats socket` line always names the socket the reloader
    /// talks to, which is fixed for the life of the process.
    fn build_compiler(settings: &CompilerConfig, reloader: &Reloader) -> ConfigCompiler {
        ConfigCompiler::new(
            settings.clone(),
            Some(reloader.socket().path().to_path_buf()),
        )
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    /// Swap in reloaded compiler settings. Returns true when they changed, in
    /// which case the caller should republish.
    pub fn apply_compiler_settings(&self, settings: &CompilerConfig) -> bool {
        if self.publisher.compiler().settings() == settings {
            return false;
        }
        let compiler = Self::build_compiler(settings, self.publisher.reloader());
        self.publisher.set_compiler(compiler);
        true
    }

    /// Hard delete a resource and every grant that referenced it.
    pub async fn delete_resource(&self, id: ResourceId) -> GatewayResult<Mutation<Resource>> {
        let mutation = self.resources.hard_delete(id).await?;
        let purged = self.grants.purge_resource(id)?;
        if purged > 0 {
            tracing::info!(resource_id = id, purged, "Grants of deleted resource removed");
        }
        Ok(mutation)
    }

    pub async fn stats(&self) -> StatsReport {
        self.stats.report().await
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            publish: self.publisher.status(),
            active_resources: self.registry.list_active().len(),
            active_grants: self.grants.active_grants().len(),
            socket_available: self.stats.socket_available(),
            config_path: self.config_path.clone(),
            grant_artifact_dir: self.artifact_dir.clone(),
            stats: self.stats.report().await,
        }
    }
}
