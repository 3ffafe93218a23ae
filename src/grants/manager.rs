//! Grant lifecycle: create, check, expire, sweep, remove.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::escape::ident;
use crate::compiler::rules::grant_rule;
use crate::control::{remove_if_exists, write_atomic};
use crate::gateway::error::{GatewayError, GatewayResult};
use crate::gateway::publisher::Publisher;
use crate::gateway::resources::Mutation;
use crate::model::{
    AccessGrant, Clock, GrantId, GrantKind, NewGrant, Resource, ResourceId, SubjectId,
};
use crate::observability::metrics;
use crate::store::{GrantStore, ResourceRegistry, StoreError};

/// Result of [`GrantManager::check_access`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "access", rename_all = "snake_case")]
pub enum AccessDecision {
    Granted { grant: AccessGrant },
    Denied { reason: String },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted { .. })
    }
}

pub struct GrantManager {
    resources: Arc<dyn ResourceRegistry>,
    store: Arc<dyn GrantStore>,
    publisher: Arc<Publisher>,
    clock: Arc<dyn Clock>,
    default_ttl_secs: u64,
    artifact_dir: Option<PathBuf>,
}

impl GrantManager {
    pub fn new(
        resources: Arc<dyn ResourceRegistry>,
        store: Arc<dyn GrantStore>,
        publisher: Arc<Publisher>,
        clock: Arc<dyn Clock>,
        default_ttl_secs: u64,
        artifact_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            resources,
            store,
            publisher,
            clock,
            default_ttl_secs,
            artifact_dir,
        }
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Persist a grant for `subject` (or everyone) on an active resource.
    ///
    /// `ttl_secs = None` makes the grant permanent. Global grants republish
    /// the proxy configuration; subject grants do not.
    pub async fn create_grant(
        &self,
        resource_id: ResourceId,
        subject: Option<SubjectId>,
        ttl_secs: Option<u64>,
    ) -> GatewayResult<Mutation<AccessGrant>> {
        let resource = self.active_resource(resource_id)?;
        let now = self.clock.now();
        let header = self.publisher.compiler().settings().subject_header.clone();

        let grant = self.store.create(NewGrant {
            resource_id,
            subject_id: subject,
            config_name: config_name(&resource, subject, now),
            rule: grant_rule(&resource, subject, &header),
            expires_at: ttl_secs.map(|ttl| now.saturating_add(ttl)),
            created_at: now,
        })?;

        tracing::info!(
            grant_id = grant.id,
            resource_id,
            subject_id = ?subject,
            expires_at = ?grant.expires_at,
            "Access grant created"
        );
        metrics::record_grant_created(grant.kind().as_str());

        let mut warnings = Vec::new();
        if let Some(e) = self.write_artifact(&grant) {
            warnings.push(e);
        }
        if grant.kind() == GrantKind::Global {
            let outcome = self.publisher.publish("global grant created").await;
            warnings.extend(outcome.warning());
        }

        Ok(Mutation {
            data: grant,
            warning: join_warnings(warnings),
        })
    }

    /// A subject's access request: default lifetime.
    pub async fn request_access(
        &self,
        resource_id: ResourceId,
        subject: SubjectId,
    ) -> GatewayResult<Mutation<AccessGrant>> {
        self.create_grant(resource_id, Some(subject), Some(self.default_ttl_secs))
            .await
    }

    /// Admin action opening a resource to everyone. Never expires.
    pub async fn create_global_grant(
        &self,
        resource_id: ResourceId,
    ) -> GatewayResult<Mutation<AccessGrant>> {
        self.create_grant(resource_id, None, None).await
    }

    pub fn is_expired(&self, grant: &AccessGrant) -> bool {
        grant.is_expired_at(self.clock.now())
    }

    pub fn record_usage(&self, id: GrantId) -> GatewayResult<AccessGrant> {
        Ok(self.store.record_usage(id, self.clock.now())?)
    }

    /// Find a grant that lets `subject` through to `resource_id` and count the use.
    ///
    /// Expired grants and grants on inactive resources never match. A
    /// subject-specific grant wins over a global one.
    pub fn check_access(
        &self,
        resource_id: ResourceId,
        subject: Option<SubjectId>,
    ) -> GatewayResult<AccessDecision> {
        let resource = self.resources.get(resource_id).ok_or(GatewayError::NotFound {
            kind: "resource",
            id: resource_id,
        })?;
        if !resource.is_active {
            return Ok(AccessDecision::Denied {
                reason: "resource is not active".to_string(),
            });
        }

        let now = self.clock.now();
        let candidate = self
            .store
            .list_by_resource(resource_id)
            .into_iter()
            .filter(|g| g.is_live_at(now))
            .filter(|g| {
                g.subject_id.is_none() || g.subject_id == subject || !resource.requires_auth
            })
            .min_by_key(|g| (g.subject_id.is_none() || g.subject_id != subject, g.id));

        match candidate {
            Some(grant) => match self.store.record_usage(grant.id, now) {
                Ok(grant) => Ok(AccessDecision::Granted { grant }),
                // swept or removed between the lookup and the usage update
                Err(StoreError::NotFound { .. }) => Ok(AccessDecision::Denied {
                    reason: "grant no longer exists".to_string(),
                }),
                Err(e) => Err(e.into()),
            },
            None => Ok(AccessDecision::Denied {
                reason: "no live grant".to_string(),
            }),
        }
    }

    /// Remove every expired grant and its side file. Running it again with no
    /// new expirations removes nothing.
    pub async fn cleanup_sweep(&self) -> GatewayResult<Mutation<usize>> {
        let expired = self.store.list_expired(self.clock.now());
        if expired.is_empty() {
            return Ok(Mutation::clean(0));
        }

        let mut warnings: Vec<String> = expired
            .iter()
            .filter_map(|g| self.remove_artifact(g))
            .collect();
        let ids: Vec<GrantId> = expired.iter().map(|g| g.id).collect();
        let removed = self.store.delete_batch(&ids)?;

        metrics::record_grants_swept(removed);
        tracing::info!(removed, "Expired grants swept");

        if expired.iter().any(|g| g.kind() == GrantKind::Global) {
            let outcome = self.publisher.publish("expired global grants swept").await;
            warnings.extend(outcome.warning());
        }

        Ok(Mutation {
            data: removed,
            warning: join_warnings(warnings),
        })
    }

    /// Delete one grant. Authorization is the caller's concern.
    pub async fn remove_grant(&self, id: GrantId) -> GatewayResult<Mutation<AccessGrant>> {
        let grant = self.store.delete(id)?;
        tracing::info!(grant_id = id, resource_id = grant.resource_id, "Access grant removed");

        let mut warnings: Vec<String> = self.remove_artifact(&grant).into_iter().collect();
        if grant.kind() == GrantKind::Global {
            let outcome = self.publisher.publish("global grant removed").await;
            warnings.extend(outcome.warning());
        }

        Ok(Mutation {
            data: grant,
            warning: join_warnings(warnings),
        })
    }

    /// Drop every grant of a resource that no longer exists.
    pub fn purge_resource(&self, resource_id: ResourceId) -> GatewayResult<usize> {
        let grants = self.store.list_by_resource(resource_id);
        for grant in &grants {
            self.remove_artifact(grant);
        }
        let ids: Vec<GrantId> = grants.iter().map(|g| g.id).collect();
        Ok(self.store.delete_batch(&ids)?)
    }

    pub fn get(&self, id: GrantId) -> GatewayResult<AccessGrant> {
        self.store
            .get(id)
            .ok_or(GatewayError::NotFound { kind: "grant", id })
    }

    pub fn list_all(&self) -> Vec<AccessGrant> {
        self.store.list_all()
    }

    pub fn list_by_subject(&self, subject: SubjectId) -> Vec<AccessGrant> {
        self.store.list_by_subject(subject)
    }

    pub fn list_by_resource(&self, resource_id: ResourceId) -> Vec<AccessGrant> {
        self.store.list_by_resource(resource_id)
    }

    /// Active and unexpired.
    pub fn active_grants(&self) -> Vec<AccessGrant> {
        let now = self.clock.now();
        self.store
            .list_all()
            .into_iter()
            .filter(|g| g.is_live_at(now))
            .collect()
    }

    fn active_resource(&self, id: ResourceId) -> GatewayResult<Resource> {
        let resource = self
            .resources
            .get(id)
            .ok_or(GatewayError::NotFound { kind: "resource", id })?;
        if !resource.is_active {
            return Err(GatewayError::InactiveResource(id));
        }
        Ok(resource)
    }

    fn artifact_path(&self, grant: &AccessGrant) -> Option<PathBuf> {
        self.artifact_dir
            .as_deref()
            .map(|dir| artifact_path(dir, &grant.config_name))
    }

    fn write_artifact(&self, grant: &AccessGrant) -> Option<String> {
        let path = self.artifact_path(grant)?;
        let mut body = grant.rule.clone();
        body.push('\n');
        match write_atomic(&path, body.as_bytes()) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(grant_id = grant.id, path = %path.display(), error = %e, "Cannot write grant file");
                Some(format!("grant file {} not written: {}", path.display(), e))
            }
        }
    }

    fn remove_artifact(&self, grant: &AccessGrant) -> Option<String> {
        let path = self.artifact_path(grant)?;
        match remove_if_exists(&path) {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(grant_id = grant.id, path = %path.display(), error = %e, "Cannot remove grant file");
                Some(format!("grant file {} not removed: {}", path.display(), e))
            }
        }
    }
}

/// `<slug>_<subject|global>_<epoch secs>_<8 hex>`.
fn config_name(resource: &Resource, subject: Option<SubjectId>, now: u64) -> String {
    let who = subject.map_or_else(|| "global".to_string(), |s| s.to_string());
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}_{}", ident(&resource.slug), who, now, &nonce[..8])
}

pub fn artifact_path(dir: &Path, config_name: &str) -> PathBuf {
    dir.join(format!("{}.cfg", config_name))
}

fn join_warnings(warnings: Vec<String>) -> Option<String> {
    if warnings.is_empty() {
        None
    } else {
        Some(warnings.join("; "))
    }
}
