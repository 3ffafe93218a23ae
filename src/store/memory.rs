//! In-memory store with optional JSON snapshots.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::control::writer::write_atomic;
use crate::model::{
    AccessGrant, AppliedRecord, GrantId, NewGrant, NewResource, Resource, ResourceId,
    ResourcePatch, SubjectId, ValidationError,
};
use crate::store::{GrantStore, ResourceRegistry, StoreError, StoreResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_resource_id: u64,
    next_grant_id: u64,
    resources: Vec<Resource>,
    grants: Vec<AccessGrant>,
    #[serde(default)]
    last_applied: Option<AppliedRecord>,
}

/// Concurrent map backed store implementing both collaborator interfaces.
///
/// Reads never take the write gate. Writes that need a consistent view
/// (uniqueness checks, batch deletes, snapshots) are serialized through it.
/// With a snapshot path, a write whose snapshot cannot be saved is undone and
/// reported, so memory never holds changes the file lost.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: DashMap<ResourceId, Resource>,
    grants: DashMap<GrantId, AccessGrant>,
    next_resource_id: AtomicU64,
    next_grant_id: AtomicU64,
    last_applied: ArcSwapOption<AppliedRecord>,
    write_gate: Mutex<()>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            snapshot_path,
            ..Self::default()
        }
    }

    /// Load from a snapshot file if it exists; start empty otherwise.
    pub fn load_from_file(path: &Path) -> StoreResult<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            store
                .next_resource_id
                .store(snapshot.next_resource_id, Ordering::SeqCst);
            store
                .next_grant_id
                .store(snapshot.next_grant_id, Ordering::SeqCst);
            for r in snapshot.resources {
                store.resources.insert(r.id, r);
            }
            for g in snapshot.grants {
                store.grants.insert(g.id, g);
            }
            store.last_applied.store(snapshot.last_applied.map(Arc::new));
            tracing::info!(
                resources = store.resources.len(),
                grants = store.grants.len(),
                path = %path.display(),
                "Loaded store snapshot"
            );
        }
        Ok(store)
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write a snapshot. Caller must hold the write gate.
    fn persist(&self) -> StoreResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let mut snapshot = Snapshot {
            next_resource_id: self.next_resource_id.load(Ordering::SeqCst),
            next_grant_id: self.next_grant_id.load(Ordering::SeqCst),
            resources: self.resources.iter().map(|r| r.value().clone()).collect(),
            grants: self.grants.iter().map(|g| g.value().clone()).collect(),
            last_applied: self.last_applied.load_full().map(|r| r.as_ref().clone()),
        };
        snapshot.resources.sort_by_key(|r| r.id);
        snapshot.grants.sort_by_key(|g| g.id);

        let result = serde_json::to_vec_pretty(&snapshot)
            .map_err(StoreError::from)
            .and_then(|bytes| write_atomic(path, &bytes).map_err(StoreError::from));
        if let Err(e) = &result {
            tracing::error!(path = %path.display(), error = %e, "Failed to write store snapshot");
        }
        result
    }

    fn check_unique(
        &self,
        id: Option<ResourceId>,
        slug: Option<&str>,
        proxy_path: Option<&str>,
    ) -> Result<(), ValidationError> {
        for entry in self.resources.iter() {
            let other = entry.value();
            if Some(other.id) == id {
                continue;
            }
            if let Some(slug) = slug {
                if other.slug == slug {
                    return Err(ValidationError::DuplicateSlug(slug.to_string()));
                }
            }
            if let Some(path) = proxy_path {
                if other.proxy_path == path {
                    return Err(ValidationError::DuplicateProxyPath(path.to_string()));
                }
                // a prefix match on the shorter path would swallow the longer one
                if is_segment_prefix(&other.proxy_path, path)
                    || is_segment_prefix(path, &other.proxy_path)
                {
                    return Err(ValidationError::OverlappingProxyPath {
                        path: path.to_string(),
                        existing: other.proxy_path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn sorted_resources(&self, filter: impl Fn(&Resource) -> bool) -> Vec<Resource> {
        let mut out: Vec<Resource> = self
            .resources
            .iter()
            .filter(|r| filter(r.value()))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }

    fn sorted_grants(&self, filter: impl Fn(&AccessGrant) -> bool) -> Vec<AccessGrant> {
        let mut out: Vec<AccessGrant> = self
            .grants
            .iter()
            .filter(|g| filter(g.value()))
            .map(|g| g.value().clone())
            .collect();
        out.sort_by_key(|g| g.id);
        out
    }

    fn resource_not_found(id: ResourceId) -> StoreError {
        StoreError::NotFound {
            kind: "resource",
            id,
        }
    }

    fn grant_not_found(id: GrantId) -> StoreError {
        StoreError::NotFound { kind: "grant", id }
    }
}

fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

impl ResourceRegistry for MemoryStore {
    fn get(&self, id: ResourceId) -> Option<Resource> {
        self.resources.get(&id).map(|r| r.value().clone())
    }

    fn get_by_slug(&self, slug: &str) -> Option<Resource> {
        self.resources
            .iter()
            .find(|r| r.value().slug == slug)
            .map(|r| r.value().clone())
    }

    fn list_active(&self) -> Vec<Resource> {
        self.sorted_resources(|r| r.is_active)
    }

    fn list_all(&self) -> Vec<Resource> {
        self.sorted_resources(|_| true)
    }

    fn create(&self, new: NewResource, now: u64) -> StoreResult<Resource> {
        let _gate = self.gate();
        self.check_unique(None, Some(&new.slug), Some(&new.proxy_path))?;

        let id = self.next_resource_id.fetch_add(1, Ordering::SeqCst) + 1;
        let resource = new.into_resource(id, now);
        self.resources.insert(id, resource.clone());
        if let Err(e) = self.persist() {
            self.resources.remove(&id);
            return Err(e);
        }
        Ok(resource)
    }

    fn update(&self, id: ResourceId, patch: &ResourcePatch, now: u64) -> StoreResult<Resource> {
        let _gate = self.gate();
        let mut resource =
            ResourceRegistry::get(self, id).ok_or_else(|| Self::resource_not_found(id))?;
        self.check_unique(Some(id), None, patch.proxy_path.as_deref())?;

        let previous = resource.clone();
        patch.apply(&mut resource, now);
        self.resources.insert(id, resource.clone());
        if let Err(e) = self.persist() {
            self.resources.insert(id, previous);
            return Err(e);
        }
        Ok(resource)
    }

    fn soft_delete(&self, id: ResourceId, now: u64) -> StoreResult<Resource> {
        ResourceRegistry::update(self, id, &ResourcePatch::deactivate(), now)
    }

    fn hard_delete(&self, id: ResourceId) -> StoreResult<Resource> {
        let _gate = self.gate();
        let (_, resource) = self
            .resources
            .remove(&id)
            .ok_or_else(|| Self::resource_not_found(id))?;
        if let Err(e) = self.persist() {
            self.resources.insert(id, resource);
            return Err(e);
        }
        Ok(resource)
    }

    fn last_applied(&self) -> Option<AppliedRecord> {
        self.last_applied.load_full().map(|r| r.as_ref().clone())
    }

    fn record_applied(&self, record: AppliedRecord) -> StoreResult<()> {
        let _gate = self.gate();
        self.last_applied.store(Some(Arc::new(record)));
        self.persist()
    }
}

impl GrantStore for MemoryStore {
    fn create(&self, new: NewGrant) -> StoreResult<AccessGrant> {
        let _gate = self.gate();
        let id = self.next_grant_id.fetch_add(1, Ordering::SeqCst) + 1;
        let grant = new.into_grant(id);
        self.grants.insert(id, grant.clone());
        if let Err(e) = self.persist() {
            self.grants.remove(&id);
            return Err(e);
        }
        Ok(grant)
    }

    fn get(&self, id: GrantId) -> Option<AccessGrant> {
        self.grants.get(&id).map(|g| g.value().clone())
    }

    fn list_all(&self) -> Vec<AccessGrant> {
        self.sorted_grants(|_| true)
    }

    fn list_by_subject(&self, subject: SubjectId) -> Vec<AccessGrant> {
        self.sorted_grants(|g| g.subject_id == Some(subject))
    }

    fn list_by_resource(&self, resource: ResourceId) -> Vec<AccessGrant> {
        self.sorted_grants(|g| g.resource_id == resource)
    }

    fn list_expired(&self, now: u64) -> Vec<AccessGrant> {
        self.sorted_grants(|g| g.is_expired_at(now))
    }

    fn record_usage(&self, id: GrantId, now: u64) -> StoreResult<AccessGrant> {
        let updated = {
            let mut entry = self
                .grants
                .get_mut(&id)
                .ok_or_else(|| Self::grant_not_found(id))?;
            entry.record_usage(now);
            entry.value().clone()
        };
        // usage counters are snapshotted opportunistically; skip the gate if a
        // writer holds it, and never fail an access check over a lost counter
        if let Ok(_gate) = self.write_gate.try_lock() {
            let _ = self.persist();
        }
        Ok(updated)
    }

    fn delete(&self, id: GrantId) -> StoreResult<AccessGrant> {
        let _gate = self.gate();
        let (_, grant) = self
            .grants
            .remove(&id)
            .ok_or_else(|| Self::grant_not_found(id))?;
        if let Err(e) = self.persist() {
            self.grants.insert(id, grant);
            return Err(e);
        }
        Ok(grant)
    }

    fn delete_batch(&self, ids: &[GrantId]) -> StoreResult<usize> {
        let _gate = self.gate();
        let removed: Vec<AccessGrant> = ids
            .iter()
            .filter_map(|id| self.grants.remove(id).map(|(_, g)| g))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.persist() {
            for grant in removed {
                self.grants.insert(grant.id, grant);
            }
            return Err(e);
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_resource(slug: &str, path: &str) -> NewResource {
        NewResource::new(slug.to_uppercase(), slug, path, "https://upstream.example")
    }

    fn new_grant(resource_id: ResourceId, subject: Option<SubjectId>, expires_at: Option<u64>) -> NewGrant {
        NewGrant {
            resource_id,
            subject_id: subject,
            config_name: format!("r{resource_id}"),
            rule: String::new(),
            expires_at,
            created_at: 0,
        }
    }

    #[test]
    fn test_resource_crud_and_ordering() {
        let store = MemoryStore::new(None);
        let a = ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();
        let b = ResourceRegistry::create(&store, new_resource("beta", "beta"), 1).unwrap();
        assert!(a.id < b.id);

        store.soft_delete(a.id, 2).unwrap();
        let active: Vec<_> = store.list_active().into_iter().map(|r| r.slug).collect();
        assert_eq!(active, vec!["beta"]);
        assert_eq!(ResourceRegistry::list_all(&store).len(), 2);

        store.hard_delete(b.id).unwrap();
        assert!(ResourceRegistry::get(&store, b.id).is_none());
        assert!(matches!(
            store.hard_delete(b.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_uniqueness_enforced() {
        let store = MemoryStore::new(None);
        ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();

        let dup_slug = ResourceRegistry::create(&store, new_resource("acme", "other"), 1);
        assert!(matches!(
            dup_slug,
            Err(StoreError::Invalid(ValidationError::DuplicateSlug(_)))
        ));

        let dup_path = ResourceRegistry::create(&store, new_resource("other", "acme"), 1);
        assert!(matches!(
            dup_path,
            Err(StoreError::Invalid(ValidationError::DuplicateProxyPath(_)))
        ));
    }

    #[test]
    fn test_update_path_conflict() {
        let store = MemoryStore::new(None);
        ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();
        let b = ResourceRegistry::create(&store, new_resource("beta", "beta"), 1).unwrap();

        let patch = ResourcePatch {
            proxy_path: Some("acme".into()),
            ..ResourcePatch::default()
        };
        assert!(ResourceRegistry::update(&store, b.id, &patch, 2).is_err());

        // keeping its own path is fine
        let patch = ResourcePatch {
            proxy_path: Some("beta".into()),
            ..ResourcePatch::default()
        };
        assert!(ResourceRegistry::update(&store, b.id, &patch, 2).is_ok());
    }

    #[test]
    fn test_grant_queries() {
        let store = MemoryStore::new(None);
        let g1 = GrantStore::create(&store, new_grant(1, Some(42), Some(100))).unwrap();
        GrantStore::create(&store, new_grant(1, None, None)).unwrap();
        GrantStore::create(&store, new_grant(2, Some(42), Some(500))).unwrap();

        assert_eq!(store.list_by_subject(42).len(), 2);
        assert_eq!(store.list_by_resource(1).len(), 2);

        let expired = store.list_expired(200);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, g1.id);

        let used = GrantStore::record_usage(&store, g1.id, 150).unwrap();
        assert_eq!(used.usage_count, 1);
    }

    #[test]
    fn test_delete_batch_ignores_missing() {
        let store = MemoryStore::new(None);
        let g = GrantStore::create(&store, new_grant(1, Some(1), Some(1))).unwrap();
        assert_eq!(store.delete_batch(&[g.id, 999]).unwrap(), 1);
        assert_eq!(store.delete_batch(&[g.id]).unwrap(), 0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let path = std::env::temp_dir().join(format!("gw-store-{}.json", uuid::Uuid::new_v4()));

        let store = MemoryStore::new(Some(path.clone()));
        let r = ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();
        GrantStore::create(&store, new_grant(r.id, Some(7), None)).unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        assert_eq!(ResourceRegistry::get(&loaded, r.id).unwrap().slug, "acme");
        assert_eq!(loaded.list_by_subject(7).len(), 1);

        // ids keep counting from the snapshot
        let next = ResourceRegistry::create(&loaded, new_resource("beta", "beta"), 2).unwrap();
        assert!(next.id > r.id);

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_nested_proxy_paths_rejected() {
        let store = MemoryStore::new(None);
        ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();

        let nested = ResourceRegistry::create(&store, new_resource("acmev2", "acme/v2"), 1);
        assert!(matches!(
            nested,
            Err(StoreError::Invalid(ValidationError::OverlappingProxyPath { .. }))
        ));

        // the other direction: a new path that would swallow an existing one
        ResourceRegistry::create(&store, new_resource("beta", "lib/beta"), 1).unwrap();
        let parent = ResourceRegistry::create(&store, new_resource("lib", "lib"), 1);
        assert!(parent.is_err());

        // sharing a leading substring is not nesting
        assert!(ResourceRegistry::create(&store, new_resource("acmecorp", "acmecorp"), 1).is_ok());
    }

    #[test]
    fn test_unwritable_snapshot_fails_and_rolls_back() {
        let blocker = std::env::temp_dir().join(format!("gw-block-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = MemoryStore::new(Some(blocker.join("store.json")));

        let created = ResourceRegistry::create(&store, new_resource("acme", "acme"), 1);
        assert!(matches!(created, Err(StoreError::Io(_))));
        assert!(ResourceRegistry::list_all(&store).is_empty());

        let grant = GrantStore::create(&store, new_grant(1, Some(7), None));
        assert!(grant.is_err());
        assert!(GrantStore::list_all(&store).is_empty());

        std::fs::remove_file(&blocker).unwrap_or_default();
    }

    #[test]
    fn test_failed_delete_keeps_record() {
        let dir = std::env::temp_dir().join(format!("gw-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("store.json");
        let store = MemoryStore::new(Some(path.clone()));
        let r = ResourceRegistry::create(&store, new_resource("acme", "acme"), 1).unwrap();
        let g = GrantStore::create(&store, new_grant(r.id, Some(7), Some(5))).unwrap();

        // replace the snapshot's directory with a file so the next write fails
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, b"blocked").unwrap();

        assert!(store.hard_delete(r.id).is_err());
        assert!(ResourceRegistry::get(&store, r.id).is_some());
        assert!(store.delete_batch(&[g.id]).is_err());
        assert!(GrantStore::get(&store, g.id).is_some());

        std::fs::remove_file(&dir).unwrap_or_default();
    }

    #[test]
    fn test_applied_marker_survives_reload() {
        use crate::compiler::Fingerprint;
        use crate::control::ReloadPath;

        let path = std::env::temp_dir().join(format!("gw-store-{}.json", uuid::Uuid::new_v4()));
        let store = MemoryStore::new(Some(path.clone()));
        assert!(store.last_applied().is_none());

        let record = AppliedRecord {
            fingerprint: Fingerprint::of("frontend libproxy_frontend"),
            applied_at: 42,
            reload_path: ReloadPath::Socket,
        };
        store.record_applied(record.clone()).unwrap();

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.last_applied(), Some(record));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
