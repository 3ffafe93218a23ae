//! Persisted records consumed by the control plane.
//!
//! # Data Flow
//! ```text
//! gateway::resources ──▶ ResourceRegistry (get / list_active / create / update / delete)
//! grants::manager    ──▶ GrantStore (create / list / list_expired / delete_batch)
//! gateway::publisher ──▶ ResourceRegistry::list_active (ascending id)
//!                    ──▶ ResourceRegistry::record_applied (staleness marker)
//! ```
//!
//! # Design Decisions
//! - Both stores are traits so the core never depends on a storage engine
//! - `MemoryStore` implements both, optionally snapshotting to a JSON file
//! - Uniqueness of slug and proxy path is enforced at write time

pub mod memory;

use thiserror::Error;

use crate::model::{
    AccessGrant, AppliedRecord, GrantId, NewGrant, NewResource, Resource, ResourceId,
    ResourcePatch, SubjectId, ValidationError,
};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Resource registry.
pub trait ResourceRegistry: Send + Sync {
    fn get(&self, id: ResourceId) -> Option<Resource>;
    fn get_by_slug(&self, slug: &str) -> Option<Resource>;
    /// Active resources in ascending id order.
    fn list_active(&self) -> Vec<Resource>;
    /// Every resource in ascending id order.
    fn list_all(&self) -> Vec<Resource>;
    fn create(&self, new: NewResource, now: u64) -> StoreResult<Resource>;
    fn update(&self, id: ResourceId, patch: &ResourcePatch, now: u64) -> StoreResult<Resource>;
    fn soft_delete(&self, id: ResourceId, now: u64) -> StoreResult<Resource>;
    fn hard_delete(&self, id: ResourceId) -> StoreResult<Resource>;
    /// Marker of the document the live proxy last confirmed.
    fn last_applied(&self) -> Option<AppliedRecord>;
    fn record_applied(&self, record: AppliedRecord) -> StoreResult<()>;
}

/// Grant store.
pub trait GrantStore: Send + Sync {
    fn create(&self, new: NewGrant) -> StoreResult<AccessGrant>;
    fn get(&self, id: GrantId) -> Option<AccessGrant>;
    fn list_all(&self) -> Vec<AccessGrant>;
    fn list_by_subject(&self, subject: SubjectId) -> Vec<AccessGrant>;
    fn list_by_resource(&self, resource: ResourceId) -> Vec<AccessGrant>;
    fn list_expired(&self, now: u64) -> Vec<AccessGrant>;
    fn record_usage(&self, id: GrantId, now: u64) -> StoreResult<AccessGrant>;
    fn delete(&self, id: GrantId) -> StoreResult<AccessGrant>;
    /// Delete several grants and persist once. Missing ids are ignored.
    fn delete_batch(&self, ids: &[GrantId]) -> StoreResult<usize>;
}
