//! Persisted record types.
//!
//! # Data Flow
//! ```text
//! admin request
//!     → resource.rs (NewResource / ResourcePatch, field validation)
//!     → store (persisted Resource)
//!     → compiler (rendered into the proxy document)
//!
//! access request
//!     → grant.rs (AccessGrant with optional expiry)
//!     → store (persisted grant, swept when expired)
//! ```
//!
//! # Design Decisions
//! - Timestamps are seconds since the Unix epoch, read through a `Clock`
//! - Updates go through an explicit allow-listed patch; unknown keys are rejected
//! - Custom headers live in a `BTreeMap` so rendering order never depends on hashing

pub mod applied;
pub mod clock;
pub mod grant;
pub mod resource;

pub use applied::AppliedRecord;
pub use clock::{Clock, ManualClock, SystemClock};
pub use grant::{AccessGrant, GrantId, GrantKind, NewGrant};
pub use resource::{
    AccessLevel, AuthMethod, NewResource, Resource, ResourceId, ResourcePatch, SubjectId,
    Upstream, ValidationError,
};
