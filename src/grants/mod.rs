//! Grant lifecycle manager.
//!
//! # Data Flow
//! ```text
//! request_access / create_grant
//!     → compiler::rules::grant_rule (path ACL [AND subject header ACL])
//!     → GrantStore::create
//!     → optional side file `<grant_artifact_dir>/<config_name>.cfg`
//!     → global grants only: gateway::publisher::publish
//!
//! cleanup_sweep
//!     → GrantStore::list_expired → side files removed → delete_batch
//! ```
//!
//! # Design Decisions
//! - Expiry is a predicate, not an error: expired grants behave as absent
//! - Usage counting never recompiles
//! - Per-subject grant removal does not republish; routing is resource level

pub mod manager;

pub use manager::{artifact_path, AccessDecision, GrantManager};
