//! Marker for the document the live proxy last confirmed.

use serde::{Deserialize, Serialize};

use crate::compiler::Fingerprint;
use crate::control::ReloadPath;

/// Last document the live proxy confirmed. Persisted next to the resource set
/// so staleness survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub fingerprint: Fingerprint,
    pub applied_at: u64,
    pub reload_path: ReloadPath,
}
