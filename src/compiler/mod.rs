//! Proxy configuration compiler.
//!
//! # Data Flow
//! ```text
//! ResourceRegistry::list_active (ascending id)
//!     → render.rs (one backend + two path ACLs + rewrites per resource)
//!     → document.rs (typed sections, deterministic serialization)
//!     → Compiled { text, fingerprint, warnings }
//!     → gateway::publisher (write + reload)
//! ```
//!
//! # Design Decisions
//! - Output is a pure function of the active set and settings
//! - Free text (names, header values) passes through `escape` before insertion
//! - A malformed resource is isolated by `MalformedPolicy`, never silently fatal

pub mod document;
pub mod escape;
pub mod render;
pub mod rules;

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::model::ResourceId;

pub use document::{Document, Section, SectionKind};
pub use render::{CompileWarning, Compiled, ConfigCompiler, MalformedPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("resource {slug} (id {id}) cannot be rendered: {reason}")]
    Malformed {
        id: ResourceId,
        slug: String,
        reason: String,
    },
}

/// Content hash of a compiled document, used to detect a stale live proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        u64::from_str_radix(&hex, 16)
            .map(Fingerprint)
            .map_err(|_| de::Error::custom(format!("invalid fingerprint {:?}", hex)))
    }
}
