//! Control plane for the live proxy process.
//!
//! # Data Flow
//! ```text
//! compiled text → writer.rs (atomic write-then-rename)
//!               → reload.rs (socket `reload`, else validate + service manager)
//!
//! status query  → stats.rs (socket `show stat`, CSV → records)
//! ```
//!
//! # Design Decisions
//! - Every socket and subprocess call is time-bounded
//! - No retries; callers re-run the idempotent publish instead
//! - Stats never raise; an unreachable proxy is a value

pub mod reload;
pub mod socket;
pub mod stats;
pub mod writer;

pub use reload::{ReloadFailed, ReloadPath, Reloader};
pub use socket::{ControlSocket, SocketError};
pub use stats::{parse_stat_csv, StatRecord, StatsReport, StatsReporter};
pub use writer::{remove_if_exists, write_atomic};
