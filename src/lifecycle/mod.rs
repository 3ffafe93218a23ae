//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Open store → Build gateway → Initial publish
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain admin requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Republish the proxy configuration
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then store, then listeners
//! - Fail fast: any startup error is fatal

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
