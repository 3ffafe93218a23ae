//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (resource id, slug, grant id) on every lifecycle event
//! - Request ID flows through the admin API
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
