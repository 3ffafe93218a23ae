//! HTTP surface of the daemon.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace, timeout)
//!     → admin router (bearer key)
//!     → gateway handle
//! ```

pub mod server;

pub use server::AdminServer;
