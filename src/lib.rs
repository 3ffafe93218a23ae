//! Library-access gateway control plane.
//!
//! Compiles the registry of proxied resources into a complete HAProxy
//! configuration, publishes it atomically, reloads the live proxy and manages
//! the lifecycle of access grants.

pub mod admin;
pub mod compiler;
pub mod config;
pub mod control;
pub mod gateway;
pub mod grants;
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod store;

pub use config::GatewayConfig;
pub use gateway::Gateway;
pub use http::AdminServer;
pub use lifecycle::Shutdown;
