//! Startup orchestration.
//!
//! Subsystems initialize in order, not concurrently. Any error here is fatal.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::model::{Clock, SystemClock};
use crate::store::{MemoryStore, StoreResult};

/// Open the store (loading its snapshot if configured) and build the gateway.
pub fn build_gateway(config: &GatewayConfig) -> StoreResult<Arc<Gateway>> {
    build_gateway_with_clock(config, Arc::new(SystemClock))
}

pub fn build_gateway_with_clock(
    config: &GatewayConfig,
    clock: Arc<dyn Clock>,
) -> StoreResult<Arc<Gateway>> {
    let store = match &config.store.snapshot_path {
        Some(path) => Arc::new(MemoryStore::load_from_file(path)?),
        None => Arc::new(MemoryStore::new(None)),
    };

    Ok(Arc::new(Gateway::new(
        config,
        store.clone(),
        store,
        clock,
    )))
}
