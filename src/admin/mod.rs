//! Admin API.
//!
//! Every route sits behind the bearer key. Mutations answer with
//! `{"data": ..., "warning"?: "..."}` where the warning reports a live proxy
//! that may be stale.

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::gateway::Gateway;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(gateway: Arc<Gateway>, api_key: &str) -> Self {
        Self {
            gateway,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/resources", get(list_resources).post(create_resource))
        .route(
            "/admin/resources/{id}",
            get(get_resource)
                .put(update_resource)
                .delete(delete_resource),
        )
        .route("/admin/resources/{id}/activate", post(activate_resource))
        .route("/admin/grants", get(list_grants).post(create_grant))
        .route("/admin/grants/global", post(create_global_grant))
        .route("/admin/grants/{id}", delete(remove_grant))
        .route("/admin/grants/{id}/usage", post(record_usage))
        .route("/admin/access", post(check_access))
        .route("/admin/cleanup", post(cleanup))
        .route("/admin/reload", post(reload))
        .route("/admin/config", get(get_config))
        .route("/admin/stats", get(get_stats))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .with_state(state)
}
