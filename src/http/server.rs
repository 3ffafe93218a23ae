//! Admin HTTP server.
//!
//! # Responsibilities
//! - Build the Axum router from the admin routes
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind to the listener and shut down gracefully

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::AdminConfig;

pub struct AdminServer {
    router: Router,
}

impl AdminServer {
    pub fn new(config: &AdminConfig, state: AdminState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Admin routes with the middleware stack applied.
    #[allow(deprecated)]
    pub fn build_router(config: &AdminConfig, state: AdminState) -> Router {
        setup_admin_router(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Admin API listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Admin API draining");
            })
            .await?;

        tracing::info!("Admin API stopped");
        Ok(())
    }
}
