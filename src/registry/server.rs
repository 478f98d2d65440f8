//! Registry HTTP server.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::RegistryConfig;
use crate::lifecycle::shutdown::wait_for;
use crate::registry::handlers;
use crate::registry::store::ServiceRegistry;

/// HTTP front for a [`ServiceRegistry`].
pub struct RegistryServer {
    router: Router,
    registry: Arc<ServiceRegistry>,
    config: RegistryConfig,
}

impl RegistryServer {
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_registry(Arc::new(ServiceRegistry::new()), config)
    }

    /// Serve an existing registry (tests inspect it directly).
    pub fn with_registry(registry: Arc<ServiceRegistry>, config: RegistryConfig) -> Self {
        let router = Router::new()
            .route("/register", post(handlers::register))
            .route("/deregister", post(handlers::deregister))
            .route("/services", get(handlers::list))
            .route("/services/{name}", get(handlers::lookup))
            .route("/status", get(handlers::status))
            .with_state(registry.clone())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size))
            .layer(TraceLayer::new_for_http());

        Self {
            router,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Service registry starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("Service registry stopped");
        Ok(())
    }
}
