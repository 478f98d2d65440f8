//! Gateway HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, body limits, request ID, rate limit)
//! - Resolve replica lists and enforce the request deadline
//! - Bind server to listener and drain on shutdown

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, ReplicaDescriptor};
use crate::discovery::DiscoveryClient;
use crate::error::{GatewayError, GatewayResult};
use crate::http::handlers::{beat_upload, gateway_status, user_proxy};
use crate::http::request::MakeRequestUuid;
use crate::lifecycle::shutdown::wait_for;
use crate::notify::NotificationDispatcher;
use crate::resilience::CircuitBreakerPool;
use crate::routing::{ReplicaRouter, UpstreamRequest, UpstreamResponse};
use crate::security::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub router: ReplicaRouter,
    pub discovery: Arc<DiscoveryClient>,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        let replica_ids: Vec<String> = config
            .services
            .values()
            .flat_map(|service| service.replicas.iter().map(ReplicaDescriptor::id))
            .collect();
        let breakers = Arc::new(CircuitBreakerPool::with_replicas(
            config.circuit_breaker.clone(),
            replica_ids,
        ));
        let discovery = Arc::new(DiscoveryClient::new(&config.discovery));

        Self {
            router: ReplicaRouter::new(&config, breakers),
            notifier: NotificationDispatcher::new(discovery.clone(), config.notifications.clone()),
            discovery,
            config,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerPool> {
        self.router.breakers()
    }

    /// Dispatch to `service` under the whole-request deadline.
    pub async fn dispatch(
        &self,
        service: &str,
        request: &UpstreamRequest,
    ) -> GatewayResult<UpstreamResponse> {
        let start = Instant::now();
        let deadline = Duration::from_millis(self.config.timeouts.request_ms);

        let work = async {
            let replicas = self.replicas_for(service).await?;
            self.router.dispatch(service, &replicas, request).await
        };

        match tokio::time::timeout(deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(service = %service, elapsed_ms, "Request deadline exceeded");
                Err(GatewayError::UpstreamTimeout { elapsed_ms })
            }
        }
    }

    /// Static replicas for `service`, or the single registry instance when
    /// none are configured.
    async fn replicas_for(&self, service: &str) -> GatewayResult<Cow<'_, [ReplicaDescriptor]>> {
        let configured = self.config.replicas_for(service);
        if !configured.is_empty() {
            return Ok(Cow::Borrowed(configured));
        }

        match self.discovery.resolve(service).await {
            Ok(record) => Ok(Cow::Owned(vec![record.into()])),
            Err(_) => Err(GatewayError::ServiceUnavailable {
                service: service.to_string(),
            }),
        }
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig) -> Self {
        let state = AppState::new(config);
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    fn build_router(state: AppState) -> Router {
        let max_body = state.config.listener.max_body_size;

        let mut router = Router::new()
            .route(
                "/user/{*path}",
                get(user_proxy)
                    .post(user_proxy)
                    .put(user_proxy)
                    .delete(user_proxy),
            )
            .route("/beats/upload", post(beat_upload))
            .route("/status", get(gateway_status));

        if state.config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::new(state.config.rate_limit.clone()));
            router = router.route_layer(middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));
        }

        router
            .with_state(state)
            .layer(DefaultBodyLimit::max(max_body))
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.config.upstream.service,
            discovery = %self.state.discovery.base_url(),
            "Gateway starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}
