//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;

use service_gateway::config::{GatewayConfig, RegistryConfig, ReplicaDescriptor, ServiceConfig};
use service_gateway::http::GatewayServer;
use service_gateway::lifecycle::Shutdown;
use service_gateway::registry::{RegistryServer, ServiceRegistry};

/// A request seen by a mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Handle to a running mock backend.
#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn replica(&self) -> ReplicaDescriptor {
        ReplicaDescriptor::new(self.addr.ip().to_string(), self.addr.port().to_string())
    }

    /// Wait until at least `expected` calls arrived or `timeout` elapsed.
    pub async fn wait_for_calls(&self, expected: u32, timeout: Duration) -> u32 {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.calls() < expected && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the method and path and returns status and JSON body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(Method, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (c, r) = (calls.clone(), requests.clone());
    let app = Router::new().fallback(move |request: Request<Body>| {
        let (f, c, r) = (f.clone(), c.clone(), r.clone());
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX)
                .await
                .unwrap_or_default();
            let path = parts.uri.path().to_string();
            r.lock().unwrap().push(RecordedRequest {
                method: parts.method.clone(),
                path: path.clone(),
                headers: parts.headers,
                body,
            });

            let (status, body) = f(parts.method, path).await;
            (
                StatusCode::from_u16(status).unwrap(),
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
        }
    });

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend {
        addr,
        calls,
        requests,
    }
}

/// Start a backend that always answers `status` with `body`.
pub async fn start_mock_backend(status: u16, body: &'static str) -> MockBackend {
    start_programmable_backend(move |_, _| async move { (status, body.to_string()) }).await
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a registry; returns its base URL and the registry it serves.
pub async fn start_registry(shutdown: &Shutdown) -> (String, Arc<ServiceRegistry>) {
    let registry = Arc::new(ServiceRegistry::new());
    let server = RegistryServer::with_registry(registry.clone(), RegistryConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    (format!("http://{}", addr), registry)
}

/// Gateway config for tests: fast backoff, no rate limit, discovery at `registry_url`.
pub fn gateway_config(registry_url: &str, replicas: Vec<ReplicaDescriptor>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.discovery.url = registry_url.to_string();
    config.discovery.timeout_ms = 1_000;
    config.retries.base_delay_ms = 1;
    config.retries.max_delay_ms = 5;
    config.timeouts.upstream_ms = 2_000;
    config.timeouts.request_ms = 10_000;
    config.rate_limit.enabled = false;
    config.notifications.timeout_ms = 1_000;
    config.status.timeout_ms = 1_000;
    config.observability.metrics_enabled = false;
    if !replicas.is_empty() {
        config
            .services
            .insert(config.upstream.service.clone(), ServiceConfig { replicas });
    }
    config
}

/// Start a gateway; returns its base URL.
pub async fn start_gateway(config: GatewayConfig, shutdown: &Shutdown) -> String {
    let server = GatewayServer::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let rx = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    format!("http://{}", addr)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
