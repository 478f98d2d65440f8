//! Per-client rate limiting.
//!
//! Each (client IP, route class) pair keeps the instant its budget is next
//! fully restored. A request is admitted while that instant is no further
//! ahead than the class allows for a full burst, and pushes it forward by one
//! request's share of the minute. Pairs whose instant has passed are
//! indistinguishable from new clients and are swept once the table grows.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Table size above which idle clients are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Budget group a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// `/user/*`.
    User,
    /// `POST /beats/upload`.
    Upload,
    /// `GET /status`.
    Status,
}

impl RouteClass {
    pub fn for_path(path: &str) -> Self {
        match path {
            "/status" => RouteClass::Status,
            "/beats/upload" => RouteClass::Upload,
            _ => RouteClass::User,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RouteClass::User => "user",
            RouteClass::Upload => "upload",
            RouteClass::Status => "status",
        }
    }
}

/// Spacing and burst allowance derived from a per-minute budget.
#[derive(Debug, Clone, Copy)]
struct Budget {
    interval: Duration,
    burst: Duration,
}

impl Budget {
    fn per_minute(requests: u32) -> Self {
        let requests = requests.max(1);
        let interval = Duration::from_secs(60) / requests;
        Self {
            interval,
            burst: interval * (requests - 1),
        }
    }
}

/// Shared limiter state.
pub struct RateLimiter {
    /// Instant at which each client's budget is full again.
    restored_at: Mutex<HashMap<(String, RouteClass), Instant>>,
    config: RateLimitConfig,
    sweep_threshold: usize,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_sweep_threshold(config, SWEEP_THRESHOLD)
    }

    fn with_sweep_threshold(config: RateLimitConfig, sweep_threshold: usize) -> Self {
        Self {
            restored_at: Mutex::new(HashMap::new()),
            config,
            sweep_threshold,
        }
    }

    fn budget(&self, class: RouteClass) -> Budget {
        Budget::per_minute(match class {
            RouteClass::User => self.config.user_requests_per_minute,
            RouteClass::Upload => self.config.upload_requests_per_minute,
            RouteClass::Status => self.config.status_requests_per_minute,
        })
    }

    /// Number of (client, class) pairs currently tracked.
    pub fn tracked(&self) -> usize {
        self.restored_at.lock().len()
    }

    pub fn check(&self, client: &str, class: RouteClass) -> bool {
        self.check_at(client, class, Instant::now())
    }

    /// Spend one request for `client` in `class` at `now`.
    pub fn check_at(&self, client: &str, class: RouteClass, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }

        let budget = self.budget(class);
        let mut table = self.restored_at.lock();
        if table.len() >= self.sweep_threshold {
            let before = table.len();
            table.retain(|_, restored| *restored > now);
            tracing::debug!(
                evicted = before - table.len(),
                remaining = table.len(),
                "Swept idle rate-limit entries"
            );
        }

        let key = (client.to_string(), class);
        let restored = table.get(&key).copied().map_or(now, |at| at.max(now));
        if restored.duration_since(now) > budget.burst {
            return false;
        }
        table.insert(key, restored + budget.interval);
        true
    }
}

/// Middleware consulted before gateway handlers run.
///
/// The client key is the peer IP when connection info is available.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let class = RouteClass::for_path(request.uri().path());

    if limiter.check(&client, class) {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, route = class.label(), "Rate limit exceeded");
        metrics::record_rate_limited(class.label());
        GatewayError::RateLimited.into_response()
    }
}
