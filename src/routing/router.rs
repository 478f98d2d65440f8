//! Replica selection and ordered failover.
//!
//! # Responsibilities
//! - Skip replicas whose breaker rejects the call (no network I/O)
//! - Make up to `attempts_per_replica` calls per replica with backoff
//! - Classify each answer and feed the replica's breaker
//! - Fail over to the next replica once attempts run out or the breaker opens

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::{GatewayConfig, ReplicaDescriptor};
use crate::error::GatewayError;
use crate::http::response::strip_hop_by_hop;
use crate::observability::metrics;
use crate::resilience::{
    classify_status, AttemptOutcome, BreakerState, CircuitBreaker, CircuitBreakerPool, Permit, RetryPolicy,
};
use crate::routing::replica::{UpstreamRequest, UpstreamResponse};

/// Releases a half-open probe slot when an attempt ends without an
/// outcome, e.g. when the request deadline drops the dispatch future.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    recorded: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record_neutral(self.permit);
        }
    }
}

/// Dispatches buffered requests across an ordered replica list.
#[derive(Clone)]
pub struct ReplicaRouter {
    client: Client<HttpConnector, Body>,
    breakers: Arc<CircuitBreakerPool>,
    retry: RetryPolicy,
    upstream_timeout: Duration,
    max_response_size: usize,
}

impl ReplicaRouter {
    pub fn new(config: &GatewayConfig, breakers: Arc<CircuitBreakerPool>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            client,
            breakers,
            retry: RetryPolicy::new(&config.retries),
            upstream_timeout: Duration::from_millis(config.timeouts.upstream_ms),
            max_response_size: config.listener.max_body_size,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerPool> {
        &self.breakers
    }

    /// Send `request` to the first replica that answers with a non-5xx status.
    ///
    /// 2xx, 3xx and 4xx answers are returned as-is. `AllReplicasUnavailable`
    /// when every replica was skipped or exhausted.
    pub async fn dispatch(
        &self,
        service: &str,
        replicas: &[ReplicaDescriptor],
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        for replica in replicas {
            let id = replica.id();
            let breaker = self.breakers.get(&id);

            for attempt in 1..=self.retry.attempts_per_replica {
                if attempt > 1 {
                    if breaker.state() == BreakerState::Open {
                        tracing::debug!(replica = %id, attempt, "Breaker opened, failing over");
                        break;
                    }
                    tokio::time::sleep(self.retry.backoff(attempt - 1)).await;
                }

                let permit = breaker.try_acquire();
                if !permit.is_allowed() {
                    tracing::debug!(
                        service = %service,
                        replica = %id,
                        state = breaker.state().as_str(),
                        "Breaker rejected call, failing over"
                    );
                    metrics::record_replica_attempt(&id, "rejected");
                    break;
                }
                if permit.is_probe() {
                    tracing::info!(replica = %id, "Sending half-open probe");
                }
                let mut in_flight = InFlight {
                    breaker: &breaker,
                    permit,
                    recorded: false,
                };

                let uri = replica.uri_for(&request.path_and_query).map_err(|e| {
                    tracing::error!(replica = %id, error = %e, "Cannot build upstream URI");
                    GatewayError::UnexpectedTransport(format!("invalid upstream URI for {}: {}", id, e))
                })?;

                let (outcome, response) = match self.attempt(uri, request).await {
                    Ok(response) => (classify_status(response.status), Some(response)),
                    Err(outcome) => (outcome, None),
                };
                metrics::record_replica_attempt(&id, outcome.label());
                in_flight.recorded = true;

                match (outcome, response) {
                    (AttemptOutcome::Success, Some(response)) => {
                        breaker.record_success(permit);
                        tracing::debug!(replica = %id, attempt, status = %response.status, "Replica answered");
                        return Ok(UpstreamResponse { replica: id, ..response });
                    }
                    (AttemptOutcome::PassThrough, Some(response)) => {
                        breaker.record_neutral(permit);
                        tracing::debug!(replica = %id, attempt, status = %response.status, "Passing replica answer through");
                        return Ok(UpstreamResponse { replica: id, ..response });
                    }
                    (outcome, _) => {
                        breaker.record_failure(permit);
                        tracing::warn!(
                            service = %service,
                            replica = %id,
                            attempt,
                            outcome = ?outcome,
                            "Replica attempt failed"
                        );
                    }
                }
            }
        }

        tracing::error!(service = %service, replicas = replicas.len(), "All replicas failed");
        Err(GatewayError::AllReplicasUnavailable {
            service: service.to_string(),
            replicas: replicas.len(),
        })
    }

    /// One call under the per-attempt timeout. Body fully buffered.
    async fn attempt(
        &self,
        uri: axum::http::Uri,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, AttemptOutcome> {
        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
        }
        let upstream = builder
            .body(Body::from(request.body.clone()))
            .map_err(|e| AttemptOutcome::Transport(e.to_string()))?;

        let call = async {
            let response = self
                .client
                .request(upstream)
                .await
                .map_err(|e| AttemptOutcome::Transport(e.to_string()))?;
            let (mut parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), self.max_response_size)
                .await
                .map_err(|e| AttemptOutcome::Transport(e.to_string()))?;

            strip_hop_by_hop(&mut parts.headers);
            Ok(UpstreamResponse {
                status: parts.status,
                headers: parts.headers,
                body,
                replica: String::new(),
            })
        };

        match tokio::time::timeout(self.upstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AttemptOutcome::Timeout),
        }
    }
}
