//! Error types surfaced to gateway and registry callers.
//!
//! HTTP mapping for these lives in `http::response` and `registry::handlers`.

use thiserror::Error;

/// Errors produced by the service registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A required registration field was missing or empty.
    #[error("Missing required fields: {0}")]
    InvalidInput(String),

    /// The service is unknown or has no live instances.
    #[error("Service not found: {0}")]
    NotFound(String),
}

/// Errors produced on the gateway dispatch path.
///
/// A 4xx answer from a replica is not an error here: it is returned to the
/// caller verbatim as a normal upstream response.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Discovery could not resolve a required downstream service.
    #[error("{service} unavailable")]
    ServiceUnavailable { service: String },

    /// Every replica was skipped (breaker open) or exhausted its attempts.
    #[error("All replicas failed or are unavailable for service '{service}' ({replicas} configured)")]
    AllReplicasUnavailable { service: String, replicas: usize },

    /// The gateway deadline for the request elapsed.
    #[error("Request timed out after {elapsed_ms} ms")]
    UpstreamTimeout { elapsed_ms: u64 },

    /// An upstream call failed in a way that is not a replica fault.
    #[error("Unexpected transport error: {0}")]
    UnexpectedTransport(String),

    /// The inbound request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The rate-limit gate rejected the request.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
