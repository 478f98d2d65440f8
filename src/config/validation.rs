//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0)
//! - Check URLs and replica endpoints are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the parsed config
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{GatewayConfig, ListenerConfig, RegistryConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a gateway configuration.
pub fn validate_gateway(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_listener(&config.listener, &mut errors);

    match Url::parse(&config.discovery.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "discovery.url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("discovery.url", e.to_string())),
    }
    if config.discovery.timeout_ms == 0 {
        errors.push(ValidationError::new("discovery.timeout_ms", "must be > 0"));
    }

    if config.upstream.service.trim().is_empty() {
        errors.push(ValidationError::new("upstream.service", "must not be empty"));
    }

    for (name, service) in &config.services {
        let mut seen = HashSet::new();
        for (i, replica) in service.replicas.iter().enumerate() {
            let field = format!("services.{}.replicas[{}]", name, i);
            if replica.host.trim().is_empty() {
                errors.push(ValidationError::new(&field, "host must not be empty"));
            }
            if replica.port.parse::<u16>().map_or(true, |p| p == 0) {
                errors.push(ValidationError::new(
                    &field,
                    format!("invalid port '{}'", replica.port),
                ));
            }
            if !seen.insert((&replica.host, &replica.port)) {
                errors.push(ValidationError::new(&field, "duplicate replica"));
            }
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be > 0",
        ));
    }
    if config.retries.attempts_per_replica == 0 {
        errors.push(ValidationError::new(
            "retries.attempts_per_replica",
            "must be > 0",
        ));
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }
    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be > 0"));
    }
    if config.timeouts.request_ms < config.timeouts.upstream_ms {
        errors.push(ValidationError::new(
            "timeouts.request_ms",
            "must be >= timeouts.upstream_ms",
        ));
    }
    if config.rate_limit.enabled
        && (config.rate_limit.user_requests_per_minute == 0
            || config.rate_limit.upload_requests_per_minute == 0
            || config.rate_limit.status_requests_per_minute == 0)
    {
        errors.push(ValidationError::new(
            "rate_limit",
            "per-minute budgets must be > 0 when enabled",
        ));
    }
    if config.notifications.enabled && config.notifications.service.trim().is_empty() {
        errors.push(ValidationError::new(
            "notifications.service",
            "must not be empty when enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a registry configuration.
pub fn validate_registry(config: &RegistryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_listener(&config.listener, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_listener(listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", listener.bind_address),
        ));
    }
    if listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be > 0"));
    }
}
