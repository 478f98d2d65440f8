//! Configuration schema definitions.
//!
//! This module defines the configuration structure for both services.
//! All types derive Serde traits for deserialization from TOML files.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the gateway service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Where the service registry lives.
    pub discovery: DiscoveryConfig,

    /// Which logical service the `/user` and `/beats` routes target.
    pub upstream: UpstreamConfig,

    /// Static replica lists keyed by service name.
    pub services: BTreeMap<String, ServiceConfig>,

    /// Per-replica circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Side-notification settings.
    pub notifications: NotificationConfig,

    /// Services pinged by `GET /status`.
    pub status: StatusConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            discovery: DiscoveryConfig::default(),
            upstream: UpstreamConfig::default(),
            services: BTreeMap::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retries: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            rate_limit: RateLimitConfig::default(),
            notifications: NotificationConfig::default(),
            status: StatusConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Replicas configured for `service`, in failover order.
    pub fn replicas_for(&self, service: &str) -> &[ReplicaDescriptor] {
        self.services
            .get(service)
            .map(|s| s.replicas.as_slice())
            .unwrap_or(&[])
    }
}

/// Root configuration for the service registry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub listener: ListenerConfig,
    pub observability: ObservabilityConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig {
                bind_address: "0.0.0.0:8500".to_string(),
                ..ListenerConfig::default()
            },
            observability: ObservabilityConfig {
                metrics_address: "0.0.0.0:9091".to_string(),
                ..ObservabilityConfig::default()
            },
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_body_size: 20 * 1024 * 1024,
        }
    }
}

/// Service registry location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base URL of the registry. Overridden by `SERVICE_DISCOVERY_URL`.
    pub url: String,

    /// Lookup timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: "http://service-discovery:8500".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Registry name of the user/file service.
    pub service: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            service: "userfile-service".to_string(),
        }
    }
}

/// Static configuration for one breaker-protected service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Candidate replicas, earliest preferred.
    pub replicas: Vec<ReplicaDescriptor>,
}

/// A statically configured replica endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ReplicaDescriptor {
    pub host: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
}

impl ReplicaDescriptor {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Time an open breaker waits before admitting a probe, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts made against a single replica before failing over.
    pub attempts_per_replica: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_replica: 3,
            base_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single call to a replica, in milliseconds.
    pub upstream_ms: u64,

    /// Deadline for a whole gateway dispatch including failover, in milliseconds.
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_ms: 10_000,
            request_ms: 120_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Per-client budget for `/user/*`.
    pub user_requests_per_minute: u32,

    /// Per-client budget for `POST /beats/upload`.
    pub upload_requests_per_minute: u32,

    /// Per-client budget for `/status`.
    pub status_requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_requests_per_minute: 5,
            upload_requests_per_minute: 5,
            status_requests_per_minute: 10,
        }
    }
}

/// Side-notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Registry name of the notification service.
    pub service: String,

    /// Timeout for the notification call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service: "notification-service".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Services pinged through the registry.
    pub services: Vec<String>,

    /// Timeout for each `/status` ping in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            services: vec![
                "userfile-service".to_string(),
                "notification-service".to_string(),
            ],
            timeout_ms: 5_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Accept a port written either as a string or as an integer.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(PortVisitor)
}

/// Same as [`string_or_number`] for optional fields; `null` maps to `None`.
pub(crate) fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OptVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a port as string or integer, or null")
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            string_or_number(d).map(Some)
        }
    }

    deserializer.deserialize_option(OptVisitor)
}

struct PortVisitor;

impl<'de> Visitor<'de> for PortVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a port as string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }
}
