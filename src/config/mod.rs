//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig / RegistryConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_gateway_config, load_registry_config, ConfigError, SERVICE_DISCOVERY_URL};
pub use schema::{
    CircuitBreakerConfig, DiscoveryConfig, GatewayConfig, ListenerConfig, NotificationConfig,
    ObservabilityConfig, RateLimitConfig, RegistryConfig, ReplicaDescriptor, RetryConfig,
    ServiceConfig, StatusConfig, TimeoutConfig, UpstreamConfig,
};
