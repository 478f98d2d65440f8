//! Resilient service gateway and in-memory service registry.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod registry;
pub mod routing;

// Traffic management
pub mod discovery;
pub mod notify;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::{GatewayConfig, RegistryConfig};
pub use error::{GatewayError, RegistryError};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use registry::{RegistryServer, ServiceRegistry};
