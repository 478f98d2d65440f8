//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered UpstreamRequest + ordered replica list
//!     → router.rs (breaker admission, attempts, backoff, failover)
//!     → replica.rs (replica identity, target URI)
//!     → Return: UpstreamResponse or GatewayError
//! ```
//!
//! # Design Decisions
//! - Ordered failover only; earliest replica preferred
//! - Request body buffered once so every attempt sends identical bytes
//! - A replica answer in 2xx/3xx/4xx ends dispatch immediately

pub mod replica;
pub mod router;

pub use replica::{ReplicaDescriptor, UpstreamRequest, UpstreamResponse};
pub use router::ReplicaRouter;
