//! Gateway HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, rate-limit gate)
//!     → handlers.rs (buffer body, validate uploads, build UpstreamRequest)
//!     → request.rs (forwarded header subset)
//!     → routing::ReplicaRouter (failover across replicas)
//!     → response.rs (hop-by-hop stripping, error mapping)
//!     → Send to client, fire notification if triggered
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
