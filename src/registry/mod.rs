//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! POST /register, /deregister
//!     → handlers.rs (validate body, map errors to 400/404)
//!     → store.rs (single lock, no I/O while held)
//! GET /services/{name}
//!     → store.rs lookup (first instance in registration order)
//! ```
//!
//! # Design Decisions
//! - In-memory only; rebuilt by re-registration after restart
//! - Owned instance injected through axum state, no globals

pub mod handlers;
pub mod server;
pub mod store;

pub use server::RegistryServer;
pub use store::{Registration, ServiceRecord, ServiceRegistry};
