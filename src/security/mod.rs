//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming gateway request:
//!     → rate_limit.rs (per-IP token bucket by route class)
//!     → Pass to handlers
//! ```
//!
//! Credentials are never inspected; `Authorization` is forwarded as-is.

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter, RouteClass};
