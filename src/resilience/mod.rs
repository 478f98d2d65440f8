//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt against a replica:
//!     → circuit_breaker.rs (admit, reject, or hand out the half-open probe)
//!     → upstream call under the per-attempt timeout
//!     → retries.rs (classify outcome, back off before the next attempt)
//!     → circuit_breaker.rs (record success, failure, or neutral outcome)
//! ```
//!
//! # Design Decisions
//! - Every upstream call has a deadline
//! - All methods are retried; the upstream user/file API is treated as
//!   safe to repeat
//! - 4xx and 3xx are answers, not faults: never retried, never counted

pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{
    Admission, BreakerSnapshot, BreakerState, CircuitBreaker, CircuitBreakerPool, Permit,
};
pub use retries::{classify_status, AttemptOutcome, RetryPolicy};
