//! Retry policy and outcome classification.
//!
//! # Responsibilities
//! - Classify an upstream status as success, pass-through, or failure
//! - Compute the jittered exponential delay between attempts

use std::time::Duration;

use axum::http::StatusCode;
use rand::Rng;

use crate::config::RetryConfig;

/// How a single replica attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx: return to the caller, close the breaker.
    Success,
    /// 3xx or 4xx: return to the caller unchanged, breaker untouched.
    PassThrough,
    /// 5xx: retry, count against the breaker.
    ServerError(StatusCode),
    /// Per-attempt deadline elapsed.
    Timeout,
    /// Connection refused, reset, or body read failure.
    Transport(String),
}

impl AttemptOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::ServerError(_) | AttemptOutcome::Timeout | AttemptOutcome::Transport(_)
        )
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::PassThrough => "passthrough",
            AttemptOutcome::ServerError(_) => "server_error",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Transport(_) => "transport",
        }
    }
}

/// Classify an upstream status code.
pub fn classify_status(status: StatusCode) -> AttemptOutcome {
    if status.is_success() {
        AttemptOutcome::Success
    } else if status.is_server_error() {
        AttemptOutcome::ServerError(status)
    } else {
        AttemptOutcome::PassThrough
    }
}

/// Per-replica retry budget with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts_per_replica: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempts_per_replica: config.attempts_per_replica.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `retry` (1-based); zero for `retry == 0`.
    ///
    /// Doubles from the base delay up to the max, then stretches the result
    /// by a random factor in `[1.0, 1.1)` so concurrent callers spread out.
    pub fn backoff(&self, retry: u32) -> Duration {
        let Some(doublings) = retry.checked_sub(1) else {
            return Duration::ZERO;
        };

        let delay = 2u32
            .checked_pow(doublings)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        delay.mul_f64(rand::thread_rng().gen_range(1.0..1.1))
    }
}
