//! Circuit breaker for replica protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: replica assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the replica recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: first admission after the reset timeout
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - One breaker per replica, keyed by "host:port"
//! - Fail fast in Open state (no waiting for timeout)
//! - Single probe in Half-Open; a neutral probe outcome (3xx/4xx)
//!   releases the slot without moving the state
//! - Every admission carries the breaker generation it was granted in;
//!   outcomes from an earlier generation are ignored

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Result of asking a breaker for permission to call its replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Breaker closed; call normally.
    Allowed,
    /// This call is the single half-open probe.
    Probe,
    /// Breaker open or probe already in flight; skip the replica.
    Rejected,
}

/// Admission plus the generation it was granted in.
///
/// Outcomes are recorded against the permit so that a slow call from a
/// previous generation cannot move the breaker or free someone else's probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub admission: Admission,
    generation: u64,
}

impl Permit {
    pub fn is_allowed(&self) -> bool {
        !matches!(self.admission, Admission::Rejected)
    }

    pub fn is_probe(&self) -> bool {
        self.admission == Admission::Probe
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped on every state change and on every probe handed out.
    generation: u64,
}

impl BreakerInner {
    fn permit(&self, admission: Admission) -> Permit {
        Permit {
            admission,
            generation: self.generation,
        }
    }

    fn owns(&self, permit: Permit) -> bool {
        permit.is_allowed() && permit.generation == self.generation
    }
}

/// Point-in-time view of one breaker, served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub replica: String,
    pub state: BreakerState,
    pub failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
}

/// Failure-tracking state machine for a single replica.
#[derive(Debug)]
pub struct CircuitBreaker {
    replica: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(replica: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            replica: replica.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn try_acquire(&self) -> Permit {
        self.try_acquire_at(Instant::now())
    }

    /// Decide whether a call may proceed at `now`.
    ///
    /// An open breaker whose reset timeout has elapsed moves to half-open and
    /// hands out the probe slot to this caller.
    pub fn try_acquire_at(&self, now: Instant) -> Permit {
        let (permit, transition) = {
            let mut inner = self.inner.lock();
            match inner.state {
                BreakerState::Closed => (inner.permit(Admission::Allowed), None),
                BreakerState::Open => {
                    let elapsed = inner
                        .opened_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(Duration::MAX);
                    if elapsed >= self.reset_timeout {
                        inner.state = BreakerState::HalfOpen;
                        inner.probe_in_flight = true;
                        inner.generation += 1;
                        (
                            inner.permit(Admission::Probe),
                            Some((BreakerState::Open, BreakerState::HalfOpen)),
                        )
                    } else {
                        (inner.permit(Admission::Rejected), None)
                    }
                }
                BreakerState::HalfOpen if inner.probe_in_flight => {
                    (inner.permit(Admission::Rejected), None)
                }
                BreakerState::HalfOpen => {
                    inner.probe_in_flight = true;
                    inner.generation += 1;
                    (inner.permit(Admission::Probe), None)
                }
            }
        };

        if let Some((from, to)) = transition {
            self.log_transition(from, to);
        }
        permit
    }

    /// Record a 2xx outcome for `permit`.
    pub fn record_success(&self, permit: Permit) {
        let transition = {
            let mut inner = self.inner.lock();
            if !inner.owns(permit) {
                return;
            }
            let from = inner.state;
            inner.failure_count = 0;
            if from != BreakerState::Closed {
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                inner.generation += 1;
            }
            (from != BreakerState::Closed).then_some(from)
        };

        if let Some(from) = transition {
            self.log_transition(from, BreakerState::Closed);
        }
    }

    pub fn record_failure(&self, permit: Permit) {
        self.record_failure_at(permit, Instant::now());
    }

    /// Record a 5xx, timeout or transport failure for `permit`, observed at `now`.
    pub fn record_failure_at(&self, permit: Permit, now: Instant) {
        let transition = {
            let mut inner = self.inner.lock();
            if !inner.owns(permit) {
                return;
            }
            inner.failure_count = inner.failure_count.saturating_add(1);
            let from = inner.state;
            let opens = match from {
                BreakerState::Closed => inner.failure_count >= self.failure_threshold,
                BreakerState::HalfOpen => true,
                BreakerState::Open => false,
            };
            if opens {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
                inner.generation += 1;
            }
            opens.then_some(from)
        };

        if let Some(from) = transition {
            self.log_transition(from, BreakerState::Open);
        }
    }

    /// Record an outcome that says nothing about replica health (3xx/4xx).
    ///
    /// Only frees the probe slot when `permit` is the probe that holds it.
    pub fn record_neutral(&self, permit: Permit) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen && inner.owns(permit) {
            inner.probe_in_flight = false;
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            replica: self.replica.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            open_for_ms: match inner.state {
                BreakerState::Open => inner
                    .opened_at
                    .map(|at| now.saturating_duration_since(at).as_millis() as u64),
                _ => None,
            },
        }
    }

    fn log_transition(&self, from: BreakerState, to: BreakerState) {
        match to {
            BreakerState::Open => tracing::warn!(
                replica = %self.replica,
                from = from.as_str(),
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                replica = %self.replica,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state changed"
            ),
        }
        metrics::record_breaker_transition(&self.replica, to.as_str());
    }
}

/// Breakers for every replica the gateway has dispatched to.
///
/// Replicas from static config are registered eagerly; replicas discovered at
/// runtime get a breaker on first use.
#[derive(Debug)]
pub struct CircuitBreakerPool {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerPool {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    pub fn with_replicas<I, S>(config: CircuitBreakerConfig, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pool = Self::new(config);
        for replica in replicas {
            pool.get(&replica.into());
        }
        pool
    }

    /// Breaker for `replica`, created closed if unseen.
    pub fn get(&self, replica: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(replica) {
            return breaker.clone();
        }
        self.breakers
            .entry(replica.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(replica, &self.config)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot of all breakers, sorted by replica id.
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot_at(now))
            .collect();
        snapshots.sort_by(|a, b| a.replica.cmp(&b.replica));
        snapshots
    }
}
