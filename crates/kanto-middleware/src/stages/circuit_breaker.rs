//! Circuit breaker.
//!
//! Counts consecutive failures (errors and `5xx` responses) of the routes it
//! wraps. After `failure_threshold` failures the circuit opens and requests
//! fail fast with `503 SERVICE_UNAVAILABLE` without reaching the handler.
//! Once `reset_timeout` has passed a single trial request is let through:
//! success closes the circuit, failure opens it again. A trial that never
//! completes (it panics or its future is dropped) counts as a failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kanto_core::{BoxFuture, Context, KantoError, KantoResult, Response};
use parking_lot::Mutex;

use crate::middleware::{Middleware, Next};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected.
    Open,
    /// One trial request is in flight.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker middleware.
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use kanto_middleware::stages::{BreakerState, CircuitBreaker};
///
/// let breaker = CircuitBreaker::new("card-db", 5, Duration::from_secs(30));
/// assert_eq!(breaker.state(), BreakerState::Closed);
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    label: &'static str,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// A threshold of zero is treated as one.
    #[must_use]
    pub fn new(label: &'static str, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            label,
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Arc::new(Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
            })),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Decides whether a request may pass, moving Open to HalfOpen when due.
    fn admit(&self, now: Instant) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Admission::Pass,
            BreakerState::HalfOpen => Admission::Reject,
            BreakerState::Open => {
                let due = inner
                    .opened_at
                    .is_some_and(|at| now.duration_since(at) >= self.reset_timeout);
                if due {
                    inner.state = BreakerState::HalfOpen;
                    tracing::debug!(breaker = self.label, "circuit half-open");
                    Admission::Trial
                } else {
                    Admission::Reject
                }
            }
        }
    }

    fn record(&self, success: bool, now: Instant) {
        let mut inner = self.inner.lock();
        if success {
            if inner.state != BreakerState::Closed {
                tracing::info!(breaker = self.label, "circuit closed");
            }
            inner.state = BreakerState::Closed;
            inner.failures = 0;
            inner.opened_at = None;
            return;
        }

        inner.failures = inner.failures.saturating_add(1);
        let trip =
            inner.state == BreakerState::HalfOpen || inner.failures >= self.failure_threshold;
        if trip && inner.state != BreakerState::Open {
            tracing::warn!(
                breaker = self.label,
                failures = inner.failures,
                "circuit opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pass,
    Trial,
    Reject,
}

/// Reopens the circuit if the trial request ends without an outcome.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(breaker = self.breaker.label, "trial request abandoned");
            self.breaker.record(false, Instant::now());
        }
    }
}

impl Middleware for CircuitBreaker {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn process<'a>(&'a self, ctx: Context, next: Next) -> BoxFuture<'a, KantoResult<Response>> {
        Box::pin(async move {
            let mut guard = match self.admit(Instant::now()) {
                Admission::Reject => {
                    return Err(KantoError::unavailable(format!(
                        "{} is temporarily unavailable",
                        self.label
                    )));
                }
                Admission::Pass => None,
                Admission::Trial => Some(TrialGuard {
                    breaker: self,
                    settled: false,
                }),
            };

            let result = next.run(ctx).await;
            let success = match &result {
                Ok(response) => !response.status().is_server_error(),
                Err(error) => !error.status_code().is_server_error(),
            };
            self.record(success, Instant::now());
            if let Some(guard) = guard.as_mut() {
                guard.settled = true;
            }
            result
        })
    }
}
