//! # Failure Backoff
//!
//! Per-resource failure counting and Fibonacci retry delays.
//!
//! The counter lives in the resource status (`status.failureCount`), so it
//! survives controller restarts and is independent for every resource.
//! Delays grow along the Fibonacci sequence and are capped:
//!
//! ```rust
//! use keycloak_operator::controller::backoff::FailureTracker;
//! use std::time::Duration;
//!
//! let tracker = FailureTracker::new(Duration::from_secs(10), Duration::from_secs(60));
//! assert_eq!(tracker.delay_for(1), Duration::from_secs(10));
//! assert_eq!(tracker.delay_for(2), Duration::from_secs(10));
//! assert_eq!(tracker.delay_for(3), Duration::from_secs(20));
//! assert_eq!(tracker.delay_for(4), Duration::from_secs(30));
//! assert_eq!(tracker.delay_for(5), Duration::from_secs(50));
//! assert_eq!(tracker.delay_for(6), Duration::from_secs(60)); // capped
//! ```

use crate::constants::STATUS_OK;
use crate::crd::RealmChildResource;
use std::time::Duration;

/// A resource carrying a failure counter and a status message
pub trait FailureCountable {
    fn failure_count(&self) -> i64;

    fn set_failure_count(&mut self, count: i64);

    fn set_status_value(&mut self, value: String);
}

impl<T: RealmChildResource> FailureCountable for T {
    fn failure_count(&self) -> i64 {
        self.child_status().map_or(0, |status| status.failure_count)
    }

    fn set_failure_count(&mut self, count: i64) {
        self.child_status_mut().failure_count = count;
    }

    fn set_status_value(&mut self, value: String) {
        self.child_status_mut().value = value;
    }
}

/// Fibonacci backoff keyed by the number of consecutive failures
///
/// Sequence for `base = 10s`: 10s, 10s, 20s, 30s, 50s, 80s, ... up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTracker {
    base: Duration,
    max: Duration,
}

impl FailureTracker {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// Retry delay after `count` consecutive failures
    ///
    /// Deterministic, non-decreasing in `count` and never above `max`.
    /// Counts of zero or less yield `base`.
    pub fn delay_for(&self, count: i64) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }

        let mut prev: u64 = 0;
        let mut current: u64 = 1;
        for _ in 1..count.max(1) {
            let next = prev.saturating_add(current);
            prev = current;
            current = next;
            if self.base.saturating_mul(u32::try_from(current).unwrap_or(u32::MAX)) >= self.max {
                return self.max;
            }
        }

        let factor = u32::try_from(current).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Count one more failure, store `error` as status message and return the retry delay
    pub fn record_failure<T, E>(&self, resource: &mut T, error: &E) -> Duration
    where
        T: FailureCountable + ?Sized,
        E: std::fmt::Display + ?Sized,
    {
        let count = resource.failure_count().saturating_add(1);
        resource.set_failure_count(count);
        resource.set_status_value(error.to_string());
        self.delay_for(count)
    }

    /// Reset the counter and mark the status as healthy
    pub fn record_success<T: FailureCountable + ?Sized>(&self, resource: &mut T) {
        resource.set_failure_count(0);
        resource.set_status_value(STATUS_OK.to_string());
    }
}
