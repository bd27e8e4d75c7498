//! Interval scheduling helper for [`Actor::should_run_now`](crate::framework::Actor::should_run_now).

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// "Run at most once per `period`" bookkeeping.
///
/// Actors answer `should_run_now` with [`Every::is_due`] and call [`Every::mark_ran`]
/// with the dispatching tick's instant at the start of `run`. Because the director never
/// dispatches a second run while one is in flight, the next run can only be dispatched on
/// the first tick at least `period` after the previous dispatch.
#[derive(Debug)]
pub struct Every {
    period: Duration,
    last_run: Mutex<Option<Instant>>,
}

impl Every {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_run: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Due if never run, or if `period` has elapsed since the last run.
    pub fn is_due(&self, now: Instant) -> bool {
        match *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        }
    }

    pub fn mark_ran(&self, at: Instant) {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    pub fn last_run(&self) -> Option<Instant> {
        *self.last_run.lock().unwrap_or_else(|e| e.into_inner())
    }
}
