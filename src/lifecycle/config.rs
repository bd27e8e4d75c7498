//! Director configuration.

use serde::Deserialize;
use std::time::Duration;

/// Timing knobs for a [`Director`](crate::lifecycle::Director).
///
/// Deserializable from any serde source; missing fields take their defaults. Durations
/// use serde's own shape, `{ "secs": u64, "nanos": u32 }`:
///
/// ```json
/// {
///   "tick_interval": { "secs": 0, "nanos": 5000000 },
///   "shutdown_grace": { "secs": 2, "nanos": 0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Cadence of the main loop.
    pub tick_interval: Duration,
    /// How often a failed startup checks for shutdown while waiting to retry.
    pub startup_poll_interval: Duration,
    /// How long a failed startup waits before the next attempt.
    pub startup_retry_window: Duration,
    /// How long `shutdown` waits for in-flight actor work. `None` returns immediately.
    pub shutdown_grace: Option<Duration>,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            startup_poll_interval: Duration::from_millis(100),
            startup_retry_window: Duration::from_secs(5),
            shutdown_grace: None,
        }
    }
}

impl DirectorConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_startup_retry(mut self, poll_interval: Duration, window: Duration) -> Self {
        self.startup_poll_interval = poll_interval;
        self.startup_retry_window = window;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }
}
