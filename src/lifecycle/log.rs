//! # Event Log
//!
//! The director reports lifecycle events (startup, failures, shutdown) through an
//! [`EventLog`] instead of writing to a fixed sink, so embedding code can route them
//! anywhere. The log is registered in the director's container under `dyn EventLog`,
//! which lets any component depend on it.
//!
//! [`TracingLog`] is the default and simply forwards to `tracing`.

use async_trait::async_trait;
use std::error::Error;
use tracing::{error, info};

/// Structured sink for director and actor events.
#[async_trait]
pub trait EventLog: Send + Sync + 'static {
    fn info(&self, location: &str, event: &str, detail: &str);

    fn error(&self, location: &str, event: &str, error: &(dyn Error + 'static));

    /// Pushes buffered events out. Awaited on failure paths before the main loop is up,
    /// so a buffering log never loses the reason startup failed.
    async fn flush(&self) {}
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

#[async_trait]
impl EventLog for TracingLog {
    fn info(&self, location: &str, event: &str, detail: &str) {
        info!(location, event, detail, "{event}");
    }

    fn error(&self, location: &str, event: &str, error: &(dyn Error + 'static)) {
        error!(location, event, error = %error, "{event}");
    }
}
