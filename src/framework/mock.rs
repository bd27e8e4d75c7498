//! # Mock Framework
//!
//! Utilities for testing actors and directors in isolation.
//!
//! - [`MemoryLog`] records every event so tests can assert on what the director reported.
//! - [`ScriptedActor`] is an actor whose timing and failures are configured up front and whose
//!   counters show exactly what the director dispatched.
//!
//! # Example
//! ```
//! use actor_director::framework::mock::{MemoryLog, ScriptedActor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let log = Arc::new(MemoryLog::new());
//! let scripted = ScriptedActor::new("scripted")
//!     .with_interval(Duration::from_millis(50))
//!     .failing_init(2)
//!     .with_dispose_handle();
//! assert_eq!(scripted.runs(), 0);
//! assert!(log.events().is_empty());
//! ```

use crate::framework::{Actor, ActorContext, BoxError, DisposeHandle, Disposer, Every};
use crate::lifecycle::EventLog;
use async_trait::async_trait;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// EVENT LOG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub location: String,
    pub event: String,
    /// The info detail, or the rendered error.
    pub detail: String,
}

/// An [`EventLog`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryLog {
    events: Mutex<Vec<LogEvent>>,
    flushes: AtomicUsize,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<LogEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, level: LogLevel, location: &str, event: &str, detail: String) {
        self.guard().push(LogEvent {
            level,
            location: location.to_string(),
            event: event.to_string(),
            detail,
        });
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.guard().clone()
    }

    /// How many events named `event` were recorded.
    pub fn count(&self, event: &str) -> usize {
        self.guard().iter().filter(|e| e.event == event).count()
    }

    pub fn errors(&self) -> Vec<LogEvent> {
        self.guard()
            .iter()
            .filter(|e| e.level == LogLevel::Error)
            .cloned()
            .collect()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    fn info(&self, location: &str, event: &str, detail: &str) {
        self.record(LogLevel::Info, location, event, detail.to_string());
    }

    fn error(&self, location: &str, event: &str, error: &(dyn Error + 'static)) {
        self.record(LogLevel::Error, location, event, error.to_string());
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// SCRIPTED ACTOR
// =============================================================================

/// Counters and switches shared between a [`ScriptedActor`] and its dispose handle.
#[derive(Debug, Default)]
pub struct ScriptedState {
    init_attempts: AtomicUsize,
    failures_left: AtomicUsize,
    init_panics_left: AtomicUsize,
    run_panics_left: AtomicUsize,
    runs: AtomicUsize,
    active_runs: AtomicUsize,
    max_active_runs: AtomicUsize,
    disposals: AtomicUsize,
    must_dispose: AtomicBool,
    broken_dispose_check: AtomicBool,
    finished: AtomicBool,
}

/// Takes one from `counter` if it is above zero.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Disposer for ScriptedState {
    fn must_dispose(&self) -> bool {
        if self.broken_dispose_check.load(Ordering::SeqCst) {
            panic!("dispose check blew up");
        }
        self.must_dispose.load(Ordering::SeqCst)
    }

    async fn dispose(&self, _ctx: &ActorContext) -> Result<(), BoxError> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A configurable actor that counts what it is asked to do.
///
/// By default it is due on every tick, initializes instantly and returns no handle.
#[derive(Debug)]
pub struct ScriptedActor {
    name: String,
    state: Arc<ScriptedState>,
    schedule: Option<Every>,
    init_delay: Duration,
    run_delay: Duration,
    returns_handle: bool,
}

impl ScriptedActor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(ScriptedState::default()),
            schedule: None,
            init_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            returns_handle: false,
        }
    }

    pub fn with_interval(mut self, period: Duration) -> Self {
        self.schedule = Some(Every::new(period));
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    /// The first `times` init attempts fail.
    pub fn failing_init(self, times: usize) -> Self {
        self.state.failures_left.store(times, Ordering::SeqCst);
        self
    }

    /// The first `times` init attempts panic.
    pub fn panicking_init(self, times: usize) -> Self {
        self.state.init_panics_left.store(times, Ordering::SeqCst);
        self
    }

    /// The first `times` runs panic before doing any work.
    pub fn panicking_run(self, times: usize) -> Self {
        self.state.run_panics_left.store(times, Ordering::SeqCst);
        self
    }

    /// The dispose handle panics whenever asked whether it must dispose.
    pub fn with_broken_dispose_check(mut self) -> Self {
        self.returns_handle = true;
        self.state.broken_dispose_check.store(true, Ordering::SeqCst);
        self
    }

    /// A successful init returns a dispose handle.
    pub fn with_dispose_handle(mut self) -> Self {
        self.returns_handle = true;
        self
    }

    pub fn state(&self) -> &Arc<ScriptedState> {
        &self.state
    }

    pub fn init_attempts(&self) -> usize {
        self.state.init_attempts.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.state.runs.load(Ordering::SeqCst)
    }

    /// The most runs ever observed in flight at once.
    pub fn max_concurrent_runs(&self) -> usize {
        self.state.max_active_runs.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.state.disposals.load(Ordering::SeqCst)
    }

    /// Makes the dispose handle due on the next tick.
    pub fn request_dispose(&self) {
        self.state.must_dispose.store(true, Ordering::SeqCst);
    }

    /// Asks to be removed from the pool.
    pub fn finish(&self) {
        self.state.finished.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Actor for ScriptedActor {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_run_now(&self, now: Instant) -> bool {
        self.schedule.as_ref().map_or(true, |every| every.is_due(now))
    }

    fn should_be_removed(&self) -> bool {
        self.state.finished.load(Ordering::SeqCst)
    }

    async fn init(&self, _ctx: &ActorContext) -> Result<Option<DisposeHandle>, BoxError> {
        let attempt = self.state.init_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        if take_one(&self.state.init_panics_left) {
            panic!("{} init attempt {attempt} panicked", self.name);
        }
        if take_one(&self.state.failures_left) {
            return Err(format!("{} init attempt {attempt} failed", self.name).into());
        }
        if !self.returns_handle {
            return Ok(None);
        }
        let disposer: Arc<dyn Disposer> = self.state.clone();
        Ok(Some(DisposeHandle::new(self.name.clone(), disposer)))
    }

    async fn run(&self, ctx: &ActorContext) -> Result<(), BoxError> {
        if let Some(every) = &self.schedule {
            every.mark_ran(ctx.now());
        }
        if take_one(&self.state.run_panics_left) {
            panic!("{} run panicked", self.name);
        }
        let active = self.state.active_runs.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active_runs.fetch_max(active, Ordering::SeqCst);
        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }
        self.state.runs.fetch_add(1, Ordering::SeqCst);
        self.state.active_runs.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
