//! # Actor Trait
//!
//! The [`Actor`] trait is the contract every unit of scheduled background work implements.
//! The director decides *when* an actor is initialized and run; the actor decides *what*
//! happens and reports through its predicates whether it is due or finished.
//!
//! Lifecycle state that must be updated atomically with dispatch (whether init has been
//! dispatched, whether a run is in flight) is owned by the pool, not by the actor, so
//! implementations only carry their own domain state.

use crate::framework::dispose::DisposeHandle;
use crate::framework::error::BoxError;
use crate::lifecycle::{DirectorHandle, EventLog};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

/// Everything an actor hook gets from the director on each dispatch.
///
/// Cheap to clone: the log and the director handle are reference counted.
#[derive(Clone)]
pub struct ActorContext {
    now: Instant,
    log: Arc<dyn EventLog>,
    director: DirectorHandle,
}

impl ActorContext {
    pub fn new(now: Instant, log: Arc<dyn EventLog>, director: DirectorHandle) -> Self {
        Self { now, log, director }
    }

    /// A context that is not attached to any director. Useful when exercising an actor
    /// by hand in tests.
    pub fn detached(log: Arc<dyn EventLog>) -> Self {
        Self::new(Instant::now(), log, DirectorHandle::detached())
    }

    /// The instant of the tick that dispatched this call.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn director(&self) -> &DirectorHandle {
        &self.director
    }
}

/// A unit of background work driven by the [`Director`](crate::lifecycle::Director).
///
/// # Lifecycle
///
/// 1. **Init**: dispatched once, on the first tick after the actor enters the pool. If it
///    fails, the director logs the failure and dispatches it again on a later tick. A
///    successful init may return a [`DisposeHandle`], which the director keeps until the
///    handle reports it must dispose, or until shutdown.
/// 2. **Run**: dispatched on every tick where [`Actor::should_run_now`] returns `true`,
///    never while a previous run of the same actor is still in flight.
/// 3. **Removal**: once [`Actor::should_be_removed`] returns `true` the actor is dropped
///    from the pool. Removal never disposes; disposal is driven by the handle.
///
/// Every hook is dispatched on its own task and never awaited by the tick, so a slow
/// actor cannot stall the others.
#[async_trait]
pub trait Actor: Send + Sync + 'static {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Whether `run` is due at `now`.
    fn should_run_now(&self, now: Instant) -> bool;

    /// Whether the actor should be detached from future ticks.
    fn should_be_removed(&self) -> bool {
        false
    }

    /// One-time initialization.
    async fn init(&self, _ctx: &ActorContext) -> Result<Option<DisposeHandle>, BoxError> {
        Ok(None)
    }

    /// The scheduled body.
    async fn run(&self, ctx: &ActorContext) -> Result<(), BoxError>;
}
