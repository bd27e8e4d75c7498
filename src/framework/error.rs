//! # Runtime Errors
//!
//! Errors raised by the director itself. Container wiring errors live in
//! [`crate::container::ContainerError`] and are wrapped here when they abort a run.

use crate::container::ContainerError;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Boxed error returned by actor hooks, dispose actions and startup routines.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Turns a panic payload into an error carrying its message.
pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> BoxError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("panicked: {message}").into()
}

/// Calls `f`, turning a panic into an error.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, BoxError> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_error)
}

/// The lifecycle step an actor failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorStage {
    Init,
    /// Deciding whether the actor is due or should leave the pool.
    Schedule,
    Run,
    Dispose,
}

impl std::fmt::Display for ActorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            ActorStage::Init => "init",
            ActorStage::Schedule => "scheduling",
            ActorStage::Run => "run",
            ActorStage::Dispose => "dispose",
        };
        f.write_str(stage)
    }
}

/// Errors that can occur while starting or running a [`Director`](crate::lifecycle::Director).
///
/// Only `Container`, `Startup` and `Discovery` are ever returned to the caller of
/// `run`. `Actor` and `Shutdown` are built for the event log and never propagate.
#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("Startup routine failed: {0}")]
    Startup(#[source] BoxError),

    #[error("Component discovery failed in module {module}: {source}")]
    Discovery {
        module: String,
        #[source]
        source: BoxError,
    },

    #[error("Actor {actor} failed during {stage}: {source}")]
    Actor {
        actor: String,
        stage: ActorStage,
        #[source]
        source: BoxError,
    },

    #[error("Actor {actor} failed to shut down: {source}")]
    Shutdown {
        actor: String,
        #[source]
        source: BoxError,
    },
}
