//! Building blocks for actors hosted by a [`Director`](crate::lifecycle::Director).
//!
//! # Main Components
//!
//! - [`Actor`] - Trait for a unit of scheduled background work
//! - [`ActorContext`] - What the director passes to every hook
//! - [`DisposeHandle`] / [`Disposer`] - Cleanup bound to a successful init
//! - [`Every`] - Interval bookkeeping for `should_run_now`
//! - [`DirectorError`] - Runtime error types
//!
//! # Testing
//!
//! See the [`mock`] module for an in-memory event log and a configurable scripted actor.

pub mod actor;
pub mod dispose;
pub mod error;
pub mod mock;
pub mod schedule;

pub use actor::{Actor, ActorContext};
pub use dispose::{DisposeHandle, Disposer};
pub use error::{ActorStage, BoxError, DirectorError};
pub use schedule::Every;
