//! # Director Lifecycle
//!
//! This module runs actors. The [`Director`] is the conductor: it wires components from
//! its [`Container`](crate::container::Container), keeps an [`ActorPool`] and drives every
//! actor through init, run and dispose from one main loop.
//!
//! ## The Director Pattern
//!
//! ```rust,no_run
//! use actor_director::container::ComponentModule;
//! use actor_director::framework::BoxError;
//! use actor_director::lifecycle::{Director, InterruptFlag, TracingLog};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), actor_director::framework::DirectorError> {
//! let director = Director::new(Arc::new(TracingLog));
//! director.set_interrupt(InterruptFlag::on_ctrl_c());
//!
//! let modules: Vec<Arc<dyn ComponentModule>> = Vec::new();
//! director.run(|_ctx| async { Ok::<(), BoxError>(()) }, true, &modules).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Responsibilities
//!
//! - **Startup**: run the caller's startup routine, retrying on failure if asked to
//! - **Wiring**: register discovered components, build the graph, construct root singletons
//! - **Scheduling**: dispatch init and run without ever awaiting them on the loop
//! - **Shutdown**: stop the loop, dispose every live handle, optionally wait for in-flight work

pub mod config;
pub mod director;
pub mod interrupt;
pub mod log;
pub mod pool;
pub mod tasks;
pub mod tracing;

pub use config::DirectorConfig;
pub use director::{Director, DirectorHandle, Phase};
pub use interrupt::{Interrupt, InterruptFlag};
pub use log::{EventLog, TracingLog};
pub use pool::{ActorCell, ActorPool, Pruned};
pub use tasks::TaskTracker;
