#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Actor Director
//!
//! > **A lifecycle loop for background actors, with a small dependency container.**
//!
//! This crate hosts long-lived background workers ("actors") inside a Tokio process. A
//! single [`Director`](lifecycle::Director) wires the object graph, initializes each actor
//! once, runs it whenever it says it is due, and disposes what it acquired when it is
//! finished or when the process shuts down.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One loop, no awaiting
//! The main loop ticks on a fixed cadence and never awaits actor work. Every `init`,
//! `run` and dispose action is launched on its own task, so a slow actor only delays
//! itself.
//!
//! ### State next to the dispatch
//! Whether an actor has been initialized, and whether a run is in flight, lives in the
//! pool's [`ActorCell`](lifecycle::ActorCell) and is claimed with a single atomic step.
//! A slow `init` is never dispatched twice and runs of one actor never overlap.
//!
//! ### Wiring by type
//! Components declare their dependencies as types. The
//! [`Container`](container::Container) builds the graph once, reports cycles with the
//! offending path, and hands any actor a component creates over to the director.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. The Contract ([`framework`])
//! - **Role**: What an actor is and what it gets from the director.
//! - **Key items**: [`Actor`](framework::Actor), [`DisposeHandle`](framework::DisposeHandle),
//!   [`Every`](framework::Every), [`DirectorError`](framework::DirectorError).
//!
//! ### 2. The Graph ([`container`])
//! - **Role**: Type-keyed singletons, aliases and discovered components.
//! - **Key items**: [`Component`](container::Component), [`Alias`](container::Alias),
//!   [`ComponentList`](container::ComponentList).
//!
//! ### 3. The Conductor ([`lifecycle`])
//! - **Role**: Startup with retry, the tick loop, shutdown.
//! - **Key items**: [`Director`](lifecycle::Director), [`EventLog`](lifecycle::EventLog),
//!   [`DirectorConfig`](lifecycle::DirectorConfig).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run the heartbeat demo, Ctrl-C to stop
//! RUST_LOG=info cargo run
//!
//! cargo test
//! ```
//!
//! ## 🧪 Testing
//!
//! See [`framework::mock`] for an in-memory event log and a configurable scripted actor.

pub mod container;
pub mod framework;
pub mod lifecycle;
