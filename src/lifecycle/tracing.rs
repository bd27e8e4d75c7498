//! # Observability & Tracing
//!
//! [`setup_tracing`] initializes structured logging for a binary hosting a director.
//! The default [`TracingLog`](crate::lifecycle::TracingLog) forwards every director event
//! here, so the subscriber sees lifecycle events next to the crate's own `debug!` output.
//!
//! The format is compact and hides the module prefix (`with_target(false)`); the
//! structured fields (`location`, `event`, `actor`) carry the context instead.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Director lifecycle events only
//! RUST_LOG=info cargo run
//!
//! # Every init, run, dispose and container construction
//! RUST_LOG=debug cargo run
//!
//! # Only container wiring
//! RUST_LOG=actor_director::container=debug cargo run
//! ```
//!
//! ## Output
//!
//! ```text
//! INFO Startup location="Startup" event="DirectorStarting" detail="Director starting"
//! DEBUG Constructed component="demo::Clock" scope=Singleton
//! INFO Components wired roots=1 actors=1
//! DEBUG Initialized actor="heartbeat"
//! INFO Shutdown location="Shutdown" event="DirectorShutdown" detail="Director shutting down"
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
