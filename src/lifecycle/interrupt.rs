//! External shutdown triggers checked at the top of every tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub trait Interrupt: Send + Sync + 'static {
    fn should_shut_down(&self) -> bool;
}

/// A latch that anything can trip.
#[derive(Debug, Default)]
pub struct InterruptFlag {
    tripped: AtomicBool,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag tripped by Ctrl-C. Must be called from inside a Tokio runtime.
    pub fn on_ctrl_c() -> Arc<Self> {
        let flag = Arc::new(Self::new());
        let tripped = Arc::clone(&flag);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received");
                    tripped.trip();
                }
                Err(e) => warn!(error = %e, "Unable to listen for Ctrl-C"),
            }
        });
        flag
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::Release);
    }
}

impl Interrupt for InterruptFlag {
    fn should_shut_down(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}
