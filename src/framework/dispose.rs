//! # Dispose Handles
//!
//! A [`DisposeHandle`] binds a completed actor initialization to its cleanup action.
//! The director keeps live handles in a single list; a handle leaves the list at the
//! moment it is selected for disposal, and its once-flag guarantees the action runs at
//! most once even if it is somehow invoked twice.

use crate::framework::actor::ActorContext;
use crate::framework::error::BoxError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cleanup half of an actor.
#[async_trait]
pub trait Disposer: Send + Sync + 'static {
    /// Whether the owner is finished and should be disposed on the next tick.
    fn must_dispose(&self) -> bool {
        false
    }

    /// Release whatever `init` acquired.
    async fn dispose(&self, ctx: &ActorContext) -> Result<(), BoxError>;
}

pub struct DisposeHandle {
    actor_name: String,
    disposer: Arc<dyn Disposer>,
    disposed: AtomicBool,
}

impl DisposeHandle {
    pub fn new(actor_name: impl Into<String>, disposer: Arc<dyn Disposer>) -> Self {
        Self {
            actor_name: actor_name.into(),
            disposer,
            disposed: AtomicBool::new(false),
        }
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn must_dispose(&self) -> bool {
        !self.is_disposed() && self.disposer.must_dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Runs the dispose action unless it already ran.
    ///
    /// Returns `Ok(false)` when the handle had already been disposed.
    pub async fn dispose(&self, ctx: &ActorContext) -> Result<bool, BoxError> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.disposer.dispose(ctx).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for DisposeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeHandle")
            .field("actor_name", &self.actor_name)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MemoryLog;
    use std::sync::atomic::AtomicUsize;

    struct CountingDisposer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Disposer for CountingDisposer {
        async fn dispose(&self, _ctx: &ActorContext) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispose_runs_once() {
        let disposer = Arc::new(CountingDisposer {
            calls: AtomicUsize::new(0),
        });
        let handle = DisposeHandle::new("counter", disposer.clone());
        let ctx = ActorContext::detached(Arc::new(MemoryLog::new()));

        assert!(handle.dispose(&ctx).await.unwrap());
        assert!(!handle.dispose(&ctx).await.unwrap());
        assert_eq!(disposer.calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_disposed());
        assert!(!handle.must_dispose());
    }
}
