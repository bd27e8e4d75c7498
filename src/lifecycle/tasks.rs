//! # Task Tracking
//!
//! Every `init`, `run` and dispose action is launched fire-and-forget, but never
//! untracked: the [`TaskTracker`] records each task by name when it is spawned and drops
//! the record when the task finishes (or unwinds). Shutdown can then wait a bounded grace
//! period for the set to drain and say exactly what was still running.
//!
//! A tracker can be bound to a runtime. Once bound, tasks spawned from threads outside
//! any runtime (a signal handler, a `Drop` impl, a plain OS thread) still land on it.
//!
//! There is no limit on how many tasks may be in flight.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::warn;

#[derive(Default)]
struct Tracked {
    tasks: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
    idle: Notify,
    runtime: Mutex<Option<Handle>>,
}

impl Tracked {
    fn tasks(&self) -> MutexGuard<'_, HashMap<u64, String>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn runtime(&self) -> MutexGuard<'_, Option<Handle>> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Removes a task's record when the task completes or is dropped mid-flight.
struct Finished {
    tracked: Arc<Tracked>,
    id: u64,
}

impl Drop for Finished {
    fn drop(&mut self) {
        let mut tasks = self.tracked.tasks();
        tasks.remove(&self.id);
        if tasks.is_empty() {
            self.tracked.idle.notify_waiters();
        }
    }
}

#[derive(Clone, Default)]
pub struct TaskTracker {
    tracked: Arc<Tracked>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the tracker to `runtime`. Later calls replace the binding.
    pub fn bind(&self, runtime: Handle) {
        *self.tracked.runtime() = Some(runtime);
    }

    /// Binds the tracker to the current runtime, if the caller is inside one.
    pub fn bind_current(&self) -> bool {
        match Handle::try_current() {
            Ok(runtime) => {
                self.bind(runtime);
                true
            }
            Err(_) => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.tracked.runtime().is_some()
    }

    /// Spawns `future` without waiting for it, on the current runtime or else on the
    /// bound one.
    ///
    /// Returns `false` (and drops the future) when there is neither.
    pub fn spawn<F>(&self, name: impl Into<String>, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let runtime = match Handle::try_current() {
            Ok(current) => current,
            Err(_) => match self.tracked.runtime().clone() {
                Some(bound) => bound,
                None => {
                    warn!(task = %name, "No runtime to spawn task on");
                    return false;
                }
            },
        };

        let id = self.tracked.next_id.fetch_add(1, Ordering::Relaxed);
        self.tracked.tasks().insert(id, name);
        let finished = Finished {
            tracked: Arc::clone(&self.tracked),
            id,
        };
        runtime.spawn(async move {
            let _finished = finished;
            future.await;
        });
        true
    }

    pub fn len(&self) -> usize {
        self.tracked.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the tasks still in flight.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tracked.tasks().values().cloned().collect();
        names.sort();
        names
    }

    pub async fn wait_idle(&self) {
        loop {
            // Created before the check so a task finishing in between still wakes us.
            let notified = self.tracked.idle.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Waits for every task to finish, for at most `grace`. Returns whether it drained.
    pub async fn wait_idle_for(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.wait_idle()).await.is_ok()
    }
}
