//! # Actor Pool
//!
//! The pool is the set of actors the director ticks. Each actor is wrapped in an
//! [`ActorCell`] that owns its scheduling state, so claiming an init or a run is one
//! atomic operation from the pool's point of view no matter how long the actor's hook
//! takes to complete.
//!
//! The actor's own predicates (`should_run_now`, `should_be_removed`) are user code
//! called on the tick. A panic in one is caught and handed back as an error; the actor
//! is then treated as not due and kept.

use crate::framework::error::catch_panic;
use crate::framework::{Actor, ActorStage, BoxError};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

const NEEDS_INIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

pub struct ActorCell {
    actor: Arc<dyn Actor>,
    state: AtomicU8,
    running: AtomicBool,
}

impl ActorCell {
    pub(crate) fn new(actor: Arc<dyn Actor>) -> Self {
        Self {
            actor,
            state: AtomicU8::new(NEEDS_INIT),
            running: AtomicBool::new(false),
        }
    }

    pub fn actor(&self) -> &Arc<dyn Actor> {
        &self.actor
    }

    pub fn name(&self) -> &str {
        self.actor.name()
    }

    pub fn needs_init(&self) -> bool {
        self.state.load(Ordering::Acquire) == NEEDS_INIT
    }

    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claims the init. Only one caller ever wins until [`ActorCell::finish_init`].
    pub(crate) fn try_begin_init(&self) -> bool {
        self.state
            .compare_exchange(NEEDS_INIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// A failed init puts the cell back so a later tick retries it.
    pub(crate) fn finish_init(&self, succeeded: bool) {
        let next = if succeeded { READY } else { NEEDS_INIT };
        self.state.store(next, Ordering::Release);
    }

    pub(crate) fn finish_run(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Claims the init, released again when the returned [`Claim`] drops.
    pub(crate) fn claim_init(self: &Arc<Self>) -> Option<Claim> {
        self.try_begin_init()
            .then(|| Claim::new(Arc::clone(self), ActorStage::Init))
    }

    /// Claims a run if the actor is initialized, idle and due.
    ///
    /// Errs if `should_run_now` panicked.
    pub(crate) fn claim_run(self: &Arc<Self>, now: Instant) -> Result<Option<Claim>, BoxError> {
        if !self.is_initialized() || self.is_running() {
            return Ok(None);
        }
        if !catch_panic(|| self.actor.should_run_now(now))? {
            return Ok(None);
        }
        let claimed = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        Ok(claimed.then(|| Claim::new(Arc::clone(self), ActorStage::Run)))
    }
}

/// An init or run in progress on one cell.
///
/// Dropping it releases the cell. An init counts as failed unless
/// [`Claim::succeed`] was called first, so a panic or a cancelled task leaves the
/// actor eligible for a retry instead of stuck.
pub(crate) struct Claim {
    cell: Arc<ActorCell>,
    stage: ActorStage,
    succeeded: bool,
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claim")
            .field("stage", &self.stage)
            .field("succeeded", &self.succeeded)
            .finish_non_exhaustive()
    }
}

impl Claim {
    fn new(cell: Arc<ActorCell>, stage: ActorStage) -> Self {
        Self {
            cell,
            stage,
            succeeded: false,
        }
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell> {
        &self.cell
    }

    pub(crate) fn succeed(mut self) {
        self.succeeded = true;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        match self.stage {
            ActorStage::Init => self.cell.finish_init(self.succeeded),
            _ => self.cell.finish_run(),
        }
    }
}

/// What [`ActorPool::prune`] left behind.
#[derive(Default)]
pub struct Pruned {
    pub kept: Vec<Arc<ActorCell>>,
    pub removed: Vec<String>,
    /// Actors whose `should_be_removed` panicked. They stay in the pool.
    pub faults: Vec<(String, BoxError)>,
}

impl std::fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCell")
            .field("name", &self.name())
            .field("needs_init", &self.needs_init())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Lock-guarded, insertion-ordered collection of actor cells.
#[derive(Default)]
pub struct ActorPool {
    cells: Mutex<Vec<Arc<ActorCell>>>,
}

impl ActorPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> MutexGuard<'_, Vec<Arc<ActorCell>>> {
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, actor: Arc<dyn Actor>) {
        self.cells().push(Arc::new(ActorCell::new(actor)));
    }

    pub fn snapshot(&self) -> Vec<Arc<ActorCell>> {
        self.cells().clone()
    }

    /// Detaches every actor in `snapshot` that asks to be removed and returns what is
    /// left in the pool. Removal never disposes.
    pub fn prune(&self, snapshot: Vec<Arc<ActorCell>>) -> Pruned {
        let mut faults = Vec::new();
        let mut doomed = Vec::new();
        for cell in &snapshot {
            match catch_panic(|| cell.actor.should_be_removed()) {
                Ok(true) => doomed.push(Arc::clone(cell)),
                Ok(false) => {}
                Err(e) => faults.push((cell.name().to_string(), e)),
            }
        }
        if doomed.is_empty() {
            return Pruned {
                kept: snapshot,
                removed: Vec::new(),
                faults,
            };
        }

        let mut cells = self.cells();
        cells.retain(|cell| !doomed.iter().any(|gone| Arc::ptr_eq(gone, cell)));
        Pruned {
            kept: cells.clone(),
            removed: doomed.iter().map(|cell| cell.name().to_string()).collect(),
            faults,
        }
    }

    pub fn len(&self) -> usize {
        self.cells().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.cells().iter().map(|cell| cell.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::ScriptedActor;

    fn cell(actor: impl Actor) -> Arc<ActorCell> {
        Arc::new(ActorCell::new(Arc::new(actor)))
    }

    /// An actor whose predicates panic.
    struct Erratic;

    #[async_trait::async_trait]
    impl Actor for Erratic {
        fn name(&self) -> &str {
            "erratic"
        }

        fn should_run_now(&self, _now: Instant) -> bool {
            panic!("schedule exploded")
        }

        fn should_be_removed(&self) -> bool {
            panic!("removal check exploded")
        }

        async fn run(&self, _ctx: &crate::framework::ActorContext) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_init_claim_is_exclusive() {
        let cell = cell(ScriptedActor::new("scripted"));
        let claim = cell.claim_init().unwrap();
        assert!(cell.claim_init().is_none());
        assert!(cell.claim_run(Instant::now()).unwrap().is_none());

        drop(claim);
        assert!(cell.needs_init());
        cell.claim_init().unwrap().succeed();
        assert!(cell.is_initialized());
        assert!(cell.claim_init().is_none());
    }

    #[test]
    fn test_run_claim_is_exclusive() {
        let cell = cell(ScriptedActor::new("scripted"));
        cell.claim_init().unwrap().succeed();

        let claim = cell.claim_run(Instant::now()).unwrap().unwrap();
        assert!(cell.is_running());
        assert!(cell.claim_run(Instant::now()).unwrap().is_none());
        drop(claim);
        assert!(!cell.is_running());
        assert!(cell.claim_run(Instant::now()).unwrap().is_some());
    }

    #[test]
    fn test_claim_released_when_holder_unwinds() {
        let cell = cell(ScriptedActor::new("scripted"));
        let held = Arc::clone(&cell);
        let outcome = std::thread::spawn(move || {
            let _claim = held.claim_init();
            panic!("init blew up");
        })
        .join();

        assert!(outcome.is_err());
        assert!(cell.needs_init());
        assert!(cell.claim_init().is_some());
    }

    #[test]
    fn test_panicking_schedule_is_not_due() {
        let cell = cell(Erratic);
        cell.claim_init().unwrap().succeed();

        let err = cell.claim_run(Instant::now()).unwrap_err();
        assert!(err.to_string().contains("schedule exploded"));
        assert!(!cell.is_running());
    }

    #[test]
    fn test_prune_detaches_only_finished_actors() {
        let pool = ActorPool::new();
        let done = Arc::new(ScriptedActor::new("done"));
        pool.push(Arc::new(ScriptedActor::new("alive")));
        pool.push(done.clone());

        let pruned = pool.prune(pool.snapshot());
        assert_eq!(pruned.kept.len(), 2);
        assert!(pruned.removed.is_empty());

        done.finish();
        let pruned = pool.prune(pool.snapshot());
        assert_eq!(pruned.removed, vec!["done".to_string()]);
        assert_eq!(pruned.kept.len(), 1);
        assert_eq!(pool.names(), vec!["alive".to_string()]);
    }

    #[test]
    fn test_prune_keeps_actor_whose_check_panics() {
        let pool = ActorPool::new();
        pool.push(Arc::new(Erratic));
        pool.push(Arc::new(ScriptedActor::new("steady")));

        let pruned = pool.prune(pool.snapshot());
        assert_eq!(pruned.kept.len(), 2);
        assert!(pruned.removed.is_empty());
        assert_eq!(pruned.faults.len(), 1);
        assert_eq!(pruned.faults[0].0, "erratic");
        assert_eq!(pool.len(), 2);
    }
}
