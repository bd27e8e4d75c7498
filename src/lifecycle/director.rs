//! # Director
//!
//! The [`Director`] owns a [`Container`], an [`ActorPool`] and the list of live
//! [`DisposeHandle`]s, and drives all of them from a single main loop.
//!
//! ## Phases
//!
//! ```text
//! Stopped --run--> Starting --startup ok, wired--> Running --dispose--> ShuttingDown --> Stopped
//!                     |  ^                                                                  ^
//!                     |  +-- startup failed, retrying                                      |
//!                     +--- startup failed (no retry) / wiring failed / disposed -----------+
//! ```
//!
//! ## Tick
//!
//! Every `tick_interval` the loop:
//!
//! 1. asks the [`Interrupt`] (if any) whether to shut down,
//! 2. moves actors produced by component construction into the pool,
//! 3. snapshots the pool and prunes actors that asked to be removed,
//! 4. takes every dispose handle that must dispose out of the list and launches its
//!    dispose action,
//! 5. launches `init` for actors that have not been initialized, and `run` for
//!    initialized actors that are idle and due.
//!
//! Nothing launched in a tick is awaited by the tick. All work is tracked by a
//! [`TaskTracker`] so `shutdown` can wait for it.
//!
//! ## Panics
//!
//! Actor code never takes the loop down. A panicking `init` or `run` is reported like
//! a returned error and the actor stays eligible. A panicking predicate
//! (`should_run_now`, `should_be_removed`, `must_dispose`, `should_shut_down`) is
//! reported and read as "no" for that tick.

use crate::container::{Alias, ComponentModule, Container, ContainerError};
use crate::framework::error::{catch_panic, panic_error};
use crate::framework::{
    Actor, ActorContext, ActorStage, BoxError, DirectorError, DisposeHandle,
};
use crate::lifecycle::config::DirectorConfig;
use crate::lifecycle::interrupt::Interrupt;
use crate::lifecycle::log::{EventLog, TracingLog};
use crate::lifecycle::pool::{ActorCell, ActorPool};
use crate::lifecycle::tasks::TaskTracker;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

const LOC_STARTUP: &str = "Startup";
const LOC_MAIN_LOOP: &str = "Main Loop";
const LOC_SHUTDOWN: &str = "Shutdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

struct RunState {
    phase: Phase,
    shutdown_requested: bool,
}

struct Shared {
    config: DirectorConfig,
    log: Arc<dyn EventLog>,
    container: Container,
    pool: ActorPool,
    /// `None` once torn down; nothing can be added after that.
    dispose_handles: Mutex<Option<Vec<DisposeHandle>>>,
    state: Mutex<RunState>,
    interrupt: Mutex<Option<Arc<dyn Interrupt>>>,
    wake: Notify,
    tasks: TaskTracker,
}

/// Hosts actors and drives their lifecycle. Cheap to clone; clones share one director.
#[derive(Clone)]
pub struct Director {
    shared: Arc<Shared>,
}

/// A non-owning reference to a [`Director`].
///
/// Registered in every director's container, so components can depend on it and add
/// actors later without keeping the director alive.
#[derive(Clone, Default)]
pub struct DirectorHandle {
    shared: Weak<Shared>,
}

impl DirectorHandle {
    /// A handle that never upgrades.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Director> {
        self.shared.upgrade().map(|shared| Director { shared })
    }

    /// Adds `actor` to the director's pool. `false` if the director is gone or torn down.
    pub fn add_actor(&self, actor: Arc<dyn Actor>) -> bool {
        self.upgrade().is_some_and(|director| director.add_actor(actor))
    }

    pub fn is_running(&self) -> bool {
        self.upgrade().is_some_and(|director| director.is_running())
    }
}

impl std::fmt::Debug for DirectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorHandle")
            .field("attached", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl Default for Director {
    fn default() -> Self {
        Self::new(Arc::new(TracingLog))
    }
}

impl Director {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self::with_config(DirectorConfig::default(), log)
    }

    pub fn with_config(config: DirectorConfig, log: Arc<dyn EventLog>) -> Self {
        let director = Self {
            shared: Arc::new(Shared {
                config,
                log: Arc::clone(&log),
                container: Container::new(),
                pool: ActorPool::new(),
                dispose_handles: Mutex::new(Some(Vec::new())),
                state: Mutex::new(RunState {
                    phase: Phase::Stopped,
                    shutdown_requested: false,
                }),
                interrupt: Mutex::new(None),
                wake: Notify::new(),
                tasks: TaskTracker::new(),
            }),
        };

        // Lets `dispose` reach the runtime even when called from a plain thread.
        director.shared.tasks.bind_current();

        let container = &director.shared.container;
        let wired = container
            .register_singleton(Arc::new(director.handle()), Vec::new())
            .and_then(|()| container.register_singleton(log, Vec::new()));
        if let Err(e) = wired {
            error!(error = %e, "Failed to register director services");
        }
        director
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispose_handles(&self) -> MutexGuard<'_, Option<Vec<DisposeHandle>>> {
        self.shared
            .dispose_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn handle(&self) -> DirectorHandle {
        DirectorHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn container(&self) -> &Container {
        &self.shared.container
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.shared.log
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Whether `dispose` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutdown_requested
    }

    pub fn actor_names(&self) -> Vec<String> {
        self.shared.pool.names()
    }

    pub fn actor_count(&self) -> usize {
        self.shared.pool.len()
    }

    /// Live handles still waiting to be disposed. Zero once torn down.
    pub fn pending_dispose_count(&self) -> usize {
        self.dispose_handles().as_ref().map_or(0, Vec::len)
    }

    /// Names of the init, run and dispose tasks still in flight.
    pub fn in_flight(&self) -> Vec<String> {
        self.shared.tasks.running()
    }

    /// Installs the shutdown trigger checked at the top of every tick.
    pub fn set_interrupt(&self, interrupt: Arc<dyn Interrupt>) {
        *self.shared.interrupt.lock().unwrap_or_else(|e| e.into_inner()) = Some(interrupt);
    }

    fn interrupt(&self) -> Option<Arc<dyn Interrupt>> {
        self.shared
            .interrupt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn context_at(&self, now: Instant) -> ActorContext {
        ActorContext::new(now, Arc::clone(&self.shared.log), self.handle())
    }

    fn context(&self) -> ActorContext {
        self.context_at(Instant::now())
    }

    // =========================================================================
    // MANUAL API
    // =========================================================================

    /// Binds `value` under `T` and `aliases`. See [`Container::register_singleton`].
    pub fn register_singleton<T: ?Sized + Send + Sync + 'static>(
        &self,
        value: Arc<T>,
        aliases: Vec<Alias<T>>,
    ) -> Result<(), ContainerError> {
        self.shared.container.register_singleton(value, aliases)
    }

    /// See [`Container::add_singleton_alias`].
    pub fn add_singleton_alias<T: ?Sized + Send + Sync + 'static>(
        &self,
        aliases: Vec<Alias<T>>,
        check_conflicts: bool,
    ) -> Result<(), ContainerError> {
        self.shared.container.add_singleton_alias(aliases, check_conflicts)
    }

    /// The value bound to `T`, if one has been constructed.
    pub fn try_get_singleton<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.shared.container.try_resolve::<T>()
    }

    pub fn get_singleton<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.try_get_singleton::<T>()
            .ok_or(ContainerError::SingletonNotFound {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Puts `actor` in the pool. Refused once the director has been torn down.
    pub fn add_actor(&self, actor: Arc<dyn Actor>) -> bool {
        if self.dispose_handles().is_none() {
            debug!(actor = actor.name(), "Refusing actor after shutdown");
            return false;
        }
        debug!(actor = actor.name(), "Actor added");
        self.shared.pool.push(actor);
        true
    }

    // =========================================================================
    // RUN
    // =========================================================================

    /// Starts up, wires discovered components and drives the main loop until disposed.
    ///
    /// Returns immediately if the director is already running or has been disposed.
    /// With `retry`, a failing `startup` is logged and retried after
    /// `startup_retry_window` until it succeeds or the director is disposed.
    #[instrument(skip(self, startup, modules), fields(modules = modules.len()))]
    pub async fn run<F, Fut>(
        &self,
        mut startup: F,
        retry: bool,
        modules: &[Arc<dyn ComponentModule>],
    ) -> Result<(), DirectorError>
    where
        F: FnMut(ActorContext) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        {
            let mut state = self.state();
            if state.shutdown_requested || state.phase != Phase::Stopped {
                debug!(phase = ?state.phase, "Director already started");
                return Ok(());
            }
            state.phase = Phase::Starting;
        }
        self.shared.tasks.bind_current();
        let log = &self.shared.log;
        log.info(LOC_STARTUP, "DirectorStarting", "Director starting");

        match self.run_startup(&mut startup, retry).await {
            Ok(true) => {}
            Ok(false) => {
                self.stop();
                return Ok(());
            }
            Err(e) => {
                self.stop();
                return Err(e);
            }
        }

        if let Err(e) = self.wire(modules) {
            log.error(LOC_STARTUP, "WiringFailed", &e);
            log.flush().await;
            self.stop();
            return Err(e);
        }

        {
            let mut state = self.state();
            if state.shutdown_requested {
                state.phase = Phase::Stopped;
                return Ok(());
            }
            state.phase = Phase::Running;
        }
        log.info(LOC_STARTUP, "DirectorStarted", "Director running");

        self.main_loop().await;
        self.stop();
        Ok(())
    }

    fn stop(&self) {
        self.state().phase = Phase::Stopped;
    }

    /// `Ok(false)` when a retrying startup was abandoned because of shutdown.
    async fn run_startup<F, Fut>(&self, startup: &mut F, retry: bool) -> Result<bool, DirectorError>
    where
        F: FnMut(ActorContext) -> Fut,
        Fut: Future<Output = Result<(), BoxError>>,
    {
        let log = &self.shared.log;
        loop {
            let e = match startup(self.context()).await {
                Ok(()) => return Ok(true),
                Err(e) => e,
            };
            log.error(LOC_STARTUP, "StartupFailed", &*e);
            log.flush().await;
            if !retry {
                return Err(DirectorError::Startup(e));
            }
            if !self.wait_before_retry().await {
                info!("Startup retry abandoned, director is shutting down");
                return Ok(false);
            }
        }
    }

    /// Sleeps out the retry window in poll-sized steps. `false` if shutdown interrupted it.
    async fn wait_before_retry(&self) -> bool {
        let poll = self.shared.config.startup_poll_interval.max(Duration::from_millis(1));
        let window = self.shared.config.startup_retry_window;
        let mut waited = Duration::ZERO;
        while waited < window {
            tokio::time::sleep(poll).await;
            waited += poll;
            if self.is_shutting_down() {
                return false;
            }
        }
        !self.is_shutting_down()
    }

    #[instrument(skip(self, modules))]
    fn wire(&self, modules: &[Arc<dyn ComponentModule>]) -> Result<(), DirectorError> {
        let container = &self.shared.container;
        for module in modules {
            let components = module.components().map_err(|source| DirectorError::Discovery {
                module: module.name().to_string(),
                source,
            })?;
            for descriptor in components {
                if !container.register_discovered(descriptor) {
                    debug!(
                        component = descriptor.type_name(),
                        module = module.name(),
                        "Already bound, keeping existing binding"
                    );
                }
            }
        }
        container.build()?;
        let roots = container.resolve_root_singletons()?;
        let adopted = self.adopt_spawned();
        info!(roots, actors = adopted, "Components wired");
        Ok(())
    }

    async fn main_loop(&self) {
        let shared = &self.shared;
        shared.log.info(LOC_MAIN_LOOP, "LoopStarted", "Main loop started");
        while self.is_running() {
            if let Err(e) = catch_panic(|| self.tick()) {
                shared.log.error(LOC_MAIN_LOOP, "TickFailed", &*e);
            }
            tokio::select! {
                _ = tokio::time::sleep(shared.config.tick_interval) => {}
                _ = shared.wake.notified() => {}
            }
        }
        shared.log.info(LOC_MAIN_LOOP, "LoopStopped", "Main loop stopped");
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// One pass of the main loop. Never blocks on actor work.
    pub fn tick(&self) {
        if let Some(interrupt) = self.interrupt() {
            match catch_panic(|| interrupt.should_shut_down()) {
                Ok(true) => {
                    info!("Interrupt requested shutdown");
                    self.dispose();
                    return;
                }
                Ok(false) => {}
                Err(e) => self.shared.log.error(LOC_MAIN_LOOP, "InterruptFailed", &*e),
            }
        }

        self.adopt_spawned();
        let pruned = self.shared.pool.prune(self.shared.pool.snapshot());
        for name in pruned.removed {
            debug!(actor = %name, "Actor removed");
        }
        for (actor, source) in pruned.faults {
            self.report(DirectorError::Actor {
                actor,
                stage: ActorStage::Schedule,
                source,
            });
        }
        self.launch_due_disposals();

        let now = Instant::now();
        for cell in pruned.kept {
            self.advance(cell, now);
        }
    }

    fn adopt_spawned(&self) -> usize {
        let spawned = self.shared.container.take_spawned_actors();
        let count = spawned.len();
        for actor in spawned {
            self.add_actor(actor);
        }
        count
    }

    fn launch_due_disposals(&self) {
        let mut faults = Vec::new();
        let due: Vec<DisposeHandle> = {
            let mut handles = self.dispose_handles();
            let Some(live) = handles.as_mut() else {
                return;
            };
            // Every verdict is settled before the list is touched, so a panicking
            // `must_dispose` cannot cost the other handles.
            let verdicts: Vec<bool> = live
                .iter()
                .map(|handle| {
                    catch_panic(|| handle.must_dispose()).unwrap_or_else(|e| {
                        faults.push((handle.actor_name().to_string(), e));
                        false
                    })
                })
                .collect();
            let mut verdicts = verdicts.into_iter();
            let (due, keep): (Vec<DisposeHandle>, Vec<DisposeHandle>) = std::mem::take(live)
                .into_iter()
                .partition(|_| verdicts.next().unwrap_or(false));
            *live = keep;
            due
        };
        for (actor, source) in faults {
            self.report(DirectorError::Actor {
                actor,
                stage: ActorStage::Dispose,
                source,
            });
        }
        if due.is_empty() {
            return;
        }
        let ctx = self.context();
        for handle in due {
            self.launch_dispose(handle, ctx.clone());
        }
    }

    fn launch_dispose(&self, handle: DisposeHandle, ctx: ActorContext) {
        let director = self.clone();
        let actor = handle.actor_name().to_string();
        let task = format!("{actor}:dispose");
        let launched = self.shared.tasks.spawn(task, async move {
            director.dispose_now(handle, &ctx).await;
        });
        if !launched {
            self.report(DirectorError::Shutdown {
                actor,
                source: "no runtime to run the dispose action on".into(),
            });
        }
    }

    async fn dispose_now(&self, handle: DisposeHandle, ctx: &ActorContext) {
        let actor = handle.actor_name().to_string();
        let ctx = ctx.clone();
        let outcome = tokio::spawn(async move { handle.dispose(&ctx).await })
            .await
            .unwrap_or_else(|e| Err(hook_error(e)));
        match outcome {
            Ok(true) => debug!(actor = %actor, "Disposed"),
            Ok(false) => {}
            Err(source) => self.report(DirectorError::Shutdown { actor, source }),
        }
    }

    /// Launches `init` or `run` for `cell` if it is eligible.
    ///
    /// The hook itself runs on an inner task so a panic surfaces as a [`JoinError`]
    /// here instead of unwinding through the claim. A launch the tracker refuses drops
    /// the claim, which releases the cell.
    fn advance(&self, cell: Arc<ActorCell>, now: Instant) {
        if let Some(claim) = cell.claim_init() {
            let director = self.clone();
            let ctx = self.context_at(now);
            let task = format!("{}:init", cell.name());
            self.shared.tasks.spawn(task, async move {
                let outcome = {
                    let (cell, ctx) = (Arc::clone(claim.cell()), ctx.clone());
                    tokio::spawn(async move { cell.actor().init(&ctx).await }).await
                };
                match outcome.unwrap_or_else(|e| Err(hook_error(e))) {
                    Ok(handle) => {
                        debug!(actor = claim.cell().name(), "Initialized");
                        claim.succeed();
                        if let Some(handle) = handle {
                            director.keep_dispose_handle(handle, &ctx).await;
                        }
                    }
                    Err(source) => {
                        let actor = claim.cell().name().to_string();
                        drop(claim);
                        director.report(DirectorError::Actor {
                            actor,
                            stage: ActorStage::Init,
                            source,
                        });
                    }
                }
            });
            return;
        }

        match cell.claim_run(now) {
            Ok(Some(claim)) => {
                let director = self.clone();
                let ctx = self.context_at(now);
                let task = format!("{}:run", cell.name());
                self.shared.tasks.spawn(task, async move {
                    let outcome = {
                        let cell = Arc::clone(claim.cell());
                        tokio::spawn(async move { cell.actor().run(&ctx).await }).await
                    };
                    let actor = claim.cell().name().to_string();
                    drop(claim);
                    if let Err(source) = outcome.unwrap_or_else(|e| Err(hook_error(e))) {
                        director.report(DirectorError::Actor {
                            actor,
                            stage: ActorStage::Run,
                            source,
                        });
                    }
                });
            }
            Ok(None) => {}
            Err(source) => self.report(DirectorError::Actor {
                actor: cell.name().to_string(),
                stage: ActorStage::Schedule,
                source,
            }),
        }
    }

    /// Appends `handle` to the live list, or disposes it at once if torn down.
    async fn keep_dispose_handle(&self, handle: DisposeHandle, ctx: &ActorContext) {
        let rejected = {
            let mut handles = self.dispose_handles();
            match handles.as_mut() {
                Some(live) => {
                    live.push(handle);
                    None
                }
                None => Some(handle),
            }
        };
        if let Some(handle) = rejected {
            debug!(actor = handle.actor_name(), "Initialized after shutdown, disposing");
            self.dispose_now(handle, ctx).await;
        }
    }

    fn report(&self, error: DirectorError) {
        let event = match &error {
            DirectorError::Shutdown { .. } => "ShutdownFailed",
            DirectorError::Actor { stage: ActorStage::Init, .. } => "InitFailed",
            _ => "ActorFailed",
        };
        self.shared.log.error(LOC_MAIN_LOOP, event, &error);
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Stops the main loop and launches every live dispose action. Idempotent.
    ///
    /// Does not wait for anything; see [`Director::shutdown`].
    pub fn dispose(&self) {
        {
            let mut state = self.state();
            if state.shutdown_requested {
                return;
            }
            state.shutdown_requested = true;
            if state.phase != Phase::Stopped {
                state.phase = Phase::ShuttingDown;
            }
        }
        self.shared.log.info(LOC_SHUTDOWN, "DirectorShutdown", "Director shutting down");
        self.shared.wake.notify_one();

        let handles = self.dispose_handles().take().unwrap_or_default();
        if handles.is_empty() {
            return;
        }
        let ctx = self.context();
        for handle in handles {
            self.launch_dispose(handle, ctx.clone());
        }
    }

    /// Disposes, then waits up to `shutdown_grace` for in-flight work to finish.
    ///
    /// Returns `false` if work was still running when the grace period ran out.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> bool {
        self.dispose();
        let Some(grace) = self.shared.config.shutdown_grace else {
            return true;
        };
        if self.shared.tasks.wait_idle_for(grace).await {
            return true;
        }
        let pending = self.shared.tasks.running();
        warn!(pending = ?pending, "Shutdown grace period elapsed");
        self.shared
            .log
            .info(LOC_SHUTDOWN, "ShutdownIncomplete", &pending.join(", "));
        false
    }
}

/// A hook task that did not return: its panic message, or the cancellation.
fn hook_error(e: JoinError) -> BoxError {
    match e.try_into_panic() {
        Ok(payload) => panic_error(payload),
        Err(e) => e.into(),
    }
}

impl std::fmt::Debug for Director {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("phase", &self.phase())
            .field("actors", &self.actor_count())
            .field("pending_dispose", &self.pending_dispose_count())
            .finish()
    }
}
