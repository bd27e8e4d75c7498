use actor_director::container::{
    Component, ComponentDescriptor, ComponentList, ComponentModule, ContainerError, Dependency,
    Resolver,
};
use actor_director::framework::mock::{MemoryLog, ScriptedActor};
use actor_director::framework::{Actor, ActorContext, BoxError, DirectorError, DisposeHandle, Every};
use actor_director::lifecycle::{
    Director, DirectorConfig, DirectorHandle, EventLog, InterruptFlag, Phase,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn fast_config() -> DirectorConfig {
    DirectorConfig::default()
        .with_tick_interval(Duration::from_millis(5))
        .with_startup_retry(Duration::from_millis(5), Duration::from_millis(20))
}

fn director() -> (Director, Arc<MemoryLog>) {
    let log = Arc::new(MemoryLog::new());
    (Director::with_config(fast_config(), log.clone()), log)
}

/// Runs the director on its own task with a startup routine that always succeeds.
fn start(
    director: &Director,
    modules: Vec<Arc<dyn ComponentModule>>,
) -> JoinHandle<Result<(), DirectorError>> {
    let director = director.clone();
    tokio::spawn(async move {
        director
            .run(|_ctx| async { Ok::<(), BoxError>(()) }, false, &modules)
            .await
    })
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn stop(director: &Director, runner: JoinHandle<Result<(), DirectorError>>) {
    director.dispose();
    runner
        .await
        .expect("director task panicked")
        .expect("director run failed");
    assert_eq!(director.phase(), Phase::Stopped);
}

// =============================================================================
// STARTUP
// =============================================================================

#[tokio::test]
async fn test_heartbeat_is_initialized_once_and_runs() {
    let (director, log) = director();
    let heartbeat = Arc::new(ScriptedActor::new("heartbeat").with_interval(Duration::from_millis(20)));
    director.add_actor(heartbeat.clone());

    let runner = start(&director, Vec::new());
    wait_until("first heartbeat", || heartbeat.runs() >= 1).await;
    assert!(director.is_running());
    assert_eq!(heartbeat.init_attempts(), 1);

    stop(&director, runner).await;
    assert_eq!(log.count("DirectorStarting"), 1);
    assert_eq!(log.count("DirectorStarted"), 1);
    assert_eq!(log.count("DirectorShutdown"), 1);
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_startup_retry_logs_each_failure() {
    let (director, log) = director();
    let attempts = Arc::new(AtomicUsize::new(0));

    let runner = {
        let director = director.clone();
        let attempts = attempts.clone();
        tokio::spawn(async move {
            director
                .run(
                    move |_ctx| {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        async move {
                            if attempt <= 2 {
                                Err::<(), BoxError>(format!("attempt {attempt} failed").into())
                            } else {
                                Ok(())
                            }
                        }
                    },
                    true,
                    &[],
                )
                .await
        })
    };

    wait_until("director running", || director.is_running()).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(log.count("StartupFailed"), 2);
    assert!(log.flushes() >= 2);

    stop(&director, runner).await;
}

#[tokio::test]
async fn test_startup_failure_without_retry_is_returned() {
    let (director, log) = director();
    let result = director
        .run(
            |_ctx| async { Err::<(), BoxError>("no database".into()) },
            false,
            &[],
        )
        .await;

    assert!(matches!(result, Err(DirectorError::Startup(_))));
    assert_eq!(log.count("StartupFailed"), 1);
    assert_eq!(log.flushes(), 1);
    assert_eq!(director.phase(), Phase::Stopped);
}

#[tokio::test]
async fn test_shutdown_abandons_startup_retry() {
    let log = Arc::new(MemoryLog::new());
    let config = fast_config().with_startup_retry(Duration::from_millis(5), Duration::from_secs(30));
    let director = Director::with_config(config, log.clone());

    let runner = {
        let director = director.clone();
        tokio::spawn(async move {
            director
                .run(
                    |_ctx| async { Err::<(), BoxError>("still down".into()) },
                    true,
                    &[],
                )
                .await
        })
    };

    wait_until("first failure", || log.count("StartupFailed") == 1).await;
    director.dispose();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("retry loop ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(director.phase(), Phase::Stopped);
    assert_eq!(log.count("StartupFailed"), 1);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let (director, _log) = director();
    let runner = start(&director, Vec::new());
    wait_until("director running", || director.is_running()).await;

    let startups = AtomicUsize::new(0);
    director
        .run(
            |_ctx| {
                startups.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), BoxError>(()) }
            },
            false,
            &[],
        )
        .await
        .unwrap();
    assert_eq!(startups.load(Ordering::SeqCst), 0);

    stop(&director, runner).await;
}

// =============================================================================
// SCHEDULING
// =============================================================================

#[tokio::test]
async fn test_slow_init_is_never_dispatched_twice() {
    let (director, _log) = director();
    let slow = Arc::new(ScriptedActor::new("slow").with_init_delay(Duration::from_millis(100)));
    director.add_actor(slow.clone());

    let runner = start(&director, Vec::new());
    wait_until("run after slow init", || slow.runs() >= 1).await;
    assert_eq!(slow.init_attempts(), 1);

    stop(&director, runner).await;
}

#[tokio::test]
async fn test_runs_of_one_actor_never_overlap() {
    let (director, _log) = director();
    let busy = Arc::new(ScriptedActor::new("busy").with_run_delay(Duration::from_millis(30)));
    director.add_actor(busy.clone());

    let runner = start(&director, Vec::new());
    wait_until("several runs", || busy.runs() >= 3).await;
    assert_eq!(busy.max_concurrent_runs(), 1);

    stop(&director, runner).await;
}

#[tokio::test]
async fn test_interval_actor_waits_between_runs() {
    let (director, _log) = director();
    let slow_clock = Arc::new(ScriptedActor::new("slow-clock").with_interval(Duration::from_millis(200)));
    director.add_actor(slow_clock.clone());

    let runner = start(&director, Vec::new());
    wait_until("first run", || slow_clock.runs() == 1).await;
    let first_seen = Instant::now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(slow_clock.runs(), 1);

    wait_until("second run", || slow_clock.runs() == 2).await;
    let gap = first_seen.elapsed();
    assert!(gap >= Duration::from_millis(180), "second run came early: {gap:?}");
    assert!(gap < Duration::from_millis(350), "second run came late: {gap:?}");

    stop(&director, runner).await;
}

#[tokio::test]
async fn test_removed_actor_is_not_disposed() {
    let (director, _log) = director();
    let finished = Arc::new(ScriptedActor::new("finished").with_dispose_handle());
    director.add_actor(finished.clone());

    let runner = start(&director, Vec::new());
    wait_until("handle kept", || director.pending_dispose_count() == 1).await;

    finished.finish();
    wait_until("actor removed", || director.actor_count() == 0).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    let runs = finished.runs();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(finished.runs(), runs);
    assert_eq!(finished.disposals(), 0);
    assert_eq!(director.pending_dispose_count(), 1);

    stop(&director, runner).await;
    wait_until("disposed at shutdown", || finished.disposals() == 1).await;
}

#[tokio::test]
async fn test_handle_due_before_shutdown_is_disposed_by_tick() {
    let (director, _log) = director();
    let scripted = Arc::new(ScriptedActor::new("scripted").with_dispose_handle());
    director.add_actor(scripted.clone());

    let runner = start(&director, Vec::new());
    wait_until("handle kept", || director.pending_dispose_count() == 1).await;

    scripted.request_dispose();
    wait_until("handle disposed", || scripted.disposals() == 1).await;
    assert_eq!(director.pending_dispose_count(), 0);

    stop(&director, runner).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(scripted.disposals(), 1);
}

// =============================================================================
// SHUTDOWN
// =============================================================================

#[tokio::test]
async fn test_shutdown_disposes_every_pending_handle() {
    let log = Arc::new(MemoryLog::new());
    let config = fast_config().with_shutdown_grace(Duration::from_secs(1));
    let director = Director::with_config(config, log.clone());
    let actors: Vec<Arc<ScriptedActor>> = (0..3)
        .map(|i| Arc::new(ScriptedActor::new(format!("scripted-{i}")).with_dispose_handle()))
        .collect();
    for scripted in &actors {
        director.add_actor(scripted.clone());
    }

    let runner = start(&director, Vec::new());
    wait_until("three handles", || director.pending_dispose_count() == 3).await;

    assert!(director.shutdown().await);
    runner.await.unwrap().unwrap();
    for scripted in &actors {
        assert_eq!(scripted.disposals(), 1);
    }
    assert_eq!(director.pending_dispose_count(), 0);
    assert!(!director.add_actor(Arc::new(ScriptedActor::new("late"))));
}

#[tokio::test]
async fn test_init_finishing_after_shutdown_disposes_immediately() {
    let (director, _log) = director();
    let late = Arc::new(
        ScriptedActor::new("late")
            .with_init_delay(Duration::from_millis(80))
            .with_dispose_handle(),
    );
    director.add_actor(late.clone());

    let runner = start(&director, Vec::new());
    wait_until("init dispatched", || late.init_attempts() == 1).await;
    stop(&director, runner).await;

    wait_until("late handle disposed", || late.disposals() == 1).await;
    assert_eq!(director.pending_dispose_count(), 0);
    assert_eq!(late.runs(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_dispose_runs_each_action_once() {
    let (director, log) = director();
    let actors: Vec<Arc<ScriptedActor>> = (0..3)
        .map(|i| Arc::new(ScriptedActor::new(format!("scripted-{i}")).with_dispose_handle()))
        .collect();
    for scripted in &actors {
        director.add_actor(scripted.clone());
    }

    let runner = start(&director, Vec::new());
    wait_until("three handles", || director.pending_dispose_count() == 3).await;

    let first = tokio::spawn({
        let director = director.clone();
        async move { director.dispose() }
    });
    let second = tokio::spawn({
        let director = director.clone();
        async move { director.dispose() }
    });
    first.await.unwrap();
    second.await.unwrap();
    runner.await.unwrap().unwrap();

    wait_until("all disposed", || actors.iter().all(|p| p.disposals() == 1)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    for scripted in &actors {
        assert_eq!(scripted.disposals(), 1);
    }
    assert_eq!(log.count("DirectorShutdown"), 1);
}

#[tokio::test]
async fn test_interrupt_stops_the_loop() {
    let (director, log) = director();
    let interrupt = Arc::new(InterruptFlag::new());
    director.set_interrupt(interrupt.clone());

    let runner = start(&director, Vec::new());
    wait_until("director running", || director.is_running()).await;

    interrupt.trip();
    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("interrupt ignored")
        .unwrap()
        .unwrap();
    assert_eq!(director.phase(), Phase::Stopped);
    assert_eq!(log.count("DirectorShutdown"), 1);
}

#[tokio::test]
async fn test_shutdown_grace_reports_stuck_work() {
    let log = Arc::new(MemoryLog::new());
    let config = fast_config().with_shutdown_grace(Duration::from_millis(20));
    let director = Director::with_config(config, log.clone());
    let stuck = Arc::new(ScriptedActor::new("stuck").with_run_delay(Duration::from_secs(5)));
    director.add_actor(stuck.clone());

    let runner = start(&director, Vec::new());
    wait_until("run in flight", || director.in_flight().iter().any(|t| t == "stuck:run")).await;

    assert!(!director.shutdown().await);
    runner.await.unwrap().unwrap();
    let incomplete = log
        .events()
        .into_iter()
        .find(|e| e.event == "ShutdownIncomplete")
        .expect("shutdown should report stuck work");
    assert!(incomplete.detail.contains("stuck:run"));
}

// =============================================================================
// WIRING
// =============================================================================

struct Settings {
    period: Duration,
}

impl Component for Settings {
    fn construct(_resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        Ok(Self {
            period: Duration::from_secs(60),
        })
    }
}

/// A discovered component that is also an actor.
struct Poller {
    settings: Arc<Settings>,
    director: Arc<DirectorHandle>,
    log: Arc<dyn EventLog>,
    polls: AtomicUsize,
}

impl Component for Poller {
    fn dependencies() -> Vec<Dependency> {
        vec![
            Dependency::component::<Settings>(),
            Dependency::bound::<DirectorHandle>(),
            Dependency::bound::<dyn EventLog>(),
        ]
    }

    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        Ok(Self {
            settings: resolver.get::<Settings>()?,
            director: resolver.get::<DirectorHandle>()?,
            log: resolver.get::<dyn EventLog>()?,
            polls: AtomicUsize::new(0),
        })
    }

    fn as_actor(this: &Arc<Self>) -> Option<Arc<dyn Actor>> {
        Some(this.clone())
    }
}

#[async_trait]
impl Actor for Poller {
    fn name(&self) -> &str {
        "poller"
    }

    fn should_run_now(&self, _now: Instant) -> bool {
        self.polls.load(Ordering::SeqCst) == 0
    }

    async fn run(&self, _ctx: &ActorContext) -> Result<(), BoxError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.log.info("Poller", "Polled", &format!("{:?}", self.settings.period));
        Ok(())
    }
}

#[tokio::test]
async fn test_discovered_actor_component_is_wired_and_run() {
    let (director, log) = director();
    let module: Arc<dyn ComponentModule> = Arc::new(ComponentList::new("polling").with::<Poller>());

    let runner = start(&director, vec![module]);
    wait_until("poller ran", || log.count("Polled") == 1).await;

    let poller = director.get_singleton::<Poller>().unwrap();
    assert_eq!(poller.settings.period, Duration::from_secs(60));
    assert!(poller.director.is_running());
    assert_eq!(director.actor_names(), vec!["poller".to_string()]);
    assert!(!director.container().is_root_singleton::<Settings>());

    stop(&director, runner).await;
}

const PULSE_PERIOD: Duration = Duration::from_millis(40);

/// A discovered component that is also a periodic actor.
struct Pulse {
    every: Every,
    inits: AtomicUsize,
    beats: AtomicUsize,
}

impl Component for Pulse {
    fn construct(_resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        Ok(Self {
            every: Every::new(PULSE_PERIOD),
            inits: AtomicUsize::new(0),
            beats: AtomicUsize::new(0),
        })
    }

    fn as_actor(this: &Arc<Self>) -> Option<Arc<dyn Actor>> {
        Some(this.clone())
    }
}

#[async_trait]
impl Actor for Pulse {
    fn name(&self) -> &str {
        "pulse"
    }

    fn should_run_now(&self, now: Instant) -> bool {
        self.every.is_due(now)
    }

    async fn init(&self, _ctx: &ActorContext) -> Result<Option<DisposeHandle>, BoxError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn run(&self, ctx: &ActorContext) -> Result<(), BoxError> {
        self.every.mark_ran(ctx.now());
        self.beats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_discovered_heartbeat_initializes_once_across_cadences() {
    let (director, log) = director();
    let module: Arc<dyn ComponentModule> = Arc::new(ComponentList::new("pulse").with::<Pulse>());

    let runner = start(&director, vec![module]);
    wait_until("director running", || director.is_running()).await;
    tokio::time::sleep(PULSE_PERIOD * 2 + Duration::from_millis(20)).await;

    let pulse = director.get_singleton::<Pulse>().unwrap();
    assert_eq!(pulse.inits.load(Ordering::SeqCst), 1);
    assert!(pulse.beats.load(Ordering::SeqCst) >= 1);
    assert_eq!(director.actor_names(), vec!["pulse".to_string()]);

    stop(&director, runner).await;
    assert!(log.errors().is_empty());
}

#[tokio::test]
async fn test_manual_singleton_wins_over_discovered() {
    let (director, _log) = director();
    director
        .register_singleton(
            Arc::new(Settings {
                period: Duration::from_millis(7),
            }),
            Vec::new(),
        )
        .unwrap();
    let module: Arc<dyn ComponentModule> =
        Arc::new(ComponentList::new("settings").with::<Settings>().with::<Poller>());

    let runner = start(&director, vec![module]);
    wait_until("director running", || director.is_running()).await;

    let settings = director.get_singleton::<Settings>().unwrap();
    assert_eq!(settings.period, Duration::from_millis(7));
    let poller = director.get_singleton::<Poller>().unwrap();
    assert!(Arc::ptr_eq(&poller.settings, &settings));

    stop(&director, runner).await;
}

struct Ping;
struct Pong;

impl Component for Ping {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::component::<Pong>()]
    }

    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        resolver.get::<Pong>()?;
        Ok(Ping)
    }
}

impl Component for Pong {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::component::<Ping>()]
    }

    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        resolver.get::<Ping>()?;
        Ok(Pong)
    }
}

#[tokio::test]
async fn test_dependency_cycle_aborts_run() {
    let (director, log) = director();
    let module: Arc<dyn ComponentModule> = Arc::new(ComponentList::new("cycle").with::<Ping>());

    let result = start(&director, vec![module]).await.unwrap();
    match result {
        Err(DirectorError::Container(ContainerError::CircularDependency { path })) => {
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert_eq!(log.count("WiringFailed"), 1);
    assert_eq!(director.phase(), Phase::Stopped);
}

struct BrokenModule;

impl ComponentModule for BrokenModule {
    fn name(&self) -> &str {
        "broken"
    }

    fn components(&self) -> Result<Vec<ComponentDescriptor>, BoxError> {
        Err("manifest unreadable".into())
    }
}

#[tokio::test]
async fn test_module_failure_aborts_run() {
    let (director, log) = director();
    let module: Arc<dyn ComponentModule> = Arc::new(BrokenModule);
    let result = start(&director, vec![module]).await.unwrap();

    match result {
        Err(DirectorError::Discovery { module, .. }) => assert_eq!(module, "broken"),
        other => panic!("expected a discovery failure, got {other:?}"),
    }
    assert_eq!(log.count("WiringFailed"), 1);
    assert!(log.flushes() >= 1);
    assert!(!director.is_running());
}

// =============================================================================
// FAULTY ACTORS
// =============================================================================

#[tokio::test]
async fn test_panicking_run_is_logged_and_runs_continue() {
    let (director, log) = director();
    let shaky = Arc::new(ScriptedActor::new("shaky").panicking_run(1));
    director.add_actor(shaky.clone());

    let runner = start(&director, Vec::new());
    wait_until("runs after the panic", || shaky.runs() >= 2).await;
    assert_eq!(log.count("ActorFailed"), 1);
    assert!(log.errors()[0].detail.contains("panicked"));
    assert!(director.is_running());

    stop(&director, runner).await;
}

#[tokio::test]
async fn test_panicking_dispose_check_does_not_stop_the_loop() {
    let (director, log) = director();
    let broken = Arc::new(ScriptedActor::new("broken").with_broken_dispose_check());
    let steady = Arc::new(ScriptedActor::new("steady").with_dispose_handle());
    director.add_actor(broken.clone());
    director.add_actor(steady.clone());

    let runner = start(&director, Vec::new());
    wait_until("both handles kept", || director.pending_dispose_count() == 2).await;
    wait_until("fault reported", || log.count("ActorFailed") >= 1).await;

    let runs = steady.runs();
    wait_until("loop still ticking", || steady.runs() >= runs + 3).await;
    assert!(director.is_running());
    assert_eq!(director.pending_dispose_count(), 2);

    stop(&director, runner).await;
    wait_until("handles disposed", || steady.disposals() == 1 && broken.disposals() == 1).await;
}

#[tokio::test]
async fn test_dispose_from_plain_thread_reaches_runtime() {
    let (director, _log) = director();
    let held = Arc::new(ScriptedActor::new("held").with_dispose_handle());
    director.add_actor(held.clone());

    let runner = start(&director, Vec::new());
    wait_until("handle kept", || director.pending_dispose_count() == 1).await;

    let remote = director.clone();
    std::thread::spawn(move || remote.dispose()).join().unwrap();
    wait_until("handle disposed", || held.disposals() == 1).await;

    stop(&director, runner).await;
    assert_eq!(held.disposals(), 1);
}
