//! # Heartbeat Demo
//!
//! Wires a `Clock` singleton and a `Heartbeat` component through a [`ComponentList`],
//! then lets the director tick until Ctrl-C.

use actor_director::container::{Component, ComponentList, ComponentModule, ContainerError, Dependency, Resolver};
use actor_director::framework::{Actor, ActorContext, BoxError, Every};
use actor_director::lifecycle::tracing::setup_tracing;
use actor_director::lifecycle::{Director, DirectorConfig, InterruptFlag, TracingLog};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

struct Clock {
    started: Instant,
}

impl Component for Clock {
    fn construct(_resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        Ok(Self {
            started: Instant::now(),
        })
    }
}

struct Heartbeat {
    clock: Arc<Clock>,
    every: Every,
    beats: AtomicU64,
}

impl Component for Heartbeat {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::component::<Clock>()]
    }

    fn construct(resolver: &mut Resolver<'_>) -> Result<Self, ContainerError> {
        Ok(Self {
            clock: resolver.get::<Clock>()?,
            every: Every::new(Duration::from_secs(1)),
            beats: AtomicU64::new(0),
        })
    }

    fn as_actor(this: &Arc<Self>) -> Option<Arc<dyn Actor>> {
        Some(this.clone())
    }
}

#[async_trait]
impl Actor for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn should_run_now(&self, now: Instant) -> bool {
        self.every.is_due(now)
    }

    async fn run(&self, ctx: &ActorContext) -> Result<(), BoxError> {
        self.every.mark_ran(ctx.now());
        let beat = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
        let uptime = ctx.now().saturating_duration_since(self.clock.started);
        info!(beat, uptime_ms = uptime.as_millis() as u64, "Heartbeat");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    setup_tracing();

    let config = DirectorConfig::default().with_shutdown_grace(Duration::from_secs(2));
    let director = Director::with_config(config, Arc::new(TracingLog));
    director.set_interrupt(InterruptFlag::on_ctrl_c());

    let modules: Vec<Arc<dyn ComponentModule>> =
        vec![Arc::new(ComponentList::new("demo").with::<Heartbeat>())];

    director
        .run(
            |_ctx| async {
                info!("Starting heartbeat demo, Ctrl-C to stop");
                Ok::<(), BoxError>(())
            },
            false,
            &modules,
        )
        .await?;

    director.shutdown().await;
    info!("Application completed successfully");
    Ok(())
}
