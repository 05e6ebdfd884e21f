//! Core watcher engine

use crate::error::EngineError;
use crate::executor::ActionExecutor;
use crate::model::WatcherSpec;
use crate::plugin::PluginRegistry;
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::runner::GroupRunner;
use crate::scheduler::{Scheduler, TickEvent};
use crate::watcher::Watcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Concurrent guarded plugin calls
    pub workers: usize,
    /// How long shutdown waits for in-flight plugin calls
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// The main watcher engine
pub struct WatchEngine {
    /// Successfully initialized watchers, in load order
    watchers: Vec<Watcher>,
    /// Plugin constructors
    registry: PluginRegistry,
    /// Workers for guarded plugin calls
    pool: Arc<WorkerPool>,
    /// Tick scheduler
    scheduler: Scheduler,
    /// Shutdown signal
    cancel: CancellationToken,
    config: EngineConfig,
}

impl WatchEngine {
    /// Create an engine resolving plugins through `registry`
    pub fn new(registry: PluginRegistry, config: EngineConfig) -> Self {
        Self {
            watchers: Vec::new(),
            registry,
            pool: Arc::new(WorkerPool::new(config.workers)),
            scheduler: Scheduler::new(),
            cancel: CancellationToken::new(),
            config,
        }
    }

    /// Token that stops the engine when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Subscribe to tick events
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.scheduler.subscribe()
    }

    /// Initialized watchers
    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }

    /// Build and add one watcher
    pub fn add_watcher(&mut self, spec: &WatcherSpec) -> Result<(), EngineError> {
        tracing::info!("Initializing watcher '{}'", spec.name);

        if self.watchers.iter().any(|w| w.name() == spec.name) {
            return Err(EngineError::InvalidValue("duplicate watcher name".into())
                .in_watcher(&spec.name, "name"));
        }

        let watcher = Watcher::build(spec, &self.registry)?;
        tracing::info!(
            "Initialized watcher '{}' (interval: {:?}, tolerance: {}, expression: {})",
            watcher.name(),
            watcher.interval(),
            watcher.tolerance(),
            watcher.expression()
        );
        self.watchers.push(watcher);
        Ok(())
    }

    /// Add every watcher, continuing past failures
    ///
    /// Returns the errors of the watchers that could not be initialized.
    pub fn load(&mut self, specs: &[WatcherSpec]) -> Vec<EngineError> {
        let mut errors = Vec::new();
        for spec in specs {
            if let Err(e) = self.add_watcher(spec) {
                tracing::error!("Failed to initialize watcher: {}", e);
                errors.push(e);
            }
        }
        errors
    }

    /// Run until the cancellation token fires, then drain plugin calls
    pub async fn run(mut self) -> Result<(), EngineError> {
        if self.watchers.is_empty() {
            return Err(EngineError::NoWatchers);
        }

        tracing::info!(
            "Starting scheduler with {} watcher(s) and {} worker(s)",
            self.watchers.len(),
            self.pool.size()
        );

        let runner = GroupRunner::new(ActionExecutor::new(
            Arc::clone(&self.pool),
            self.cancel.clone(),
        ));
        self.scheduler
            .run(&mut self.watchers, &runner, &self.cancel)
            .await;

        tracing::info!("Scheduler stopped, shutting down");
        self.pool.shutdown(self.config.shutdown_grace).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ActionSpec, ChainStrategy, ErrorStrategy, ExecuteFailurePolicy, GroupSpec, PluginParams,
        ScheduleMode,
    };
    use crate::plugin::Plugin;
    use crate::test_support::{HangingPlugin, SlowPlugin, StaticPlugin};
    use crate::watcher::TickOutcome;
    use tokio::time::Instant;

    fn group(name: &str, plugin: &str, timeout: f64) -> GroupSpec {
        GroupSpec {
            name: name.into(),
            chain_strategy: ChainStrategy::Continue,
            error_strategy: ErrorStrategy::Skip,
            actions: vec![ActionSpec {
                plugin: plugin.into(),
                timeout,
                retries: 0,
                delay: 1.0,
                params: PluginParams::new(),
            }],
        }
    }

    fn spec(name: &str, interval: f64, fetch: &str) -> WatcherSpec {
        WatcherSpec {
            name: name.into(),
            interval,
            tolerance: 5,
            expression: "fetch_0 != empty".into(),
            schedule: ScheduleMode::FixedDelay,
            on_execute_failure: ExecuteFailurePolicy::Reset,
            fetches: vec![group("fetch_0", fetch, 3.0)],
            executes: vec![group("execute_0", "static", 3.0)],
        }
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.register("static", |_| {
            Ok(Arc::new(StaticPlugin::ok(&["x"])) as Arc<dyn Plugin>)
        });
        registry.register("hang", |_| Ok(Arc::new(HangingPlugin) as Arc<dyn Plugin>));
        registry.register("slow", |_| {
            Ok(Arc::new(SlowPlugin::new(Duration::from_secs(2))) as Arc<dyn Plugin>)
        });
        registry
    }

    #[test]
    fn test_load_continues_past_failures() {
        let mut engine = WatchEngine::new(registry(), EngineConfig::default());
        let errors = engine.load(&[
            spec("first", 10.0, "static"),
            spec("broken", 10.0, "missing"),
            spec("first", 10.0, "static"),
            spec("second", 10.0, "static"),
        ]);

        assert_eq!(errors.len(), 2);
        assert!(errors[0].to_string().contains("'broken'"));
        assert!(errors[1].to_string().contains("duplicate watcher name"));
        let names: Vec<&str> = engine.watchers().iter().map(Watcher::name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_run_without_watchers() {
        let engine = WatchEngine::new(registry(), EngineConfig::default());
        assert!(matches!(engine.run().await, Err(EngineError::NoWatchers)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_schedule_and_shutdown() {
        let mut engine = WatchEngine::new(registry(), EngineConfig::default());
        assert!(engine.load(&[spec("fast", 10.0, "static"), spec("slow", 25.0, "hang")]).is_empty());

        let mut events = engine.subscribe();
        let cancel = engine.cancellation_token();
        let start = Instant::now();
        let handle = tokio::spawn(engine.run());

        let mut seen = Vec::new();
        while seen.len() < 5 {
            let event = events.recv().await.unwrap();
            seen.push((event.watcher, start.elapsed().as_secs(), event.outcome));
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // "fast" ticks at 0; "slow" hangs until its 3s timeout; "fast" then
        // runs 10s after its previous tick finished, "slow" 25s after 3s.
        assert_eq!(seen[0], ("fast".into(), 0, TickOutcome::Accumulated { attempts: 1 }));
        assert_eq!(seen[1], ("slow".into(), 3, TickOutcome::NotMet));
        assert_eq!(seen[2], ("fast".into(), 10, TickOutcome::Accumulated { attempts: 2 }));
        assert_eq!(seen[3], ("fast".into(), 20, TickOutcome::Accumulated { attempts: 3 }));
        assert_eq!(seen[4].0, "slow");
        assert_eq!(seen[4].1, 31);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_schedule() {
        let mut engine = WatchEngine::new(registry(), EngineConfig::default());
        let mut rate = spec("rate", 10.0, "slow");
        rate.schedule = ScheduleMode::FixedRate;
        assert!(engine.load(&[rate]).is_empty());

        let mut events = engine.subscribe();
        let cancel = engine.cancellation_token();
        let start = Instant::now();
        let handle = tokio::spawn(engine.run());

        let mut times = Vec::new();
        while times.len() < 4 {
            events.recv().await.unwrap();
            times.push(start.elapsed().as_secs());
        }
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // Due times stay on the 10s grid despite each 2s fetch
        assert_eq!(times, vec![2, 12, 22, 32]);
    }
}
