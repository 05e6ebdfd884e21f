//! Retry and timeout enforcement around plugin calls

use crate::context::TickContext;
use crate::error::{ActionError, EngineError};
use crate::model::{positive_secs, ActionSpec};
use crate::plugin::{Plugin, PluginRegistry};
use crate::pool::WorkerPool;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A plugin instance bound to its retry/timeout policy
#[derive(Clone)]
pub struct GuardedAction {
    plugin_id: String,
    plugin: Arc<dyn Plugin>,
    timeout: Duration,
    retries: u32,
    delay: Duration,
}

impl GuardedAction {
    pub fn new(
        plugin_id: impl Into<String>,
        plugin: Arc<dyn Plugin>,
        timeout: Duration,
        retries: u32,
        delay: Duration,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            plugin,
            timeout,
            retries,
            delay,
        }
    }

    /// Resolve the spec's plugin through the registry
    ///
    /// Returned errors carry no field path; callers add it.
    pub fn from_spec(spec: &ActionSpec, registry: &PluginRegistry) -> Result<Self, EngineError> {
        let timeout = positive_secs(spec.timeout)?;
        let delay = positive_secs(spec.delay)?;
        let plugin = registry.create(&spec.plugin, &spec.params)?;
        Ok(Self::new(&spec.plugin, plugin, timeout, spec.retries, delay))
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }
}

impl std::fmt::Debug for GuardedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedAction")
            .field("plugin", &self.plugin_id)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("delay", &self.delay)
            .finish()
    }
}

/// Outcome of one guarded action: values or the last failure, never both
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub plugin: String,
    pub outcome: Result<Vec<String>, ActionError>,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl ActionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Result values; empty on failure
    pub fn values(&self) -> &[String] {
        self.outcome.as_deref().unwrap_or(&[])
    }

    pub fn error(&self) -> Option<&ActionError> {
        self.outcome.as_ref().err()
    }
}

/// Runs guarded actions on the worker pool
#[derive(Debug, Clone)]
pub struct ActionExecutor {
    pool: Arc<WorkerPool>,
    cancel: CancellationToken,
}

impl ActionExecutor {
    pub fn new(pool: Arc<WorkerPool>, cancel: CancellationToken) -> Self {
        Self { pool, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `action` with up to `retries + 1` attempts
    ///
    /// Never fails: the terminal outcome is recorded on the result.
    pub async fn run(&self, action: &GuardedAction, ctx: &mut TickContext) -> ActionResult {
        let total = action.retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                "Executing plugin '{}' (attempt {}/{})",
                action.plugin_id,
                attempt,
                total
            );

            let error = match self.attempt(action, ctx).await {
                Ok(values) => {
                    tracing::debug!("Plugin '{}' returned {:?}", action.plugin_id, values);
                    return ActionResult {
                        plugin: action.plugin_id.clone(),
                        outcome: Ok(values),
                        attempts: attempt,
                    };
                }
                Err(e) => e,
            };

            if error == ActionError::Cancelled || attempt >= total {
                tracing::warn!(
                    "Plugin '{}' failed after {} attempt(s): {}",
                    action.plugin_id,
                    attempt,
                    error
                );
                return ActionResult {
                    plugin: action.plugin_id.clone(),
                    outcome: Err(error),
                    attempts: attempt,
                };
            }

            tracing::debug!(
                "Plugin '{}' failed: {}; retrying in {:?}",
                action.plugin_id,
                error,
                action.delay
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    return ActionResult {
                        plugin: action.plugin_id.clone(),
                        outcome: Err(ActionError::Cancelled),
                        attempts: attempt,
                    };
                }
                () = tokio::time::sleep(action.delay) => {}
            }
        }
    }

    /// One bounded attempt
    ///
    /// The timeout covers the wait for a worker slot; a call that never got
    /// one is never started. The call runs on a copy of the context; its
    /// `extra` replaces the caller's only if the call completed. A started
    /// call that times out keeps running in the background and its writes
    /// are discarded.
    async fn attempt(
        &self,
        action: &GuardedAction,
        ctx: &mut TickContext,
    ) -> Result<Vec<String>, ActionError> {
        let plugin = Arc::clone(&action.plugin);
        let mut scratch = ctx.clone();
        let pool = &self.pool;
        let call = async move {
            let handle = pool
                .spawn(async move {
                    let result = plugin.execute(&mut scratch).await;
                    (result, scratch)
                })
                .await;
            handle.await
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ActionError::Cancelled),
            joined = tokio::time::timeout(action.timeout, call) => match joined {
                Err(_) => Err(ActionError::Timeout(action.timeout)),
                Ok(Err(join_err)) if join_err.is_panic() => {
                    Err(ActionError::Panicked(panic_message(join_err.into_panic())))
                }
                Ok(Err(join_err)) => Err(ActionError::Panicked(join_err.to_string())),
                Ok(Ok((result, scratch))) => {
                    ctx.replace_extra(scratch.into_extra());
                    result.map_err(ActionError::from)
                }
            },
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::test_support::{
        context, CountingPlugin, ExtraWriter, HangingPlugin, PanicPlugin, SlowPlugin,
    };
    use tokio::time::Instant;

    fn guarded(plugin: Arc<dyn Plugin>, timeout: u64, retries: u32, delay: u64) -> GuardedAction {
        GuardedAction::new(
            "test",
            plugin,
            Duration::from_secs(timeout),
            retries,
            Duration::from_secs(delay),
        )
    }

    fn executor() -> ActionExecutor {
        ActionExecutor::new(Arc::new(WorkerPool::new(1)), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let plugin = Arc::new(CountingPlugin::succeed_after(0, &["1.2.3.4"]));
        let action = guarded(plugin.clone(), 5, 3, 1);
        let result = executor().run(&action, &mut context()).await;
        assert_eq!(result.outcome, Ok(vec!["1.2.3.4".to_string()]));
        assert_eq!(result.attempts, 1);
        assert_eq!(plugin.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_with_delay() {
        let plugin = Arc::new(CountingPlugin::always_fail());
        let action = guarded(plugin.clone(), 5, 2, 3);
        let result = executor().run(&action, &mut context()).await;

        assert_eq!(plugin.calls(), 3);
        assert_eq!(result.attempts, 3);
        assert_eq!(
            result.outcome,
            Err(ActionError::Plugin(PluginError::failed("failure #3")))
        );

        let times = plugin.call_times();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_retry() {
        let plugin = Arc::new(CountingPlugin::succeed_after(2, &["ok"]));
        let action = guarded(plugin.clone(), 5, 5, 1);
        let result = executor().run(&action, &mut context()).await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(plugin.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_wait() {
        let action = guarded(Arc::new(HangingPlugin), 7, 0, 1);
        let start = Instant::now();
        let result = executor().run(&action, &mut context()).await;
        let elapsed = start.elapsed();

        assert_eq!(result.outcome, Err(ActionError::Timeout(Duration::from_secs(7))));
        assert!(elapsed >= Duration::from_secs(7));
        assert!(elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let action = guarded(Arc::new(HangingPlugin), 2, 1, 1);
        let start = Instant::now();
        // Two workers so the abandoned first call does not block the retry
        let executor = ActionExecutor::new(Arc::new(WorkerPool::new(2)), CancellationToken::new());
        let result = executor.run(&action, &mut context()).await;
        assert_eq!(result.attempts, 2);
        assert!(matches!(result.outcome, Err(ActionError::Timeout(_))));
        // 2s + 1s delay + 2s
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_while_queued_never_runs() {
        let executor = executor();
        let slow = Arc::new(SlowPlugin::new(Duration::from_secs(10)));
        let result = executor.run(&guarded(slow.clone(), 2, 0, 1), &mut context()).await;
        assert!(matches!(result.outcome, Err(ActionError::Timeout(_))));
        assert_eq!(slow.calls(), 1);

        // The only worker is still busy with the abandoned slow call
        let queued = Arc::new(CountingPlugin::succeed_after(0, &["x"]));
        let result = executor.run(&guarded(queued.clone(), 1, 1, 1), &mut context()).await;
        assert_eq!(result.outcome, Err(ActionError::Timeout(Duration::from_secs(1))));
        assert_eq!(result.attempts, 2);
        assert_eq!(queued.calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(queued.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_captured() {
        let action = guarded(Arc::new(PanicPlugin), 5, 0, 1);
        let result = executor().run(&action, &mut context()).await;
        assert_eq!(result.outcome, Err(ActionError::Panicked("boom".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extra_written_back() {
        let action = guarded(Arc::new(ExtraWriter::new("ip", "10.0.0.1")), 5, 0, 1);
        let mut ctx = context();
        let result = executor().run(&action, &mut ctx).await;
        assert!(result.is_success());
        assert_eq!(ctx.extra()["ip"], "10.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_retry_delay() {
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(Arc::new(WorkerPool::new(1)), cancel.clone());
        let plugin = Arc::new(CountingPlugin::always_fail());
        let action = guarded(plugin.clone(), 5, 10, 60);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let result = executor.run(&action, &mut context()).await;
        canceller.await.unwrap();

        assert_eq!(result.outcome, Err(ActionError::Cancelled));
        assert_eq!(plugin.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(31));
    }
}
