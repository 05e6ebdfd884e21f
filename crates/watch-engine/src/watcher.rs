//! Per-watcher tick state machine

use crate::context::{ExtraMap, TickContext, WatcherSnapshot};
use crate::error::EngineError;
use crate::model::{
    positive_secs, ExecuteFailurePolicy, GroupKind, GroupSpec, ScheduleMode, WatcherSpec,
};
use crate::plugin::PluginRegistry;
use crate::runner::{Group, GroupRunner};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use watch_expression::ParsedExpression;

/// What a tick decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TickOutcome {
    /// A fetch group's error strategy ended the tick before evaluation
    FetchAborted,
    /// The condition was false; attempts reset
    NotMet,
    /// The condition held but tolerance is not yet exhausted
    Accumulated { attempts: u32 },
    /// Execute groups ran
    Executed { failed: bool },
    /// Shutdown interrupted the fetch pass; state left as it was
    Cancelled,
    /// The tick panicked; attempts reset
    Panicked,
}

/// Stand-in deadline for intervals too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Mutable state carried between ticks
#[derive(Debug, Clone, Default)]
pub struct WatcherState {
    /// Consecutive true evaluations since the last reset
    pub attempts: u32,
    /// `extra` map left by the previous tick
    pub extra: ExtraMap,
}

/// One scheduled watcher with resolved plugins and compiled expression
#[derive(Debug)]
pub struct Watcher {
    name: String,
    interval: Duration,
    interval_secs: f64,
    tolerance: u32,
    expression: ParsedExpression,
    schedule: ScheduleMode,
    on_execute_failure: ExecuteFailurePolicy,
    fetches: Vec<Group>,
    executes: Vec<Group>,
    state: WatcherState,
    /// Panic at the start of a tick taken with this many attempts
    #[cfg(test)]
    pub(crate) fault_at_attempts: Option<u32>,
}

impl Watcher {
    /// Validate `spec`, compile its expression, and resolve its plugins
    pub fn build(spec: &WatcherSpec, registry: &PluginRegistry) -> Result<Self, EngineError> {
        spec.validate()?;

        let interval =
            positive_secs(spec.interval).map_err(|e| e.in_watcher(&spec.name, "interval"))?;
        let expression = watch_expression::compile(&spec.expression)
            .map_err(|e| EngineError::from(e).in_watcher(&spec.name, "expression"))?;

        let resolve = |kind: GroupKind, specs: &[GroupSpec]| {
            specs
                .iter()
                .enumerate()
                .map(|(i, group)| {
                    Group::from_spec(group, registry).map_err(|(field, e)| {
                        e.in_watcher(&spec.name, format!("{}[{i}].{field}", kind.as_str()))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        let fetches = resolve(GroupKind::Fetch, &spec.fetches)?;
        let executes = resolve(GroupKind::Execute, &spec.executes)?;

        Ok(Self {
            name: spec.name.clone(),
            interval,
            interval_secs: spec.interval,
            tolerance: spec.tolerance,
            expression,
            schedule: spec.schedule,
            on_execute_failure: spec.on_execute_failure,
            fetches,
            executes,
            state: WatcherState::default(),
            #[cfg(test)]
            fault_at_attempts: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    pub fn expression(&self) -> &ParsedExpression {
        &self.expression
    }

    pub fn state(&self) -> &WatcherState {
        &self.state
    }

    /// Drop accumulated attempts, e.g. after a faulted tick
    pub fn reset(&mut self) {
        self.state.attempts = 0;
    }

    /// Due time of the tick after one that was due at `due` and finished at `finished`
    ///
    /// Intervals past what the clock can represent saturate to a far-future
    /// deadline.
    pub fn next_due(&self, due: Instant, finished: Instant) -> Instant {
        let after = |base: Instant| {
            base.checked_add(self.interval)
                .or_else(|| base.checked_add(FAR_FUTURE))
                .unwrap_or(base)
        };
        match self.schedule {
            ScheduleMode::FixedDelay => after(finished),
            ScheduleMode::FixedRate => after(due).max(finished),
        }
    }

    fn snapshot(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            name: self.name.clone(),
            interval: self.interval_secs,
            tolerance: self.tolerance,
            attempts: self.state.attempts,
            expression: self.expression.source().to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Run one tick: fetch, evaluate, then reset, accumulate, or execute
    pub async fn tick(&mut self, runner: &GroupRunner) -> TickOutcome {
        tracing::info!("Starting tick for watcher '{}'", self.name);

        // The stored map stays intact until the tick completes
        let mut ctx = TickContext::new(self.snapshot(), self.state.extra.clone());

        #[cfg(test)]
        if self.fault_at_attempts == Some(self.state.attempts) {
            panic!("injected fault in watcher '{}'", self.name);
        }

        let fetched = runner.run(GroupKind::Fetch, &self.fetches, &mut ctx).await;

        if runner.is_cancelled() {
            tracing::info!(
                "Shutdown interrupted fetches for watcher '{}', skipping evaluation",
                self.name
            );
            return TickOutcome::Cancelled;
        }

        let outcome = if fetched.reset {
            self.state.attempts = 0;
            TickOutcome::FetchAborted
        } else {
            let variables = fetched.variables();
            let met = self.expression.evaluate(&variables);
            tracing::debug!(
                "Expression '{}' over {:?} evaluated to {}",
                self.expression,
                variables,
                met
            );

            if !met {
                self.state.attempts = 0;
                TickOutcome::NotMet
            } else if self.state.attempts < self.tolerance {
                self.state.attempts += 1;
                tracing::info!(
                    "Condition met for watcher '{}' ({} of {} tolerated)",
                    self.name,
                    self.state.attempts,
                    self.tolerance
                );
                TickOutcome::Accumulated {
                    attempts: self.state.attempts,
                }
            } else {
                tracing::info!("Condition persisted for watcher '{}', executing", self.name);
                let executed = runner.run(GroupKind::Execute, &self.executes, &mut ctx).await;
                let failed = executed.any_failed();

                self.state.attempts = match self.on_execute_failure {
                    ExecuteFailurePolicy::Retry if failed && !executed.reset => self.tolerance,
                    _ => 0,
                };
                if failed {
                    tracing::warn!(
                        "Execute pass for watcher '{}' had failures (attempts now {})",
                        self.name,
                        self.state.attempts
                    );
                }
                TickOutcome::Executed { failed }
            }
        };

        self.state.extra = ctx.into_extra();
        tracing::info!(
            "Finished tick for watcher '{}': {:?}",
            self.name,
            outcome
        );
        outcome
    }
}
