//! Group execution with chain and error strategies

use crate::context::TickContext;
use crate::error::EngineError;
use crate::executor::{ActionExecutor, ActionResult, GuardedAction};
use crate::model::{ChainStrategy, ErrorStrategy, GroupKind, GroupSpec};
use crate::plugin::PluginRegistry;
use std::collections::HashMap;

/// A group with its plugins resolved
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub chain_strategy: ChainStrategy,
    pub error_strategy: ErrorStrategy,
    pub actions: Vec<GuardedAction>,
}

impl Group {
    /// Resolve every action of `spec`
    ///
    /// On failure returns the field path (relative to the group) with the error.
    pub fn from_spec(
        spec: &GroupSpec,
        registry: &PluginRegistry,
    ) -> Result<Self, (String, EngineError)> {
        let actions = spec
            .actions
            .iter()
            .enumerate()
            .map(|(i, action)| {
                GuardedAction::from_spec(action, registry).map_err(|e| (format!("actions[{i}]"), e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: spec.name.clone(),
            chain_strategy: spec.chain_strategy,
            error_strategy: spec.error_strategy,
            actions,
        })
    }
}

/// Results of one group run
#[derive(Debug, Clone)]
pub struct GroupReport {
    pub name: String,
    /// One entry per action actually invoked
    pub results: Vec<ActionResult>,
}

impl GroupReport {
    pub fn failed(&self) -> bool {
        self.results.iter().any(|r| !r.is_success())
    }

    /// Values of all actions, concatenated in action order
    pub fn values(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.values().iter().cloned())
            .collect()
    }
}

/// Results of running a list of groups
#[derive(Debug, Clone, Default)]
pub struct GroupsReport {
    pub groups: Vec<GroupReport>,
    /// A failed group's error strategy abandoned the rest of the tick
    pub reset: bool,
}

impl GroupsReport {
    pub fn any_failed(&self) -> bool {
        self.groups.iter().any(GroupReport::failed)
    }

    /// Expression variables: group name to concatenated values
    pub fn variables(&self) -> HashMap<String, Vec<String>> {
        self.groups
            .iter()
            .map(|g| (g.name.clone(), g.values()))
            .collect()
    }
}

/// Runs groups of guarded actions
#[derive(Debug, Clone)]
pub struct GroupRunner {
    executor: ActionExecutor,
}

impl GroupRunner {
    pub fn new(executor: ActionExecutor) -> Self {
        Self { executor }
    }

    /// Shutdown was requested; groups run from now on are skipped
    pub fn is_cancelled(&self) -> bool {
        self.executor.is_cancelled()
    }

    /// Run `groups` in order, stopping early when an error strategy resets
    pub async fn run(
        &self,
        kind: GroupKind,
        groups: &[Group],
        ctx: &mut TickContext,
    ) -> GroupsReport {
        let mut report = GroupsReport::default();

        for group in groups {
            if self.executor.is_cancelled() {
                tracing::debug!("Shutdown requested, skipping remaining {}", kind.as_str());
                break;
            }

            let group_report = self.run_group(group, ctx).await;
            let failed = group_report.failed();
            report.groups.push(group_report);

            if failed && group.error_strategy.resets(kind) {
                tracing::warn!(
                    "Group '{}' failed with error strategy {:?}, abandoning remaining {}",
                    group.name,
                    group.error_strategy,
                    kind.as_str()
                );
                report.reset = true;
                break;
            }
            if failed {
                tracing::info!("Group '{}' had failures, continuing", group.name);
            }
        }

        report
    }

    async fn run_group(&self, group: &Group, ctx: &mut TickContext) -> GroupReport {
        let mut results = Vec::with_capacity(group.actions.len());

        for (index, action) in group.actions.iter().enumerate() {
            let result = self.executor.run(action, ctx).await;
            let succeeded = result.is_success();
            results.push(result);

            if !group.chain_strategy.should_continue(succeeded) {
                let skipped = group.actions.len() - index - 1;
                if skipped > 0 {
                    tracing::debug!(
                        "Group '{}' stopped by {:?} after action {}, skipping {}",
                        group.name,
                        group.chain_strategy,
                        index,
                        skipped
                    );
                }
                break;
            }
        }

        GroupReport {
            name: group.name.clone(),
            results,
        }
    }
}
