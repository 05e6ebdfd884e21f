//! Data models for watchers, groups, and actions

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Opaque plugin-specific parameters, passed through unchanged
pub type PluginParams = serde_json::Map<String, serde_json::Value>;

/// A complete watcher definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSpec {
    /// Unique watcher name
    pub name: String,
    /// Seconds between ticks
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Consecutive true evaluations tolerated before executing
    #[serde(default)]
    pub tolerance: u32,
    /// Set-algebra condition over fetch group results
    #[serde(default = "default_expression")]
    pub expression: String,
    /// How the next tick is timed
    #[serde(default)]
    pub schedule: ScheduleMode,
    /// What happens to the attempt counter when an execute pass fails
    #[serde(default)]
    pub on_execute_failure: ExecuteFailurePolicy,
    /// Groups whose results feed the expression
    pub fetches: Vec<GroupSpec>,
    /// Groups run once the condition persists past tolerance
    pub executes: Vec<GroupSpec>,
}

/// A named, ordered collection of actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group name; fetch group names are expression variables
    pub name: String,
    /// Continuation rule between actions of this group
    #[serde(default)]
    pub chain_strategy: ChainStrategy,
    /// Continuation rule for the remaining groups when this one fails
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    /// Actions in invocation order
    pub actions: Vec<ActionSpec>,
}

/// One configured plugin invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Plugin identifier resolved through the registry
    pub plugin: String,
    /// Hard bound per attempt, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Additional attempts after a failure
    #[serde(default)]
    pub retries: u32,
    /// Pause between attempts, in seconds
    #[serde(default = "default_delay")]
    pub delay: f64,
    /// Everything else is handed to the plugin constructor
    #[serde(flatten)]
    pub params: PluginParams,
}

/// Whether to continue to the next action in a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStrategy {
    /// Always run every action
    #[default]
    Continue,
    /// Stop after the first action that succeeds
    SuccessStop,
    /// Stop after the first action that fails
    FailureStop,
}

impl ChainStrategy {
    /// Decide whether the next action runs given the outcome of the current one
    #[must_use]
    pub fn should_continue(self, succeeded: bool) -> bool {
        match self {
            Self::Continue => true,
            Self::SuccessStop => !succeeded,
            Self::FailureStop => succeeded,
        }
    }
}

/// What a failed group does to the rest of the tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Ignore the failure
    #[default]
    Skip,
    /// Abandon remaining groups and reset attempts
    Reset,
    /// Reset only when the group is a fetch group
    FetchReset,
    /// Reset only when the group is an execute group
    ExecuteReset,
}

impl ErrorStrategy {
    /// Whether a failure in a group of `kind` triggers a reset
    #[must_use]
    pub fn resets(self, kind: GroupKind) -> bool {
        match self {
            Self::Skip => false,
            Self::Reset => true,
            Self::FetchReset => kind == GroupKind::Fetch,
            Self::ExecuteReset => kind == GroupKind::Execute,
        }
    }
}

/// Which list a group belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Fetch,
    Execute,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetches",
            Self::Execute => "executes",
        }
    }
}

/// Timing of the tick after the current one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// `interval` after the tick finishes; drifts under slow ticks
    #[default]
    FixedDelay,
    /// `interval` after the previous due time; missed ticks are not replayed
    FixedRate,
}

/// Attempt counter handling after an execute pass with failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteFailurePolicy {
    /// Reset attempts regardless of outcome
    #[default]
    Reset,
    /// Keep attempts at tolerance so the next true tick executes again
    Retry,
}

fn default_interval() -> f64 {
    120.0
}

fn default_expression() -> String {
    "fetch_0 & fetch_1 == empty".to_string()
}

fn default_timeout() -> f64 {
    60.0
}

fn default_delay() -> f64 {
    1.0
}

/// Convert a positive number of seconds into a duration
pub(crate) fn positive_secs(value: f64) -> Result<Duration, EngineError> {
    if value.is_nan() || value <= 0.0 {
        return Err(EngineError::InvalidValue(format!(
            "must be greater than 0, got {value}"
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| EngineError::InvalidValue(format!("{value}: {e}")))
}

impl WatcherSpec {
    /// Check structural and numeric invariants
    ///
    /// Errors name the watcher and the offending field.
    pub fn validate(&self) -> Result<(), EngineError> {
        positive_secs(self.interval).map_err(|e| e.in_watcher(&self.name, "interval"))?;

        for (kind, groups) in [
            (GroupKind::Fetch, &self.fetches),
            (GroupKind::Execute, &self.executes),
        ] {
            if groups.is_empty() {
                return Err(
                    EngineError::InvalidValue("at least one group is required".into())
                        .in_watcher(&self.name, kind.as_str()),
                );
            }

            let mut seen = HashSet::new();
            for (gi, group) in groups.iter().enumerate() {
                let path = format!("{}[{gi}]", kind.as_str());
                if !seen.insert(group.name.as_str()) {
                    return Err(EngineError::InvalidValue(format!(
                        "duplicate group name '{}'",
                        group.name
                    ))
                    .in_watcher(&self.name, format!("{path}.name")));
                }
                group.validate().map_err(|(field, e)| {
                    e.in_watcher(&self.name, format!("{path}.{field}"))
                })?;
            }
        }

        Ok(())
    }
}

impl GroupSpec {
    fn validate(&self) -> Result<(), (String, EngineError)> {
        if self.actions.is_empty() {
            return Err((
                "actions".into(),
                EngineError::InvalidValue("at least one action is required".into()),
            ));
        }
        for (ai, action) in self.actions.iter().enumerate() {
            positive_secs(action.timeout).map_err(|e| (format!("actions[{ai}].timeout"), e))?;
            positive_secs(action.delay).map_err(|e| (format!("actions[{ai}].delay"), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> ActionSpec {
        ActionSpec {
            plugin: "echo".into(),
            timeout: 1.0,
            retries: 0,
            delay: 1.0,
            params: PluginParams::new(),
        }
    }

    fn group(name: &str) -> GroupSpec {
        GroupSpec {
            name: name.into(),
            chain_strategy: ChainStrategy::Continue,
            error_strategy: ErrorStrategy::Skip,
            actions: vec![action()],
        }
    }

    fn watcher() -> WatcherSpec {
        WatcherSpec {
            name: "home".into(),
            interval: 10.0,
            tolerance: 0,
            expression: "fetch_0 == empty".into(),
            schedule: ScheduleMode::FixedDelay,
            on_execute_failure: ExecuteFailurePolicy::Reset,
            fetches: vec![group("fetch_0")],
            executes: vec![group("execute_0")],
        }
    }

    #[test]
    fn test_chain_strategy() {
        assert!(ChainStrategy::Continue.should_continue(true));
        assert!(ChainStrategy::Continue.should_continue(false));
        assert!(!ChainStrategy::SuccessStop.should_continue(true));
        assert!(ChainStrategy::SuccessStop.should_continue(false));
        assert!(ChainStrategy::FailureStop.should_continue(true));
        assert!(!ChainStrategy::FailureStop.should_continue(false));
    }

    #[test]
    fn test_error_strategy() {
        assert!(!ErrorStrategy::Skip.resets(GroupKind::Fetch));
        assert!(ErrorStrategy::Reset.resets(GroupKind::Execute));
        assert!(ErrorStrategy::FetchReset.resets(GroupKind::Fetch));
        assert!(!ErrorStrategy::FetchReset.resets(GroupKind::Execute));
        assert!(ErrorStrategy::ExecuteReset.resets(GroupKind::Execute));
        assert!(!ErrorStrategy::ExecuteReset.resets(GroupKind::Fetch));
    }

    #[test]
    fn test_valid_watcher() {
        assert!(watcher().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut spec = watcher();
        spec.interval = 0.0;
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("'home'"), "{err}");
        assert!(err.contains("'interval'"), "{err}");
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut spec = watcher();
        spec.fetches.push(group("fetch_0"));
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("fetches[1].name"), "{err}");
    }

    #[test]
    fn test_empty_actions_rejected() {
        let mut spec = watcher();
        spec.executes[0].actions.clear();
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("executes[0].actions"), "{err}");
    }

    #[test]
    fn test_nan_delay_rejected() {
        let mut spec = watcher();
        spec.fetches[0].actions[0].delay = f64::NAN;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults_and_params() {
        let json = serde_json::json!({
            "name": "home",
            "fetches": [{"name": "fetch_0", "actions": [{"plugin": "resolve", "domain": "example.com"}]}],
            "executes": [{"name": "execute_0", "chain_strategy": "failure_stop",
                          "error_strategy": "execute_reset",
                          "actions": [{"plugin": "echo", "retries": 2}]}]
        });
        let spec: WatcherSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.interval, 120.0);
        assert_eq!(spec.tolerance, 0);
        assert_eq!(spec.expression, "fetch_0 & fetch_1 == empty");
        assert_eq!(spec.schedule, ScheduleMode::FixedDelay);
        let fetch = &spec.fetches[0].actions[0];
        assert_eq!(fetch.timeout, 60.0);
        assert_eq!(fetch.delay, 1.0);
        assert_eq!(fetch.params["domain"], "example.com");
        assert!(!fetch.params.contains_key("plugin"));
        assert_eq!(spec.executes[0].chain_strategy, ChainStrategy::FailureStop);
        assert_eq!(spec.executes[0].error_strategy, ErrorStrategy::ExecuteReset);
        assert_eq!(spec.executes[0].actions[0].retries, 2);
    }
}
