//! Per-tick context handed to plugins

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Scratch data shared by the actions of one tick
pub type ExtraMap = serde_json::Map<String, serde_json::Value>;

/// Read-only view of the watcher at the start of a tick
#[derive(Debug, Clone, Serialize)]
pub struct WatcherSnapshot {
    pub name: String,
    /// Seconds between ticks
    pub interval: f64,
    pub tolerance: u32,
    pub attempts: u32,
    pub expression: String,
    pub started_at: DateTime<Utc>,
}

/// Context passed to every action of a tick
///
/// The watcher snapshot is immutable; `extra` is the only channel through
/// which an action hands data to later actions (and to the next tick).
#[derive(Debug, Clone)]
pub struct TickContext {
    watcher: Arc<WatcherSnapshot>,
    extra: ExtraMap,
}

impl TickContext {
    pub fn new(watcher: WatcherSnapshot, extra: ExtraMap) -> Self {
        Self {
            watcher: Arc::new(watcher),
            extra,
        }
    }

    pub fn watcher(&self) -> &WatcherSnapshot {
        &self.watcher
    }

    pub fn extra(&self) -> &ExtraMap {
        &self.extra
    }

    pub fn extra_mut(&mut self) -> &mut ExtraMap {
        &mut self.extra
    }

    /// Replace the scratch map with one produced by a completed attempt
    pub(crate) fn replace_extra(&mut self, extra: ExtraMap) {
        self.extra = extra;
    }

    pub fn into_extra(self) -> ExtraMap {
        self.extra
    }

    /// Look up a value by name: watcher fields first, then `extra.KEY`
    ///
    /// Strings are returned unquoted; other JSON values in compact form.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let w = &self.watcher;
        match key {
            "name" => Some(w.name.clone()),
            "interval" => Some(w.interval.to_string()),
            "tolerance" => Some(w.tolerance.to_string()),
            "attempts" => Some(w.attempts.to_string()),
            "expression" => Some(w.expression.clone()),
            "started_at" => Some(w.started_at.to_rfc3339()),
            _ => {
                let value = self.extra.get(key.strip_prefix("extra.")?)?;
                Some(match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            }
        }
    }
}
