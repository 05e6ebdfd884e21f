//! Watcher engine for DDNS Guard
//!
//! Periodically samples state through fetch plugins, evaluates a set-algebra
//! expression over the results, and runs execute plugins once the condition
//! has held for more than `tolerance` consecutive ticks.

pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod plugin;
pub mod pool;
pub mod runner;
pub mod scheduler;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use context::{ExtraMap, TickContext, WatcherSnapshot};
pub use engine::{EngineConfig, WatchEngine};
pub use error::{ActionError, EngineError, PluginError};
pub use executor::{ActionExecutor, ActionResult, GuardedAction};
pub use model::*;
pub use plugin::{Plugin, PluginConstructor, PluginRegistry};
pub use pool::WorkerPool;
pub use runner::{Group, GroupReport, GroupRunner, GroupsReport};
pub use scheduler::{Scheduler, TickEvent};
pub use watcher::{TickOutcome, Watcher, WatcherState};

/// Re-exported so plugin crates do not need a direct dependency
pub use async_trait::async_trait;
