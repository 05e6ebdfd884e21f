//! Scripted plugins shared by the unit tests

use crate::context::{ExtraMap, TickContext, WatcherSnapshot};
use crate::error::PluginError;
use crate::plugin::Plugin;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::time::Instant;

pub fn context() -> TickContext {
    TickContext::new(
        WatcherSnapshot {
            name: "test".into(),
            interval: 1.0,
            tolerance: 0,
            attempts: 0,
            expression: "a == empty".into(),
            started_at: chrono::Utc::now(),
        },
        ExtraMap::new(),
    )
}

/// Always returns the same outcome
pub struct StaticPlugin {
    outcome: Result<Vec<String>, PluginError>,
    calls: AtomicU32,
}

impl StaticPlugin {
    pub fn ok(values: &[&str]) -> Self {
        Self {
            outcome: Ok(values.iter().map(|v| v.to_string()).collect()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn fail() -> Self {
        Self {
            outcome: Err(PluginError::failed("static failure")),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for StaticPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

/// Fails a fixed number of times, then succeeds
pub struct CountingPlugin {
    failures: u32,
    values: Vec<String>,
    calls: AtomicU32,
    times: Mutex<Vec<Instant>>,
}

impl CountingPlugin {
    pub fn succeed_after(failures: u32, values: &[&str]) -> Self {
        Self {
            failures,
            values: values.iter().map(|v| v.to_string()).collect(),
            calls: AtomicU32::new(0),
            times: Mutex::new(Vec::new()),
        }
    }

    pub fn always_fail() -> Self {
        Self::succeed_after(u32::MAX, &[])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.times.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for CountingPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.times.lock().unwrap().push(Instant::now());
        if n <= self.failures {
            Err(PluginError::failed(format!("failure #{n}")))
        } else {
            Ok(self.values.clone())
        }
    }
}

/// Returns one scripted outcome per call; `true` yields a value, `false` nothing
pub struct ScriptedPlugin {
    script: Mutex<VecDeque<bool>>,
}

impl ScriptedPlugin {
    pub fn new(script: &[bool]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        let hit = self.script.lock().unwrap().pop_front().unwrap_or(false);
        Ok(if hit { vec!["hit".to_string()] } else { Vec::new() })
    }
}

/// Never completes
pub struct HangingPlugin;

#[async_trait]
impl Plugin for HangingPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        std::future::pending().await
    }
}

/// Sleeps for a fixed duration, then returns one value
pub struct SlowPlugin {
    duration: std::time::Duration,
    calls: AtomicU32,
}

impl SlowPlugin {
    pub fn new(duration: std::time::Duration) -> Self {
        Self {
            duration,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Plugin for SlowPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        Ok(vec!["slow".to_string()])
    }
}

pub struct PanicPlugin;

#[async_trait]
impl Plugin for PanicPlugin {
    async fn execute(&self, _ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        panic!("boom")
    }
}

/// Stores a value in `extra` and returns it
pub struct ExtraWriter {
    key: String,
    value: String,
}

impl ExtraWriter {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[async_trait]
impl Plugin for ExtraWriter {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        ctx.extra_mut()
            .insert(self.key.clone(), self.value.clone().into());
        Ok(vec![self.value.clone()])
    }
}

/// Returns the `extra` value under `key`, or fails when absent
pub struct ExtraReader {
    key: String,
}

impl ExtraReader {
    pub fn new(key: &str) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl Plugin for ExtraReader {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        ctx.lookup(&format!("extra.{}", self.key))
            .map(|v| vec![v])
            .ok_or_else(|| PluginError::failed(format!("no extra '{}'", self.key)))
    }
}
