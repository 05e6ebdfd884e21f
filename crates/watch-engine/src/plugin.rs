//! Plugin boundary and registry
//!
//! Plugins are resolved through an explicit registry of constructors that
//! is populated at startup.

use crate::context::TickContext;
use crate::error::{EngineError, PluginError};
use crate::model::PluginParams;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// A fetch or execute implementation
///
/// Implementations may fail arbitrarily; retries and timeouts are applied
/// by the engine around every call.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Run once and return the result sequence
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError>;
}

/// Builds a plugin instance from its configured parameters
pub type PluginConstructor =
    Arc<dyn Fn(&PluginParams) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// Registry mapping plugin identifiers to constructors
#[derive(Default, Clone)]
pub struct PluginRegistry {
    constructors: Arc<DashMap<String, PluginConstructor>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor, replacing any previous one for `id`
    pub fn register<F>(&self, id: impl Into<String>, constructor: F)
    where
        F: Fn(&PluginParams) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        let id = id.into();
        tracing::debug!("Registered plugin '{}'", id);
        self.constructors.insert(id, Arc::new(constructor));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Instantiate the plugin `id` with `params`
    pub fn create(&self, id: &str, params: &PluginParams) -> Result<Arc<dyn Plugin>, EngineError> {
        // Clone the constructor out so the map shard is not held while it runs
        let constructor = self
            .constructors
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| EngineError::PluginNotFound(id.to_string()))?;

        constructor(params).map_err(|source| EngineError::PluginInit {
            plugin: id.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.ids())
            .finish()
    }
}
