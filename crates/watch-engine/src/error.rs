//! Error types for the watcher engine

use std::time::Duration;
use thiserror::Error;
use watch_expression::SyntaxError;

/// Errors raised while building or starting watchers
#[derive(Error, Debug)]
pub enum EngineError {
    /// A configuration value is out of range or malformed
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Expression text failed to compile
    #[error("Invalid expression: {0}")]
    Syntax(#[from] SyntaxError),

    /// No constructor registered for the plugin identifier
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Plugin constructor rejected its parameters
    #[error("Plugin '{plugin}' failed to initialize: {source}")]
    PluginInit {
        plugin: String,
        #[source]
        source: PluginError,
    },

    /// Watcher initialization failed at a specific field
    #[error("Watcher '{watcher}' field '{field}': {source}")]
    WatcherInit {
        watcher: String,
        field: String,
        #[source]
        source: Box<EngineError>,
    },

    /// Nothing to schedule
    #[error("No watchers to run")]
    NoWatchers,
}

impl EngineError {
    /// Attach watcher name and field path to an error
    pub fn in_watcher(self, watcher: &str, field: impl Into<String>) -> Self {
        Self::WatcherInit {
            watcher: watcher.to_string(),
            field: field.into(),
            source: Box::new(self),
        }
    }
}

/// Errors raised by plugin construction or execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Required parameter not supplied
    #[error("Missing parameter: {0}")]
    MissingParam(String),

    /// Parameter present but unusable
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    /// Execution failed
    #[error("{0}")]
    Failed(String),
}

impl PluginError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_param(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self::Failed(format!("IO error: {e}"))
    }
}

/// Terminal failure of one guarded action invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The plugin returned an error
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// The plugin did not finish within its timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The plugin panicked
    #[error("Plugin panicked: {0}")]
    Panicked(String),

    /// Engine shutdown interrupted the action
    #[error("Cancelled")]
    Cancelled,
}
