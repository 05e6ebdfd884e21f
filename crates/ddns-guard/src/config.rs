//! TOML configuration file

use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use watch_engine::{EngineConfig, EngineError, WatcherSpec};
use watch_expression::EMPTY_KEYWORD;

const WATCHER_NAME: &str = r"^[A-Za-z0-9_-]{3,15}$";

/// Top-level configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    /// Log outputs; every event goes to each output whose filters accept it
    #[serde(default = "default_logs")]
    pub logs: Vec<LogOutput>,
    #[serde(default)]
    pub watchers: Vec<WatcherSpec>,
}

fn default_logs() -> Vec<LogOutput> {
    vec![LogOutput::default()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            logs: default_logs(),
            watchers: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds to wait for in-flight plugin calls on shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: f64,
}

fn default_workers() -> usize {
    4
}

fn default_shutdown_grace() -> f64 {
    5.0
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where an output writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Warnings and errors to stderr, everything else to stdout
    Std,
    Stdout,
    Stderr,
    /// Appended to this file
    File(PathBuf),
}

/// One `[[logs]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogOutput {
    /// `std`, `stdout`, `stderr` (any case) or a file path
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Most verbose level written
    #[serde(default = "default_level")]
    pub level: String,
    /// Line template for text output
    #[serde(default = "default_text_format")]
    pub text_format: String,
    /// strftime format for timestamps
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Only these exact levels, when set
    #[serde(default)]
    pub level_filters: Vec<String>,
    /// Only events inside these watchers' ticks, when set
    #[serde(default)]
    pub name_filters: Vec<String>,
    /// Only messages matching one of these regexes, when set
    #[serde(default)]
    pub msg_filters: Vec<String>,
}

fn default_output() -> String {
    "std".to_string()
}

fn default_level() -> String {
    "warn".to_string()
}

fn default_text_format() -> String {
    "{levelname}: {message}".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

impl Default for LogOutput {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: LogFormat::default(),
            level: default_level(),
            text_format: default_text_format(),
            date_format: default_date_format(),
            level_filters: Vec::new(),
            name_filters: Vec::new(),
            msg_filters: Vec::new(),
        }
    }
}

impl LogOutput {
    pub fn target(&self) -> LogTarget {
        match self.output.to_lowercase().as_str() {
            "std" => LogTarget::Std,
            "stdout" => LogTarget::Stdout,
            "stderr" => LogTarget::Stderr,
            _ => LogTarget::File(PathBuf::from(&self.output)),
        }
    }

    pub fn level_filter(&self) -> anyhow::Result<LevelFilter> {
        self.level
            .parse()
            .map_err(|_| anyhow::anyhow!("level: unknown level '{}'", self.level))
    }

    pub fn levels(&self) -> anyhow::Result<Vec<Level>> {
        self.level_filters
            .iter()
            .map(|level| {
                level
                    .parse()
                    .map_err(|_| anyhow::anyhow!("level_filters: unknown level '{level}'"))
            })
            .collect()
    }

    pub fn messages(&self) -> anyhow::Result<Vec<Regex>> {
        self.msg_filters
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("msg_filters: bad regex '{pattern}'"))
            })
            .collect()
    }

    /// Check every field without opening the output
    pub fn validate(&self) -> anyhow::Result<()> {
        self.level_filter()?;
        self.levels()?;
        self.messages()?;

        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            anyhow::bail!("date_format: invalid format '{}'", self.date_format);
        }

        let watcher = Regex::new(WATCHER_NAME)?;
        if let Some(name) = self.name_filters.iter().find(|n| !watcher.is_match(n)) {
            anyhow::bail!("name_filters: '{name}' must match {WATCHER_NAME}");
        }
        Ok(())
    }
}

impl Config {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.logs.is_empty() {
            anyhow::bail!("logs must contain at least one output");
        }
        for (i, log) in config.logs.iter().enumerate() {
            log.validate().with_context(|| format!("logs[{i}]"))?;
        }
        config.engine_config()?;
        Ok(config)
    }

    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        if self.engine.workers == 0 {
            anyhow::bail!("engine.workers must be at least 1");
        }
        let shutdown_grace = Duration::try_from_secs_f64(self.engine.shutdown_grace)
            .map_err(|e| anyhow::anyhow!("engine.shutdown_grace: {e}"))?;
        Ok(EngineConfig {
            workers: self.engine.workers,
            shutdown_grace,
        })
    }
}

/// Naming rules the engine does not enforce itself
pub struct NameRules {
    watcher: Regex,
    group: Regex,
    plugin: Regex,
}

impl NameRules {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            watcher: Regex::new(WATCHER_NAME)?,
            group: Regex::new(r"^[A-Za-z0-9_]{1,31}$")?,
            plugin: Regex::new(r"^[A-Za-z0-9_-]{3,15}$")?,
        })
    }

    /// Check names in `spec`; on success returns warnings worth logging
    pub fn check(&self, spec: &WatcherSpec) -> Result<Vec<String>, EngineError> {
        let invalid = |field: String, reason: String| {
            EngineError::InvalidValue(reason).in_watcher(&spec.name, field)
        };

        if !self.watcher.is_match(&spec.name) {
            return Err(invalid(
                "name".into(),
                format!("'{}' must match {}", spec.name, self.watcher.as_str()),
            ));
        }

        for (list, groups) in [("fetches", &spec.fetches), ("executes", &spec.executes)] {
            for (gi, group) in groups.iter().enumerate() {
                if group.name == EMPTY_KEYWORD || !self.group.is_match(&group.name) {
                    return Err(invalid(
                        format!("{list}[{gi}].name"),
                        format!(
                            "'{}' must match {} and not be '{EMPTY_KEYWORD}'",
                            group.name,
                            self.group.as_str()
                        ),
                    ));
                }
                for (ai, action) in group.actions.iter().enumerate() {
                    if !self.plugin.is_match(&action.plugin) {
                        return Err(invalid(
                            format!("{list}[{gi}].actions[{ai}].plugin"),
                            format!("'{}' must match {}", action.plugin, self.plugin.as_str()),
                        ));
                    }
                }
            }
        }

        // Compile errors are reported when the watcher is built
        let warnings = match watch_expression::compile(&spec.expression) {
            Ok(expression) => expression
                .variables()
                .iter()
                .filter(|var| !spec.fetches.iter().any(|g| &g.name == *var))
                .map(|var| {
                    format!(
                        "Watcher '{}': expression variable '{var}' is not a fetch group and is always empty",
                        spec.name
                    )
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        Ok(warnings)
    }
}
