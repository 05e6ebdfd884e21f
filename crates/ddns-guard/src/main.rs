//! DDNS Guard - condition-triggered watcher daemon

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast;
use watch_engine::{PluginRegistry, TickEvent, TickOutcome, WatchEngine};

mod config;
mod logging;

use config::{Config, LogFormat, LogOutput, NameRules};

#[derive(Debug, Parser)]
#[command(name = "ddns-guard", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(env = "DDNS_GUARD_CONFIG")]
    config: PathBuf,

    /// Log level; any `--log-*` flag replaces the configured outputs
    #[arg(long, value_parser = ["error", "warn", "info", "debug", "trace", "off"])]
    log_level: Option<String>,

    /// Shorthand for `--log-level info`
    #[arg(short, long, conflicts_with = "log_level")]
    verbose: bool,

    /// Log destination: std, stdout, stderr or a file path
    #[arg(long, value_name = "OUTPUT")]
    log_output: Option<String>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Only log these exact levels (repeatable)
    #[arg(long = "log-level-filter", value_name = "LEVEL")]
    log_level_filters: Vec<String>,

    /// Only log ticks of these watchers (repeatable)
    #[arg(long = "log-name-filter", value_name = "WATCHER")]
    log_name_filters: Vec<String>,

    /// Only log messages matching this regex (repeatable)
    #[arg(long = "log-msg-filter", value_name = "REGEX")]
    log_msg_filters: Vec<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn level(&self) -> Option<&str> {
        if self.verbose {
            Some("info")
        } else {
            self.log_level.as_deref()
        }
    }

    /// Single output built from the `--log-*` flags, if any was given
    fn log_override(&self) -> Option<LogOutput> {
        let given = self.level().is_some()
            || self.log_output.is_some()
            || self.log_format.is_some()
            || !self.log_level_filters.is_empty()
            || !self.log_name_filters.is_empty()
            || !self.log_msg_filters.is_empty();
        if !given {
            return None;
        }

        let mut output = LogOutput::default();
        if let Some(level) = self.level() {
            output.level = level.to_string();
        }
        if let Some(target) = &self.log_output {
            output.output = target.clone();
        }
        if let Some(format) = self.log_format {
            output.format = format;
        }
        output.level_filters = self.log_level_filters.clone();
        output.name_filters = self.log_name_filters.clone();
        output.msg_filters = self.log_msg_filters.clone();
        Some(output)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(output) = cli.log_override() {
        output.validate().context("Invalid logging flags")?;
        config.logs = vec![output];
    }
    logging::init(&config.logs)?;

    tracing::info!("Starting DDNS Guard with {}", cli.config.display());

    let registry = PluginRegistry::new();
    watch_plugins::register_builtins(&registry);
    let mut engine = WatchEngine::new(registry, config.engine_config()?);

    let rules = NameRules::new().context("Failed to compile name rules")?;
    let mut failures = 0;
    let mut specs = Vec::new();
    for spec in &config.watchers {
        match rules.check(spec) {
            Ok(warnings) => {
                for warning in warnings {
                    tracing::warn!("{}", warning);
                }
                specs.push(spec.clone());
            }
            Err(e) => {
                tracing::error!("Failed to initialize watcher: {}", e);
                failures += 1;
            }
        }
    }
    failures += engine.load(&specs).len();

    let started = engine.watchers().len();
    if started == 0 {
        anyhow::bail!("No watcher could be started ({failures} failed)");
    }

    if cli.check {
        if failures > 0 {
            anyhow::bail!("{failures} watcher(s) failed validation");
        }
        println!("Configuration OK: {started} watcher(s)");
        return Ok(());
    }
    if failures > 0 {
        tracing::warn!("{} watcher(s) skipped, {} running", failures, started);
    }

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupt received, shutting down"),
            Err(e) => tracing::error!("Failed to listen for interrupt: {}", e),
        }
        cancel.cancel();
    });

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event logger lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    engine.run().await?;
    tracing::info!("DDNS Guard stopped");
    Ok(())
}

fn log_event(event: &TickEvent) {
    if event.outcome == TickOutcome::Panicked {
        tracing::error!(watcher = %event.watcher, "Tick panicked");
    }
    match serde_json::to_string(event) {
        Ok(json) => tracing::trace!(target: "ddns_guard::events", "{}", json),
        Err(e) => tracing::warn!("Failed to serialize tick event: {}", e),
    }
}
