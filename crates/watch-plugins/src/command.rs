//! Command plugin: runs a shell command and extracts values from stdout

use crate::params;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use watch_engine::{async_trait, Plugin, PluginError, PluginParams, TickContext};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandParams {
    cmd: String,
    #[serde(default)]
    dir: Option<PathBuf>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    ignorecase: bool,
    #[serde(default)]
    store: Option<String>,
}

/// Runs `cmd` through the platform shell
///
/// A non-zero exit status is a failure. Values are extracted from stdout
/// with `regex` (one per line by default).
#[derive(Debug)]
pub struct CommandPlugin {
    cmd: String,
    dir: Option<PathBuf>,
    env: HashMap<String, String>,
    regex: Regex,
    store: Option<String>,
}

impl CommandPlugin {
    pub fn from_params(params: &PluginParams) -> Result<Self, PluginError> {
        let p: CommandParams = params::decode(params)?;
        if p.cmd.trim().is_empty() {
            return Err(PluginError::invalid_param("cmd", "must not be empty"));
        }
        if let Some(dir) = &p.dir {
            if !dir.is_dir() {
                return Err(PluginError::invalid_param(
                    "dir",
                    format!("{} is not a directory", dir.display()),
                ));
            }
        }

        Ok(Self {
            regex: params::pattern(p.regex.as_deref(), p.ignorecase)?,
            cmd: p.cmd,
            dir: p.dir,
            env: p.env,
            store: p.store,
        })
    }

    fn command(&self) -> Command {
        #[cfg(windows)]
        let mut command = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        command
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl Plugin for CommandPlugin {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        tracing::debug!("Running command: {}", self.cmd);
        let output = self.command().output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::failed(format!(
                "command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let values = params::extract(&self.regex, &stdout);
        params::store(ctx, self.store.as_deref(), &values);
        Ok(values)
    }
}
