//! Echo plugin: renders templated parameters and logs them

use crate::params;
use regex::Regex;
use watch_engine::{async_trait, Plugin, PluginError, PluginParams, TickContext};

const PLACEHOLDER: &str = r"\{([A-Za-z0-9_.]+)\}";

/// Render `{key}` placeholders from the tick context
///
/// Unknown placeholders are kept verbatim.
pub fn render(placeholder: &Regex, template: &str, ctx: &TickContext) -> String {
    placeholder
        .replace_all(template, |caps: &regex::Captures<'_>| {
            ctx.lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Renders every configured parameter, logs it as `key: value`, and returns
/// the rendered values in configuration order
///
/// The optional `store` parameter names an `extra` key that receives the
/// rendered values.
#[derive(Debug)]
pub struct EchoPlugin {
    placeholder: Regex,
    templates: Vec<(String, String)>,
    store: Option<String>,
}

impl EchoPlugin {
    pub fn from_params(params: &PluginParams) -> Result<Self, PluginError> {
        let mut templates = Vec::new();
        let mut store = None;

        for (key, value) in params {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if key == "store" {
                store = Some(text);
            } else {
                templates.push((key.clone(), text));
            }
        }

        let placeholder =
            Regex::new(PLACEHOLDER).map_err(|e| PluginError::failed(e.to_string()))?;
        Ok(Self {
            placeholder,
            templates,
            store,
        })
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        let mut values = Vec::with_capacity(self.templates.len());
        for (key, template) in &self.templates {
            let value = render(&self.placeholder, template, ctx);
            tracing::info!(watcher = %ctx.watcher().name, "{}: {}", key, value);
            values.push(value);
        }

        params::store(ctx, self.store.as_deref(), &values);
        Ok(values)
    }
}
