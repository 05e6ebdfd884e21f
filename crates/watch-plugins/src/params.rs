//! Parameter decoding and result extraction shared by the built-in plugins

use regex::{Regex, RegexBuilder};
use serde::de::DeserializeOwned;
use watch_engine::{PluginError, PluginParams, TickContext};

/// Pattern used when a plugin is given no `regex`: one value per non-empty line
pub const DEFAULT_PATTERN: &str = r"(?m)^(.+)$";

/// Decode a plugin's parameter table into its typed form
pub fn decode<T: DeserializeOwned>(params: &PluginParams) -> Result<T, PluginError> {
    serde_json::from_value(serde_json::Value::Object(params.clone())).map_err(|e| {
        let message = e.to_string();
        match missing_field(&message) {
            Some(name) => PluginError::MissingParam(name.to_string()),
            None => PluginError::invalid_param("params", message),
        }
    })
}

fn missing_field(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("missing field `")?;
    rest.split('`').next()
}

/// Compile the optional `regex` parameter
pub fn pattern(source: Option<&str>, ignorecase: bool) -> Result<Regex, PluginError> {
    RegexBuilder::new(source.unwrap_or(DEFAULT_PATTERN))
        .case_insensitive(ignorecase)
        .build()
        .map_err(|e| PluginError::invalid_param("regex", e))
}

/// Collect every match of `regex` in `text`
///
/// Each match yields its first capture group, or the whole match when the
/// pattern has none. Values are trimmed and empty ones dropped.
pub fn extract(regex: &Regex, text: &str) -> Vec<String> {
    regex
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

/// Stash `values` under `extra[key]` when a `store` key was configured
pub fn store(ctx: &mut TickContext, key: Option<&str>, values: &[String]) {
    if let Some(key) = key {
        ctx.extra_mut()
            .insert(key.to_string(), serde_json::json!(values));
    }
}
