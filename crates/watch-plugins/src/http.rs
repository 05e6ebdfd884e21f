//! HTTP plugin: fetches a URL and extracts values from the body

use crate::params;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::HashMap;
use watch_engine::{async_trait, Plugin, PluginError, PluginParams, TickContext};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpParams {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    ignorecase: bool,
    #[serde(default)]
    store: Option<String>,
}

/// Issues a GET request; any non-2xx status is a failure
#[derive(Debug)]
pub struct HttpPlugin {
    client: reqwest::Client,
    url: reqwest::Url,
    headers: HeaderMap,
    regex: Regex,
    store: Option<String>,
}

impl HttpPlugin {
    pub fn from_params(params: &PluginParams) -> Result<Self, PluginError> {
        let p: HttpParams = params::decode(params)?;

        let url = reqwest::Url::parse(&p.url).map_err(|e| PluginError::invalid_param("url", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PluginError::invalid_param(
                "url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &p.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PluginError::invalid_param("headers", e))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| PluginError::invalid_param("headers", e))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PluginError::failed(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            headers,
            regex: params::pattern(p.regex.as_deref(), p.ignorecase)?,
            store: p.store,
        })
    }
}

#[async_trait]
impl Plugin for HttpPlugin {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        tracing::debug!("GET {}", self.url);
        let response = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| PluginError::failed(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginError::failed(format!(
                "{} returned {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PluginError::failed(format!("failed to read body: {e}")))?;

        let values = params::extract(&self.regex, &body);
        params::store(ctx, self.store.as_deref(), &values);
        Ok(values)
    }
}
