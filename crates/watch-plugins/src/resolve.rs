//! Resolve plugin: looks up the addresses a domain points at

use crate::params;
use serde::Deserialize;
use std::net::IpAddr;
use watch_engine::{async_trait, Plugin, PluginError, PluginParams, TickContext};

/// Address family filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl Family {
    fn accepts(self, ip: &IpAddr) -> bool {
        match self {
            Self::Any => true,
            Self::Ipv4 => ip.is_ipv4(),
            Self::Ipv6 => ip.is_ipv6(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResolveParams {
    domain: String,
    #[serde(default)]
    family: Family,
    #[serde(default)]
    store: Option<String>,
}

/// Returns the distinct addresses of `domain`, in resolver order
#[derive(Debug)]
pub struct ResolvePlugin {
    domain: String,
    family: Family,
    store: Option<String>,
}

impl ResolvePlugin {
    pub fn from_params(params: &PluginParams) -> Result<Self, PluginError> {
        let p: ResolveParams = params::decode(params)?;
        if p.domain.trim().is_empty() {
            return Err(PluginError::invalid_param("domain", "must not be empty"));
        }
        Ok(Self {
            domain: p.domain,
            family: p.family,
            store: p.store,
        })
    }
}

#[async_trait]
impl Plugin for ResolvePlugin {
    async fn execute(&self, ctx: &mut TickContext) -> Result<Vec<String>, PluginError> {
        let addrs = tokio::net::lookup_host((self.domain.as_str(), 0))
            .await
            .map_err(|e| PluginError::failed(format!("failed to resolve {}: {e}", self.domain)))?;

        let mut values: Vec<String> = Vec::new();
        for ip in addrs.map(|addr| addr.ip()).filter(|ip| self.family.accepts(ip)) {
            let ip = ip.to_string();
            if !values.contains(&ip) {
                values.push(ip);
            }
        }

        tracing::debug!("Resolved {} to {:?}", self.domain, values);
        params::store(ctx, self.store.as_deref(), &values);
        Ok(values)
    }
}
