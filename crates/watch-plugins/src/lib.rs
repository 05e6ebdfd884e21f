//! Built-in fetch and execute plugins
//!
//! This crate provides the plugins shipped with DDNS Guard on top of the
//! watcher engine's plugin boundary.

pub mod command;
pub mod echo;
pub mod http;
pub mod params;
pub mod resolve;

pub use command::CommandPlugin;
pub use echo::EchoPlugin;
pub use http::HttpPlugin;
pub use resolve::ResolvePlugin;

use std::sync::Arc;
use watch_engine::{Plugin, PluginRegistry};

/// Register every built-in plugin under its identifier
pub fn register_builtins(registry: &PluginRegistry) {
    registry.register("echo", |params| {
        Ok(Arc::new(EchoPlugin::from_params(params)?) as Arc<dyn Plugin>)
    });
    registry.register("command", |params| {
        Ok(Arc::new(CommandPlugin::from_params(params)?) as Arc<dyn Plugin>)
    });
    registry.register("resolve", |params| {
        Ok(Arc::new(ResolvePlugin::from_params(params)?) as Arc<dyn Plugin>)
    });
    registry.register("http", |params| {
        Ok(Arc::new(HttpPlugin::from_params(params)?) as Arc<dyn Plugin>)
    });
}
