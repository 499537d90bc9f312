//! Plugin system for hotswap-bot
//!
//! Plugins are loaded, unloaded and reloaded against a live event source
//! without restarting the host.

pub mod builtin;
pub mod context;
pub mod handlers;
pub mod manager;
pub mod resolver;
pub mod trait_def;

pub use context::PluginContext;
pub use handlers::HandlerRegistry;
pub use manager::{format_uptime, HostStatus, PluginManager, StartupReport};
pub use resolver::{CompositeResolver, FactoryResolver, PluginModule, PluginResolver};
pub use trait_def::{define_plugin, validate_name, Cleanup, FnPlugin, Plugin, PluginInfo};
