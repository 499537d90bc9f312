//! hotswap-bot - A chat bot host whose plugins can be loaded, unloaded and
//! reloaded while it keeps running

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{BotError, ConfigError, PluginError, PluginErrorKind};
pub use plugins::{PluginContext, PluginManager};
