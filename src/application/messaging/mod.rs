//! Messaging - Event routing and command parsing

pub mod bus;
pub mod parser;

pub use bus::LocalEventSource;
pub use parser::{AdminCommand, CommandParser, PluginOp};
