//! Domain traits - Abstractions for infrastructure implementations

pub mod config_store;
pub mod event_source;

pub use config_store::ConfigStore;
pub use event_source::{BoxFuture, EventSource, Handler, HandlerId};
