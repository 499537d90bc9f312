//! Plugin loading from disk
//!
//! Plugins are shared libraries that export `hotswap_plugin_entry`
//! (see [`export_plugin!`](crate::export_plugin)), each in its own directory
//! next to a `plugin.yaml` manifest.

pub mod loader;
pub mod manifest;

pub use loader::{LibraryResolver, PluginEntryFn, ENTRY_SYMBOL};
pub use manifest::{PluginManifest, MANIFEST_FILE};
