//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading and the file-backed config store
//! - Plugins: Shared-library plugin resolution
//! - Adapters: Front ends (console)

pub mod config;
pub mod plugins;
pub mod adapters;
