use std::path::PathBuf;
use crate::application::errors::ConfigError;

/// Config store - the persisted settings the plugin manager depends on
///
/// Holds the enabled-plugin list and the owner/admin id lists. A mutation
/// whose write fails is reported and leaves the store as it was.
pub trait ConfigStore: Send + Sync {
    /// Plugins that should be loaded at startup, in order
    fn enabled_plugins(&self) -> Vec<String>;

    /// Append `name` if absent; returns whether the list changed
    fn add_enabled(&self, name: &str) -> Result<bool, ConfigError>;

    /// Remove `name` if present; returns whether the list changed
    fn remove_enabled(&self, name: &str) -> Result<bool, ConfigError>;

    fn owners(&self) -> Vec<String>;

    fn admins(&self) -> Vec<String>;

    fn add_admin(&self, user_id: &str) -> Result<bool, ConfigError>;

    fn remove_admin(&self, user_id: &str) -> Result<bool, ConfigError>;

    /// Command prefix for the admin surface
    fn prefix(&self) -> String;

    /// Root directory for per-plugin data
    fn data_dir(&self) -> PathBuf;

    /// Root directory for per-plugin configuration
    fn config_dir(&self) -> PathBuf;

    fn is_owner(&self, user_id: &str) -> bool {
        self.owners().iter().any(|id| id == user_id)
    }

    /// Owners count as admins
    fn is_admin(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.admins().iter().any(|id| id == user_id)
    }
}
