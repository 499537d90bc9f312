//! Application layer errors

use thiserror::Error;

/// Event source / transport errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Action '{action}' failed: {reason}")]
    Action { action: String, reason: String },

    #[error("Event source disconnected")]
    Disconnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Tag for branching on a [`PluginError`] without matching its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorKind {
    InvalidPluginShape,
    DuplicateName,
    NotFound,
    AlreadyEnabled,
    SetupFailure,
    CleanupFailure,
    ModuleResolutionFailure,
    StaleContext,
    ReloadIncomplete,
    Persist,
    ShutDown,
    Action,
    Config,
}

/// Plugin lifecycle errors
///
/// The `Display` output is what operators see, so every variant names the
/// plugin it concerns.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{name}' has an invalid shape: {reason}")]
    InvalidPluginShape { name: String, reason: String },

    #[error("Plugin '{0}' is already loaded")]
    DuplicateName(String),

    #[error("Plugin '{0}' not found")]
    NotFound(String),

    #[error("Plugin '{0}' is already enabled")]
    AlreadyEnabled(String),

    #[error("Plugin '{name}' setup failed: {reason}")]
    SetupFailure { name: String, reason: String },

    #[error("Plugin '{name}' cleanup failed: {reason}")]
    CleanupFailure { name: String, reason: String },

    #[error("Cannot resolve plugin '{name}': {reason}")]
    ModuleResolutionFailure { name: String, reason: String },

    #[error("Context of plugin '{0}' is no longer valid (plugin unloaded)")]
    StaleContext(String),

    /// Disable succeeded but the following enable failed: the plugin is now unloaded
    #[error("Reload of plugin '{name}' incomplete, plugin is now unloaded: {source}")]
    ReloadIncomplete {
        name: String,
        #[source]
        source: Box<PluginError>,
    },

    /// The lifecycle step took effect but the enabled list could not be saved
    #[error("Plugin '{name}' is {} but the enabled list was not saved: {source}", load_state(.loaded))]
    Persist {
        name: String,
        loaded: bool,
        #[source]
        source: ConfigError,
    },

    #[error("Cannot load plugin '{0}': the host is shut down")]
    ShutDown(String),

    #[error("Plugin '{name}' action failed: {reason}")]
    Action { name: String, reason: String },

    #[error("Plugin config error: {0}")]
    Config(#[from] ConfigError),
}

impl PluginError {
    pub fn kind(&self) -> PluginErrorKind {
        match self {
            PluginError::InvalidPluginShape { .. } => PluginErrorKind::InvalidPluginShape,
            PluginError::DuplicateName(_) => PluginErrorKind::DuplicateName,
            PluginError::NotFound(_) => PluginErrorKind::NotFound,
            PluginError::AlreadyEnabled(_) => PluginErrorKind::AlreadyEnabled,
            PluginError::SetupFailure { .. } => PluginErrorKind::SetupFailure,
            PluginError::CleanupFailure { .. } => PluginErrorKind::CleanupFailure,
            PluginError::ModuleResolutionFailure { .. } => PluginErrorKind::ModuleResolutionFailure,
            PluginError::StaleContext(_) => PluginErrorKind::StaleContext,
            PluginError::ReloadIncomplete { .. } => PluginErrorKind::ReloadIncomplete,
            PluginError::Persist { .. } => PluginErrorKind::Persist,
            PluginError::ShutDown(_) => PluginErrorKind::ShutDown,
            PluginError::Action { .. } => PluginErrorKind::Action,
            PluginError::Config(_) => PluginErrorKind::Config,
        }
    }

    pub fn setup(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::SetupFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn cleanup(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::CleanupFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::ModuleResolutionFailure {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn action(name: impl Into<String>, err: BotError) -> Self {
        PluginError::Action {
            name: name.into(),
            reason: err.to_string(),
        }
    }
}

fn load_state(loaded: &bool) -> &'static str {
    if *loaded {
        "loaded"
    } else {
        "unloaded"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_plugin() {
        let err = PluginError::NotFound("echo".to_string());
        assert!(err.to_string().contains("echo"));

        let err = PluginError::setup("weather", "boom");
        let msg = err.to_string();
        assert!(msg.contains("weather"));
        assert!(msg.contains("setup"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_reload_incomplete_wraps_enable_error() {
        let err = PluginError::ReloadIncomplete {
            name: "echo".to_string(),
            source: Box::new(PluginError::resolution("echo", "file removed")),
        };
        assert_eq!(err.kind(), PluginErrorKind::ReloadIncomplete);
        let msg = err.to_string();
        assert!(msg.contains("now unloaded"));
        assert!(msg.contains("file removed"));
    }

    #[test]
    fn test_persist_error_names_plugin_and_state() {
        let err = PluginError::Persist {
            name: "echo".to_string(),
            loaded: false,
            source: ConfigError::InvalidValue("read-only".to_string()),
        };
        assert_eq!(err.kind(), PluginErrorKind::Persist);
        let msg = err.to_string();
        assert!(msg.contains("'echo' is unloaded"));
        assert!(msg.contains("read-only"));
    }

    #[test]
    fn test_config_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: PluginError = ConfigError::from(io_err).into();
        assert_eq!(err.kind(), PluginErrorKind::Config);
    }
}
