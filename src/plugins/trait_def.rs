//! Plugin trait definitions

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use crate::application::errors::PluginError;
use crate::domain::traits::BoxFuture;
use super::context::PluginContext;

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier for the plugin
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// Human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Install handlers through `ctx`; the returned cleanup runs once on unload
    async fn setup(&self, _ctx: PluginContext) -> Result<Option<Cleanup>, PluginError> {
        Ok(None)
    }
}

/// Teardown callback handed back by [`Plugin::setup`]
pub struct Cleanup(Box<dyn FnOnce() -> BoxFuture<'static, Result<(), PluginError>> + Send>);

impl Cleanup {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PluginError>> + Send + 'static,
    {
        Self(Box::new(move || Box::pin(f())))
    }

    pub fn run(self) -> BoxFuture<'static, Result<(), PluginError>> {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

type SetupFn = dyn Fn(PluginContext) -> BoxFuture<'static, Result<Option<Cleanup>, PluginError>>
    + Send
    + Sync;

/// Closure-backed plugin, for plugins that need no state of their own
///
/// ```ignore
/// let plugin = define_plugin("echo")
///     .with_version("1.0.0")
///     .setup(|ctx| async move {
///         ctx.on_message(Handler::new(|_| async { Ok(()) }))?;
///         Ok(None)
///     });
/// ```
pub struct FnPlugin {
    name: String,
    version: String,
    description: String,
    setup: Option<Arc<SetupFn>>,
}

pub fn define_plugin(name: impl Into<String>) -> FnPlugin {
    FnPlugin {
        name: name.into(),
        version: "0.0.0".to_string(),
        description: String::new(),
        setup: None,
    }
}

impl FnPlugin {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn setup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Cleanup>, PluginError>> + Send + 'static,
    {
        self.setup = Some(Arc::new(move |ctx| Box::pin(f(ctx))));
        self
    }
}

#[async_trait]
impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn setup(&self, ctx: PluginContext) -> Result<Option<Cleanup>, PluginError> {
        match &self.setup {
            Some(setup) => setup(ctx).await,
            None => Ok(None),
        }
    }
}

/// Plugin information for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    /// `None` for catalog entries that are not loaded
    pub version: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    /// Resolver generation of the loaded module
    pub generation: Option<u64>,
}

impl PluginInfo {
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            enabled: false,
            generation: None,
        }
    }
}

/// Check that `name` can identify a plugin.
///
/// Non-ASCII letters are allowed; whitespace, path separators and punctuation
/// other than `-` and `_` are not.
pub fn validate_name(name: &str) -> Result<(), PluginError> {
    let invalid = |reason: &str| PluginError::InvalidPluginShape {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.starts_with('-') || name.starts_with('.') {
        return Err(invalid("name must start with a letter, digit or '_'"));
    }
    if let Some(c) = name.chars().find(|c| !(c.is_alphanumeric() || *c == '-' || *c == '_')) {
        return Err(invalid(&format!("name contains invalid character {:?}", c)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginErrorKind;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("echo").is_ok());
        assert!(validate_name("my_plugin-2").is_ok());
        assert!(validate_name("复读").is_ok());

        for bad in ["", "has space", "../etc", "a/b", "-flag", "tab\t"] {
            let err = validate_name(bad).unwrap_err();
            assert_eq!(err.kind(), PluginErrorKind::InvalidPluginShape, "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_cleanup_reports_error() {
        let cleanup = Cleanup::new(|| async { Err(PluginError::cleanup("x", "nope")) });
        let err = cleanup.run().await.unwrap_err();
        assert_eq!(err.kind(), PluginErrorKind::CleanupFailure);
    }

    #[test]
    fn test_fn_plugin_metadata() {
        let plugin = define_plugin("echo")
            .with_version("1.2.0")
            .with_description("Replies pong");
        assert_eq!(plugin.name(), "echo");
        assert_eq!(plugin.version(), "1.2.0");
        assert_eq!(plugin.description(), "Replies pong");
    }
}
