//! Plugin resolvers - Turn a plugin name into a fresh, loadable module

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use crate::application::errors::PluginError;
use super::trait_def::Plugin;

/// A resolved plugin, tagged with the resolver generation it came from
#[derive(Clone)]
pub struct PluginModule {
    plugin: Arc<dyn Plugin>,
    generation: u64,
    /// Keeps the shared library mapped while the plugin is alive
    library: Option<Arc<libloading::Library>>,
}

impl PluginModule {
    pub fn new<P: Plugin + 'static>(plugin: P) -> Self {
        Self::from_arc(Arc::new(plugin))
    }

    pub fn from_arc(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            generation: 0,
            library: None,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub(crate) fn with_library(mut self, library: Arc<libloading::Library>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_library(&self) -> bool {
        self.library.is_some()
    }
}

impl<P: Plugin + 'static> From<P> for PluginModule {
    fn from(plugin: P) -> Self {
        PluginModule::new(plugin)
    }
}

/// Source of plugin code, looked up by name
///
/// `resolve` must never hand back a cached artifact from before the last
/// `invalidate`: reload depends on it to pick up changed code.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<PluginModule, PluginError>;

    /// Drop anything cached for `name` so the next resolve re-reads it
    fn invalidate(&self, name: &str);

    /// Names this resolver can provide
    fn available(&self) -> Vec<String>;
}

type Factory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

struct FactoryEntry {
    factory: Factory,
    generation: u64,
}

/// Resolver over in-process factory functions
#[derive(Default)]
pub struct FactoryResolver {
    entries: RwLock<BTreeMap<String, FactoryEntry>>,
}

impl FactoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the factory for `name`; replacing bumps the generation
    pub fn register<F, P>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Plugin + 'static,
    {
        let name = name.into();
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Arc<dyn Plugin>);
        match self.entries.write() {
            Ok(mut entries) => {
                let generation = entries.get(&name).map(|e| e.generation + 1).unwrap_or(0);
                tracing::debug!(plugin = %name, generation, "Factory registered");
                entries.insert(name, FactoryEntry { factory, generation });
            }
            Err(_) => tracing::error!(plugin = %name, "Factory table poisoned"),
        }
    }

    /// Builder form of [`FactoryResolver::register`]
    pub fn with<F, P>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> P + Send + Sync + 'static,
        P: Plugin + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries
            .write()
            .map(|mut e| e.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn generation(&self, name: &str) -> Option<u64> {
        self.entries.read().ok()?.get(name).map(|e| e.generation)
    }
}

impl PluginResolver for FactoryResolver {
    fn resolve(&self, name: &str) -> Result<PluginModule, PluginError> {
        let (factory, generation) = {
            let entries = self.entries.read()
                .map_err(|_| PluginError::resolution(name, "factory table poisoned"))?;
            let entry = entries
                .get(name)
                .ok_or_else(|| PluginError::resolution(name, "no such plugin"))?;
            (entry.factory.clone(), entry.generation)
        };
        Ok(PluginModule::from_arc(factory()).with_generation(generation))
    }

    fn invalidate(&self, name: &str) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(name) {
                entry.generation += 1;
            }
        }
    }

    fn available(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Resolver that consults several sources in order
pub struct CompositeResolver {
    sources: Vec<Arc<dyn PluginResolver>>,
}

impl CompositeResolver {
    pub fn new(sources: Vec<Arc<dyn PluginResolver>>) -> Self {
        Self { sources }
    }
}

impl PluginResolver for CompositeResolver {
    fn resolve(&self, name: &str) -> Result<PluginModule, PluginError> {
        self.sources
            .iter()
            .find(|s| s.available().iter().any(|n| n == name))
            .ok_or_else(|| PluginError::resolution(name, "not provided by any plugin source"))?
            .resolve(name)
    }

    fn invalidate(&self, name: &str) {
        for source in &self.sources {
            source.invalidate(name);
        }
    }

    fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.iter().flat_map(|s| s.available()).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginErrorKind;
    use crate::plugins::trait_def::define_plugin;

    #[test]
    fn test_unknown_name_fails_resolution() {
        let resolver = FactoryResolver::new();
        let err = resolver.resolve("missing").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::ModuleResolutionFailure);
    }

    #[test]
    fn test_each_resolve_builds_a_fresh_instance() {
        let resolver = FactoryResolver::new().with("echo", || define_plugin("echo"));
        let a = resolver.resolve("echo").unwrap();
        let b = resolver.resolve("echo").unwrap();
        assert!(!Arc::ptr_eq(a.plugin(), b.plugin()));
    }

    #[test]
    fn test_invalidate_and_replace_bump_generation() {
        let resolver = FactoryResolver::new().with("echo", || define_plugin("echo"));
        assert_eq!(resolver.resolve("echo").unwrap().generation(), 0);

        resolver.invalidate("echo");
        assert_eq!(resolver.resolve("echo").unwrap().generation(), 1);

        resolver.register("echo", || define_plugin("echo").with_version("2.0.0"));
        let module = resolver.resolve("echo").unwrap();
        assert_eq!(module.generation(), 2);
        assert_eq!(module.plugin().version(), "2.0.0");
    }

    #[test]
    fn test_composite_prefers_first_source() {
        let first = Arc::new(FactoryResolver::new().with("echo", || define_plugin("echo").with_version("1")));
        let second = Arc::new(
            FactoryResolver::new()
                .with("echo", || define_plugin("echo").with_version("2"))
                .with("repeat", || define_plugin("repeat")),
        );
        let composite = CompositeResolver::new(vec![first, second]);

        assert_eq!(composite.resolve("echo").unwrap().plugin().version(), "1");
        assert!(composite.resolve("repeat").is_ok());
        assert_eq!(composite.available(), vec!["echo", "repeat"]);
        assert!(composite.resolve("nope").is_err());
    }
}
