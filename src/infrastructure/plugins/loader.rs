//! Plugin loader - Resolves plugins from shared libraries on disk
//!
//! Layout of the plugin directory:
//!
//! ```text
//! plugins/
//!   weather/
//!     plugin.yaml
//!     libweather.so
//!   .shadow/            copies actually opened by the host
//! ```
//!
//! A library is never unmapped once opened, and its shadow copy stays on disk
//! until the next start. Every reload of a library plugin therefore adds one
//! mapped library and one file under `.shadow/` for the life of the process;
//! restart the host after many reloads to reclaim them.

use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use crate::application::errors::PluginError;
use crate::plugins::resolver::{PluginModule, PluginResolver};
use crate::plugins::trait_def::{validate_name, Plugin};
use super::manifest::{PluginManifest, MANIFEST_FILE};

/// Symbol every plugin library exports
pub const ENTRY_SYMBOL: &[u8] = b"hotswap_plugin_entry";

/// Signature of [`ENTRY_SYMBOL`].
///
/// Uses the Rust ABI, so a plugin library must be built with the same
/// compiler and the same version of this crate as the host.
pub type PluginEntryFn = unsafe fn() -> Box<dyn Plugin>;

/// Export `$ctor` as the entry point of a plugin library
#[macro_export]
macro_rules! export_plugin {
    ($ctor:expr) => {
        #[no_mangle]
        pub fn hotswap_plugin_entry() -> Box<dyn $crate::plugins::Plugin> {
            Box::new($ctor)
        }
    };
}

const SHADOW_DIR: &str = ".shadow";

/// Resolver over plugin directories holding a manifest and a shared library
///
/// Every resolve copies the library to a new generation-suffixed file before
/// opening it, so a library rebuilt in place is really read again instead of
/// the loader handing back the mapping it already has.
pub struct LibraryResolver {
    plugin_dir: PathBuf,
    generations: Mutex<HashMap<String, u64>>,
    /// Libraries are never unmapped: a handler cloned by an in-flight
    /// dispatch may still point into one after its plugin is unloaded
    opened: Mutex<Vec<Arc<Library>>>,
}

impl LibraryResolver {
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            generations: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Libraries opened since startup, including ones from earlier generations
    pub fn mapped_count(&self) -> usize {
        self.opened.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn shadow_dir(&self) -> PathBuf {
        self.plugin_dir.join(SHADOW_DIR)
    }

    /// Delete shadow copies left by an earlier run
    pub fn clean_shadow_dir(&self) -> std::io::Result<()> {
        let dir = self.shadow_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            tracing::debug!(dir = %dir.display(), "Removed stale shadow copies");
        }
        Ok(())
    }

    fn next_generation(&self, name: &str) -> u64 {
        let mut generations = self.generations.lock().unwrap_or_else(|p| p.into_inner());
        let generation = generations.entry(name.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Read the manifest of `name`; the directory name is the plugin name
    pub fn manifest(&self, name: &str) -> Result<PluginManifest, PluginError> {
        let dir = self.plugin_dir.join(name);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PluginError::resolution(
                name,
                format!("missing {} in {}", MANIFEST_FILE, dir.display()),
            ));
        }
        let manifest = PluginManifest::from_file(&manifest_path)?;
        if manifest.name != name {
            return Err(PluginError::InvalidPluginShape {
                name: name.to_string(),
                reason: format!("manifest declares the name '{}'", manifest.name),
            });
        }
        Ok(manifest)
    }

    fn open(&self, name: &str, library_path: &Path, generation: u64) -> Result<PluginModule, PluginError> {
        let shadow = shadow_copy(library_path, &self.shadow_dir(), name, generation)
            .map_err(|e| PluginError::resolution(name, format!("failed to copy library: {}", e)))?;

        // SAFETY: loading a library runs its initialisers; plugin libraries
        // are trusted code placed in the plugin directory by the operator.
        let library = unsafe { Library::new(&shadow) }
            .map_err(|e| PluginError::resolution(name, format!("failed to load library: {}", e)))?;

        // SAFETY: the symbol type matches `export_plugin!`, which is the only
        // supported way to define the entry point.
        let plugin = unsafe {
            let entry: Symbol<PluginEntryFn> = library
                .get(ENTRY_SYMBOL)
                .map_err(|e| PluginError::InvalidPluginShape {
                    name: name.to_string(),
                    reason: format!("missing entry point: {}", e),
                })?;
            entry()
        };

        let library = Arc::new(library);
        let mapped = {
            let mut opened = self.opened.lock().unwrap_or_else(|p| p.into_inner());
            opened.push(library.clone());
            opened.len()
        };

        tracing::info!(plugin = %name, version = plugin.version(), generation, mapped, "Opened plugin library");
        Ok(PluginModule::from_arc(Arc::from(plugin))
            .with_generation(generation)
            .with_library(library))
    }
}

impl PluginResolver for LibraryResolver {
    fn resolve(&self, name: &str) -> Result<PluginModule, PluginError> {
        validate_name(name)?;
        let manifest = self.manifest(name)?;
        let library_path = manifest.library_path(&self.plugin_dir.join(name));
        if !library_path.exists() {
            return Err(PluginError::resolution(
                name,
                format!("library not found: {}", library_path.display()),
            ));
        }
        let generation = self.next_generation(name);
        self.open(name, &library_path, generation)
    }

    fn invalidate(&self, name: &str) {
        // Nothing is cached between resolves; the next one gets a new generation anyway
        tracing::debug!(plugin = %name, "Library resolver invalidated");
    }

    fn available(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.plugin_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %self.plugin_dir.display(), error = %e, "Plugin directory not readable");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).exists())
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names
    }
}

/// Copy `library` to `<shadow_dir>/<name>-<generation>.<ext>`
fn shadow_copy(library: &Path, shadow_dir: &Path, name: &str, generation: u64) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(shadow_dir)?;
    let extension = library.extension().and_then(|e| e.to_str()).unwrap_or("lib");
    let target = shadow_dir.join(format!("{}-{}.{}", name, generation, extension));
    std::fs::copy(library, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginErrorKind;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), manifest).unwrap();
    }

    #[test]
    fn test_available_lists_directories_with_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "weather", "name: weather\nversion: '1'\n");
        write_plugin(tmp.path(), "dice", "name: dice\nversion: '1'\n");
        std::fs::create_dir_all(tmp.path().join("no-manifest")).unwrap();
        std::fs::create_dir_all(tmp.path().join(SHADOW_DIR)).unwrap();

        let resolver = LibraryResolver::new(tmp.path());
        assert_eq!(resolver.available(), vec!["dice", "weather"]);
    }

    #[test]
    fn test_missing_directory_has_empty_catalog() {
        let resolver = LibraryResolver::new("/definitely/not/here");
        assert!(resolver.available().is_empty());
        let err = resolver.resolve("weather").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::ModuleResolutionFailure);
    }

    #[test]
    fn test_missing_library_fails_resolution() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "weather", "name: weather\nversion: '1'\n");
        let resolver = LibraryResolver::new(tmp.path());

        let err = resolver.resolve("weather").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::ModuleResolutionFailure);
        assert!(err.to_string().contains("library not found"));
    }

    #[test]
    fn test_manifest_name_must_match_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "weather", "name: forecast\nversion: '1'\n");
        let resolver = LibraryResolver::new(tmp.path());

        let err = resolver.resolve("weather").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::InvalidPluginShape);
    }

    #[test]
    fn test_invalid_library_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "weather", "name: weather\nversion: '1'\nlibrary: broken.so\n");
        std::fs::write(tmp.path().join("weather/broken.so"), b"not a library").unwrap();
        let resolver = LibraryResolver::new(tmp.path());

        let err = resolver.resolve("weather").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::ModuleResolutionFailure);
        assert_eq!(resolver.mapped_count(), 0);
        // The copy was still made under a fresh generation
        assert!(tmp.path().join(SHADOW_DIR).join("weather-1.so").exists());
    }

    #[test]
    fn test_path_like_names_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = LibraryResolver::new(tmp.path());
        let err = resolver.resolve("../etc").err().unwrap();
        assert_eq!(err.kind(), PluginErrorKind::InvalidPluginShape);
    }

    #[test]
    fn test_shadow_copies_get_distinct_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("libx.so");
        std::fs::write(&lib, b"v1").unwrap();
        let shadow = tmp.path().join(SHADOW_DIR);

        let first = shadow_copy(&lib, &shadow, "x", 1).unwrap();
        std::fs::write(&lib, b"v2").unwrap();
        let second = shadow_copy(&lib, &shadow, "x", 2).unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"v1");
        assert_eq!(std::fs::read(&second).unwrap(), b"v2");
    }

    #[test]
    fn test_clean_shadow_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = LibraryResolver::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join(SHADOW_DIR)).unwrap();
        resolver.clean_shadow_dir().unwrap();
        assert!(!tmp.path().join(SHADOW_DIR).exists());
    }
}
