//! Plugin manifest definition

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::application::errors::PluginError;

/// File every plugin directory must contain
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// Plugin metadata
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginManifest {
    /// Plugin name (required)
    pub name: String,

    /// Plugin version (required)
    pub version: String,

    pub description: Option<String>,

    pub author: Option<String>,

    /// Shared library, relative to the plugin directory
    pub library: Option<PathBuf>,
}

impl PluginManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::resolution(dir_name(path), format!("failed to read manifest: {}", e)))?;
        Self::parse(dir_name(path), &content)
    }

    /// Parse manifest text found for plugin `name`
    pub fn parse(name: &str, content: &str) -> Result<Self, PluginError> {
        let manifest: Self = serde_yaml::from_str(content)
            .map_err(|e| PluginError::resolution(name, format!("failed to parse manifest: {}", e)))?;
        if manifest.name.trim().is_empty() {
            return Err(PluginError::InvalidPluginShape {
                name: name.to_string(),
                reason: "manifest has an empty name".to_string(),
            });
        }
        Ok(manifest)
    }

    /// Library file inside `dir`, defaulting to the platform name for `lib<name>`
    pub fn library_path(&self, dir: &Path) -> PathBuf {
        match &self.library {
            Some(lib) => dir.join(lib),
            None => dir.join(format!(
                "{}{}{}",
                std::env::consts::DLL_PREFIX,
                self.name.replace('-', "_"),
                std::env::consts::DLL_SUFFIX
            )),
        }
    }
}

/// Name of the directory holding `manifest_path`
fn dir_name(manifest_path: &Path) -> &str {
    manifest_path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginErrorKind;

    #[test]
    fn test_parse_manifest() {
        let manifest = PluginManifest::parse(
            "weather",
            "name: weather\nversion: 0.3.1\ndescription: Forecasts\nauthor: someone\nlibrary: target/libweather.so\n",
        )
        .unwrap();
        assert_eq!(manifest.version, "0.3.1");
        assert_eq!(manifest.author.as_deref(), Some("someone"));
        assert_eq!(
            manifest.library_path(Path::new("/p/weather")),
            PathBuf::from("/p/weather/target/libweather.so")
        );
    }

    #[test]
    fn test_default_library_path() {
        let manifest = PluginManifest::parse("my-plugin", "name: my-plugin\nversion: '1'\n").unwrap();
        let path = manifest.library_path(Path::new("dir"));
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.contains("my_plugin"));
        assert!(file.ends_with(std::env::consts::DLL_SUFFIX));
    }

    #[test]
    fn test_bad_manifest_is_a_resolution_failure() {
        let err = PluginManifest::parse("x", "version: [").unwrap_err();
        assert_eq!(err.kind(), PluginErrorKind::ModuleResolutionFailure);

        let err = PluginManifest::parse("x", "name: ''\nversion: '1'\n").unwrap_err();
        assert_eq!(err.kind(), PluginErrorKind::InvalidPluginShape);
    }
}
