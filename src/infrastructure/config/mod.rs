//! Configuration management

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;
use crate::application::errors::ConfigError;
use crate::domain::traits::ConfigStore;

/// Host configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Root user ids
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub admins: Vec<String>,
    /// Enabled plugins, loaded at startup in this order
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathsConfig {
    pub plugins: PathBuf,
    pub data: PathBuf,
    pub config: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugins: PathBuf::from("./plugins"),
            data: PathBuf::from("./data"),
            config: PathBuf::from("./config"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                name: "hotswap-bot".to_string(),
                prefix: "/".to_string(),
            },
            connection: ConnectionConfig::default(),
            owners: Vec::new(),
            admins: Vec::new(),
            plugins: vec!["admin".to_string(), "echo".to_string()],
            paths: PathsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;

        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }

        // Write next to the target and rename over it, so readers never see a partial file
        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix must not be empty".to_string()));
        }
        if self.connection.host.is_empty() {
            return Err(ConfigError::InvalidValue("connection.host must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn load_env() -> Self {
        // Load from environment variables
        let mut config = Config::default();

        if let Ok(host) = std::env::var("BOT_HOST") {
            config.connection.host = host;
        }

        if let Some(port) = std::env::var("BOT_PORT").ok().and_then(|p| p.parse().ok()) {
            config.connection.port = port;
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            config.bot.prefix = prefix;
        }

        config
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

fn remove_value(list: &mut Vec<String>, value: &str) -> bool {
    let before = list.len();
    list.retain(|v| v != value);
    list.len() != before
}

/// Config store backed by an in-memory [`Config`], optionally persisted to a yaml file
pub struct FileConfigStore {
    path: Option<PathBuf>,
    config: RwLock<Config>,
}

impl FileConfigStore {
    /// Load from `path`, falling back to defaults when the file is missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() {
            Config::load(&path)?
        } else {
            tracing::warn!(path = %path.display(), "Config file missing, using defaults");
            Config::load_env()
        };
        Ok(Self {
            path: Some(path),
            config: RwLock::new(config),
        })
    }

    /// Store that never touches the filesystem
    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            config: RwLock::new(config),
        }
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Config {
        match self.config.read() {
            Ok(c) => c.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Config) -> T) -> T {
        match self.config.read() {
            Ok(c) => f(&c),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Apply `f`; persist when it reports a change.
    ///
    /// The write lock is held across the save so concurrent mutations reach
    /// the file in the order they were applied. A failed save undoes `f`.
    fn mutate(&self, f: impl FnOnce(&mut Config) -> bool) -> Result<bool, ConfigError> {
        let mut config = self.config.write()
            .map_err(|_| ConfigError::InvalidValue("Config lock poisoned".to_string()))?;
        let before = config.clone();
        if !f(&mut config) {
            return Ok(false);
        }

        if let Some(path) = &self.path {
            if let Err(e) = config.save(path) {
                *config = before;
                return Err(e);
            }
            tracing::debug!(path = %path.display(), "Config saved");
        }
        Ok(true)
    }
}

impl ConfigStore for FileConfigStore {
    fn enabled_plugins(&self) -> Vec<String> {
        self.read(|c| c.plugins.clone())
    }

    fn add_enabled(&self, name: &str) -> Result<bool, ConfigError> {
        self.mutate(|c| push_unique(&mut c.plugins, name))
    }

    fn remove_enabled(&self, name: &str) -> Result<bool, ConfigError> {
        self.mutate(|c| remove_value(&mut c.plugins, name))
    }

    fn owners(&self) -> Vec<String> {
        self.read(|c| c.owners.clone())
    }

    fn admins(&self) -> Vec<String> {
        self.read(|c| c.admins.clone())
    }

    fn add_admin(&self, user_id: &str) -> Result<bool, ConfigError> {
        self.mutate(|c| push_unique(&mut c.admins, user_id))
    }

    fn remove_admin(&self, user_id: &str) -> Result<bool, ConfigError> {
        self.mutate(|c| remove_value(&mut c.admins, user_id))
    }

    fn prefix(&self) -> String {
        self.read(|c| c.bot.prefix.clone())
    }

    fn data_dir(&self) -> PathBuf {
        self.read(|c| c.paths.data.clone())
    }

    fn config_dir(&self) -> PathBuf {
        self.read(|c| c.paths.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enabled_list_keeps_order_and_is_idempotent() {
        let store = FileConfigStore::in_memory(Config {
            plugins: vec!["a".to_string()],
            ..Config::default()
        });

        assert!(store.add_enabled("b").unwrap());
        assert!(!store.add_enabled("a").unwrap());
        assert_eq!(store.enabled_plugins(), vec!["a", "b"]);

        assert!(store.remove_enabled("a").unwrap());
        assert!(!store.remove_enabled("a").unwrap());
        assert_eq!(store.enabled_plugins(), vec!["b"]);
    }

    #[test]
    fn test_mutations_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save(&path).unwrap();

        let store = FileConfigStore::open(&path).unwrap();
        store.add_enabled("weather").unwrap();
        store.add_admin("42").unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert!(reloaded.plugins.contains(&"weather".to_string()));
        assert_eq!(reloaded.admins, vec!["42"]);
    }

    #[test]
    fn test_concurrent_mutations_all_reach_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let store = FileConfigStore::open(&path).unwrap();

        for round in 0..20 {
            std::thread::scope(|s| {
                for i in 0..8 {
                    let store = &store;
                    s.spawn(move || store.add_enabled(&format!("p{}_{}", round, i)).unwrap());
                }
            });

            let saved = Config::load(&path).unwrap();
            assert_eq!(saved.plugins, store.enabled_plugins());
            for i in 0..8 {
                assert!(saved.plugins.contains(&format!("p{}_{}", round, i)));
            }
        }
    }

    #[test]
    fn test_failed_save_is_undone() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes every save fail
        let path = dir.path().join("config.yaml");
        std::fs::create_dir_all(&path).unwrap();
        let store = FileConfigStore {
            path: Some(path),
            config: RwLock::new(Config::default()),
        };

        assert!(store.add_enabled("weather").is_err());
        assert!(!store.enabled_plugins().contains(&"weather".to_string()));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save(&path).unwrap();
        Config::default().save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_open_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = FileConfigStore::open(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(store.prefix(), "/");
    }

    #[test]
    fn test_owner_is_admin() {
        let store = FileConfigStore::in_memory(Config {
            owners: vec!["1".to_string()],
            admins: vec!["2".to_string()],
            ..Config::default()
        });
        assert!(store.is_owner("1"));
        assert!(store.is_admin("1"));
        assert!(store.is_admin("2"));
        assert!(!store.is_owner("2"));
        assert!(!store.is_admin("3"));
    }

    #[test]
    fn test_load_rejects_empty_prefix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::default();
        config.bot.prefix = String::new();
        config.save(&path).unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::InvalidValue(_))));
    }
}
