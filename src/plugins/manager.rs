//! Plugin manager - handles plugin lifecycle against a live event source

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use crate::application::errors::PluginError;
use crate::domain::entities::Action;
use crate::domain::traits::{ConfigStore, EventSource};
use super::context::PluginContext;
use super::handlers::HandlerRegistry;
use super::resolver::{PluginModule, PluginResolver};
use super::trait_def::{validate_name, Cleanup, PluginInfo};

/// A plugin in the Loaded state
struct LoadedPlugin {
    module: PluginModule,
    /// Taken exactly once, during unload
    cleanup: Mutex<Option<Cleanup>>,
    /// Shared with the plugin's context; cleared when the plugin is unloaded
    alive: Arc<AtomicBool>,
    loaded_at: DateTime<Utc>,
}

impl LoadedPlugin {
    fn info(&self) -> PluginInfo {
        let plugin = self.module.plugin();
        PluginInfo {
            name: plugin.name().to_string(),
            version: Some(plugin.version().to_string()),
            description: Some(plugin.description().to_string()),
            enabled: true,
            generation: Some(self.module.generation()),
        }
    }
}

/// Aggregate host status
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub uptime: Duration,
    /// Resident memory of the host process
    pub memory_bytes: Option<u64>,
    pub plugin_count: usize,
    /// `None` when the event source could not be asked
    pub group_count: Option<usize>,
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Uptime: {}", format_uptime(self.uptime))?;
        match self.memory_bytes {
            Some(bytes) => writeln!(f, "Memory: {} MB", bytes / 1024 / 1024)?,
            None => writeln!(f, "Memory: unknown")?,
        }
        writeln!(f, "Plugins: {}", self.plugin_count)?;
        match self.group_count {
            Some(count) => write!(f, "Groups: {}", count),
            None => write!(f, "Groups: unknown"),
        }
    }
}

/// Result of loading the enabled list at startup
#[derive(Debug, Default)]
pub struct StartupReport {
    pub loaded: Vec<String>,
    pub failed: Vec<(String, PluginError)>,
}

pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
}

fn process_memory() -> Option<u64> {
    use sysinfo::{ProcessExt, System, SystemExt};

    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_process(pid);
    sys.process(pid).map(|p| p.memory())
}

/// Owns every loaded plugin and drives load / unload / enable / disable / reload.
///
/// Lifecycle operations on the same name are serialized by a per-name lock;
/// operations on different names run independently. The record map, handler
/// registry and cleanup slots are only ever mutated from here.
pub struct PluginManager {
    me: Weak<PluginManager>,
    source: Arc<dyn EventSource>,
    resolver: Arc<dyn PluginResolver>,
    config: Arc<dyn ConfigStore>,
    handlers: HandlerRegistry,
    plugins: RwLock<BTreeMap<String, LoadedPlugin>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    started: Instant,
    shut_down: AtomicBool,
    shutdown_done: AtomicBool,
    shutdown_notify: Notify,
}

impl PluginManager {
    pub fn new(
        source: Arc<dyn EventSource>,
        resolver: Arc<dyn PluginResolver>,
        config: Arc<dyn ConfigStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            handlers: HandlerRegistry::new(source.clone()),
            source,
            resolver,
            config,
            plugins: RwLock::new(BTreeMap::new()),
            locks: Mutex::new(HashMap::new()),
            started: Instant::now(),
            shut_down: AtomicBool::new(false),
            shutdown_done: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        })
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn resolver(&self) -> &Arc<dyn PluginResolver> {
        &self.resolver
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.entry(name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    // ---- load / unload ----

    /// Load a plugin module: run its setup and install its handlers.
    ///
    /// Handlers installed during setup become visible to events dispatched
    /// after the load completes. If setup fails or panics, every handler it
    /// recorded is discarded and the plugin stays unloaded.
    pub async fn load(&self, module: impl Into<PluginModule>) -> Result<(), PluginError> {
        let module = module.into();
        let name = module.name().to_string();
        validate_name(&name)?;
        let _guard = self.lock_name(&name).await;
        self.load_locked(module).await
    }

    async fn load_locked(&self, module: PluginModule) -> Result<(), PluginError> {
        let name = module.name().to_string();
        if self.is_shut_down() {
            return Err(PluginError::ShutDown(name));
        }
        if self.plugins.read().await.contains_key(&name) {
            return Err(PluginError::DuplicateName(name));
        }

        let alive = Arc::new(AtomicBool::new(true));
        let ctx = PluginContext::new(
            name.clone(),
            self.me.clone(),
            self.source.clone(),
            self.config.clone(),
            alive.clone(),
        );

        self.handlers.stage(&name);
        let plugin = module.plugin().clone();
        let outcome = tokio::spawn(async move { plugin.setup(ctx).await }).await;

        let cleanup = match outcome {
            Ok(Ok(cleanup)) => cleanup,
            Ok(Err(e)) => {
                self.roll_back(&name, &alive);
                return Err(match e {
                    e @ PluginError::SetupFailure { .. } => e,
                    e => PluginError::setup(&name, e.to_string()),
                });
            }
            Err(join_error) => {
                self.roll_back(&name, &alive);
                let reason = if join_error.is_panic() {
                    "setup panicked".to_string()
                } else {
                    join_error.to_string()
                };
                return Err(PluginError::setup(&name, reason));
            }
        };

        let mut plugins = self.plugins.write().await;
        // Shutdown sets the flag before it collects names under this lock
        if self.is_shut_down() {
            drop(plugins);
            alive.store(false, Ordering::SeqCst);
            let discarded = self.handlers.abort(&name);
            warn!(plugin = %name, discarded, "Host shut down during setup, plugin not loaded");
            if let Some(cleanup) = cleanup {
                if let Err(e) = run_cleanup(&name, cleanup).await {
                    warn!(plugin = %name, error = %e, "Cleanup failed after aborted load");
                }
            }
            return Err(PluginError::ShutDown(name));
        }
        let live = self.handlers.commit(&name);
        plugins.insert(
            name.clone(),
            LoadedPlugin {
                module,
                cleanup: Mutex::new(cleanup),
                alive,
                loaded_at: Utc::now(),
            },
        );
        drop(plugins);
        info!(plugin = %name, handlers = live, "Plugin loaded");
        Ok(())
    }

    fn roll_back(&self, name: &str, alive: &AtomicBool) {
        alive.store(false, Ordering::SeqCst);
        let discarded = self.handlers.abort(name);
        warn!(plugin = %name, discarded, "Plugin setup failed, rolled back");
    }

    /// Unload a plugin.
    ///
    /// Handlers are unsubscribed first, so no event is delivered to the plugin
    /// once this returns; a handler already running is not cancelled. The
    /// cleanup callback then runs once. A failing cleanup is reported as
    /// `CleanupFailure` but the plugin is removed regardless.
    pub async fn unload(&self, name: &str) -> Result<(), PluginError> {
        let _guard = self.lock_name(name).await;
        self.unload_locked(name).await
    }

    async fn unload_locked(&self, name: &str) -> Result<(), PluginError> {
        let (cleanup, alive, released) = {
            let mut plugins = self.plugins.write().await;
            let Some(entry) = plugins.get_mut(name) else {
                return Err(PluginError::NotFound(name.to_string()));
            };
            let released = self.handlers.release_all(name);
            let cleanup = entry
                .cleanup
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            (cleanup, entry.alive.clone(), released)
        };

        let cleanup_result = match cleanup {
            Some(cleanup) => run_cleanup(name, cleanup).await,
            None => Ok(()),
        };

        let removed = self.plugins.write().await.remove(name);
        alive.store(false, Ordering::SeqCst);

        if let Some(entry) = removed {
            debug!(
                plugin = %name,
                loaded_for = %format_uptime((Utc::now() - entry.loaded_at).to_std().unwrap_or_default()),
                "Plugin record removed"
            );
        }
        match &cleanup_result {
            Ok(()) => info!(plugin = %name, handlers = released, "Plugin unloaded"),
            Err(e) => warn!(plugin = %name, error = %e, "Plugin unloaded, cleanup failed"),
        }
        cleanup_result
    }

    // ---- enable / disable / reload ----

    /// Resolve the plugin by name, load it and add it to the enabled list.
    ///
    /// If the enabled list cannot be saved the load is undone and `Persist`
    /// is returned with the plugin unloaded.
    pub async fn enable(&self, name: &str) -> Result<(), PluginError> {
        validate_name(name)?;
        let _guard = self.lock_name(name).await;
        self.enable_locked(name).await
    }

    async fn enable_locked(&self, name: &str) -> Result<(), PluginError> {
        if self.is_loaded(name).await {
            return Err(PluginError::AlreadyEnabled(name.to_string()));
        }
        self.resolve_and_load(name).await?;
        match self.config.add_enabled(name) {
            Ok(true) => debug!(plugin = %name, "Added to enabled list"),
            Ok(false) => {}
            Err(e) => {
                error!(plugin = %name, error = %e, "Failed to save enabled list, undoing load");
                if let Err(unload_error) = self.unload_locked(name).await {
                    warn!(plugin = %name, error = %unload_error, "Error while undoing load");
                }
                return Err(PluginError::Persist {
                    name: name.to_string(),
                    loaded: false,
                    source: e,
                });
            }
        }
        info!(plugin = %name, "Plugin enabled");
        Ok(())
    }

    async fn resolve_and_load(&self, name: &str) -> Result<(), PluginError> {
        if self.is_shut_down() {
            return Err(PluginError::ShutDown(name.to_string()));
        }
        let resolver = self.resolver.clone();
        let owned = name.to_string();
        let module = tokio::task::spawn_blocking(move || resolver.resolve(&owned))
            .await
            .map_err(|e| PluginError::resolution(name, e.to_string()))??;

        if module.name() != name {
            return Err(PluginError::InvalidPluginShape {
                name: name.to_string(),
                reason: format!("module declares the name '{}'", module.name()),
            });
        }
        self.load_locked(module).await
    }

    /// Unload the plugin and remove it from the enabled list.
    ///
    /// A `CleanupFailure` result still means the plugin was disabled. If the
    /// enabled list cannot be saved the plugin stays unloaded and `Persist`
    /// is returned.
    pub async fn disable(&self, name: &str) -> Result<(), PluginError> {
        let _guard = self.lock_name(name).await;
        self.disable_locked(name).await
    }

    async fn disable_locked(&self, name: &str) -> Result<(), PluginError> {
        let cleanup_error = match self.unload_locked(name).await {
            Ok(()) => None,
            Err(e @ PluginError::CleanupFailure { .. }) => Some(e),
            Err(e) => return Err(e),
        };
        match self.config.remove_enabled(name) {
            Ok(true) => debug!(plugin = %name, "Removed from enabled list"),
            Ok(false) => {}
            Err(e) => {
                error!(plugin = %name, error = %e, "Plugin unloaded but enabled list not saved");
                return Err(PluginError::Persist {
                    name: name.to_string(),
                    loaded: false,
                    source: e,
                });
            }
        }
        info!(plugin = %name, "Plugin disabled");
        match cleanup_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Disable then enable, resolving the module afresh.
    ///
    /// Not atomic: an event arriving between the two phases sees no plugin.
    ///
    /// An error before the old instance is unloaded (`NotFound`) is returned
    /// as is and changes nothing. Once it is unloaded, cleanup and enabled-list
    /// failures are logged and the enable phase still runs; if that fails the
    /// plugin stays unloaded, reported as `ReloadIncomplete`.
    pub async fn reload(&self, name: &str) -> Result<(), PluginError> {
        let _guard = self.lock_name(name).await;
        match self.disable_locked(name).await {
            Ok(()) => {}
            Err(e @ (PluginError::CleanupFailure { .. } | PluginError::Persist { .. })) => {
                warn!(plugin = %name, error = %e, "Continuing reload after disable error");
            }
            Err(e) => return Err(e),
        }

        self.resolver.invalidate(name);
        self.enable_locked(name).await.map_err(|e| {
            error!(plugin = %name, error = %e, "Reload failed after disable, plugin is unloaded");
            PluginError::ReloadIncomplete {
                name: name.to_string(),
                source: Box::new(e),
            }
        })?;
        info!(plugin = %name, "Plugin reloaded");
        Ok(())
    }

    // ---- queries ----

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// Exact match first, then the first case-insensitive match
    pub async fn find_by_name(&self, name: &str) -> Option<PluginInfo> {
        let plugins = self.plugins.read().await;
        if let Some(entry) = plugins.get(name) {
            return Some(entry.info());
        }
        let lower = name.to_lowercase();
        plugins
            .iter()
            .find(|(key, _)| key.to_lowercase() == lower)
            .map(|(_, entry)| entry.info())
    }

    /// Loaded plugins only
    pub async fn loaded(&self) -> Vec<PluginInfo> {
        self.plugins
            .read()
            .await
            .values()
            .map(LoadedPlugin::info)
            .collect()
    }

    /// Every loaded plugin, followed by catalog entries that could be enabled
    pub async fn list(&self) -> Vec<PluginInfo> {
        let mut infos = self.loaded().await;
        let mut catalog = self.resolver.available();
        catalog.sort();
        catalog.dedup();
        for name in catalog {
            if !infos.iter().any(|i| i.name == name) {
                infos.push(PluginInfo::placeholder(name));
            }
        }
        infos
    }

    pub async fn status(&self) -> HostStatus {
        let group_count = match self.source.call(Action::GetGroupList).await {
            Ok(groups) => groups.as_array().map(Vec::len),
            Err(e) => {
                warn!(error = %e, "Failed to query group list");
                None
            }
        };
        HostStatus {
            uptime: self.started.elapsed(),
            memory_bytes: process_memory(),
            plugin_count: self.plugins.read().await.len(),
            group_count,
        }
    }

    // ---- host lifecycle ----

    /// Load every plugin on the enabled list.
    ///
    /// A failing plugin is logged and reported; it does not stop the others.
    pub async fn load_enabled(&self) -> StartupReport {
        let mut report = StartupReport::default();
        for name in self.config.enabled_plugins() {
            let result = match validate_name(&name) {
                Ok(()) => {
                    let _guard = self.lock_name(&name).await;
                    if self.is_loaded(&name).await {
                        continue;
                    }
                    self.resolve_and_load(&name).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.loaded.push(name),
                Err(e) => {
                    error!(plugin = %name, error = %e, "Failed to load plugin");
                    report.failed.push((name, e));
                }
            }
        }
        info!(loaded = report.loaded.len(), failed = report.failed.len(), "Startup plugins processed");
        report
    }

    /// Unload every plugin, disconnect the event source and wake waiters.
    ///
    /// Loads started afterwards fail with `ShutDown`.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down plugin host");
        let names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        for name in names {
            match self.unload(&name).await {
                Ok(()) | Err(PluginError::NotFound(_)) => {}
                Err(e) => warn!(plugin = %name, error = %e, "Error while unloading during shutdown"),
            }
        }
        self.source.disconnect().await;
        self.shutdown_done.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Resolve once [`PluginManager::shutdown`] has finished
    pub async fn wait_for_shutdown(&self) {
        let notified = self.shutdown_notify.notified();
        if self.shutdown_done.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }
}

async fn run_cleanup(name: &str, cleanup: Cleanup) -> Result<(), PluginError> {
    match tokio::spawn(cleanup.run()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e @ PluginError::CleanupFailure { .. })) => Err(e),
        Ok(Err(e)) => Err(PluginError::cleanup(name, e.to_string())),
        Err(join_error) if join_error.is_panic() => Err(PluginError::cleanup(name, "cleanup panicked")),
        Err(join_error) => Err(PluginError::cleanup(name, join_error.to_string())),
    }
}
