//! Handler registry - Tracks every subscription a plugin made so unload can undo it

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::application::errors::PluginError;
use crate::domain::entities::EventKind;
use crate::domain::traits::{EventSource, Handler, HandlerId};

struct Entry {
    kind: EventKind,
    handler: Handler,
}

#[derive(Default)]
struct Sets {
    /// Handlers live on the event source, one set per loaded plugin
    installed: HashMap<String, Vec<Entry>>,
    /// Handlers recorded during a setup that has not committed yet
    staged: HashMap<String, Vec<Entry>>,
}

fn push_unique(list: &mut Vec<Entry>, kind: EventKind, handler: &Handler) -> bool {
    if list.iter().any(|e| e.kind == kind && e.handler == *handler) {
        return false;
    }
    list.push(Entry {
        kind,
        handler: handler.clone(),
    });
    true
}

/// Registry of handlers per plugin name.
///
/// Every subscription a context makes goes through [`HandlerRegistry::record`];
/// that is what lets [`HandlerRegistry::release_all`] tear a plugin down
/// completely. Handlers recorded while a plugin is still in `setup` are staged
/// and only reach the event source on [`HandlerRegistry::commit`], so a failed
/// setup never leaves a live handler behind.
pub struct HandlerRegistry {
    source: Arc<dyn EventSource>,
    sets: Mutex<Sets>,
}

impl HandlerRegistry {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self {
            source,
            sets: Mutex::new(Sets::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sets> {
        // The sets stay consistent even if a holder panicked
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a staging set for a plugin about to run `setup`
    pub fn stage(&self, name: &str) {
        self.lock().staged.insert(name.to_string(), Vec::new());
    }

    /// Record a handler for `name`.
    ///
    /// Returns false when the same handler was already recorded for `kind`.
    /// Fails with `StaleContext` when `name` is neither loading nor loaded.
    pub fn record(&self, name: &str, kind: EventKind, handler: Handler) -> Result<bool, PluginError> {
        let mut sets = self.lock();
        if let Some(list) = sets.installed.get_mut(name) {
            let added = push_unique(list, kind, &handler);
            if added {
                self.source.subscribe(kind, handler);
            }
            return Ok(added);
        }
        if let Some(list) = sets.staged.get_mut(name) {
            return Ok(push_unique(list, kind, &handler));
        }
        Err(PluginError::StaleContext(name.to_string()))
    }

    /// Remove one handler; returns whether it was recorded
    pub fn forget(&self, name: &str, kind: EventKind, id: HandlerId) -> bool {
        let mut sets = self.lock();
        if let Some(list) = sets.installed.get_mut(name) {
            let before = list.len();
            list.retain(|e| !(e.kind == kind && e.handler.id() == id));
            if list.len() != before {
                self.source.unsubscribe(kind, id);
                return true;
            }
            return false;
        }
        if let Some(list) = sets.staged.get_mut(name) {
            let before = list.len();
            list.retain(|e| !(e.kind == kind && e.handler.id() == id));
            return list.len() != before;
        }
        false
    }

    /// Subscribe every staged handler of `name`; returns how many went live
    pub fn commit(&self, name: &str) -> usize {
        let mut sets = self.lock();
        let staged = sets.staged.remove(name).unwrap_or_default();
        for entry in &staged {
            self.source.subscribe(entry.kind, entry.handler.clone());
        }
        let count = staged.len();
        sets.installed.insert(name.to_string(), staged);
        count
    }

    /// Throw away the staging set of a failed setup
    pub fn abort(&self, name: &str) -> usize {
        self.lock().staged.remove(name).map(|s| s.len()).unwrap_or(0)
    }

    /// Unsubscribe every handler of `name` and clear its set.
    ///
    /// Unsubscription is attempted for every event kind, not only the one a
    /// handler was recorded under. Returns the number of handlers released.
    pub fn release_all(&self, name: &str) -> usize {
        let mut sets = self.lock();
        let entries: Vec<Entry> = sets
            .installed
            .remove(name)
            .into_iter()
            .chain(sets.staged.remove(name))
            .flatten()
            .collect();
        drop(sets);

        let ids: HashSet<HandlerId> = entries.iter().map(|e| e.handler.id()).collect();
        for id in &ids {
            for kind in EventKind::ALL {
                self.source.unsubscribe(kind, *id);
            }
        }
        tracing::debug!(plugin = %name, handlers = entries.len(), "Handlers released");
        entries.len()
    }

    /// Number of live handlers recorded for `name`
    pub fn count(&self, name: &str) -> usize {
        self.lock().installed.get(name).map(Vec::len).unwrap_or(0)
    }

    /// Names with at least one live handler
    pub fn installed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .installed
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginErrorKind;
    use crate::application::messaging::LocalEventSource;

    fn noop() -> Handler {
        Handler::new(|_| async { Ok(()) })
    }

    fn registry() -> (Arc<LocalEventSource>, HandlerRegistry) {
        let source = Arc::new(LocalEventSource::new());
        let registry = HandlerRegistry::new(source.clone());
        (source, registry)
    }

    #[test]
    fn test_staged_handlers_are_not_live_until_commit() {
        let (source, registry) = registry();
        registry.stage("echo");
        assert!(registry.record("echo", EventKind::Message, noop()).unwrap());
        assert_eq!(source.total_subscribers(), 0);
        assert!(registry.installed_names().is_empty());

        assert_eq!(registry.commit("echo"), 1);
        assert_eq!(source.subscriber_count(EventKind::Message), 1);
        assert_eq!(registry.installed_names(), vec!["echo"]);
    }

    #[test]
    fn test_abort_discards_staged_handlers() {
        let (source, registry) = registry();
        registry.stage("echo");
        registry.record("echo", EventKind::Message, noop()).unwrap();
        assert_eq!(registry.abort("echo"), 1);
        assert_eq!(source.total_subscribers(), 0);

        let err = registry.record("echo", EventKind::Message, noop()).unwrap_err();
        assert_eq!(err.kind(), PluginErrorKind::StaleContext);
    }

    #[test]
    fn test_recording_twice_is_idempotent() {
        let (source, registry) = registry();
        registry.stage("echo");
        registry.commit("echo");

        let handler = noop();
        assert!(registry.record("echo", EventKind::Message, handler.clone()).unwrap());
        assert!(!registry.record("echo", EventKind::Message, handler).unwrap());
        assert_eq!(registry.count("echo"), 1);
        assert_eq!(source.subscriber_count(EventKind::Message), 1);
    }

    #[test]
    fn test_release_all_unsubscribes_every_kind() {
        let (source, registry) = registry();
        registry.stage("multi");
        registry.commit("multi");
        let shared = noop();
        registry.record("multi", EventKind::Message, shared.clone()).unwrap();
        registry.record("multi", EventKind::Notice, shared).unwrap();
        registry.record("multi", EventKind::Meta, noop()).unwrap();
        assert_eq!(source.total_subscribers(), 3);

        assert_eq!(registry.release_all("multi"), 3);
        assert_eq!(source.total_subscribers(), 0);
        assert_eq!(registry.count("multi"), 0);
        assert!(registry.record("multi", EventKind::Message, noop()).is_err());
    }

    #[test]
    fn test_forget_unsubscribes_one_handler() {
        let (source, registry) = registry();
        registry.stage("echo");
        registry.commit("echo");
        let keep = noop();
        let drop_me = noop();
        registry.record("echo", EventKind::Message, keep).unwrap();
        registry.record("echo", EventKind::Message, drop_me.clone()).unwrap();

        assert!(registry.forget("echo", EventKind::Message, drop_me.id()));
        assert!(!registry.forget("echo", EventKind::Message, drop_me.id()));
        assert_eq!(registry.count("echo"), 1);
        assert_eq!(source.subscriber_count(EventKind::Message), 1);
    }

    #[test]
    fn test_handlers_of_other_plugins_survive_release() {
        let (source, registry) = registry();
        for name in ["a", "b"] {
            registry.stage(name);
            registry.record(name, EventKind::Message, noop()).unwrap();
            registry.commit(name);
        }
        registry.release_all("a");
        assert_eq!(registry.installed_names(), vec!["b"]);
        assert_eq!(source.subscriber_count(EventKind::Message), 1);
    }
}
