//! In-process event source - Routes events to subscribed handlers

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use crate::application::errors::BotError;
use crate::domain::entities::{Action, Event, EventKind};
use crate::domain::traits::{EventSource, Handler, HandlerId};

/// Event source that lives in the host process
///
/// Used by the console adapter and by tests. Events are pushed in with
/// [`LocalEventSource::dispatch`]; outbound actions are collected in an outbox
/// and optionally forwarded on a channel.
pub struct LocalEventSource {
    subscribers: RwLock<HashMap<EventKind, Vec<Handler>>>,
    outbox: Mutex<Vec<Action>>,
    forward: Option<mpsc::UnboundedSender<Action>>,
    groups: RwLock<Vec<serde_json::Value>>,
    next_message_id: AtomicI64,
    connected: AtomicBool,
}

impl LocalEventSource {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
            forward: None,
            groups: RwLock::new(Vec::new()),
            next_message_id: AtomicI64::new(1),
            connected: AtomicBool::new(true),
        }
    }

    /// Forward every outbound action to `sender`
    pub fn with_forward(mut self, sender: mpsc::UnboundedSender<Action>) -> Self {
        self.forward = Some(sender);
        self
    }

    /// Groups reported by `get_group_list`
    pub fn with_groups(self, groups: Vec<(String, String)>) -> Self {
        if let Ok(mut g) = self.groups.write() {
            *g = groups
                .into_iter()
                .map(|(id, name)| json!({ "group_id": id, "group_name": name, "member_count": 0, "max_member_count": 0 }))
                .collect();
        }
        self
    }

    /// Deliver an event to every handler subscribed to its kind.
    ///
    /// The subscriber list is snapshotted when dispatch starts, so handlers
    /// added meanwhile only see later events. Each handler is checked again
    /// right before it runs, so one unsubscribed mid-dispatch is skipped.
    /// Returns the number of handlers invoked.
    pub async fn dispatch(&self, event: Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Handler> = match self.subscribers.read() {
            Ok(subs) => subs.get(&kind).cloned().unwrap_or_default(),
            Err(_) => {
                tracing::error!("Subscriber table poisoned, dropping event");
                return 0;
            }
        };

        let mut invoked = 0;
        for handler in snapshot {
            if !self.is_subscribed(kind, handler.id()) {
                continue;
            }
            invoked += 1;
            if let Err(e) = handler.call(event.clone()).await {
                tracing::warn!(kind = kind.as_str(), handler = %handler.id(), error = %e, "Handler failed");
            }
        }
        tracing::debug!(kind = kind.as_str(), invoked, "Event dispatched");
        invoked
    }

    pub fn is_subscribed(&self, kind: EventKind, id: HandlerId) -> bool {
        self.subscribers
            .read()
            .ok()
            .and_then(|subs| subs.get(&kind).map(|list| list.iter().any(|h| h.id() == id)))
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .read()
            .ok()
            .and_then(|subs| subs.get(&kind).map(Vec::len))
            .unwrap_or(0)
    }

    /// Total subscriptions across all kinds
    pub fn total_subscribers(&self) -> usize {
        EventKind::ALL.iter().map(|k| self.subscriber_count(*k)).sum()
    }

    /// Actions performed so far
    pub fn outbox(&self) -> Vec<Action> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Drain the outbox
    pub fn take_outbox(&self) -> Vec<Action> {
        self.outbox
            .lock()
            .map(|mut o| std::mem::take(&mut *o))
            .unwrap_or_default()
    }

    /// Text of every message sent so far
    pub fn sent_texts(&self) -> Vec<String> {
        self.outbox().iter().filter_map(Action::message_text).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn respond_to(&self, action: &Action) -> serde_json::Value {
        match action {
            Action::SendGroupMsg { .. } | Action::SendPrivateMsg { .. } => {
                json!({ "message_id": self.next_message_id.fetch_add(1, Ordering::SeqCst) })
            }
            Action::GetGroupList => self
                .groups
                .read()
                .map(|g| serde_json::Value::Array(g.clone()))
                .unwrap_or(serde_json::Value::Null),
            Action::GetGroupInfo { group_id } => self
                .groups
                .read()
                .ok()
                .and_then(|g| g.iter().find(|v| v["group_id"] == *group_id).cloned())
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        }
    }
}

impl Default for LocalEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for LocalEventSource {
    fn subscribe(&self, kind: EventKind, handler: Handler) {
        match self.subscribers.write() {
            Ok(mut subs) => {
                let list = subs.entry(kind).or_default();
                if !list.contains(&handler) {
                    list.push(handler);
                }
            }
            Err(_) => tracing::error!("Subscriber table poisoned, subscription dropped"),
        }
    }

    fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let Ok(mut subs) = self.subscribers.write() else {
            return false;
        };
        let Some(list) = subs.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| h.id() != id);
        list.len() != before
    }

    async fn call(&self, action: Action) -> Result<serde_json::Value, BotError> {
        if !self.is_connected() {
            return Err(BotError::Disconnected);
        }

        let response = self.respond_to(&action);
        if let Some(text) = action.message_text() {
            tracing::info!(action = action.name(), "Sent: {}", text);
        }
        if let Some(forward) = &self.forward {
            if forward.send(action.clone()).is_err() {
                tracing::debug!("Action forward channel closed");
            }
        }
        self.outbox
            .lock()
            .map_err(|_| BotError::Internal("Outbox lock poisoned".to_string()))?
            .push(action);
        Ok(response)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Event source disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{MessageEvent, Segment};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counting_handler(counter: Arc<AtomicUsize>) -> Handler {
        Handler::new(move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_dispatch_reaches_only_matching_kind() {
        let source = LocalEventSource::new();
        let counter = Arc::new(AtomicUsize::new(0));
        source.subscribe(EventKind::Notice, counting_handler(counter.clone()));

        let invoked = source.dispatch(MessageEvent::private("1", "hi").into()).await;
        assert_eq!(invoked, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subscribe_same_handler_twice_is_single() {
        let source = LocalEventSource::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());
        source.subscribe(EventKind::Message, handler.clone());
        source.subscribe(EventKind::Message, handler.clone());

        source.dispatch(MessageEvent::private("1", "hi").into()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(source.unsubscribe(EventKind::Message, handler.id()));
        assert!(!source.unsubscribe(EventKind::Message, handler.id()));
        source.dispatch(MessageEvent::private("1", "hi").into()).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_unsubscribed_mid_dispatch_is_skipped() {
        let source = Arc::new(LocalEventSource::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let second = counting_handler(counter.clone());
        let second_id = second.id();

        let src = source.clone();
        let first = Handler::new(move |_event| {
            let src = src.clone();
            async move {
                src.unsubscribe(EventKind::Message, second_id);
                Ok(())
            }
        });
        source.subscribe(EventKind::Message, first);
        source.subscribe(EventKind::Message, second);

        let invoked = source.dispatch(MessageEvent::private("1", "hi").into()).await;
        assert_eq!(invoked, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_calls_are_recorded_and_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = LocalEventSource::new().with_forward(tx);
        let reply = source
            .call(Action::SendPrivateMsg {
                user_id: "1".to_string(),
                message: vec![Segment::text("pong")],
            })
            .await
            .unwrap();

        assert_eq!(reply["message_id"], 1);
        assert_eq!(source.sent_texts(), vec!["pong"]);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_calls_fail_after_disconnect() {
        let source = LocalEventSource::new();
        source.disconnect().await;
        let result = source.call(Action::GetGroupList).await;
        assert!(matches!(result, Err(BotError::Disconnected)));
    }

    #[tokio::test]
    async fn test_group_list() {
        let source = LocalEventSource::new()
            .with_groups(vec![("100".to_string(), "rust".to_string())]);
        let groups = source.call(Action::GetGroupList).await.unwrap();
        assert_eq!(groups.as_array().map(Vec::len), Some(1));
        let info = source
            .call(Action::GetGroupInfo { group_id: "100".to_string() })
            .await
            .unwrap();
        assert_eq!(info["group_name"], "rust");
    }
}
