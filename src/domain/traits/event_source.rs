use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use crate::domain::entities::{Action, Event, EventKind};
use crate::application::errors::{BotError, PluginError};

/// Boxed, sendable future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result returned by an event handler
pub type HandlerResult = Result<(), PluginError>;

type HandlerFn = dyn Fn(Event) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// Identity of a handler; two clones of a [`Handler`] share it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(uuid::Uuid);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event callback with a stable identity
#[derive(Clone)]
pub struct Handler {
    id: HandlerId,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            id: HandlerId(uuid::Uuid::new_v4()),
            func: Arc::new(move |event| Box::pin(f(event))),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn call(&self, event: Event) -> BoxFuture<'static, HandlerResult> {
        (self.func)(event)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

/// Event source - the connection that delivers events and accepts actions
///
/// Subscription changes are plain table mutations and take effect for the
/// next dispatched event.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Deliver future events of `kind` to `handler`
    fn subscribe(&self, kind: EventKind, handler: Handler);

    /// Stop delivering `kind` events to the handler; false if it was not subscribed
    fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool;

    /// Perform an outbound call
    async fn call(&self, action: Action) -> Result<serde_json::Value, BotError>;

    /// Close the connection
    async fn disconnect(&self);
}
