//! Console adapter for development/testing
//!
//! Every line typed on stdin becomes a message event from one console user;
//! actions the plugins perform are printed back.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use crate::application::messaging::LocalEventSource;
use crate::domain::entities::{Action, Event, MessageEvent, Sender};

pub const CONSOLE_USER: &str = "console";

/// Console front end for a [`LocalEventSource`]
pub struct ConsoleAdapter {
    source: Arc<LocalEventSource>,
    user_id: String,
    group_id: Option<String>,
    next_message_id: AtomicI64,
}

impl ConsoleAdapter {
    pub fn new(source: Arc<LocalEventSource>) -> Self {
        Self {
            source,
            user_id: CONSOLE_USER.to_string(),
            group_id: None,
            next_message_id: AtomicI64::new(1),
        }
    }

    /// Send lines as this user
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Send lines as group messages instead of private ones
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Build the event for one input line; blank lines produce none
    pub fn event_for(&self, line: &str) -> Option<Event> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        let message = match &self.group_id {
            Some(group_id) => MessageEvent::group(
                group_id.clone(),
                Sender::new(self.user_id.clone()).with_nickname(CONSOLE_USER),
                text,
            ),
            None => MessageEvent::private(self.user_id.clone(), text),
        };
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        Some(message.with_message_id(id).into())
    }

    /// Dispatch every line of `input` until it ends; returns the number of events sent
    pub async fn run<R>(&self, input: R) -> usize
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut sent = 0;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(event) = self.event_for(&line) {
                        self.source.dispatch(event).await;
                        sent += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read console input");
                    break;
                }
            }
        }
        tracing::info!(events = sent, "Console input closed");
        sent
    }

    /// Read from the process stdin
    pub async fn run_stdin(&self) -> usize {
        self.run(BufReader::new(tokio::io::stdin())).await
    }
}

/// Print every forwarded action until the sender side is dropped
pub fn spawn_printer(mut actions: mpsc::UnboundedReceiver<Action>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = actions.recv().await {
            println!("{}", render(&action));
        }
    })
}

fn render(action: &Action) -> String {
    match action.message_text() {
        Some(text) => format!("[BOT] {}", text),
        None => format!("[{}] {}", action.name(), serde_json::to_string(action).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EventKind, Segment};
    use crate::domain::traits::{EventSource, Handler};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_blank_lines_are_skipped() {
        let console = ConsoleAdapter::new(Arc::new(LocalEventSource::new()));
        assert!(console.event_for("   ").is_none());

        let event = console.event_for(" ping ").unwrap();
        let message = event.as_message().unwrap();
        assert_eq!(message.text(), "ping");
        assert_eq!(message.user_id, CONSOLE_USER);
        assert!(!message.is_group());
    }

    #[test]
    fn test_group_mode() {
        let console = ConsoleAdapter::new(Arc::new(LocalEventSource::new()))
            .with_user("42")
            .with_group("100");
        let event = console.event_for("hi").unwrap();
        let message = event.as_message().unwrap();
        assert_eq!(message.group_id.as_deref(), Some("100"));
        assert_eq!(message.user_id, "42");
    }

    #[tokio::test]
    async fn test_run_dispatches_each_line() {
        let source = Arc::new(LocalEventSource::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        source.subscribe(
            EventKind::Message,
            Handler::new(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let console = ConsoleAdapter::new(source);
        let sent = console.run(&b"ping\n\nhello\n"[..]).await;
        assert_eq!(sent, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_render() {
        let reply = Action::SendPrivateMsg {
            user_id: "1".into(),
            message: vec![Segment::text("pong")],
        };
        assert_eq!(render(&reply), "[BOT] pong");
        assert!(render(&Action::GetGroupList).starts_with("[get_group_list]"));
    }
}
