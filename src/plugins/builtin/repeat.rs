//! Repeat plugin - echoes a group message once it has been sent three times in a row

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use crate::application::errors::PluginError;
use crate::domain::entities::Segment;
use crate::domain::traits::Handler;
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Cleanup, Plugin};

pub const NAME: &str = "repeat";

/// Identical consecutive messages needed before the bot joins in
pub const THRESHOLD: usize = 3;

/// Tracks the current run of identical messages per group
#[derive(Debug, Default)]
pub struct RepeatTracker {
    runs: HashMap<String, (Vec<Segment>, usize)>,
}

impl RepeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message; returns true when it should be repeated now
    pub fn observe(&mut self, group_id: &str, segments: &[Segment]) -> bool {
        if segments.is_empty() {
            return false;
        }
        let run = self
            .runs
            .entry(group_id.to_string())
            .or_insert_with(|| (Vec::new(), 0));

        if run.0 == segments {
            run.1 += 1;
        } else {
            *run = (segments.to_vec(), 1);
        }

        if run.1 >= THRESHOLD {
            self.runs.remove(group_id);
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.runs.clear();
    }
}

#[derive(Debug, Default)]
pub struct RepeatPlugin;

impl RepeatPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for RepeatPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Joins in when a group repeats the same message"
    }

    async fn setup(&self, ctx: PluginContext) -> Result<Option<Cleanup>, PluginError> {
        let tracker = Arc::new(Mutex::new(RepeatTracker::new()));

        let responder = ctx.clone();
        let seen = tracker.clone();
        ctx.on_message(Handler::new(move |event| {
            let ctx = responder.clone();
            let seen = seen.clone();
            async move {
                let Some(message) = event.as_message() else {
                    return Ok(());
                };
                let Some(group_id) = message.group_id.as_deref() else {
                    return Ok(());
                };
                let repeat = seen
                    .lock()
                    .map(|mut t| t.observe(group_id, &message.segments))
                    .unwrap_or(false);
                if repeat {
                    tracing::debug!(group = %group_id, "Repeating message");
                    ctx.send_group_msg(group_id, message.segments.clone()).await?;
                }
                Ok(())
            }
        }))?;

        Ok(Some(Cleanup::new(move || async move {
            if let Ok(mut t) = tracker.lock() {
                t.clear();
            }
            Ok(())
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Vec<Segment> {
        vec![Segment::text(s)]
    }

    #[test]
    fn test_third_identical_message_triggers() {
        let mut tracker = RepeatTracker::new();
        assert!(!tracker.observe("g1", &text("hi")));
        assert!(!tracker.observe("g1", &text("hi")));
        assert!(tracker.observe("g1", &text("hi")));
        // The run starts over after repeating
        assert!(!tracker.observe("g1", &text("hi")));
    }

    #[test]
    fn test_different_message_resets_run() {
        let mut tracker = RepeatTracker::new();
        tracker.observe("g1", &text("hi"));
        tracker.observe("g1", &text("hi"));
        assert!(!tracker.observe("g1", &text("yo")));
        assert!(!tracker.observe("g1", &text("hi")));
    }

    #[test]
    fn test_groups_are_tracked_separately() {
        let mut tracker = RepeatTracker::new();
        tracker.observe("g1", &text("hi"));
        tracker.observe("g2", &text("hi"));
        tracker.observe("g1", &text("hi"));
        assert!(!tracker.observe("g2", &text("yo")));
        assert!(tracker.observe("g1", &text("hi")));
    }

    #[test]
    fn test_empty_message_is_ignored() {
        let mut tracker = RepeatTracker::new();
        for _ in 0..THRESHOLD {
            assert!(!tracker.observe("g1", &[]));
        }
    }
}
