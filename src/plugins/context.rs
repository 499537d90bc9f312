//! Plugin context - The capability surface handed to a plugin's `setup`

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use crate::application::errors::{ConfigError, PluginError};
use crate::domain::entities::action::{DEFAULT_MUTE_SECS, MAX_LIKES};
use crate::domain::entities::{Action, Event, EventKind, MessageEvent, Role, Segment};
use crate::domain::traits::{ConfigStore, EventSource, Handler};
use super::manager::{HostStatus, PluginManager};
use super::trait_def::PluginInfo;

/// Capabilities bound to one plugin.
///
/// Built fresh for every load and never shared between plugins. Once the
/// owning plugin is unloaded every fallible call returns `StaleContext`.
#[derive(Clone)]
pub struct PluginContext {
    name: String,
    manager: Weak<PluginManager>,
    source: Arc<dyn EventSource>,
    config: Arc<dyn ConfigStore>,
    alive: Arc<AtomicBool>,
}

impl PluginContext {
    pub(crate) fn new(
        name: impl Into<String>,
        manager: Weak<PluginManager>,
        source: Arc<dyn EventSource>,
        config: Arc<dyn ConfigStore>,
        alive: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: name.into(),
            manager,
            source,
            config,
            alive,
        }
    }

    /// Name of the owning plugin
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> Result<(), PluginError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(PluginError::StaleContext(self.name.clone()))
        }
    }

    fn manager(&self) -> Result<Arc<PluginManager>, PluginError> {
        self.ensure_alive()?;
        self.manager
            .upgrade()
            .ok_or_else(|| PluginError::StaleContext(self.name.clone()))
    }

    // ---- subscriptions ----

    /// Subscribe `handler` to events of `kind`
    pub fn on(&self, kind: EventKind, handler: Handler) -> Result<(), PluginError> {
        let manager = self.manager()?;
        manager.handlers().record(&self.name, kind, handler)?;
        Ok(())
    }

    /// Subscribe `handler` to message events
    pub fn on_message(&self, handler: Handler) -> Result<(), PluginError> {
        self.on(EventKind::Message, handler)
    }

    /// Remove a subscription made with [`PluginContext::on`]
    pub fn off(&self, kind: EventKind, handler: &Handler) -> Result<bool, PluginError> {
        let manager = self.manager()?;
        Ok(manager.handlers().forget(&self.name, kind, handler.id()))
    }

    // ---- outbound actions ----

    /// Send a raw action to the event source
    pub async fn call(&self, action: Action) -> Result<serde_json::Value, PluginError> {
        self.ensure_alive()?;
        self.source
            .call(action)
            .await
            .map_err(|e| PluginError::action(&self.name, e))
    }

    /// Escape hatch for protocol calls without a typed variant
    pub async fn raw(&self, name: impl Into<String>, params: serde_json::Value) -> Result<serde_json::Value, PluginError> {
        self.call(Action::Raw { name: name.into(), params }).await
    }

    /// Reply to the chat `event` came from; returns the new message id
    pub async fn respond(&self, event: &MessageEvent, text: impl Into<String>) -> Result<Option<i64>, PluginError> {
        let message = vec![Segment::text(text)];
        let action = match &event.group_id {
            Some(group_id) if event.is_group() => Action::SendGroupMsg {
                group_id: group_id.clone(),
                message,
            },
            _ => Action::SendPrivateMsg {
                user_id: event.user_id.clone(),
                message,
            },
        };
        let reply = self.call(action).await?;
        Ok(reply["message_id"].as_i64())
    }

    pub async fn send_group_msg(&self, group_id: &str, message: Vec<Segment>) -> Result<Option<i64>, PluginError> {
        let reply = self
            .call(Action::SendGroupMsg { group_id: group_id.to_string(), message })
            .await?;
        Ok(reply["message_id"].as_i64())
    }

    pub async fn send_private_msg(&self, user_id: &str, message: Vec<Segment>) -> Result<Option<i64>, PluginError> {
        let reply = self
            .call(Action::SendPrivateMsg { user_id: user_id.to_string(), message })
            .await?;
        Ok(reply["message_id"].as_i64())
    }

    pub async fn recall(&self, message_id: i64) -> Result<(), PluginError> {
        self.call(Action::DeleteMsg { message_id }).await.map(|_| ())
    }

    pub async fn get_msg(&self, message_id: i64) -> Result<serde_json::Value, PluginError> {
        self.call(Action::GetMsg { message_id }).await
    }

    /// Like a user's profile; `times` is clamped to 1..=50
    pub async fn send_like(&self, user_id: &str, times: u32) -> Result<(), PluginError> {
        let times = times.clamp(1, MAX_LIKES);
        self.call(Action::SendLike { user_id: user_id.to_string(), times }).await.map(|_| ())
    }

    pub async fn kick(&self, group_id: &str, user_id: &str, reject_add_request: bool) -> Result<(), PluginError> {
        self.call(Action::SetGroupKick {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            reject_add_request,
        })
        .await
        .map(|_| ())
    }

    /// Mute a member; `None` uses the default of 30 minutes, `Some(0)` unmutes
    pub async fn mute(&self, group_id: &str, user_id: &str, duration_secs: Option<u64>) -> Result<(), PluginError> {
        self.call(Action::SetGroupBan {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            duration: duration_secs.unwrap_or(DEFAULT_MUTE_SECS),
        })
        .await
        .map(|_| ())
    }

    pub async fn mute_group(&self, group_id: &str, enable: bool) -> Result<(), PluginError> {
        self.call(Action::SetGroupWholeBan { group_id: group_id.to_string(), enable })
            .await
            .map(|_| ())
    }

    pub async fn set_admin(&self, group_id: &str, user_id: &str, enable: bool) -> Result<(), PluginError> {
        self.call(Action::SetGroupAdmin {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            enable,
        })
        .await
        .map(|_| ())
    }

    /// Set a member's card; an empty card clears it
    pub async fn set_group_card(&self, group_id: &str, user_id: &str, card: &str) -> Result<(), PluginError> {
        self.call(Action::SetGroupCard {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            card: card.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn set_group_name(&self, group_id: &str, group_name: &str) -> Result<(), PluginError> {
        self.call(Action::SetGroupName {
            group_id: group_id.to_string(),
            group_name: group_name.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn set_title(&self, group_id: &str, user_id: &str, title: &str) -> Result<(), PluginError> {
        self.call(Action::SetGroupSpecialTitle {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            special_title: title.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn quit_group(&self, group_id: &str) -> Result<(), PluginError> {
        self.call(Action::SetGroupLeave { group_id: group_id.to_string() })
            .await
            .map(|_| ())
    }

    pub async fn group_list(&self) -> Result<serde_json::Value, PluginError> {
        self.call(Action::GetGroupList).await
    }

    pub async fn group_info(&self, group_id: &str) -> Result<serde_json::Value, PluginError> {
        self.call(Action::GetGroupInfo { group_id: group_id.to_string() }).await
    }

    pub async fn member_info(&self, group_id: &str, user_id: &str, no_cache: bool) -> Result<serde_json::Value, PluginError> {
        self.call(Action::GetGroupMemberInfo {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            no_cache,
        })
        .await
    }

    // ---- permissions ----

    pub fn is_owner(&self, event: &Event) -> bool {
        event.user_id().is_some_and(|id| self.config.is_owner(id))
    }

    /// Owners count as admins
    pub fn is_admin(&self, event: &Event) -> bool {
        event.user_id().is_some_and(|id| self.config.is_admin(id))
    }

    pub fn is_group_owner(&self, event: &MessageEvent) -> bool {
        event.is_group() && event.sender.role == Role::Owner
    }

    pub fn is_group_admin(&self, event: &MessageEvent) -> bool {
        event.is_group() && matches!(event.sender.role, Role::Owner | Role::Admin)
    }

    pub fn add_admin(&self, user_id: &str) -> Result<bool, PluginError> {
        self.ensure_alive()?;
        Ok(self.config.add_admin(user_id)?)
    }

    pub fn remove_admin(&self, user_id: &str) -> Result<bool, PluginError> {
        self.ensure_alive()?;
        Ok(self.config.remove_admin(user_id)?)
    }

    /// Command prefix configured for the host
    pub fn prefix(&self) -> String {
        self.config.prefix()
    }

    // ---- storage ----

    /// Per-plugin data directory, created on first use
    pub fn data_dir(&self) -> Result<PathBuf, PluginError> {
        self.ensure_alive()?;
        ensure_dir(self.config.data_dir().join(&self.name))
    }

    /// Per-plugin configuration directory, created on first use
    pub fn config_dir(&self) -> Result<PathBuf, PluginError> {
        self.ensure_alive()?;
        ensure_dir(self.config.config_dir().join(&self.name))
    }

    // ---- manager self-service ----

    /// Loaded plugins plus not-yet-enabled catalog entries
    pub async fn list_plugins(&self) -> Result<Vec<PluginInfo>, PluginError> {
        Ok(self.manager()?.list().await)
    }

    pub async fn find_plugin(&self, name: &str) -> Result<Option<PluginInfo>, PluginError> {
        Ok(self.manager()?.find_by_name(name).await)
    }

    pub async fn enable_plugin(&self, name: &str) -> Result<(), PluginError> {
        self.manager()?.enable(name).await
    }

    pub async fn disable_plugin(&self, name: &str) -> Result<(), PluginError> {
        self.manager()?.disable(name).await
    }

    /// Not atomic: between the two phases the plugin is absent
    pub async fn reload_plugin(&self, name: &str) -> Result<(), PluginError> {
        self.manager()?.reload(name).await
    }

    pub async fn status(&self) -> Result<HostStatus, PluginError> {
        Ok(self.manager()?.status().await)
    }

    /// Unload every plugin and disconnect the event source
    pub async fn shutdown(&self) -> Result<(), PluginError> {
        self.manager()?.shutdown().await;
        Ok(())
    }
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf, PluginError> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(ConfigError::from)?;
    }
    Ok(dir)
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}
