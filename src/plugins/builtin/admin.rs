//! Admin plugin - operator commands for managing plugins and the host

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::application::errors::PluginError;
use crate::application::messaging::{AdminCommand, CommandParser, PluginOp};
use crate::domain::entities::{Event, MessageEvent};
use crate::domain::traits::Handler;
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Cleanup, Plugin, PluginInfo};

pub const NAME: &str = "admin";

#[derive(Debug, Default)]
pub struct AdminPlugin;

impl AdminPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for AdminPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Plugin and host management commands"
    }

    async fn setup(&self, ctx: PluginContext) -> Result<Option<Cleanup>, PluginError> {
        let parser = Arc::new(CommandParser::new(ctx.prefix()));
        let handler_ctx = ctx.clone();
        ctx.on_message(Handler::new(move |event| {
            let ctx = handler_ctx.clone();
            let parser = parser.clone();
            async move { handle(&ctx, &parser, &event).await }
        }))?;
        Ok(None)
    }
}

async fn handle(ctx: &PluginContext, parser: &CommandParser, event: &Event) -> Result<(), PluginError> {
    let Some(message) = event.as_message() else {
        return Ok(());
    };
    let Some(command) = parser.parse(&message.text()) else {
        return Ok(());
    };
    if !ctx.is_admin(event) {
        debug!(user = %message.user_id, "Ignoring command from non-admin");
        return Ok(());
    }
    info!(user = %message.user_id, command = ?command, "Admin command");

    let answer = match command {
        AdminCommand::Help => parser.help(),
        AdminCommand::Settings => {
            let p = parser.prefix();
            format!("〓 settings 〓\n{p}set +admin <@user> - add an admin\n{p}set -admin <@user> - remove an admin")
        }
        AdminCommand::ListPlugins => format_plugin_list(&ctx.list_plugins().await?),
        AdminCommand::Plugin { op, name: None } => format!("Please name the plugin to {}", op.verb()),
        AdminCommand::Plugin { op, name: Some(name) } => run_plugin_op(ctx, message, op, &name).await,
        AdminCommand::UnknownPluginOp(op) => format!("Unknown command: p {}", op),
        AdminCommand::Status => match ctx.status().await {
            Ok(status) => format!("〓 status 〓\n{}", status),
            Err(e) => format!("Failed to read status: {}", e),
        },
        AdminCommand::AddAdmin(arg) | AdminCommand::RemoveAdmin(arg) if !ctx.is_owner(event) => {
            debug!(user = %message.user_id, target = ?arg, "Admin edit refused");
            return Ok(());
        }
        AdminCommand::AddAdmin(arg) => match target(message, arg) {
            None => format!("Usage: {}set +admin <@user>", parser.prefix()),
            Some(user) => match ctx.add_admin(&user) {
                Ok(true) => format!("Added admin: {}", user),
                Ok(false) => format!("{} is already an admin", user),
                Err(e) => format!("Failed to add admin: {}", e),
            },
        },
        AdminCommand::RemoveAdmin(arg) => match target(message, arg) {
            None => format!("Usage: {}set -admin <@user>", parser.prefix()),
            Some(user) => match ctx.remove_admin(&user) {
                Ok(true) => format!("Removed admin: {}", user),
                Ok(false) => format!("{} is not an admin", user),
                Err(e) => format!("Failed to remove admin: {}", e),
            },
        },
        AdminCommand::Exit => {
            if !ctx.is_owner(event) {
                return Ok(());
            }
            reply(ctx, message, "Shutting down...").await;
            return ctx.shutdown().await;
        }
    };

    reply(ctx, message, answer).await;
    Ok(())
}

/// An @-mention wins over a typed id
fn target(message: &MessageEvent, arg: Option<String>) -> Option<String> {
    message.tagged_user().map(str::to_string).or(arg)
}

/// Exact name first, then a case-insensitive match over the whole catalog
fn find_plugin<'a>(plugins: &'a [PluginInfo], name: &str) -> Option<&'a PluginInfo> {
    let lower = name.to_lowercase();
    plugins
        .iter()
        .find(|p| p.name == name)
        .or_else(|| plugins.iter().find(|p| p.name.to_lowercase() == lower))
}

async fn run_plugin_op(ctx: &PluginContext, message: &MessageEvent, op: PluginOp, name: &str) -> String {
    let plugins = match ctx.list_plugins().await {
        Ok(plugins) => plugins,
        Err(e) => return format!("Failed to {} {}: {}", op.verb(), name, e),
    };
    let Some(plugin) = find_plugin(&plugins, name) else {
        return format!("Failed to {} {}: plugin not found", op.verb(), name);
    };
    let name = plugin.name.clone();

    // On success this context goes stale before the outcome can be sent
    if name == ctx.name() && op != PluginOp::Enable {
        reply(ctx, message, format!("{} plugin {}...", op.progressive(), name)).await;
    }

    let result = match op {
        PluginOp::Enable => ctx.enable_plugin(&name).await,
        PluginOp::Disable => ctx.disable_plugin(&name).await,
        PluginOp::Reload => ctx.reload_plugin(&name).await,
    };
    match result {
        Ok(()) => format!("{} plugin {}", op.past_tense(), name),
        Err(e) => format!("Failed to {} {}: {}", op.verb(), name, e),
    }
}

fn format_plugin_list(plugins: &[PluginInfo]) -> String {
    let enabled = plugins.iter().filter(|p| p.enabled).count();
    let mut out = String::from("〓 plugins 〓\n");
    for plugin in plugins {
        let mark = if plugin.enabled { "🟢" } else { "🔴" };
        match &plugin.version {
            Some(version) => out.push_str(&format!("{} {} v{}\n", mark, plugin.name, version)),
            None => out.push_str(&format!("{} {}\n", mark, plugin.name)),
        }
    }
    out.push_str(&format!("{} total, {} enabled", plugins.len(), enabled));
    out
}

/// Send an outcome message; the context may already be gone if the command
/// disabled this very plugin
async fn reply(ctx: &PluginContext, message: &MessageEvent, text: impl Into<String>) {
    match ctx.respond(message, text).await {
        Ok(_) => {}
        Err(PluginError::StaleContext(_)) => debug!("Admin plugin unloaded before replying"),
        Err(e) => warn!(error = %e, "Failed to send admin reply"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, enabled: bool) -> PluginInfo {
        PluginInfo {
            enabled,
            version: enabled.then(|| "1.0.0".to_string()),
            ..PluginInfo::placeholder(name)
        }
    }

    #[test]
    fn test_find_plugin_prefers_exact_name() {
        let plugins = vec![info("Echo", true), info("echo", false)];
        assert!(!find_plugin(&plugins, "echo").unwrap().enabled);
        assert!(find_plugin(&plugins, "Echo").unwrap().enabled);
        assert_eq!(find_plugin(&plugins, "ECHO").unwrap().name, "Echo");
        assert!(find_plugin(&plugins, "nope").is_none());
    }

    #[test]
    fn test_plugin_list_counts() {
        let text = format_plugin_list(&[info("admin", true), info("repeat", false)]);
        assert!(text.contains("🟢 admin v1.0.0"));
        assert!(text.contains("🔴 repeat"));
        assert!(text.ends_with("2 total, 1 enabled"));
    }

    #[test]
    fn test_mention_overrides_typed_target() {
        let message = MessageEvent::private("1", "/set +admin 5")
            .with_segment(crate::domain::entities::Segment::at("9"));
        assert_eq!(target(&message, Some("5".into())), Some("9".into()));

        let plain = MessageEvent::private("1", "/set +admin 5");
        assert_eq!(target(&plain, Some("5".into())), Some("5".into()));
        assert_eq!(target(&plain, None), None);
    }
}
