//! Command parser - Turns prefixed chat text into operator commands

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SET_ADMIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:set|设置)\s+(\+admin|-admin|加管理|删管理)(?:\s+@?(\S+))?$").unwrap()
});

/// What `p <op> <name>` asks the host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginOp {
    Enable,
    Disable,
    Reload,
}

impl PluginOp {
    pub fn verb(&self) -> &'static str {
        match self {
            PluginOp::Enable => "enable",
            PluginOp::Disable => "disable",
            PluginOp::Reload => "reload",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            PluginOp::Enable => "Enabled",
            PluginOp::Disable => "Disabled",
            PluginOp::Reload => "Reloaded",
        }
    }

    pub fn progressive(&self) -> &'static str {
        match self {
            PluginOp::Enable => "Enabling",
            PluginOp::Disable => "Disabling",
            PluginOp::Reload => "Reloading",
        }
    }
}

/// Operator commands understood by the admin plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    Settings,
    ListPlugins,
    /// `name` is `None` when the operator left it out
    Plugin { op: PluginOp, name: Option<String> },
    /// `p` followed by something we do not know
    UnknownPluginOp(String),
    Status,
    /// Target given as text; an @-mention on the message takes precedence
    AddAdmin(Option<String>),
    RemoveAdmin(Option<String>),
    Exit,
}

/// Parses commands that start with the configured prefix
pub struct CommandParser {
    prefix: String,
}

impl CommandParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `None` when `text` is not a command at all
    pub fn parse(&self, text: &str) -> Option<AdminCommand> {
        let body = text.trim().strip_prefix(self.prefix.as_str())?.trim();

        match body {
            "help" | "帮助" => return Some(AdminCommand::Help),
            "seting" | "settings" | "设置" => return Some(AdminCommand::Settings),
            "status" | "状态" => return Some(AdminCommand::Status),
            "exit" | "退出" => return Some(AdminCommand::Exit),
            _ => {}
        }

        if let Some(rest) = body.strip_prefix("p ") {
            return Some(parse_plugin_command(rest));
        }

        let caps = SET_ADMIN.captures(body)?;
        let target = caps.get(2).map(|m| m.as_str().to_string());
        match caps.get(1).map(|m| m.as_str()) {
            Some("+admin") | Some("加管理") => Some(AdminCommand::AddAdmin(target)),
            Some(_) => Some(AdminCommand::RemoveAdmin(target)),
            None => None,
        }
    }

    /// Help text listing every command with the prefix filled in
    pub fn help(&self) -> String {
        let p = &self.prefix;
        [
            "〓 hotswap-bot help 〓".to_string(),
            format!("{p}p ls - list plugins"),
            format!("{p}p on <name> - enable a plugin"),
            format!("{p}p off <name> - disable a plugin"),
            format!("{p}p reload <name> - reload a plugin"),
            format!("{p}status - host status"),
            format!("{p}set +admin <@user> - add an admin"),
            format!("{p}set -admin <@user> - remove an admin"),
            format!("{p}exit - shut down (owner only)"),
            format!("{p}help - show this help"),
        ]
        .join("\n")
    }
}

fn parse_plugin_command(rest: &str) -> AdminCommand {
    let mut parts = rest.split_whitespace();
    let op = parts.next().unwrap_or_default();
    let name = parts.next().map(str::to_string);

    let op = match op {
        "ls" | "list" => return AdminCommand::ListPlugins,
        "on" => PluginOp::Enable,
        "off" => PluginOp::Disable,
        "reload" => PluginOp::Reload,
        other => return AdminCommand::UnknownPluginOp(other.to_string()),
    };
    AdminCommand::Plugin { op, name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_without_prefix_is_not_a_command() {
        let parser = CommandParser::new("/");
        assert_eq!(parser.parse("help"), None);
        assert_eq!(parser.parse("ping"), None);
        assert_eq!(parser.parse("/nonsense"), None);
    }

    #[test]
    fn test_simple_commands() {
        let parser = CommandParser::new("/");
        assert_eq!(parser.parse("/help"), Some(AdminCommand::Help));
        assert_eq!(parser.parse(" /status "), Some(AdminCommand::Status));
        assert_eq!(parser.parse("/退出"), Some(AdminCommand::Exit));
    }

    #[test]
    fn test_plugin_commands() {
        let parser = CommandParser::new("#");
        assert_eq!(parser.parse("#p ls"), Some(AdminCommand::ListPlugins));
        assert_eq!(
            parser.parse("#p reload Echo"),
            Some(AdminCommand::Plugin { op: PluginOp::Reload, name: Some("Echo".into()) })
        );
        assert_eq!(
            parser.parse("#p on"),
            Some(AdminCommand::Plugin { op: PluginOp::Enable, name: None })
        );
        assert_eq!(parser.parse("#p zap x"), Some(AdminCommand::UnknownPluginOp("zap".into())));
    }

    #[test]
    fn test_admin_edits() {
        let parser = CommandParser::new("/");
        assert_eq!(parser.parse("/set +admin 42"), Some(AdminCommand::AddAdmin(Some("42".into()))));
        assert_eq!(parser.parse("/set -admin @42"), Some(AdminCommand::RemoveAdmin(Some("42".into()))));
        assert_eq!(parser.parse("/set +admin"), Some(AdminCommand::AddAdmin(None)));
        assert_eq!(parser.parse("/设置 删管理 7"), Some(AdminCommand::RemoveAdmin(Some("7".into()))));
    }

    #[test]
    fn test_help_uses_prefix() {
        let help = CommandParser::new("!").help();
        assert!(help.contains("!p ls"));
        assert!(help.contains("!exit"));
    }
}
