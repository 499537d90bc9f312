use super::Segment;
use serde::{Deserialize, Serialize};

/// Default mute duration in seconds
pub const DEFAULT_MUTE_SECS: u64 = 1800;
/// Upper bound the protocol accepts for a single like call
pub const MAX_LIKES: u32 = 50;

/// An outbound call to the event source
///
/// Serialized as `{"action": "...", "params": {...}}`, which is the shape the
/// protocol layer sends on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    SendGroupMsg {
        group_id: String,
        message: Vec<Segment>,
    },
    SendPrivateMsg {
        user_id: String,
        message: Vec<Segment>,
    },
    DeleteMsg {
        message_id: i64,
    },
    GetMsg {
        message_id: i64,
    },
    SendLike {
        user_id: String,
        times: u32,
    },
    SetGroupKick {
        group_id: String,
        user_id: String,
        reject_add_request: bool,
    },
    SetGroupBan {
        group_id: String,
        user_id: String,
        duration: u64,
    },
    SetGroupWholeBan {
        group_id: String,
        enable: bool,
    },
    SetGroupAdmin {
        group_id: String,
        user_id: String,
        enable: bool,
    },
    SetGroupCard {
        group_id: String,
        user_id: String,
        card: String,
    },
    SetGroupName {
        group_id: String,
        group_name: String,
    },
    SetGroupSpecialTitle {
        group_id: String,
        user_id: String,
        special_title: String,
    },
    SetGroupLeave {
        group_id: String,
    },
    GetGroupList,
    GetGroupInfo {
        group_id: String,
    },
    GetGroupMemberInfo {
        group_id: String,
        user_id: String,
        no_cache: bool,
    },
    /// Escape hatch for protocol calls without a typed variant
    Raw {
        name: String,
        params: serde_json::Value,
    },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::SendGroupMsg { .. } => "send_group_msg",
            Action::SendPrivateMsg { .. } => "send_private_msg",
            Action::DeleteMsg { .. } => "delete_msg",
            Action::GetMsg { .. } => "get_msg",
            Action::SendLike { .. } => "send_like",
            Action::SetGroupKick { .. } => "set_group_kick",
            Action::SetGroupBan { .. } => "set_group_ban",
            Action::SetGroupWholeBan { .. } => "set_group_whole_ban",
            Action::SetGroupAdmin { .. } => "set_group_admin",
            Action::SetGroupCard { .. } => "set_group_card",
            Action::SetGroupName { .. } => "set_group_name",
            Action::SetGroupSpecialTitle { .. } => "set_group_special_title",
            Action::SetGroupLeave { .. } => "set_group_leave",
            Action::GetGroupList => "get_group_list",
            Action::GetGroupInfo { .. } => "get_group_info",
            Action::GetGroupMemberInfo { .. } => "get_group_member_info",
            Action::Raw { name, .. } => name,
        }
    }

    /// Plain text of an outgoing message, `None` for other actions
    pub fn message_text(&self) -> Option<String> {
        let segments = match self {
            Action::SendGroupMsg { message, .. } | Action::SendPrivateMsg { message, .. } => message,
            _ => return None,
        };
        Some(
            segments
                .iter()
                .map(|s| match s {
                    Segment::Text { text } => text.clone(),
                    Segment::At { qq } => format!("@{}", qq),
                    Segment::Image { .. } => "[image]".to_string(),
                    Segment::Reply { .. } => "[reply]".to_string(),
                    Segment::Other { kind } => format!("[{}]", kind),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let action = Action::SetGroupBan {
            group_id: "100".to_string(),
            user_id: "7".to_string(),
            duration: DEFAULT_MUTE_SECS,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "set_group_ban");
        assert_eq!(json["params"]["duration"], 1800);
        assert_eq!(action.name(), "set_group_ban");
    }

    #[test]
    fn test_message_text() {
        let action = Action::SendPrivateMsg {
            user_id: "1".to_string(),
            message: vec![Segment::text("pong")],
        };
        assert_eq!(action.message_text().as_deref(), Some("pong"));
        assert_eq!(Action::GetGroupList.message_text(), None);
    }
}
