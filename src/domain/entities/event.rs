use super::Sender;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event categories a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Notice,
    Request,
    Meta,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Message,
        EventKind::Notice,
        EventKind::Request,
        EventKind::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Notice => "notice",
            EventKind::Request => "request",
            EventKind::Meta => "meta_event",
        }
    }
}

/// Where a message was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Private,
    Group,
}

/// One element of a message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    At { qq: String },
    Image { url: String },
    Reply { id: String },
    Other { kind: String },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    pub fn at(qq: impl Into<String>) -> Self {
        Segment::At { qq: qq.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: i64,
    pub message_type: MessageType,
    pub user_id: String,
    pub group_id: Option<String>,
    pub sender: Sender,
    pub segments: Vec<Segment>,
    pub raw_message: String,
    pub time: DateTime<Utc>,
}

impl MessageEvent {
    pub fn private(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let text = text.into();
        Self {
            message_id: 0,
            message_type: MessageType::Private,
            sender: Sender::new(user_id.clone()),
            user_id,
            group_id: None,
            segments: vec![Segment::text(text.clone())],
            raw_message: text,
            time: Utc::now(),
        }
    }

    pub fn group(
        group_id: impl Into<String>,
        sender: Sender,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            message_id: 0,
            message_type: MessageType::Group,
            user_id: sender.user_id.clone(),
            group_id: Some(group_id.into()),
            sender,
            segments: vec![Segment::text(text.clone())],
            raw_message: text,
            time: Utc::now(),
        }
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn with_message_id(mut self, id: i64) -> Self {
        self.message_id = id;
        self
    }

    pub fn is_group(&self) -> bool {
        self.message_type == MessageType::Group
    }

    /// Concatenated text segments, trimmed
    pub fn text(&self) -> String {
        let text: String = self
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        text.trim().to_string()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Image { url } => Some(url.as_str()),
            _ => None,
        })
    }

    /// Id of the quoted message, if this one is a reply
    pub fn reply_id(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Reply { id } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Last @-mentioned user
    pub fn tagged_user(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::At { qq } => Some(qq.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeEvent {
    pub notice_type: String,
    pub group_id: Option<String>,
    pub user_id: Option<String>,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_type: String,
    pub user_id: String,
    pub flag: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEvent {
    pub meta_event_type: String,
    pub detail: serde_json::Value,
}

/// An inbound event delivered by the event source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum Event {
    Message(MessageEvent),
    Notice(NoticeEvent),
    Request(RequestEvent),
    #[serde(rename = "meta_event")]
    Meta(MetaEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Message(_) => EventKind::Message,
            Event::Notice(_) => EventKind::Notice,
            Event::Request(_) => EventKind::Request,
            Event::Meta(_) => EventKind::Meta,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Event::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Id of the user that caused the event, when there is one
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Event::Message(m) => Some(&m.user_id),
            Event::Notice(n) => n.user_id.as_deref(),
            Event::Request(r) => Some(&r.user_id),
            Event::Meta(_) => None,
        }
    }
}

impl From<MessageEvent> for Event {
    fn from(m: MessageEvent) -> Self {
        Event::Message(m)
    }
}

pub fn avatar_url(user_id: &str) -> String {
    format!("https://thirdqq.qlogo.cn/headimg_dl?dst_uin={}&spec=0", user_id)
}

pub fn group_avatar_url(group_id: &str) -> String {
    format!("https://p.qlogo.cn/gh/{0}/{0}/0", group_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_joins_and_trims() {
        let msg = MessageEvent::private("1", " hello")
            .with_segment(Segment::at("2"))
            .with_segment(Segment::text(" world "));
        assert_eq!(msg.text(), "hello world");
    }

    #[test]
    fn test_tagged_user_is_last_mention() {
        let msg = MessageEvent::private("1", "hi")
            .with_segment(Segment::at("2"))
            .with_segment(Segment::at("3"));
        assert_eq!(msg.tagged_user(), Some("3"));
    }

    #[test]
    fn test_event_kind() {
        let event: Event = MessageEvent::private("1", "ping").into();
        assert_eq!(event.kind(), EventKind::Message);
        assert_eq!(event.user_id(), Some("1"));
        assert_eq!(EventKind::Meta.as_str(), "meta_event");
    }
}
