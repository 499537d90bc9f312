use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a sender inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
}

/// The user that sent a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: String,
    pub nickname: Option<String>,
    pub card: Option<String>,
    pub role: Role,
}

impl Sender {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            nickname: None,
            card: None,
            role: Role::Member,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn display_name(&self) -> String {
        if let Some(card) = self.card.as_deref().filter(|c| !c.is_empty()) {
            card.to_string()
        } else if let Some(ref nickname) = self.nickname {
            nickname.clone()
        } else {
            self.user_id.clone()
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name(), self.user_id)
    }
}
