//! Conversation Types
//!
//! A conversation accumulates messages strictly in creation order; there
//! are no other state transitions. Ordering is enforced with a monotonic
//! sequence number rather than wall-clock timestamps so two messages
//! created in the same millisecond still order deterministically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;

/// A multi-turn chat session owned by one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: OwnerId,
    pub title: String,
    /// Optional free-text context folded into the system prompt
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// Tokens attributed to this message, known only for assistant replies
    pub tokens_used: Option<u32>,
    /// Strictly increasing within a conversation
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse_or_default(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(MessageRole::parse_or_default("user"), MessageRole::User);
        assert_eq!(
            MessageRole::parse_or_default("assistant"),
            MessageRole::Assistant
        );
        assert_eq!(MessageRole::parse_or_default("system"), MessageRole::User);
    }
}
