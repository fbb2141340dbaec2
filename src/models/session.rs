//! Session Models
//!
//! Conversation turns as recorded in a chat session.

use askdb_llm::{Message, MessageRole};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn label(&self) -> &'static str {
        match self {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
            TurnRole::System => "System",
        }
    }
}

impl From<TurnRole> for MessageRole {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => MessageRole::User,
            TurnRole::Assistant => MessageRole::Assistant,
            TurnRole::System => MessageRole::System,
        }
    }
}

/// One recorded message of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Words for user turns, model tokens for assistant turns
    pub tokens: u32,
}

impl Turn {
    /// A user turn. Its token count is the whitespace word count.
    pub fn user(content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = word_count(&content);
        Self {
            role: TurnRole::User,
            content,
            timestamp: Utc::now(),
            tokens,
        }
    }

    /// An assistant turn carrying the model tokens spent producing it.
    pub fn assistant(content: impl Into<String>, tokens: u32) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            tokens,
        }
    }

    pub fn to_message(&self) -> Message {
        Message::text(self.role.into(), self.content.clone())
    }

    /// `[2024-05-01 12:00:00] User (4 tokens): content`
    pub fn display_line(&self) -> String {
        format!(
            "[{}] {} ({} tokens): {}",
            self.timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            self.role.label(),
            self.tokens,
            self.content
        )
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
