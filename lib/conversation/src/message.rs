//! Turn types for conversations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Message written by the chat user.
    User,
    /// Reply produced by the relay.
    Assistant,
    /// Instruction injected by the relay itself.
    System,
}

impl TurnRole {
    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
///
/// Fields are private so a turn cannot change after it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: TurnRole,
    content: String,
}

impl ConversationTurn {
    /// Creates a new turn.
    #[must_use]
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Returns the author role.
    #[must_use]
    pub fn role(&self) -> TurnRole {
        self.role
    }

    /// Returns the message text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns true if the user wrote this turn.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_creation() {
        let turn = ConversationTurn::user("Hello!");
        assert_eq!(turn.role(), TurnRole::User);
        assert_eq!(turn.content(), "Hello!");
        assert!(turn.is_user());
        assert!(!ConversationTurn::assistant("Hi").is_user());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&TurnRole::Assistant).expect("serialize");
        assert_eq!(json, "\"assistant\"");
        assert_eq!(TurnRole::System.to_string(), "system");
    }
}
