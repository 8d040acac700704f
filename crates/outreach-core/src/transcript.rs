use serde::{Deserialize, Serialize};

use crate::collaborators::ChatMessage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ConversationTurn {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), is_error: false }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), is_error: false }
    }

    #[must_use]
    pub fn assistant_error(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), is_error: true }
    }
}

/// Append-only conversation log. Only an explicit clear removes turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Every turn as a chat message, error turns included.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.turns.iter().map(|turn| ChatMessage::new(turn.role.as_str(), &turn.content)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_mirrors_turns_in_order() {
        let mut transcript = Transcript::default();
        transcript.push(ConversationTurn::user("hi"));
        transcript.push(ConversationTurn::assistant_error("failed"));
        let history = transcript.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[1].content, "failed");
    }

    #[test]
    fn turns_serialize_with_error_flag() {
        let json = serde_json::to_value(ConversationTurn::assistant_error("x"))
            .unwrap_or_else(|err| panic!("serialize turn: {err}"));
        assert_eq!(json["isError"], true);
        assert_eq!(json["role"], "assistant");
    }
}
