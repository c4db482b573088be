//! Chat history types shared by the router and the chat pipeline.

use serde::{Deserialize, Serialize};

/// Role of a chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One prior turn of a conversation, as held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    /// Agent that produced an assistant turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            agent_id: None,
        }
    }

    pub fn assistant(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            agent_id: Some(agent_id.into()),
        }
    }
}

/// The last `n` turns of `history`, oldest first.
pub fn recent_turns(history: &[ChatTurn], n: usize) -> &[ChatTurn] {
    &history[history.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_turns_keeps_the_tail() {
        let history: Vec<_> = (0..6).map(|i| ChatTurn::user(format!("m{i}"))).collect();
        let tail = recent_turns(&history, 4);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].content, "m2");
        assert_eq!(tail[3].content, "m5");

        assert_eq!(recent_turns(&history[..2], 4).len(), 2);
        assert!(recent_turns(&[], 4).is_empty());
    }

    #[test]
    fn serializes_role_lowercase() {
        let turn = ChatTurn::assistant("coach", "Nice run!");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["agent_id"], "coach");
    }
}
