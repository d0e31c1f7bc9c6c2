use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a chat turn.
///
/// - `User`: The operator
/// - `Agent`: The remote analysis agent
/// - `System`: The client itself (mode notices, surfaced errors)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
    System,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    /// Role name used in the outgoing `chat_history`, if the turn belongs there.
    pub fn history_role(&self) -> Option<&'static str> {
        match self {
            Self::User => Some("user"),
            Self::Agent => Some("assistant"),
            Self::System => None,
        }
    }
}

/// One entry of the append-only chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub text: String,
    /// Position in the log, starting at 0.
    pub turn_index: u64,
    pub created_at: DateTime<Utc>,
}

/// Append-only, ordered chat log.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    turns: Vec<ChatTurn>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return a copy of it.
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> ChatTurn {
        let turn = ChatTurn {
            sender,
            text: text.into(),
            turn_index: self.turns.len() as u64,
            created_at: Utc::now(),
        };
        self.turns.push(turn.clone());
        turn
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }
}
