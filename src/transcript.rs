//! Conversation transcript
//!
//! Append-only record of the turns in the current session, in display order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person using the assistant
    User,
    /// The assistant
    Assistant,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Message text
    pub text: String,
    /// Author
    pub sender: Sender,
    /// When the turn was appended
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender,
            at: Utc::now(),
        }
    }
}

/// Ordered, append-only list of turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Create an empty transcript
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a user turn
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Turn::new(Sender::User, text));
    }

    /// Append an assistant turn
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Turn::new(Sender::Assistant, text));
    }

    fn push(&mut self, turn: Turn) {
        tracing::debug!(sender = %turn.sender, index = self.turns.len(), "turn appended");
        self.turns.push(turn);
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn was appended yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
