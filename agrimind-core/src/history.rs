//! In-memory conversation history capped at a fixed number of turns.
//!
//! A turn is one user query and the assistant's answer. When the cap is
//! exceeded the oldest turn is evicted. Nothing is persisted; the serde
//! derives exist so the CLI can print history as JSON.

use crate::types::{Capability, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
    /// Capability that produced the answer, if a single one did.
    pub capability: Option<Capability>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        user: impl Into<String>,
        assistant: impl Into<String>,
        capability: Option<Capability>,
    ) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            capability,
            timestamp: Utc::now(),
        }
    }
}

/// Sliding window of recent turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    max_turns: usize,
    total_turns_seen: usize,
}

impl ConversationHistory {
    /// Create a history holding at most `max_turns` turns (0 is treated as 1).
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
            total_turns_seen: 0,
        }
    }

    /// Append a turn, evicting the oldest when over capacity.
    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        self.total_turns_seen += 1;
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Convenience wrapper around [`add_turn`](Self::add_turn).
    pub fn record(
        &mut self,
        user: impl Into<String>,
        assistant: impl Into<String>,
        capability: Option<Capability>,
    ) {
        self.add_turn(Turn::new(user, assistant, capability));
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&Turn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).collect()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Turns ever added, including evicted ones.
    pub fn total_turns_seen(&self) -> usize {
        self.total_turns_seen
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// User/assistant message pairs, oldest first.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .flat_map(|t| [Message::user(&t.user), Message::assistant(&t.assistant)])
            .collect()
    }

    /// Plain-text transcript (`User: ...` / `Assistant: ...`), empty when there are no turns.
    pub fn render_transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(10)
    }
}
