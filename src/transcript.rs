//! Append-only chat transcript.

use crate::models::{ChatTurn, Role};

/// Ordered sequence of chat turns. Turns can be appended and read, never
/// edited, removed, or reordered.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Most recent assistant turn, if any.
    pub fn last_answer(&self) -> Option<&ChatTurn> {
        self.turns.iter().rev().find(|t| t.role == Role::Assistant)
    }
}
