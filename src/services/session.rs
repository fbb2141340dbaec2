//! Chat Session
//!
//! Owns the conversation history and token total for one REPL session. The
//! pipeline borrows it mutably for each turn, so turns never interleave.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::session::Turn;

#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    history: Vec<Turn>,
    total_tokens: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            history: Vec::new(),
            total_tokens: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Every turn, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Model tokens consumed by the session so far.
    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub(crate) fn append(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub(crate) fn add_tokens(&mut self, tokens: u32) {
        self.total_tokens += u64::from(tokens);
    }
}
