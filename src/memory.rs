// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only conversation log.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

/// One question and the answer given to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Chronological log of turns, safe to append from several threads.
///
/// Turns are never removed or reordered for the lifetime of the value.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Mutex<Vec<Turn>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns the new length.
    pub fn append(&self, question: impl Into<String>, answer: impl Into<String>) -> usize {
        let mut turns = self.lock();
        turns.push(Turn {
            question: question.into(),
            answer: answer.into(),
        });
        turns.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every turn, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.lock().clone()
    }

    /// Copy of the last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Turn> {
        let turns = self.lock();
        let start = turns.len().saturating_sub(n);
        turns[start..].to_vec()
    }

    // A panic while holding the lock cannot leave a half-pushed turn behind.
    fn lock(&self) -> MutexGuard<'_, Vec<Turn>> {
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
