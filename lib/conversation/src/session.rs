//! Per-user conversation sessions.
//!
//! A session owns one bounded history. When a push would exceed the window
//! the oldest turn is evicted first, so the history always holds the most
//! recent turns in chronological order.

use crate::message::ConversationTurn;
use chrono::{DateTime, Duration, Utc};
use palaver_core::UserId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An ordered, bounded sequence of turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
}

impl ConversationHistory {
    /// Creates an empty history holding at most `max_turns` turns.
    ///
    /// A window of zero is raised to one.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    /// Appends a turn, returning the evicted turn if the window overflowed.
    pub fn push(&mut self, turn: ConversationTurn) -> Option<ConversationTurn> {
        let evicted = if self.turns.len() == self.max_turns {
            self.turns.pop_front()
        } else {
            None
        };
        self.turns.push_back(turn);
        evicted
    }

    /// Returns the turns oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ConversationTurn> + ExactSizeIterator {
        self.turns.iter()
    }

    /// Returns the number of retained turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns true if no turns are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the window size.
    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Returns the newest turn, if any.
    #[must_use]
    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    /// Returns the newest turn written by the user, if any.
    #[must_use]
    pub fn last_user_turn(&self) -> Option<&ConversationTurn> {
        self.turns.iter().rev().find(|t| t.is_user())
    }

    /// Returns up to `count` of the most recent turns, oldest first.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Copies the turns out, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Removes every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl From<Vec<ConversationTurn>> for ConversationHistory {
    /// Builds a history whose window is exactly the given turns.
    fn from(turns: Vec<ConversationTurn>) -> Self {
        let mut history = Self::new(turns.len());
        for turn in turns {
            history.push(turn);
        }
        history
    }
}

/// A user's conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    /// The user who owns this session.
    pub user_id: UserId,
    /// The bounded history.
    pub history: ConversationHistory,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When a turn was last appended.
    pub last_active_at: DateTime<Utc>,
}

impl UserSession {
    /// Creates an empty session.
    #[must_use]
    pub fn new(user_id: UserId, max_turns: usize, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            history: ConversationHistory::new(max_turns),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Appends a turn and marks the session active.
    pub fn add_turn(&mut self, turn: ConversationTurn, now: DateTime<Utc>) {
        self.history.push(turn);
        self.last_active_at = now;
    }

    /// Returns true if the session has been idle for at least `ttl`.
    #[must_use]
    pub fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl {
            Some(ttl) => now - self.last_active_at >= ttl,
            None => false,
        }
    }
}
