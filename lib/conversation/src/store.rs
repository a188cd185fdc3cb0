//! Process-wide conversation store.
//!
//! Sessions live only in memory; a restart silently drops them. Each
//! operation runs inside the map's per-key critical section, so concurrent
//! calls for one user are serialised while other users proceed.

use crate::message::ConversationTurn;
use crate::session::{ConversationHistory, UserSession};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use palaver_core::UserId;
use tracing::debug;

/// Default number of turns retained per user.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum turns retained per user.
    pub window: usize,
    /// Idle time after which a session is discarded. `None` keeps sessions
    /// until they are cleared explicitly.
    pub ttl: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_HISTORY_WINDOW,
            ttl: None,
        }
    }
}

/// Per-user bounded conversation histories.
#[derive(Debug, Default)]
pub struct ConversationStore {
    config: StoreConfig,
    sessions: DashMap<UserId, UserSession>,
}

impl ConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Appends a turn to the user's history, creating the session lazily.
    ///
    /// Returns a snapshot of the history after the append.
    pub fn append(&self, user_id: UserId, turn: ConversationTurn) -> ConversationHistory {
        self.append_at(user_id, turn, Utc::now())
    }

    /// Like [`append`](Self::append) with an explicit clock reading.
    pub fn append_at(
        &self,
        user_id: UserId,
        turn: ConversationTurn,
        now: DateTime<Utc>,
    ) -> ConversationHistory {
        let window = self.config.window;
        let mut session = self
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id, window, now));

        if session.is_expired(self.config.ttl, now) {
            debug!(user_id = %user_id, "session expired, starting fresh");
            *session = UserSession::new(user_id, window, now);
        }

        session.add_turn(turn, now);
        session.history.clone()
    }

    /// Returns the user's history, empty if there is no live session.
    #[must_use]
    pub fn get(&self, user_id: UserId) -> ConversationHistory {
        self.get_at(user_id, Utc::now())
    }

    /// Like [`get`](Self::get) with an explicit clock reading.
    #[must_use]
    pub fn get_at(&self, user_id: UserId, now: DateTime<Utc>) -> ConversationHistory {
        let ttl = self.config.ttl;
        if self
            .sessions
            .remove_if(&user_id, |_, session| session.is_expired(ttl, now))
            .is_some()
        {
            debug!(user_id = %user_id, "dropped expired session on read");
        }

        self.sessions
            .get(&user_id)
            .map(|session| session.history.clone())
            .unwrap_or_else(|| ConversationHistory::new(self.config.window))
    }

    /// Removes the user's session. Returns true if one existed.
    pub fn clear(&self, user_id: UserId) -> bool {
        self.sessions.remove(&user_id).is_some()
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops every session idle for longer than the TTL.
    ///
    /// Returns the number of sessions removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Like [`purge_expired`](Self::purge_expired) with an explicit clock reading.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.config.ttl;
        if ttl.is_none() {
            return 0;
        }
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(ttl, now));
        before.saturating_sub(self.sessions.len())
    }
}
