//! Identity-keyed storage for in-progress compositions.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::EmailSession;

/// At most one [`EmailSession`] per chat.
///
/// Reads take a shared lock and writes hold the exclusive lock only for a
/// single map operation, so one chat's flow never waits on another chat's
/// delivery or download. Updates for the same chat are serialized by the
/// dispatcher, which handles one update per chat at a time.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, EmailSession>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the session for `chat_id`. A previous session is
    /// discarded without merging.
    pub async fn set(&self, chat_id: i64, session: EmailSession) {
        self.sessions.write().await.insert(chat_id, session);
    }

    /// A copy of the session for `chat_id`, if one exists.
    pub async fn get(&self, chat_id: i64) -> Option<EmailSession> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    /// Remove the session for `chat_id`. Returns whether one existed.
    pub async fn delete(&self, chat_id: i64) -> bool {
        self.sessions.write().await.remove(&chat_id).is_some()
    }

    /// Whether `chat_id` has an active session.
    pub async fn exists(&self, chat_id: i64) -> bool {
        self.sessions.read().await.contains_key(&chat_id)
    }

    /// Number of active sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is active.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
