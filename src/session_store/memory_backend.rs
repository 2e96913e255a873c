use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{AppendOutcome, SessionBackend};
use crate::domain::session::{Session, SessionStatus, Turn};
use crate::error::SessionError;

/// Process-local session backend: an `RwLock`-guarded map of per-session
/// `Mutex`es (spec §4.7: "a per-session lock"; generalizes
/// `squall::memory::local::MemoryStore`'s single `write_lock: Mutex<()>`
/// down to one lock per session instead of one for the whole store, since
/// sessions here are independent of each other).
pub struct MemoryBackend {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    async fn handle(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Inserts `session` into the local map if it isn't already tracked
    /// locally. Used by `CompositeSessionStore` to hydrate local state from
    /// the external backend's copy before committing a turn against it, the
    /// same way `get()` prefers the external copy on read.
    pub(crate) async fn hydrate_if_absent(&self, session: Session) {
        let mut guard = self.sessions.write().await;
        guard
            .entry(session.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn create(&self, owner: String, issue_code: Option<String>) -> Result<Session, SessionError> {
        let session = Session::new(owner, issue_code);
        let mut guard = self.sessions.write().await;
        guard.insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, SessionError> {
        match self.handle(id).await {
            Some(handle) => Ok(handle.lock().await.clone()),
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn append_turn(
        &self,
        id: &str,
        expected_count: u64,
        turn: Turn,
        max_history_turns: usize,
    ) -> Result<AppendOutcome, SessionError> {
        let Some(handle) = self.handle(id).await else {
            return Ok(AppendOutcome::NotFound);
        };
        let mut session = handle.lock().await;
        if session.conversation_count != expected_count {
            return Ok(AppendOutcome::Conflict);
        }
        session.commit_turn(turn, max_history_turns);
        Ok(AppendOutcome::Committed(session.clone()))
    }

    async fn end(&self, id: &str) -> Result<(), SessionError> {
        match self.handle(id).await {
            Some(handle) => {
                handle.lock().await.end();
                Ok(())
            }
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let mut guard = self.sessions.write().await;
        match guard.remove(id) {
            Some(_) => Ok(()),
            None => Err(SessionError::NotFound(id.to_string())),
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize {
        let guard = self.sessions.read().await;
        let mut count = 0;
        for handle in guard.values() {
            let mut session = handle.lock().await;
            if session.status == SessionStatus::Active && session.is_idle(now, idle_timeout) {
                session.end();
                count += 1;
            }
        }
        count
    }
}
