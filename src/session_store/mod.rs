mod memory_backend;

#[cfg(feature = "durable-session")]
pub mod external_backend;

pub use memory_backend::MemoryBackend;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::session::{Session, Turn};
use crate::error::SessionError;

/// Outcome of an `append_turn` attempt that also enforces optimistic
/// concurrency (spec §5: "the store rejects append_turn if the stored
/// counter does not match the pre-turn read").
#[derive(Debug)]
pub enum AppendOutcome {
    Committed(Session),
    Conflict,
    NotFound,
}

/// Operations a session backend must support (spec §4.7, C7). None panic;
/// every operation returns a typed result.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn create(&self, owner: String, issue_code: Option<String>) -> Result<Session, SessionError>;
    async fn get(&self, id: &str) -> Result<Session, SessionError>;
    /// Appends `turn` only if the session's current `conversation_count`
    /// equals `expected_count`; otherwise returns `AppendOutcome::Conflict`
    /// without mutating anything (spec §4.7: "atomic: either the counter and
    /// history both update or neither does").
    async fn append_turn(
        &self,
        id: &str,
        expected_count: u64,
        turn: Turn,
        max_history_turns: usize,
    ) -> Result<AppendOutcome, SessionError>;
    async fn end(&self, id: &str) -> Result<(), SessionError>;
    async fn delete(&self, id: &str) -> Result<(), SessionError>;
    async fn sweep_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize;
}

/// Composite store: a process-local map is always present; an optional
/// durable external backend, when configured, is authoritative (spec §4.7,
/// §6: "the external backend is authoritative when present").
///
/// Generalizes `squall::memory::CompositeMemoryStore`'s local+global shape:
/// here every write fans out to both backends (when the external one is
/// configured), but reads prefer the external backend's copy.
pub struct CompositeSessionStore {
    local: MemoryBackend,
    #[cfg(feature = "durable-session")]
    external: Option<external_backend::ExternalBackend>,
}

impl CompositeSessionStore {
    pub fn local_only() -> Self {
        Self {
            local: MemoryBackend::new(),
            #[cfg(feature = "durable-session")]
            external: None,
        }
    }

    #[cfg(feature = "durable-session")]
    pub fn with_external(external: external_backend::ExternalBackend) -> Self {
        Self {
            local: MemoryBackend::new(),
            external: Some(external),
        }
    }
}

#[async_trait]
impl SessionBackend for CompositeSessionStore {
    async fn create(&self, owner: String, issue_code: Option<String>) -> Result<Session, SessionError> {
        let session = self.local.create(owner, issue_code).await?;

        #[cfg(feature = "durable-session")]
        if let Some(external) = &self.external {
            external.put(&session).await?;
        }

        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Session, SessionError> {
        #[cfg(feature = "durable-session")]
        if let Some(external) = &self.external
            && let Ok(session) = external.get(id).await
        {
            return Ok(session);
        }

        self.local.get(id).await
    }

    async fn append_turn(
        &self,
        id: &str,
        expected_count: u64,
        turn: Turn,
        max_history_turns: usize,
    ) -> Result<AppendOutcome, SessionError> {
        // A session committed before a process restart (or by another
        // instance) may exist only in `external`. Hydrate `local` from it
        // first, mirroring `get()`'s external-authoritative read, so the
        // append below doesn't spuriously see `NotFound`.
        #[cfg(feature = "durable-session")]
        if let Some(external) = &self.external
            && self.local.get(id).await.is_err()
            && let Ok(session) = external.get(id).await
        {
            self.local.hydrate_if_absent(session).await;
        }

        let outcome = self
            .local
            .append_turn(id, expected_count, turn, max_history_turns)
            .await?;

        #[cfg(feature = "durable-session")]
        if let AppendOutcome::Committed(session) = &outcome
            && let Some(external) = &self.external
        {
            external.put(session).await?;
        }

        Ok(outcome)
    }

    async fn end(&self, id: &str) -> Result<(), SessionError> {
        self.local.end(id).await?;

        #[cfg(feature = "durable-session")]
        if let Some(external) = &self.external {
            external.end(id).await?;
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.local.delete(id).await?;

        #[cfg(feature = "durable-session")]
        if let Some(external) = &self.external {
            external.delete(id).await?;
        }

        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize {
        self.local.sweep_expired(now, idle_timeout).await
    }
}

#[cfg(all(test, feature = "durable-session"))]
mod tests {
    use super::*;
    use crate::domain::expert::ExpertName;
    use crate::domain::recommendation::SynthesisProvenance;
    use std::collections::HashMap;

    fn turn() -> Turn {
        Turn {
            user_message: "hi".to_string(),
            reply: "hello".to_string(),
            at: Utc::now(),
            participating_experts: vec![ExpertName::A],
            expert_processing_time: HashMap::new(),
            confidence_level: 0.8,
            moderator_record: SynthesisProvenance {
                participants: vec![ExpertName::A],
                debate_rounds_count: 0,
                synthesized_at: Utc::now(),
            },
        }
    }

    fn temp_db_path() -> std::path::PathBuf {
        use rand::RngCore;
        let mut suffix = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut suffix);
        std::env::temp_dir().join(format!("consult-engine-test-{}.duckdb", hex::encode(suffix)))
    }

    #[tokio::test]
    async fn append_turn_hydrates_local_from_external_after_restart() {
        let path = temp_db_path();
        let external = external_backend::ExternalBackend::open(&path).unwrap();
        let store = CompositeSessionStore::with_external(external);
        let session = store.create("owner".to_string(), None).await.unwrap();

        // Simulate a process restart: a fresh composite store shares the same
        // durable backend but starts with an empty local map, so the session
        // is only known to `external`.
        let external = external_backend::ExternalBackend::open(&path).unwrap();
        let restarted = CompositeSessionStore::with_external(external);

        let outcome = restarted
            .append_turn(&session.id, 0, turn(), 50)
            .await
            .unwrap();
        match outcome {
            AppendOutcome::Committed(s) => {
                assert_eq!(s.conversation_count, 1);
                assert_eq!(s.history.len(), 1);
            }
            other => panic!("expected commit, got {other:?}"),
        }

        let _ = std::fs::remove_file(&path);
    }
}
