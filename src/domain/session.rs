use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::expert::ExpertName;
use super::recommendation::SynthesisProvenance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One user-message/recommendation exchange within a session (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_message: String,
    pub reply: String,
    pub at: DateTime<Utc>,
    pub participating_experts: Vec<ExpertName>,
    pub expert_processing_time: HashMap<ExpertName, std::time::Duration>,
    pub confidence_level: f64,
    pub moderator_record: SynthesisProvenance,
}

/// A bag of per-session metadata (spec §3): experts ever used, accumulated
/// processing time, and arbitrary key/value extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub experts_ever_used: std::collections::BTreeSet<ExpertName>,
    pub total_processing_time: std::time::Duration,
    pub extra: HashMap<String, serde_json::Value>,
}

/// Document schema version, bumped whenever the on-disk/on-wire shape of a
/// `Session` changes. The external backend migrates older documents on read
/// (spec §6).
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// A session: owner, optional issue code, timestamps, status, monotone
/// conversation counter, ordered turn history, and metadata (spec §3).
///
/// `conversation_count == history.len()` at quiescence (invariant 1). The
/// counter only ever advances via `commit_turn`, which enforces that
/// equality by construction — there is no other way to append a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub version: u32,
    pub id: String,
    pub owner_id: String,
    pub issue_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub conversation_count: u64,
    pub history: Vec<Turn>,
    pub metadata: SessionMetadata,
}

/// Session id format: `sess_<hex>` (SPEC_FULL §9, Open Question 2).
pub fn new_session_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sess_{}", hex::encode(bytes))
}

impl Session {
    pub fn new(owner_id: String, issue_code: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            version: SESSION_SCHEMA_VERSION,
            id: new_session_id(),
            owner_id,
            issue_code,
            created_at: now,
            updated_at: now,
            status: SessionStatus::Active,
            conversation_count: 0,
            history: Vec::new(),
            metadata: SessionMetadata::default(),
        }
    }

    /// Append a committed turn, advancing the counter exactly once
    /// (invariants 1 and 2). Applies the `max_history_turns` evict-oldest
    /// policy (SPEC_FULL §9, Open Question 1).
    pub fn commit_turn(&mut self, turn: Turn, max_history_turns: usize) {
        for &expert in &turn.participating_experts {
            self.metadata.experts_ever_used.insert(expert);
        }
        self.metadata.total_processing_time += turn.expert_processing_time.values().sum();

        self.history.push(turn);
        if self.history.len() > max_history_turns {
            let overflow = self.history.len() - max_history_turns;
            self.history.drain(0..overflow);
        }
        self.conversation_count += 1;
        self.updated_at = Utc::now();

        // conversation_count tracks *all* committed turns, not just the ones
        // still retained in `history` after eviction — history can be
        // shorter once eviction starts, but never longer than the counter.
        debug_assert!(self.history.len() as u64 <= self.conversation_count);
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: std::time::Duration) -> bool {
        let elapsed = now.signed_duration_since(self.updated_at);
        elapsed
            .to_std()
            .map(|d| d >= idle_timeout)
            .unwrap_or(false)
    }

    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
        self.updated_at = Utc::now();
    }
}
