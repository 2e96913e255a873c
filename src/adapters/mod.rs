mod http_expert;

pub use http_expert::HttpExpert;

use async_trait::async_trait;

use crate::domain::expert::ExpertResponse;
use crate::error::ExpertError;

/// A single question posed to an expert, with the retrieval context and the
/// recent-history digest the classifier/workflow prepared for it (spec §4.1).
#[derive(Debug, Clone)]
pub struct ExpertQuery {
    pub question: String,
    pub issue_context: String,
    pub retrieved_snippets: Vec<String>,
    pub history_digest: Option<String>,
    pub deadline: std::time::Instant,
    pub cancellation_token: Option<tokio_util::sync::CancellationToken>,
}

/// Static, per-expert identity used to build prompts and the moderator's
/// debate-simulation narration (spec §3, SPEC_FULL §2.1 "Participant
/// descriptions").
#[derive(Debug, Clone)]
pub struct ExpertProfile {
    pub name: crate::domain::expert::ExpertName,
    pub specialty: String,
    pub persona_blurb: String,
}

/// The seam every expert (A, B, C) and the debate moderator's own backing
/// call (D) implement (spec §4.1, §4.6). One real adapter (`HttpExpert`)
/// backs all four; tests substitute a stub implementation.
#[async_trait]
pub trait Expert: Send + Sync {
    fn profile(&self) -> &ExpertProfile;

    async fn answer(&self, query: ExpertQuery) -> Result<ExpertResponse, ExpertError>;
}
