use thiserror::Error;

/// Error taxonomy for a single expert adapter call (spec §4.1, §7).
///
/// `Timeout`, `RateLimit`, `TransportError`, `EmptyResponse` are transient:
/// the workflow retries once with jittered backoff before giving up.
/// `AuthError` and `BadRequest` are permanent: surfaced as a Failure Record
/// immediately, never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpertError {
    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("rate limited by {provider}")]
    RateLimit { provider: String },

    #[error("transport error from {provider}: {message}")]
    TransportError { provider: String, message: String },

    #[error("{provider} returned an empty response body")]
    EmptyResponse { provider: String },

    #[error("auth failed for {provider}: {message}")]
    AuthError { provider: String, message: String },

    #[error("bad request to {provider}: {message}")]
    BadRequest { provider: String, message: String },
}

impl ExpertError {
    pub fn provider(&self) -> &str {
        match self {
            Self::Timeout { provider }
            | Self::RateLimit { provider }
            | Self::TransportError { provider, .. }
            | Self::EmptyResponse { provider }
            | Self::AuthError { provider, .. }
            | Self::BadRequest { provider, .. } => provider,
        }
    }

    /// Kind string per spec §7's error taxonomy, surfaced in `failed_experts` (spec §6).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "TIMEOUT",
            Self::RateLimit { .. } => "RATE_LIMIT",
            Self::TransportError { .. } => "TRANSPORT_ERROR",
            Self::EmptyResponse { .. } => "EMPTY_RESPONSE",
            Self::AuthError { .. } => "AUTH_ERROR",
            Self::BadRequest { .. } => "BAD_REQUEST",
        }
    }

    /// Transient errors get one retry with jittered backoff (spec §7);
    /// permanent errors go straight to a Failure Record.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimit { .. }
                | Self::TransportError { .. }
                | Self::EmptyResponse { .. }
        )
    }

    /// Sanitized message safe to surface to a caller — never leaks endpoint
    /// URLs or raw upstream bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { provider } => format!("{provider} timed out"),
            Self::RateLimit { provider } => format!("{provider} is rate limiting requests"),
            Self::TransportError { provider, .. } => format!("transport error from {provider}"),
            Self::EmptyResponse { provider } => format!("{provider} returned no content"),
            Self::AuthError { provider, .. } => format!("authentication failed for {provider}"),
            Self::BadRequest { provider, .. } => format!("bad request to {provider}"),
        }
    }
}

/// Errors surfaced by the workflow engine to the caller (spec §6, §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("session not found")]
    SessionNotFound,

    #[error("another turn is already in flight for this session")]
    ConcurrentTurn,

    #[error("all experts failed for this turn")]
    AllExpertsFailed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ConcurrentTurn => "CONCURRENT_TURN",
            Self::AllExpertsFailed => "ALL_EXPERTS_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Errors surfaced by the session store (spec §4.7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session backend error: {0}")]
    Backend(String),
}
