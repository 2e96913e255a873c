use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExpertError;

/// Identifies one of the three advice experts or the moderator (spec GLOSSARY).
/// Fixed ordering A < B < C is used to break selector ties and to sort
/// expert responses before they reach the moderator (spec §5: "the moderator
/// must be invariant to [completion] order").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExpertName {
    A,
    B,
    C,
    /// The debate moderator's own backing adapter (spec §4.6). Never
    /// selected by the Expert Selector.
    D,
}

impl ExpertName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl std::fmt::Display for ExpertName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token usage counters reported by the provider alongside a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A completed Expert Response (spec §3). An expert either produces one of
/// these in full, or is represented by a `FailureRecord` instead — the two
/// are mutually exclusive by construction (`ExpertOutcome`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertResponse {
    pub name: ExpertName,
    pub specialty: String,
    pub reply: String,
    pub confidence: f64,
    pub usage: TokenUsage,
    pub elapsed: std::time::Duration,
    pub model_id: String,
}

/// Marker left in a turn's state for an expert that did not produce a valid
/// response (spec §3, §4.5, GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub name: ExpertName,
    pub error_kind: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn from_error(name: ExpertName, err: &ExpertError) -> Self {
        Self {
            name,
            error_kind: err.kind(),
            message: err.user_message(),
            at: Utc::now(),
        }
    }
}

/// Either a complete response or a failure — the invariant from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExpertOutcome {
    Success(ExpertResponse),
    Failure(FailureRecord),
}

impl ExpertOutcome {
    pub fn name(&self) -> ExpertName {
        match self {
            Self::Success(r) => r.name,
            Self::Failure(f) => f.name,
        }
    }
}

/// Confidence heuristic shared by every adapter (spec §4.1): start from a
/// per-provider base in [0.70, 0.85], add up to +0.10 for long, detailed
/// replies, subtract up to -0.20 for very short ones, clamp to the
/// configured [floor, ceiling]. Kept as a pure function so it is testable
/// without a network call.
pub fn heuristic_confidence(base: f64, reply_chars: usize, floor: f64, ceiling: f64) -> f64 {
    let adjustment = if reply_chars >= 1200 {
        0.10
    } else if reply_chars >= 600 {
        0.05
    } else if reply_chars < 80 {
        -0.20
    } else if reply_chars < 200 {
        -0.10
    } else {
        0.0
    };
    (base + adjustment).clamp(floor, ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_reply_gets_bonus() {
        let c = heuristic_confidence(0.80, 1500, 0.3, 0.95);
        assert!((c - 0.90).abs() < 1e-9);
    }

    #[test]
    fn short_reply_gets_penalty_and_clamps() {
        let c = heuristic_confidence(0.32, 10, 0.3, 0.95);
        assert_eq!(c, 0.3);
    }

    #[test]
    fn stays_within_bounds() {
        for base in [0.70, 0.75, 0.80, 0.85] {
            for len in [0, 50, 150, 500, 800, 2000] {
                let c = heuristic_confidence(base, len, 0.3, 0.95);
                assert!((0.3..=0.95).contains(&c));
            }
        }
    }
}
