use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::expert::ExpertName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateAction {
    pub step: u32,
    pub action: String,
    pub time_estimate: String,
    pub priority: Priority,
    pub assignee: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionPhase {
    pub phase: String,
    pub actions: Vec<String>,
    pub estimated_time: String,
    pub resources: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostEstimate {
    pub parts: String,
    pub labor: String,
    pub total: String,
}

/// Provenance of the synthesized recommendation: who participated, how many
/// debate rounds ran, and when synthesis completed (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisProvenance {
    pub participants: Vec<ExpertName>,
    pub debate_rounds_count: u32,
    pub synthesized_at: DateTime<Utc>,
}

/// The moderator's output (spec §3). Every field is always present; a
/// degraded or diagnostic recommendation (spec §4.6, §7) fills them with
/// sentinel values rather than omitting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub executive_summary: String,
    pub immediate_actions: Vec<ImmediateAction>,
    pub detailed_solution: Vec<SolutionPhase>,
    pub cost_estimation: CostEstimate,
    pub safety_precautions: Vec<String>,
    pub prevention_measures: Vec<String>,
    pub success_indicators: Vec<String>,
    pub alternative_approaches: Vec<String>,
    pub expert_consensus: String,
    pub confidence_level: f64,
    pub recommended_followup: String,
    pub provenance: SynthesisProvenance,
    /// Set when the moderator itself failed in all three phases and the
    /// recommendation is a raw copy of the highest-confidence expert's text
    /// (spec §4.6, "Moderator itself fails in all three phases").
    pub fallback: bool,
}

impl Recommendation {
    /// The fixed diagnostic recommendation for when zero experts succeed
    /// (spec §4.6, §7): confidence 0.0, empty structured fields, an apology,
    /// and a follow-up suggesting retry or contacting the operator.
    pub fn diagnostic() -> Self {
        Self {
            executive_summary:
                "We were unable to reach any expert for this question. Please try again shortly \
                 or contact the operator if the problem persists."
                    .to_string(),
            immediate_actions: Vec::new(),
            detailed_solution: Vec::new(),
            cost_estimation: CostEstimate::default(),
            safety_precautions: Vec::new(),
            prevention_measures: Vec::new(),
            success_indicators: Vec::new(),
            alternative_approaches: Vec::new(),
            expert_consensus: "No expert produced a usable response.".to_string(),
            confidence_level: 0.0,
            recommended_followup: "Retry the question, or contact the operator.".to_string(),
            provenance: SynthesisProvenance {
                participants: Vec::new(),
                debate_rounds_count: 0,
                synthesized_at: Utc::now(),
            },
            fallback: false,
        }
    }

    /// Appends the one-sentence partial-failure notice required by spec §7
    /// ("appends a one-sentence notice to the executive summary").
    pub fn with_failure_notice(mut self, failed: &[ExpertName]) -> Self {
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(|n| n.as_str()).collect();
            self.executive_summary.push_str(&format!(
                " (Note: expert{} {} did not respond and {} excluded from this recommendation.)",
                if failed.len() > 1 { "s" } else { "" },
                names.join(", "),
                if failed.len() > 1 { "were" } else { "was" },
            ));
        }
        self
    }
}
