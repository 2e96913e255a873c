use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::{Expert, ExpertQuery};
use crate::domain::expert::ExpertResponse;
use crate::domain::recommendation::{
    CostEstimate, ImmediateAction, Priority, Recommendation, SolutionPhase, SynthesisProvenance,
};
use crate::monitoring::Monitoring;

/// Structured difference-analysis report (spec §4.6 phase 1), or the
/// empty-but-valid fallback used on parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
struct DifferenceAnalysis {
    #[serde(default)]
    common_points: Vec<String>,
    #[serde(default)]
    differences: Vec<Value>,
    #[serde(default)]
    conflicts: Vec<Value>,
    #[serde(default)]
    complementary_aspects: Vec<Value>,
}

/// Structured debate transcript (spec §4.6 phase 2).
#[derive(Debug, Clone, Default, Deserialize)]
struct DebateResult {
    #[serde(default)]
    debate_rounds: Vec<Value>,
    #[serde(default)]
    consensus_points: Vec<String>,
    #[serde(default)]
    final_agreement: String,
    #[serde(default)]
    raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SynthesizedSolution {
    executive_summary: String,
    #[serde(default)]
    immediate_actions: Vec<RawAction>,
    #[serde(default)]
    detailed_solution: Vec<RawPhase>,
    #[serde(default)]
    cost_estimation: RawCost,
    #[serde(default)]
    safety_precautions: Vec<String>,
    #[serde(default)]
    prevention_measures: Vec<String>,
    #[serde(default)]
    success_indicators: Vec<String>,
    #[serde(default)]
    alternative_approaches: Vec<String>,
    expert_consensus: String,
    confidence_level: f64,
    recommended_followup: String,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    step: u32,
    action: String,
    time: String,
    priority: String,
    #[serde(default)]
    responsible: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPhase {
    phase: String,
    #[serde(default)]
    actions: Vec<String>,
    estimated_time: String,
    #[serde(default)]
    resources: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCost {
    #[serde(default)]
    parts: String,
    #[serde(default)]
    labor: String,
    #[serde(default)]
    total: String,
}

fn parse_priority(raw: &str) -> Priority {
    match raw.to_lowercase().as_str() {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

/// A short, fixed description of each expert persona used when narrating the
/// simulated debate (spec SPEC_FULL §2.1 "Participant descriptions").
fn participant_blurb(profile: &crate::adapters::ExpertProfile) -> String {
    profile.persona_blurb.clone()
}

/// Compares expert answers, simulates a debate, and synthesizes a final
/// Recommendation (spec §4.6, C5). Backed by one designated LLM adapter (D).
pub struct DebateModerator {
    backing: Arc<dyn Expert>,
    monitoring: Arc<Monitoring>,
}

impl DebateModerator {
    pub fn new(backing: Arc<dyn Expert>, monitoring: Arc<Monitoring>) -> Self {
        Self { backing, monitoring }
    }

    pub async fn moderate(
        &self,
        responses: &[ExpertResponse],
        question: &str,
        deadline: std::time::Instant,
    ) -> Recommendation {
        match responses.len() {
            0 => Recommendation::diagnostic(),
            1 => self.single_expert(&responses[0], deadline).await,
            _ => self.full_debate(responses, question, deadline).await,
        }
    }

    /// Spec §4.6 "Single expert succeeded": skip phases 1-2, structure that
    /// one response into the Recommendation schema, confidence is the
    /// expert's own confidence.
    async fn single_expert(
        &self,
        response: &ExpertResponse,
        deadline: std::time::Instant,
    ) -> Recommendation {
        let prompt = format!(
            "Structure the following single expert response into the required JSON \
             recommendation schema. Expert: {} ({}). Response:\n{}",
            response.name, response.specialty, response.reply
        );
        let query = ExpertQuery {
            question: prompt,
            issue_context: String::new(),
            retrieved_snippets: Vec::new(),
            history_digest: None,
            deadline,
            cancellation_token: None,
        };

        let provenance = SynthesisProvenance {
            participants: vec![response.name],
            debate_rounds_count: 0,
            synthesized_at: chrono::Utc::now(),
        };

        match self.backing.answer(query).await {
            Ok(reply) => match parse_solution(&reply.reply) {
                Some(solution) => solution_to_recommendation(solution, provenance, false),
                None => {
                    self.monitoring.parse_failures.inc();
                    single_expert_fallback(response, provenance)
                }
            },
            Err(_) => {
                self.monitoring.parse_failures.inc();
                single_expert_fallback(response, provenance)
            }
        }
    }

    /// Spec §4.6 three-phase debate for 2+ successful experts.
    async fn full_debate(
        &self,
        responses: &[ExpertResponse],
        question: &str,
        deadline: std::time::Instant,
    ) -> Recommendation {
        let mut sorted: Vec<&ExpertResponse> = responses.iter().collect();
        sorted.sort_by_key(|r| r.name);

        let analysis = self.analyze_differences(&sorted, deadline).await;
        let debate = self
            .simulate_debate(&sorted, &analysis, question, deadline)
            .await;

        let provenance = SynthesisProvenance {
            participants: sorted.iter().map(|r| r.name).collect(),
            debate_rounds_count: debate.debate_rounds.len() as u32,
            synthesized_at: chrono::Utc::now(),
        };

        match self.synthesize(&sorted, &debate, question, deadline).await {
            Ok(solution) => solution_to_recommendation(solution, provenance, false),
            Err(Some(raw)) => synthesis_parse_failure_fallback(raw, provenance),
            Err(None) => debate_failure_fallback(&sorted, provenance),
        }
    }

    /// Phase 1 (spec §4.6): on parse failure, fall back to an empty-but-valid
    /// report and continue — never aborts the turn.
    async fn analyze_differences(
        &self,
        responses: &[&ExpertResponse],
        deadline: std::time::Instant,
    ) -> DifferenceAnalysis {
        let mut prompt = String::from(
            "Compare the following manufacturing expert opinions. Identify common points, \
             differences (area + details), conflicts (issue + positions), and complementary \
             aspects. Respond as JSON with keys: common_points, differences, conflicts, \
             complementary_aspects.\n\n",
        );
        for r in responses {
            prompt.push_str(&format!(
                "=== {} ({}) ===\nConfidence: {:.2}\nOpinion: {}\n\n",
                r.name, r.specialty, r.confidence, r.reply
            ));
        }

        let query = ExpertQuery {
            question: prompt,
            issue_context: String::new(),
            retrieved_snippets: Vec::new(),
            history_digest: None,
            deadline,
            cancellation_token: None,
        };

        match self.backing.answer(query).await {
            Ok(reply) => serde_json::from_str(&reply.reply).unwrap_or_else(|_| {
                self.monitoring.parse_failures.inc();
                DifferenceAnalysis::default()
            }),
            Err(_) => {
                self.monitoring.parse_failures.inc();
                DifferenceAnalysis::default()
            }
        }
    }

    /// Phase 2 (spec §4.6): on parse failure, fall back to a minimal record
    /// with the raw text preserved under `raw`.
    async fn simulate_debate(
        &self,
        responses: &[&ExpertResponse],
        analysis: &DifferenceAnalysis,
        question: &str,
        deadline: std::time::Instant,
    ) -> DebateResult {
        let mut prompt = format!(
            "Simulate a constructive panel debate between the following manufacturing experts \
             about the user's problem: {question}\n\nParticipants and initial opinions:\n"
        );
        for r in responses {
            let summary: String = r.reply.chars().take(500).collect();
            prompt.push_str(&format!("{}: \"{summary}\"\n", participant_blurb_for(r)));
        }
        prompt.push_str(&format!(
            "\nCommon points: {}\nConflicts: {:?}\n\nRespond as JSON with keys: debate_rounds \
             (list of {{round, topic, discussions: [{{speaker, statement}}]}}), consensus_points, \
             final_agreement.",
            analysis.common_points.join(", "),
            analysis.conflicts
        ));

        let query = ExpertQuery {
            question: prompt,
            issue_context: String::new(),
            retrieved_snippets: Vec::new(),
            history_digest: None,
            deadline,
            cancellation_token: None,
        };

        match self.backing.answer(query).await {
            Ok(reply) => serde_json::from_str(&reply.reply).unwrap_or_else(|_| {
                self.monitoring.parse_failures.inc();
                DebateResult {
                    raw: Some(reply.reply),
                    ..Default::default()
                }
            }),
            Err(_) => {
                self.monitoring.parse_failures.inc();
                DebateResult::default()
            }
        }
    }

    /// Phase 3 (spec §4.6). Distinguishes a parse failure (`Err(Some(raw))`,
    /// the backing call succeeded but its reply didn't parse — degrades to a
    /// raw-text Recommendation) from the backing call itself erroring
    /// (`Err(None)` — this, alongside phases 1 and 2 already having degraded,
    /// is the genuine "moderator fails in all three phases" case).
    async fn synthesize(
        &self,
        responses: &[&ExpertResponse],
        debate: &DebateResult,
        question: &str,
        deadline: std::time::Instant,
    ) -> Result<SynthesizedSolution, Option<String>> {
        let prompt = format!(
            "User question: {question}\n\nConsensus: {}\nFinal agreement: {}\n\n\
             Write the final recommendation as JSON matching the required schema.",
            debate.consensus_points.join(", "),
            debate.final_agreement,
        );
        let _ = responses;

        let query = ExpertQuery {
            question: prompt,
            issue_context: String::new(),
            retrieved_snippets: Vec::new(),
            history_digest: None,
            deadline,
            cancellation_token: None,
        };

        let reply = self.backing.answer(query).await.map_err(|_| {
            self.monitoring.parse_failures.inc();
            None
        })?;
        match parse_solution(&reply.reply) {
            Some(solution) => Ok(solution),
            None => {
                self.monitoring.parse_failures.inc();
                Err(Some(reply.reply))
            }
        }
    }
}

fn participant_blurb_for(r: &ExpertResponse) -> String {
    format!("{} ({})", r.name, r.specialty)
}

fn parse_solution(text: &str) -> Option<SynthesizedSolution> {
    serde_json::from_str(text).ok()
}

fn solution_to_recommendation(
    solution: SynthesizedSolution,
    provenance: SynthesisProvenance,
    fallback: bool,
) -> Recommendation {
    Recommendation {
        executive_summary: solution.executive_summary,
        immediate_actions: solution
            .immediate_actions
            .into_iter()
            .map(|a| ImmediateAction {
                step: a.step,
                action: a.action,
                time_estimate: a.time,
                priority: parse_priority(&a.priority),
                assignee: a.responsible.unwrap_or_else(|| "unassigned".to_string()),
            })
            .collect(),
        detailed_solution: solution
            .detailed_solution
            .into_iter()
            .map(|p| SolutionPhase {
                phase: p.phase,
                actions: p.actions,
                estimated_time: p.estimated_time,
                resources: p.resources.unwrap_or_default(),
            })
            .collect(),
        cost_estimation: CostEstimate {
            parts: solution.cost_estimation.parts,
            labor: solution.cost_estimation.labor,
            total: solution.cost_estimation.total,
        },
        safety_precautions: solution.safety_precautions,
        prevention_measures: solution.prevention_measures,
        success_indicators: solution.success_indicators,
        alternative_approaches: solution.alternative_approaches,
        expert_consensus: solution.expert_consensus,
        confidence_level: solution.confidence_level,
        recommended_followup: solution.recommended_followup,
        provenance,
        fallback,
    }
}

/// Spec §4.6: synthesis phase parse failure on the single-expert path yields
/// a degraded recommendation built directly from the expert's raw text.
fn single_expert_fallback(
    response: &ExpertResponse,
    provenance: SynthesisProvenance,
) -> Recommendation {
    Recommendation {
        executive_summary: format!("{} expert's analysis is presented below.", response.name),
        immediate_actions: vec![ImmediateAction {
            step: 1,
            action: "Review the expert's analysis".to_string(),
            time_estimate: "immediate".to_string(),
            priority: Priority::Medium,
            assignee: "unassigned".to_string(),
        }],
        detailed_solution: vec![SolutionPhase {
            phase: "Analysis".to_string(),
            actions: vec![response.reply.chars().take(800).collect()],
            estimated_time: "n/a".to_string(),
            resources: String::new(),
        }],
        cost_estimation: CostEstimate::default(),
        safety_precautions: vec!["Follow the expert's recommendations".to_string()],
        prevention_measures: vec!["Schedule a routine inspection".to_string()],
        success_indicators: vec!["Issue resolved".to_string()],
        alternative_approaches: vec!["Consult an additional expert".to_string()],
        expert_consensus: format!("{} single-expert analysis", response.name),
        confidence_level: response.confidence,
        recommended_followup: "Consider reviewing additional expert opinions.".to_string(),
        provenance,
        fallback: false,
    }
}

/// Spec §4.6 phase 3 parse failure: the backing call succeeded but its reply
/// didn't parse as the Recommendation schema. The raw text becomes the
/// executive summary; every other structured field carries a sentinel value.
/// Distinct from `debate_failure_fallback`, which is reserved for the
/// backing call itself erroring out.
fn synthesis_parse_failure_fallback(raw: String, provenance: SynthesisProvenance) -> Recommendation {
    Recommendation {
        executive_summary: raw,
        immediate_actions: Vec::new(),
        detailed_solution: Vec::new(),
        cost_estimation: CostEstimate::default(),
        safety_precautions: Vec::new(),
        prevention_measures: Vec::new(),
        success_indicators: Vec::new(),
        alternative_approaches: Vec::new(),
        expert_consensus: "moderator synthesis did not parse; raw text shown".to_string(),
        confidence_level: 0.5,
        recommended_followup: "Retry for a fully structured recommendation if needed.".to_string(),
        provenance,
        fallback: false,
    }
}

/// Spec §4.6 "Moderator itself fails in all three phases": fall back to the
/// expert response with the highest confidence, mark `fallback: true`, copy
/// its text as the executive summary (`debate_moderator.py`'s
/// `handle_debate_failure`).
fn debate_failure_fallback(
    responses: &[&ExpertResponse],
    provenance: SynthesisProvenance,
) -> Recommendation {
    let best = responses
        .iter()
        .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap())
        .expect("full_debate is only called with at least one response");

    Recommendation {
        executive_summary: format!(
            "The expert debate could not be completed; presenting the highest-confidence \
             opinion from {}.",
            best.name
        ),
        immediate_actions: Vec::new(),
        detailed_solution: vec![SolutionPhase {
            phase: "Primary expert opinion".to_string(),
            actions: vec![best.reply.clone()],
            estimated_time: "n/a".to_string(),
            resources: String::new(),
        }],
        cost_estimation: CostEstimate::default(),
        safety_precautions: Vec::new(),
        prevention_measures: Vec::new(),
        success_indicators: Vec::new(),
        alternative_approaches: Vec::new(),
        expert_consensus: format!("Debate simulation failed; {} opinion used as-is.", best.name),
        confidence_level: best.confidence,
        recommended_followup: "Retry for a full synthesized recommendation if needed.".to_string(),
        provenance,
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ExpertProfile;
    use crate::domain::expert::{ExpertName, TokenUsage};
    use crate::error::ExpertError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubExpert {
        profile: ExpertProfile,
        replies: Mutex<Vec<Result<String, ExpertError>>>,
    }

    #[async_trait]
    impl Expert for StubExpert {
        fn profile(&self) -> &ExpertProfile {
            &self.profile
        }

        async fn answer(&self, _query: ExpertQuery) -> Result<ExpertResponse, ExpertError> {
            let next = self.replies.lock().unwrap().remove(0);
            next.map(|text| ExpertResponse {
                name: ExpertName::D,
                specialty: "moderator".to_string(),
                reply: text,
                confidence: 0.8,
                usage: TokenUsage::default(),
                elapsed: std::time::Duration::from_millis(1),
                model_id: "stub".to_string(),
            })
        }
    }

    fn profile() -> ExpertProfile {
        ExpertProfile {
            name: ExpertName::D,
            specialty: "moderator".to_string(),
            persona_blurb: "moderator".to_string(),
        }
    }

    fn expert_response(name: ExpertName, confidence: f64, reply: &str) -> ExpertResponse {
        ExpertResponse {
            name,
            specialty: "test".to_string(),
            reply: reply.to_string(),
            confidence,
            usage: TokenUsage::default(),
            elapsed: std::time::Duration::from_millis(1),
            model_id: "stub".to_string(),
        }
    }

    #[tokio::test]
    async fn zero_experts_never_invokes_moderator() {
        let backing = Arc::new(StubExpert {
            profile: profile(),
            replies: Mutex::new(vec![]),
        });
        let moderator = DebateModerator::new(backing, Arc::new(Monitoring::new()));
        let rec = moderator
            .moderate(&[], "anything", std::time::Instant::now() + std::time::Duration::from_secs(1))
            .await;
        assert_eq!(rec.confidence_level, 0.0);
        assert!(!rec.fallback);
    }

    #[tokio::test]
    async fn single_expert_parse_failure_falls_back_to_raw_text() {
        let backing = Arc::new(StubExpert {
            profile: profile(),
            replies: Mutex::new(vec![Ok("not json".to_string())]),
        });
        let moderator = DebateModerator::new(backing, Arc::new(Monitoring::new()));
        let resp = expert_response(ExpertName::A, 0.75, "torque the bolt to spec");
        let rec = moderator
            .moderate(
                std::slice::from_ref(&resp),
                "q",
                std::time::Instant::now() + std::time::Duration::from_secs(1),
            )
            .await;
        assert_eq!(rec.confidence_level, 0.75);
        assert!(!rec.fallback);
    }

    #[tokio::test]
    async fn moderator_failure_in_all_phases_falls_back_to_best_expert() {
        let backing = Arc::new(StubExpert {
            profile: profile(),
            replies: Mutex::new(vec![
                Err(ExpertError::Timeout {
                    provider: "d".to_string(),
                }),
                Err(ExpertError::Timeout {
                    provider: "d".to_string(),
                }),
                Err(ExpertError::Timeout {
                    provider: "d".to_string(),
                }),
            ]),
        });
        let moderator = DebateModerator::new(backing, Arc::new(Monitoring::new()));
        let a = expert_response(ExpertName::A, 0.6, "a's answer");
        let b = expert_response(ExpertName::B, 0.9, "b's answer");
        let rec = moderator
            .moderate(
                &[a, b],
                "q",
                std::time::Instant::now() + std::time::Duration::from_secs(1),
            )
            .await;
        assert!(rec.fallback);
        assert_eq!(rec.confidence_level, 0.9);
        assert!(rec.expert_consensus.contains('B'));
    }

    #[tokio::test]
    async fn phase_three_parse_failure_alone_keeps_raw_text_not_best_expert() {
        let backing = Arc::new(StubExpert {
            profile: profile(),
            replies: Mutex::new(vec![
                Ok(r#"{"common_points":[]}"#.to_string()),
                Ok(r#"{"debate_rounds":[]}"#.to_string()),
                Ok("the panel agrees: replace the bearing".to_string()),
            ]),
        });
        let monitoring = Arc::new(Monitoring::new());
        let moderator = DebateModerator::new(backing, monitoring.clone());
        let a = expert_response(ExpertName::A, 0.6, "a's answer");
        let b = expert_response(ExpertName::B, 0.9, "b's answer");
        let rec = moderator
            .moderate(
                &[a, b],
                "q",
                std::time::Instant::now() + std::time::Duration::from_secs(1),
            )
            .await;

        assert!(!rec.fallback);
        assert_eq!(rec.executive_summary, "the panel agrees: replace the bearing");
        assert_eq!(monitoring.parse_failures.get(), 1);
    }
}
