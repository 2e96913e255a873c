use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use consult_engine::adapters::{Expert, ExpertProfile, ExpertQuery};
use consult_engine::classifier::Classifier;
use consult_engine::config::Settings;
use consult_engine::domain::expert::{ExpertName, ExpertResponse, TokenUsage};
use consult_engine::error::ExpertError;
use consult_engine::moderator::DebateModerator;
use consult_engine::monitoring::Monitoring;
use consult_engine::retrieval_provider::RetrievalProvider;
use consult_engine::session_store::CompositeSessionStore;
use consult_engine::workflow::WorkflowEngine;

/// Canned expert used across the scenarios below: each call pops the next
/// reply from a fixed queue and records the query it was asked, so tests can
/// assert on prompt content (the follow-up scenario checks history made it
/// into the prompt).
struct ScriptedExpert {
    profile: ExpertProfile,
    replies: Mutex<Vec<Result<String, ExpertError>>>,
    confidence: f64,
    seen_queries: Mutex<Vec<String>>,
}

impl ScriptedExpert {
    fn new(name: ExpertName, confidence: f64, replies: Vec<Result<String, ExpertError>>) -> Arc<Self> {
        Arc::new(Self {
            profile: ExpertProfile {
                name,
                specialty: format!("{name}-specialty"),
                persona_blurb: format!("expert {name}"),
            },
            replies: Mutex::new(replies),
            confidence,
            seen_queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Expert for ScriptedExpert {
    fn profile(&self) -> &ExpertProfile {
        &self.profile
    }

    async fn answer(&self, query: ExpertQuery) -> Result<ExpertResponse, ExpertError> {
        self.seen_queries.lock().unwrap().push(query.question.clone());
        let next = self.replies.lock().unwrap().remove(0);
        next.map(|text| ExpertResponse {
            name: self.profile.name,
            specialty: self.profile.specialty.clone(),
            reply: text,
            confidence: self.confidence,
            usage: TokenUsage::default(),
            elapsed: Duration::from_millis(5),
            model_id: "scripted".to_string(),
        })
    }
}

fn single_expert_json(summary: &str) -> String {
    format!(
        r#"{{"executive_summary":"{summary}","immediate_actions":[],"detailed_solution":[],
        "cost_estimation":{{"parts":"n/a","labor":"n/a","total":"n/a"}},"safety_precautions":[],
        "prevention_measures":[],"success_indicators":[],"alternative_approaches":[],
        "expert_consensus":"A's analysis accepted","confidence_level":0.8,
        "recommended_followup":"none"}}"#
    )
}

fn debate_synthesis_json(summary: &str) -> String {
    format!(
        r#"{{"executive_summary":"{summary}","immediate_actions":[],"detailed_solution":[],
        "cost_estimation":{{"parts":"n/a","labor":"n/a","total":"n/a"}},"safety_precautions":[],
        "prevention_measures":[],"success_indicators":[],"alternative_approaches":[],
        "expert_consensus":"panel agreement reached","confidence_level":0.85,
        "recommended_followup":"schedule follow-up inspection"}}"#
    )
}

fn difference_analysis_json() -> String {
    r#"{"common_points":["both note wear"],"differences":[],"conflicts":[],"complementary_aspects":[]}"#
        .to_string()
}

fn debate_rounds_json() -> String {
    r#"{"debate_rounds":[{"round":1,"topic":"root cause","discussions":[{"speaker":"A","statement":"wear"}]}],
    "consensus_points":["replace the part"],"final_agreement":"replace and monitor"}"#
        .to_string()
}

fn engine(
    experts: HashMap<ExpertName, Arc<dyn Expert>>,
    moderator_backing: Arc<dyn Expert>,
) -> WorkflowEngine {
    let monitoring = Arc::new(Monitoring::new());
    WorkflowEngine::new(
        Settings::default(),
        experts,
        Classifier::new(),
        RetrievalProvider::new(None, None, Duration::from_secs(1)),
        DebateModerator::new(moderator_backing, monitoring.clone()),
        Arc::new(CompositeSessionStore::local_only()),
        monitoring,
    )
}

/// Scenario 1 (spec §8): cold session, general single-expert category.
#[tokio::test]
async fn cold_session_general_question_routes_to_single_expert() {
    let a = ScriptedExpert::new(ExpertName::A, 0.8, vec![Ok("tighten the idler pulley".to_string())]);
    let d = ScriptedExpert::new(ExpertName::D, 0.8, vec![Ok(single_expert_json("tighten the idler pulley"))]);

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    experts.insert(ExpertName::A, a);

    let engine = engine(experts, d);
    let outcome = engine
        .run_turn(
            None,
            "operator-1".to_string(),
            "the conveyor belt keeps stopping".to_string(),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.participating_experts, vec![ExpertName::A]);
    assert_eq!(outcome.conversation_count, 1);
    assert!(outcome.failed_experts.is_empty());
}

/// Scenario 2 (spec §8): safety-critical question selects all three experts
/// and runs the full debate path.
#[tokio::test]
async fn safety_critical_question_runs_full_debate() {
    let a = ScriptedExpert::new(ExpertName::A, 0.8, vec![Ok("inspect brake pads".to_string())]);
    let b = ScriptedExpert::new(ExpertName::B, 0.75, vec![Ok("check hydraulic pressure".to_string())]);
    let c = ScriptedExpert::new(ExpertName::C, 0.7, vec![Ok("replace disc if warped".to_string())]);
    let d = ScriptedExpert::new(
        ExpertName::D,
        0.8,
        vec![
            Ok(difference_analysis_json()),
            Ok(debate_rounds_json()),
            Ok(debate_synthesis_json("Brakes show fade; this is a safety issue requiring immediate action.")),
        ],
    );

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    experts.insert(ExpertName::A, a);
    experts.insert(ExpertName::B, b);
    experts.insert(ExpertName::C, c);

    let engine = engine(experts, d);
    let outcome = engine
        .run_turn(
            None,
            "operator-2".to_string(),
            "Is this a safety issue? The brakes won't engage properly.".to_string(),
            Some("ASBP-BRAKE-FADE".to_string()),
            None,
        )
        .await
        .unwrap();

    let mut participating = outcome.participating_experts.clone();
    participating.sort();
    assert_eq!(participating, vec![ExpertName::A, ExpertName::B, ExpertName::C]);
    assert!(outcome.recommendation.provenance.debate_rounds_count >= 1);
    assert!(outcome.recommendation.executive_summary.to_lowercase().contains("brake"));
    assert!(outcome.recommendation.executive_summary.to_lowercase().contains("safety"));
}

/// Scenario 3 (spec §8): one of three selected experts times out; the
/// recommendation still succeeds, and the failure notice is appended.
#[tokio::test]
async fn partial_failure_produces_notice_and_failure_record() {
    let a = ScriptedExpert::new(ExpertName::A, 0.8, vec![Ok("inspect brake pads".to_string())]);
    let b = ScriptedExpert::new(
        ExpertName::B,
        0.0,
        vec![
            Err(ExpertError::Timeout { provider: "b".to_string() }),
            Err(ExpertError::Timeout { provider: "b".to_string() }),
        ],
    );
    let c = ScriptedExpert::new(ExpertName::C, 0.7, vec![Ok("replace disc if warped".to_string())]);
    let d = ScriptedExpert::new(
        ExpertName::D,
        0.8,
        vec![
            Ok(difference_analysis_json()),
            Ok(debate_rounds_json()),
            Ok(debate_synthesis_json("Brake safety issue identified by two of three experts.")),
        ],
    );

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    experts.insert(ExpertName::A, a);
    experts.insert(ExpertName::B, b);
    experts.insert(ExpertName::C, c);

    let engine = engine(experts, d);
    let outcome = engine
        .run_turn(
            None,
            "operator-3".to_string(),
            "Is this a safety issue? The brakes won't engage properly.".to_string(),
            Some("ASBP-BRAKE-FADE".to_string()),
            None,
        )
        .await
        .unwrap();

    let mut participating = outcome.participating_experts.clone();
    participating.sort();
    assert_eq!(participating, vec![ExpertName::A, ExpertName::C]);
    assert_eq!(outcome.failed_experts.len(), 1);
    assert_eq!(outcome.failed_experts[0].name, ExpertName::B);
    assert_eq!(outcome.failed_experts[0].error_kind, "TIMEOUT");
    assert!(outcome.recommendation.executive_summary.contains("did not respond"));
}

/// Scenario 4 (spec §8): a follow-up turn on the same session sees the
/// prior turn in its history digest.
#[tokio::test]
async fn follow_up_turn_carries_prior_turn_in_history_digest() {
    let a = ScriptedExpert::new(
        ExpertName::A,
        0.8,
        vec![
            Ok("welcome, Park Seoul".to_string()),
            Ok("your name is Park Seoul".to_string()),
        ],
    );
    let d = ScriptedExpert::new(
        ExpertName::D,
        0.8,
        vec![
            Ok(single_expert_json("welcome, Park Seoul")),
            Ok(single_expert_json("your name is Park Seoul")),
        ],
    );

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    experts.insert(ExpertName::A, a.clone());

    let engine = engine(experts, d);

    let first = engine
        .run_turn(
            None,
            "operator-4".to_string(),
            "My name is Park Seoul. The machine sounds unusual today.".to_string(),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(first.conversation_count, 1);

    let second = engine
        .run_turn(
            Some(first.session_id.clone()),
            "operator-4".to_string(),
            "what was my name again?".to_string(),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(second.conversation_count, 2);
    let seen = a.seen_queries.lock().unwrap();
    assert!(seen[1].contains("Park Seoul"));
}

/// Scenario 5 (spec §8): every expert fails — diagnostic recommendation,
/// counter and history untouched.
#[tokio::test]
async fn all_experts_failing_leaves_session_state_untouched() {
    let auth_err = || Err(ExpertError::AuthError { provider: "x".to_string(), message: "bad key".to_string() });
    let a = ScriptedExpert::new(ExpertName::A, 0.0, vec![auth_err()]);
    let b = ScriptedExpert::new(ExpertName::B, 0.0, vec![auth_err()]);
    let c = ScriptedExpert::new(ExpertName::C, 0.0, vec![auth_err()]);
    let d = ScriptedExpert::new(ExpertName::D, 0.0, vec![]);

    let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
    experts.insert(ExpertName::A, a);
    experts.insert(ExpertName::B, b);
    experts.insert(ExpertName::C, c);

    let engine = engine(experts, d);
    let outcome = engine
        .run_turn(
            None,
            "operator-5".to_string(),
            "Is this a safety issue? The brakes won't engage properly.".to_string(),
            Some("ASBP-BRAKE-FADE".to_string()),
            None,
        )
        .await
        .unwrap();

    assert!(outcome.participating_experts.is_empty());
    assert_eq!(outcome.recommendation.confidence_level, 0.0);
    assert_eq!(outcome.conversation_count, 0);
}

/// Scenario 6 (spec §8): several turns race on the same session under
/// optimistic concurrency. Every attempt must resolve to either a commit
/// with a distinct `conversation_count` or `WorkflowError::ConcurrentTurn` —
/// never a silent lost update or a duplicate commit — and the store's final
/// state must agree with however many attempts actually won.
#[tokio::test]
async fn concurrent_turns_never_lose_or_duplicate_a_commit() {
    use consult_engine::error::WorkflowError;
    use consult_engine::session_store::SessionBackend;

    let store = Arc::new(CompositeSessionStore::local_only());
    let session = store.create("operator-6".to_string(), None).await.unwrap();

    const RACERS: usize = 4;
    let mut engines = Vec::with_capacity(RACERS);
    for _ in 0..RACERS {
        let a = ScriptedExpert::new(ExpertName::A, 0.8, vec![Ok("ok".to_string())]);
        let d = ScriptedExpert::new(ExpertName::D, 0.8, vec![Ok(single_expert_json("ok"))]);
        let mut experts: HashMap<ExpertName, Arc<dyn Expert>> = HashMap::new();
        experts.insert(ExpertName::A, a);
        engines.push(engine(experts, d));
    }

    let mut set = tokio::task::JoinSet::new();
    for (i, engine) in engines.into_iter().enumerate() {
        let session_id = session.id.clone();
        set.spawn(async move {
            engine
                .run_turn(Some(session_id), format!("operator-6-{i}"), "another question".to_string(), None, None)
                .await
        });
    }

    let mut committed_counts = Vec::new();
    let mut conflicts = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(outcome) => committed_counts.push(outcome.conversation_count),
            Err(WorkflowError::ConcurrentTurn) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(committed_counts.len() + conflicts, RACERS);
    committed_counts.sort_unstable();
    committed_counts.dedup();
    assert_eq!(committed_counts.len(), committed_counts.last().copied().unwrap_or(0) as usize);

    let final_session = store.get(&session.id).await.unwrap();
    assert_eq!(final_session.conversation_count, committed_counts.last().copied().unwrap_or(0));
    assert_eq!(final_session.history.len(), final_session.conversation_count as usize);
}
