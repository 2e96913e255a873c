use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{Id as TaskId, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::adapters::{Expert, ExpertQuery};
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::domain::expert::{ExpertName, ExpertResponse, FailureRecord};
use crate::domain::recommendation::Recommendation;
use crate::domain::session::Turn;
use crate::equipment::NumericReading;
use crate::error::WorkflowError;
use crate::moderator::DebateModerator;
use crate::monitoring::Monitoring;
use crate::retrieval_provider::RetrievalProvider;
use crate::selector::Selector;
use crate::session_store::{AppendOutcome, SessionBackend};

/// A list of experts spawned but not heard from before the cutoff fired
/// (straggler cutoff grace drained with no response).
const STRAGGLER_GRACE: Duration = Duration::from_secs(3);
const ABORT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Nodes visited for one turn, recorded append-only in turn order (spec
/// §4.5: "steps_completed").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Classify,
    Select,
    Dispatch,
    Moderate,
    AllFailed,
}

/// The chat-turn output's non-Recommendation fields (spec §6).
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub conversation_count: u64,
    pub response_type: ResponseType,
    pub participating_experts: Vec<ExpertName>,
    pub failed_experts: Vec<FailureRecord>,
    pub processing_time: Duration,
    pub recommendation: Recommendation,
    pub steps_completed: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    FirstQuestion,
    FollowUp,
}

/// Fixed five-node graph (spec §4.5, C6):
/// `Classify -> Select -> Dispatch -> {A?, B?, C?} -> Moderate -> END`,
/// with conditional routing to the all-failed and single-expert terminals.
///
/// Generalizes `squall::review::ReviewExecutor`'s `JoinSet` + `select!`
/// straggler-cutoff loop: cooperative cancel, grace period for partial
/// results, hard abort, drain grace.
pub struct WorkflowEngine {
    settings: Settings,
    experts: HashMap<ExpertName, Arc<dyn Expert>>,
    classifier: Classifier,
    retrieval: RetrievalProvider,
    moderator: DebateModerator,
    store: Arc<dyn SessionBackend>,
    monitoring: Arc<Monitoring>,
}

impl WorkflowEngine {
    pub fn new(
        settings: Settings,
        experts: HashMap<ExpertName, Arc<dyn Expert>>,
        classifier: Classifier,
        retrieval: RetrievalProvider,
        moderator: DebateModerator,
        store: Arc<dyn SessionBackend>,
        monitoring: Arc<Monitoring>,
    ) -> Self {
        Self {
            settings,
            experts,
            classifier,
            retrieval,
            moderator,
            store,
            monitoring,
        }
    }

    /// Runs one full turn against an existing or newly created session (spec
    /// §2, "Data flow per turn").
    #[allow(clippy::too_many_arguments)]
    pub async fn run_turn(
        &self,
        session_id: Option<String>,
        owner_id: String,
        user_message: String,
        issue_code_hint: Option<String>,
        numeric_reading: Option<NumericReading>,
    ) -> Result<TurnOutcome, WorkflowError> {
        let turn_start = Instant::now();
        self.monitoring.total_requests.inc();
        self.monitoring.chat_requests.inc();

        let session = match session_id {
            Some(id) => self.store.get(&id).await.map_err(|_| WorkflowError::SessionNotFound)?,
            None => self
                .store
                .create(owner_id, issue_code_hint.clone())
                .await
                .map_err(|e| WorkflowError::Internal(e.to_string()))?,
        };

        let response_type = if session.conversation_count == 0 {
            ResponseType::FirstQuestion
        } else {
            ResponseType::FollowUp
        };

        let mut steps_completed = vec![Step::Classify];
        let global_deadline = Instant::now() + self.settings.turn_timeout;

        // Classify (C3): static dictionary + keyword heuristic + optional
        // numeric-trigger escalation.
        let classification = self.classifier.classify(
            &user_message,
            issue_code_hint.as_deref(),
            numeric_reading.as_ref(),
        );

        // Retrieval context (C2), fanned out in parallel with classification
        // would require restructuring around a join; kept sequential here
        // since the classifier's dictionary lookup is in-process and fast
        // relative to the network-bound retrieval backends.
        let retrieval = self.retrieval.retrieve(&user_message, 5).await;
        let snippets: Vec<String> = retrieval
            .merged_top_k(5)
            .into_iter()
            .map(|s| s.text)
            .collect();

        steps_completed.push(Step::Select);
        let (chosen, _rationale) = Selector::select(&classification, session.conversation_count);

        steps_completed.push(Step::Dispatch);
        let issue_context = classification
            .issue_code
            .as_deref()
            .map(|code| format!("Known issue: {code}"))
            .unwrap_or_default();
        let history_digest = recent_history_digest(&session.history);

        let (successes, failures) = self
            .dispatch(
                &chosen,
                &user_message,
                &issue_context,
                &snippets,
                history_digest,
                global_deadline,
            )
            .await;

        for name in &chosen {
            self.monitoring
                .record_expert_outcome(*name, successes.iter().any(|r| r.name == *name));
        }

        let (recommendation, steps_completed) = if successes.is_empty() {
            steps_completed.push(Step::AllFailed);
            (Recommendation::diagnostic(), steps_completed)
        } else {
            let moderator_deadline = Instant::now() + self.settings.moderator_timeout;
            let rec = self
                .moderator
                .moderate(&successes, &user_message, moderator_deadline.min(global_deadline))
                .await
                .with_failure_notice(&failures.iter().map(|f| f.name).collect::<Vec<_>>());
            let mut steps_completed = steps_completed;
            steps_completed.push(Step::Moderate);
            (rec, steps_completed)
        };

        if successes.is_empty() {
            self.monitoring.workflow_errors.inc();
        } else {
            self.monitoring.workflow_success.inc();
        }

        let processing_time = turn_start.elapsed();
        self.monitoring
            .workflow_duration
            .observe(processing_time.as_secs_f64());

        // Spec §8, scenario 5: when every expert fails the turn is never
        // committed — the counter and history are left exactly as they were.
        let conversation_count = if successes.is_empty() {
            session.conversation_count
        } else {
            let turn = Turn {
                user_message,
                reply: recommendation.executive_summary.clone(),
                at: chrono::Utc::now(),
                participating_experts: successes.iter().map(|r| r.name).collect(),
                expert_processing_time: successes.iter().map(|r| (r.name, r.elapsed)).collect(),
                confidence_level: recommendation.confidence_level,
                moderator_record: recommendation.provenance.clone(),
            };
            let committed = self
                .commit_with_retry(&session.id, session.conversation_count, turn)
                .await?;
            committed.conversation_count
        };

        self.monitoring
            .request_duration
            .observe(turn_start.elapsed().as_secs_f64());

        Ok(TurnOutcome {
            session_id: session.id,
            conversation_count,
            response_type,
            participating_experts: successes.iter().map(|r| r.name).collect(),
            failed_experts: failures,
            processing_time,
            recommendation,
            steps_completed,
        })
    }

    /// Optimistic-concurrency commit (spec §5): one retry on conflict, then
    /// `CONCURRENT_TURN`.
    async fn commit_with_retry(
        &self,
        session_id: &str,
        expected_count: u64,
        turn: Turn,
    ) -> Result<crate::domain::session::Session, WorkflowError> {
        let outcome = self
            .store
            .append_turn(session_id, expected_count, turn.clone(), self.settings.max_history_turns)
            .await
            .map_err(|e| WorkflowError::Internal(e.to_string()))?;

        match outcome {
            AppendOutcome::Committed(session) => Ok(session),
            AppendOutcome::NotFound => Err(WorkflowError::SessionNotFound),
            AppendOutcome::Conflict => {
                let refreshed = self
                    .store
                    .get(session_id)
                    .await
                    .map_err(|_| WorkflowError::SessionNotFound)?;
                let retry = self
                    .store
                    .append_turn(
                        session_id,
                        refreshed.conversation_count,
                        turn,
                        self.settings.max_history_turns,
                    )
                    .await
                    .map_err(|e| WorkflowError::Internal(e.to_string()))?;
                match retry {
                    AppendOutcome::Committed(session) => Ok(session),
                    AppendOutcome::NotFound => Err(WorkflowError::SessionNotFound),
                    AppendOutcome::Conflict => Err(WorkflowError::ConcurrentTurn),
                }
            }
        }
    }

    /// Dispatch node (spec §4.5): fans `chosen` experts out concurrently,
    /// each racing a per-expert deadline against the shared turn deadline;
    /// waits for all dispatched experts (success or failure) before
    /// returning, applying the same cooperative-cancel-then-hard-abort
    /// straggler cutoff as `squall::review::ReviewExecutor::execute`.
    async fn dispatch(
        &self,
        chosen: &[ExpertName],
        question: &str,
        issue_context: &str,
        snippets: &[String],
        history_digest: Option<String>,
        global_deadline: Instant,
    ) -> (Vec<ExpertResponse>, Vec<FailureRecord>) {
        let mut set: JoinSet<(ExpertName, Result<ExpertResponse, crate::error::ExpertError>)> =
            JoinSet::new();
        let mut task_names: HashMap<TaskId, ExpertName> = HashMap::new();
        let cancel_token = CancellationToken::new();

        let per_expert_deadline = Instant::now() + self.settings.expert_timeout;
        let effective_deadline = per_expert_deadline.min(global_deadline);

        for &name in chosen {
            let Some(expert) = self.experts.get(&name).cloned() else {
                continue;
            };
            let query = ExpertQuery {
                question: question.to_string(),
                issue_context: issue_context.to_string(),
                retrieved_snippets: snippets.to_vec(),
                history_digest: history_digest.clone(),
                deadline: effective_deadline,
                cancellation_token: Some(cancel_token.clone()),
            };
            let handle =
                set.spawn(async move { (name, call_with_retry(expert.as_ref(), query, effective_deadline).await) });
            task_names.insert(handle.id(), name);
        }

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        let mut responded: std::collections::HashSet<ExpertName> = std::collections::HashSet::new();

        let cutoff = tokio::time::sleep(
            effective_deadline
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::ZERO),
        );
        tokio::pin!(cutoff);

        loop {
            tokio::select! {
                biased;
                joined = set.join_next() => {
                    match joined {
                        Some(Ok((name, result))) => {
                            responded.insert(name);
                            record_outcome(name, result, &self.monitoring, &mut successes, &mut failures);
                            if set.is_empty() { break; }
                        }
                        Some(Err(join_err)) if join_err.is_panic() => {
                            if let Some(name) = task_names.get(&join_err.id()) {
                                failures.push(FailureRecord {
                                    name: *name,
                                    error_kind: "INTERNAL",
                                    message: "expert adapter task panicked".to_string(),
                                    at: chrono::Utc::now(),
                                });
                                responded.insert(*name);
                            }
                            if set.is_empty() { break; }
                        }
                        Some(Err(_)) => { if set.is_empty() { break; } }
                        None => break,
                    }
                }
                _ = &mut cutoff => {
                    cancel_token.cancel();
                    drain_with_grace(&mut set, &task_names, STRAGGLER_GRACE, &self.monitoring, &mut responded, &mut successes, &mut failures).await;
                    set.abort_all();
                    drain_with_grace(&mut set, &task_names, ABORT_DRAIN_GRACE, &self.monitoring, &mut responded, &mut successes, &mut failures).await;
                    break;
                }
            }
        }

        for &name in chosen {
            if !responded.contains(&name) {
                failures.push(FailureRecord {
                    name,
                    error_kind: "TIMEOUT",
                    message: format!("{name} did not respond before the turn deadline"),
                    at: chrono::Utc::now(),
                });
            }
        }

        successes.sort_by_key(|r| r.name);
        (successes, failures)
    }
}

fn record_outcome(
    name: ExpertName,
    result: Result<ExpertResponse, crate::error::ExpertError>,
    monitoring: &Monitoring,
    successes: &mut Vec<ExpertResponse>,
    failures: &mut Vec<FailureRecord>,
) {
    match result {
        Ok(response) => {
            monitoring.expert_latency.observe(response.elapsed.as_secs_f64());
            successes.push(response);
        }
        Err(err) => failures.push(FailureRecord::from_error(name, &err)),
    }
}

async fn drain_with_grace(
    set: &mut JoinSet<(ExpertName, Result<ExpertResponse, crate::error::ExpertError>)>,
    task_names: &HashMap<TaskId, ExpertName>,
    grace: Duration,
    monitoring: &Monitoring,
    responded: &mut std::collections::HashSet<ExpertName>,
    successes: &mut Vec<ExpertResponse>,
    failures: &mut Vec<FailureRecord>,
) {
    let timer = tokio::time::sleep(grace);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            biased;
            joined = set.join_next() => {
                match joined {
                    Some(Ok((name, result))) => {
                        responded.insert(name);
                        record_outcome(name, result, monitoring, successes, failures);
                    }
                    Some(Err(join_err)) if join_err.is_panic() => {
                        if let Some(name) = task_names.get(&join_err.id()) {
                            responded.insert(*name);
                        }
                    }
                    Some(Err(_)) => {}
                    None => break,
                }
            }
            _ = &mut timer => break,
        }
    }
}

/// Retries a transient `ExpertError` once with jittered backoff bounded by
/// the remaining deadline (spec §7, `ExpertError::is_transient`). Permanent
/// errors and successes return immediately without a second call.
async fn call_with_retry(
    expert: &dyn Expert,
    query: ExpertQuery,
    deadline: Instant,
) -> Result<ExpertResponse, crate::error::ExpertError> {
    const RETRY_MARGIN: Duration = Duration::from_millis(300);

    let retry_query = query.clone();
    let first = expert.answer(query).await;
    let Err(err) = &first else { return first };
    if !err.is_transient() {
        return first;
    }
    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
        return first;
    };
    if remaining <= RETRY_MARGIN {
        return first;
    }

    tokio::time::sleep(jittered_backoff(remaining)).await;
    expert.answer(retry_query).await
}

/// A random backoff in `[50ms, 250ms]`, capped so it never eats into the
/// margin `call_with_retry` already reserved before the retried call itself.
fn jittered_backoff(remaining: Duration) -> Duration {
    use rand::Rng;
    const MIN_BACKOFF: Duration = Duration::from_millis(50);
    const MAX_BACKOFF: Duration = Duration::from_millis(250);
    let cap = MAX_BACKOFF.min(remaining.saturating_sub(MIN_BACKOFF)).max(MIN_BACKOFF);
    Duration::from_millis(rand::thread_rng().gen_range(MIN_BACKOFF.as_millis() as u64..=cap.as_millis() as u64))
}

/// A short digest of recent history fed to each expert as conversation
/// continuity context (spec §4.1's "suspension-safe context").
fn recent_history_digest(history: &[Turn]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let recent = history.iter().rev().take(3).rev();
    let mut digest = String::new();
    for turn in recent {
        digest.push_str(&format!("Q: {}\nA: {}\n", turn.user_message, turn.reply));
    }
    Some(digest)
}
