use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

use crate::domain::expert::ExpertName;

/// Counters, histograms, and a health snapshot (spec §4.8, C8).
///
/// Grounded in the `dashflow-observability` example crate's use of a
/// Prometheus registry rather than hand-rolled atomics, adapted to the exact
/// counter/histogram/health-snapshot vocabulary spec.md §4.8 names.
pub struct Monitoring {
    registry: Registry,
    pub total_requests: IntCounter,
    pub chat_requests: IntCounter,
    pub workflow_success: IntCounter,
    pub workflow_errors: IntCounter,
    pub expert_failures: IntCounter,
    pub parse_failures: IntCounter,
    pub request_duration: Histogram,
    pub workflow_duration: Histogram,
    pub expert_latency: Histogram,

    started_at: Instant,
    expert_outcomes: Mutex<HashMap<ExpertName, Vec<bool>>>,
    active_sessions: Mutex<usize>,
    active_alerts: Mutex<usize>,
}

/// Last-N success rate per expert kept for the health snapshot (spec §4.8).
const SUCCESS_WINDOW: usize = 50;

/// Uptime, active session count, per-expert success rate, active alert count
/// (spec §4.8).
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub uptime_seconds: f64,
    pub active_sessions: usize,
    pub expert_success_rate: HashMap<ExpertName, f64>,
    pub active_alerts: usize,
}

impl Monitoring {
    pub fn new() -> Self {
        let registry = Registry::new();

        let total_requests = IntCounter::new("total_requests", "total requests received").unwrap();
        let chat_requests = IntCounter::new("chat_requests", "chat turn requests received").unwrap();
        let workflow_success = IntCounter::new("workflow_success", "turns that produced a recommendation").unwrap();
        let workflow_errors = IntCounter::new("workflow_errors", "turns that ended in error").unwrap();
        let expert_failures = IntCounter::new("expert_failures", "expert adapter calls that failed").unwrap();
        let parse_failures = IntCounter::new("parse_failures", "moderator JSON parse failures").unwrap();

        let request_duration = Histogram::with_opts(
            HistogramOpts::new("request_duration_seconds", "end-to-end request latency"),
        )
        .unwrap();
        let workflow_duration = Histogram::with_opts(
            HistogramOpts::new("workflow_duration_seconds", "workflow engine turn latency"),
        )
        .unwrap();
        let expert_latency = Histogram::with_opts(
            HistogramOpts::new("expert_latency_seconds", "per-expert call latency"),
        )
        .unwrap();

        for collector in [
            Box::new(total_requests.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(chat_requests.clone()),
            Box::new(workflow_success.clone()),
            Box::new(workflow_errors.clone()),
            Box::new(expert_failures.clone()),
            Box::new(parse_failures.clone()),
        ] {
            registry.register(collector).expect("metric names are unique");
        }
        for collector in [
            Box::new(request_duration.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(workflow_duration.clone()),
            Box::new(expert_latency.clone()),
        ] {
            registry.register(collector).expect("metric names are unique");
        }

        Self {
            registry,
            total_requests,
            chat_requests,
            workflow_success,
            workflow_errors,
            expert_failures,
            parse_failures,
            request_duration,
            workflow_duration,
            expert_latency,
            started_at: Instant::now(),
            expert_outcomes: Mutex::new(HashMap::new()),
            active_sessions: Mutex::new(0),
            active_alerts: Mutex::new(0),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_expert_outcome(&self, name: ExpertName, succeeded: bool) {
        let mut guard = self.expert_outcomes.lock().unwrap();
        let entry = guard.entry(name).or_default();
        entry.push(succeeded);
        if entry.len() > SUCCESS_WINDOW {
            let overflow = entry.len() - SUCCESS_WINDOW;
            entry.drain(0..overflow);
        }
        if !succeeded {
            self.expert_failures.inc();
        }
    }

    pub fn set_active_sessions(&self, count: usize) {
        *self.active_sessions.lock().unwrap() = count;
    }

    pub fn set_active_alerts(&self, count: usize) {
        *self.active_alerts.lock().unwrap() = count;
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        let outcomes = self.expert_outcomes.lock().unwrap();
        let expert_success_rate = outcomes
            .iter()
            .map(|(name, history)| {
                let rate = if history.is_empty() {
                    1.0
                } else {
                    history.iter().filter(|&&ok| ok).count() as f64 / history.len() as f64
                };
                (*name, rate)
            })
            .collect();

        HealthSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            active_sessions: *self.active_sessions.lock().unwrap(),
            expert_success_rate,
            active_alerts: *self.active_alerts.lock().unwrap(),
        }
    }
}

impl Default for Monitoring {
    fn default() -> Self {
        Self::new()
    }
}
