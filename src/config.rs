use std::env;
use std::time::Duration;

/// Enumerated configuration options (spec §6), loaded from environment
/// variables with fixed defaults. The source this spec was distilled from
/// used a free-form option bag; every recognized option is listed here
/// explicitly instead (spec §9, "Dynamic configuration objects").
#[derive(Debug, Clone)]
pub struct Settings {
    pub turn_timeout: Duration,
    pub expert_timeout: Duration,
    pub moderator_timeout: Duration,
    pub classifier_timeout: Duration,
    pub retrieval_timeout: Duration,
    pub max_experts: usize,
    pub min_experts_for_debate: usize,
    pub session_idle: Duration,
    pub max_history_turns: usize,
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(180),
            expert_timeout: Duration::from_secs(60),
            moderator_timeout: Duration::from_secs(60),
            classifier_timeout: Duration::from_secs(10),
            retrieval_timeout: Duration::from_secs(5),
            max_experts: 3,
            min_experts_for_debate: 2,
            session_idle: Duration::from_secs(24 * 3600),
            max_history_turns: 50,
            confidence_floor: 0.3,
            confidence_ceiling: 0.95,
        }
    }
}

impl Settings {
    /// Load from environment, falling back to defaults for anything unset
    /// or unparsable. Mirrors the teacher's `Config::from_env` shape: read
    /// each variable, warn and fall back rather than fail the process.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            turn_timeout: env_secs("CONSULT_TURN_TIMEOUT_S", defaults.turn_timeout),
            expert_timeout: env_secs("CONSULT_EXPERT_TIMEOUT_S", defaults.expert_timeout),
            moderator_timeout: env_secs("CONSULT_MODERATOR_TIMEOUT_S", defaults.moderator_timeout),
            classifier_timeout: env_secs("CONSULT_CLASSIFIER_TIMEOUT_S", defaults.classifier_timeout),
            retrieval_timeout: env_secs("CONSULT_RETRIEVAL_TIMEOUT_S", defaults.retrieval_timeout),
            max_experts: env_usize("CONSULT_MAX_EXPERTS", defaults.max_experts),
            min_experts_for_debate: env_usize(
                "CONSULT_MIN_EXPERTS_FOR_DEBATE",
                defaults.min_experts_for_debate,
            ),
            session_idle: env_hours("CONSULT_SESSION_IDLE_HOURS", defaults.session_idle),
            max_history_turns: env_usize("CONSULT_MAX_HISTORY_TURNS", defaults.max_history_turns),
            confidence_floor: env_f64("CONSULT_CONFIDENCE_FLOOR", defaults.confidence_floor),
            confidence_ceiling: env_f64("CONSULT_CONFIDENCE_CEILING", defaults.confidence_ceiling),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    match env::var(key).ok().and_then(|v| v.parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs),
        None => default,
    }
}

fn env_hours(key: &str, default: Duration) -> Duration {
    match env::var(key).ok().and_then(|v| v.parse::<u64>().ok()) {
        Some(hours) => Duration::from_secs(hours * 3600),
        None => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

/// HTTP endpoint + credentials for one expert adapter (spec §4.1: "model id,
/// max tokens, temperature, API key, endpoint" fixed at construction).
#[derive(Debug, Clone)]
pub struct ExpertEndpoint {
    pub name: crate::domain::expert::ExpertName,
    pub provider: String,
    pub model_id: String,
    pub base_url: String,
    pub api_key: String,
    pub persona_prompt: String,
    pub persona_blurb: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub base_confidence: f64,
}

/// One expert's fixed persona, used both as the system prompt and the short
/// blurb the moderator narrates the debate with (spec §3, SPEC_FULL §2.1).
struct PersonaDefaults {
    provider: &'static str,
    persona_prompt: &'static str,
    persona_blurb: &'static str,
    base_confidence: f64,
}

fn persona_defaults(name: crate::domain::expert::ExpertName) -> PersonaDefaults {
    use crate::domain::expert::ExpertName;
    match name {
        ExpertName::A => PersonaDefaults {
            provider: "technical",
            persona_prompt: "You are a senior manufacturing process engineer. Diagnose equipment \
                and process issues with precise, technical reasoning grounded in the provided context.",
            persona_blurb: "the technical process engineer",
            base_confidence: 0.80,
        },
        ExpertName::B => PersonaDefaults {
            provider: "diagnostic",
            persona_prompt: "You are a diagnostics specialist focused on root-cause analysis of \
                equipment faults using sensor data and failure history.",
            persona_blurb: "the diagnostics specialist",
            base_confidence: 0.78,
        },
        ExpertName::C => PersonaDefaults {
            provider: "practical",
            persona_prompt: "You are a shop-floor maintenance lead. Give practical, cost-aware, \
                step-by-step guidance a technician can act on immediately.",
            persona_blurb: "the practical maintenance lead",
            base_confidence: 0.75,
        },
        ExpertName::D => PersonaDefaults {
            provider: "moderator",
            persona_prompt: "You are a neutral panel moderator. Compare expert opinions, simulate \
                a debate between them, and synthesize one final recommendation as JSON.",
            persona_blurb: "the panel moderator",
            base_confidence: 0.80,
        },
    }
}

/// Builds the four fixed expert endpoints (A, B, C, and the moderator's own
/// backing D) from environment variables, one `CONSULT_EXPERT_<NAME>_*`
/// group per expert (spec §4.1, §6). A missing `BASE_URL` or `API_KEY` is
/// left empty; the adapter surfaces that as an `AuthError`/`BadRequest` on
/// first use rather than failing process startup.
pub fn load_expert_endpoints() -> Vec<ExpertEndpoint> {
    use crate::domain::expert::ExpertName;
    [ExpertName::A, ExpertName::B, ExpertName::C, ExpertName::D]
        .into_iter()
        .map(|name| {
            let defaults = persona_defaults(name);
            let prefix = format!("CONSULT_EXPERT_{name}");
            ExpertEndpoint {
                name,
                provider: env::var(format!("{prefix}_PROVIDER")).unwrap_or_else(|_| defaults.provider.to_string()),
                model_id: env::var(format!("{prefix}_MODEL")).unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                base_url: env::var(format!("{prefix}_BASE_URL")).unwrap_or_default(),
                api_key: env::var(format!("{prefix}_API_KEY")).unwrap_or_default(),
                persona_prompt: env::var(format!("{prefix}_PERSONA"))
                    .unwrap_or_else(|_| defaults.persona_prompt.to_string()),
                persona_blurb: defaults.persona_blurb.to_string(),
                max_tokens: env_usize(&format!("{prefix}_MAX_TOKENS"), 1200) as u32,
                temperature: env_f64(&format!("{prefix}_TEMPERATURE"), 0.3),
                base_confidence: defaults.base_confidence,
            }
        })
        .collect()
}
