use std::time::Duration;

const DEFAULT_INITIAL_RECALL_STRENGTH: f64 = 0.5;
const DEFAULT_DELTA_UP: f64 = 0.1;
const DEFAULT_DELTA_DOWN: f64 = 0.15;
const DEFAULT_TECHNIQUE_DELTA_UP: f64 = 0.05;
const DEFAULT_TECHNIQUE_DELTA_DOWN: f64 = 0.08;
const DEFAULT_DECAY_THRESHOLD_HOURS: i64 = 24;
const DEFAULT_DECAY_RATE_PER_DAY: f64 = 0.05;
const DEFAULT_RANKING_BETA: f64 = 1.0;
const DEFAULT_FEEDBACK_TIMEOUT_MS: u64 = 10_000;

/// Engine tuning knobs. Every constant has a named default and an
/// environment override so deployments can adjust policy without a rebuild.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recall strength assumed for a question the learner has never seen.
    pub initial_recall_strength: f64,
    /// Recall strength gain on a correct answer.
    pub delta_up: f64,
    /// Recall strength loss on an incorrect answer. Kept larger than
    /// `delta_up`: the forgetting curve punishes failure harder than
    /// success rewards.
    pub delta_down: f64,
    pub technique_delta_up: f64,
    pub technique_delta_down: f64,
    /// Elapsed time since the last attempt before decay applies.
    pub decay_threshold_hours: i64,
    /// Exponential decay rate per day past the threshold.
    pub decay_rate_per_day: f64,
    /// β in the urgency score `exp(-β · recall_strength)`.
    pub ranking_beta: f64,
    /// Upper bound on a feedback batch call; answer processing never waits
    /// longer than this.
    pub feedback_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_recall_strength: DEFAULT_INITIAL_RECALL_STRENGTH,
            delta_up: DEFAULT_DELTA_UP,
            delta_down: DEFAULT_DELTA_DOWN,
            technique_delta_up: DEFAULT_TECHNIQUE_DELTA_UP,
            technique_delta_down: DEFAULT_TECHNIQUE_DELTA_DOWN,
            decay_threshold_hours: DEFAULT_DECAY_THRESHOLD_HOURS,
            decay_rate_per_day: DEFAULT_DECAY_RATE_PER_DAY,
            ranking_beta: DEFAULT_RANKING_BETA,
            feedback_timeout: Duration::from_millis(DEFAULT_FEEDBACK_TIMEOUT_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            initial_recall_strength: env_f64("RECALL_INITIAL_STRENGTH")
                .unwrap_or(defaults.initial_recall_strength)
                .clamp(0.0, 1.0),
            delta_up: env_f64("RECALL_DELTA_UP").unwrap_or(defaults.delta_up),
            delta_down: env_f64("RECALL_DELTA_DOWN").unwrap_or(defaults.delta_down),
            technique_delta_up: env_f64("RECALL_TECHNIQUE_DELTA_UP")
                .unwrap_or(defaults.technique_delta_up),
            technique_delta_down: env_f64("RECALL_TECHNIQUE_DELTA_DOWN")
                .unwrap_or(defaults.technique_delta_down),
            decay_threshold_hours: env_i64("RECALL_DECAY_THRESHOLD_HOURS")
                .unwrap_or(defaults.decay_threshold_hours)
                .max(0),
            decay_rate_per_day: env_f64("RECALL_DECAY_RATE_PER_DAY")
                .unwrap_or(defaults.decay_rate_per_day)
                .max(0.0),
            ranking_beta: env_f64("RECALL_RANKING_BETA").unwrap_or(defaults.ranking_beta),
            feedback_timeout: env_u64("FEEDBACK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.feedback_timeout),
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    std::env::var(key).ok().and_then(|v| v.parse::<i64>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse::<u64>().ok())
}
