use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EASINESS: f64 = 2.5;

/// SM-2 scheduling state carried by every recall record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sm2State {
    pub repetition_count: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            repetition_count: 0,
            easiness_factor: DEFAULT_EASINESS,
            interval_days: 0,
            last_reviewed_at: None,
        }
    }
}

/// Per-(user, question) recall state. Mutated only by answer and decay
/// events; the store is the single holder of the current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRecord {
    pub user_id: String,
    pub question_id: String,
    pub correct_attempts: u32,
    pub total_attempts: u32,
    pub recall_strength: f64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// High-water mark of applied elapsed-time decay; keeps repeated decay
    /// passes from compounding over the same interval.
    #[serde(default)]
    pub decayed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub technique_transfer_scores: HashMap<String, f64>,
    pub sm2: Sm2State,
    #[serde(default)]
    pub dirty: bool,
}

impl RecallRecord {
    pub fn new(user_id: &str, question_id: &str, initial_strength: f64) -> Self {
        Self {
            user_id: user_id.to_string(),
            question_id: question_id.to_string(),
            correct_attempts: 0,
            total_attempts: 0,
            recall_strength: initial_strength.clamp(0.0, 1.0),
            last_attempt_at: None,
            decayed_at: None,
            technique_transfer_scores: HashMap::new(),
            sm2: Sm2State::default(),
            dirty: false,
        }
    }

    /// Storage key, unique per (user, question) pair.
    pub fn key(user_id: &str, question_id: &str) -> String {
        format!("{user_id}:{question_id}")
    }

    /// Feedback is only meaningful once the learner has attempted the
    /// question at least once.
    pub fn can_request_feedback(&self) -> bool {
        self.total_attempts > 0
    }
}

/// Taxonomy entry with an externally-maintained mastery aggregate.
/// Read-only inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub mastery_score: f64,
    #[serde(default)]
    pub dirty: bool,
}

/// Question content as handed to the feedback collaborator. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option_index: usize,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnswer {
    pub answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSession {
    pub id: String,
    pub user_id: String,
    pub all_question_ids: Vec<String>,
    /// Current active subset, always of the size requested at session start.
    pub question_ids: Vec<String>,
    pub subset_history: Vec<Vec<String>>,
    pub current_question_index: usize,
    pub answers: HashMap<String, SessionAnswer>,
    /// First-answer order; keeps feedback batch slices deterministic.
    #[serde(default)]
    pub answered_order: Vec<String>,
    pub feedback_batches_generated: u32,
    pub summary: SessionSummary,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dirty: bool,
}

impl LearningSession {
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn subset_size(&self) -> usize {
        self.question_ids.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecommendation {
    pub question_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecommendation {
    pub category_id: String,
    pub level: RecommendationLevel,
    pub explanation: String,
}

/// Ephemeral output of `generate_recommendations`; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub questions: Vec<QuestionRecommendation>,
    pub categories: Vec<CategoryRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    pub correct_approach: String,
    pub incorrect_approach: String,
}
