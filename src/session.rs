//! Session orchestrator. The only caller of the scheduler, the recall
//! model, the recommendation engine, and the external collaborators; keeps
//! their updates consistent by merging every answer event into a single
//! record write.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::feedback::{FeedbackError, FeedbackGenerator};
use crate::models::{
    LearningSession, QuestionFeedback, RecallRecord, Recommendation, SessionAnswer, SessionSummary,
};
use crate::recall;
use crate::recommend;
use crate::sm2::{self, Sm2Error, MAX_QUALITY};
use crate::store::{EngineStore, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Quality(#[from] Sm2Error),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("session not active: {0}")]
    SessionNotActive(String),
    #[error("question {question_id} is not part of session {session_id}")]
    QuestionNotInSession {
        session_id: String,
        question_id: String,
    },
    #[error("subset size {requested} invalid for {available} offered questions")]
    InvalidSubsetSize { requested: usize, available: usize },
    #[error("no questions remaining to serve in session {0}")]
    SessionExhausted(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Transient persistence failures may be retried by the caller with the
    /// same event; everything else needs caller-side correction first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(err) if err.is_retryable())
    }
}

#[derive(Debug, Clone)]
pub struct ProcessAnswerInput {
    pub question_id: String,
    pub answer: String,
    pub is_correct: bool,
    /// SM-2 answer quality, 0..=5.
    pub quality: u8,
    pub technique_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub record: RecallRecord,
    /// Feedback produced at this checkpoint; empty between checkpoints and
    /// when the collaborator had nothing to say.
    pub feedback: HashMap<String, QuestionFeedback>,
    pub feedback_batches_generated: u32,
}

/// Coordinates sessions for all users of one host. Callers must serialize
/// operations per session; the engine awaits every persistence write before
/// returning but adds no mutual-exclusion gate of its own.
pub struct LearningEngine {
    store: EngineStore,
    feedback: Arc<dyn FeedbackGenerator>,
    config: EngineConfig,
}

impl LearningEngine {
    pub fn new(
        store: EngineStore,
        feedback: Arc<dyn FeedbackGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            feedback,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open a session: catch up stale recall strength, pick the first
    /// subset by urgency, persist the new session.
    pub async fn start_session(
        &self,
        user_id: &str,
        all_question_ids: Vec<String>,
        subset_size: usize,
    ) -> Result<LearningSession, EngineError> {
        if subset_size == 0 || subset_size > all_question_ids.len() {
            return Err(EngineError::InvalidSubsetSize {
                requested: subset_size,
                available: all_question_ids.len(),
            });
        }

        self.decay_recall_strength(user_id).await?;

        let subset = self
            .pick_subset(user_id, &all_question_ids, subset_size, &HashSet::new())
            .await?;

        let session = LearningSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            all_question_ids,
            question_ids: subset.clone(),
            subset_history: vec![subset],
            current_question_index: 0,
            answers: HashMap::new(),
            answered_order: Vec::new(),
            feedback_batches_generated: 0,
            summary: SessionSummary::default(),
            started_at: Utc::now(),
            ended_at: None,
            dirty: false,
        };
        self.store.upsert_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            user_id,
            subset_size,
            total = session.all_question_ids.len(),
            "learning session started"
        );
        Ok(session)
    }

    /// Route one answer through the recall model and the scheduler, then
    /// advance session bookkeeping and fire any due feedback checkpoint.
    ///
    /// The merged recall record is written before the session; an abandoned
    /// call can lose session progress but never leaves recall/scheduling
    /// state inconsistent.
    pub async fn process_answer(
        &self,
        session_id: &str,
        input: ProcessAnswerInput,
    ) -> Result<AnswerOutcome, EngineError> {
        let mut session = self.active_session(session_id).await?;
        if !session
            .all_question_ids
            .iter()
            .any(|id| id == &input.question_id)
        {
            return Err(EngineError::QuestionNotInSession {
                session_id: session.id,
                question_id: input.question_id,
            });
        }
        if input.quality > MAX_QUALITY {
            return Err(Sm2Error::InvalidQuality(input.quality).into());
        }

        let now = Utc::now();
        let snapshot = self
            .store
            .recall_record(&session.user_id, &input.question_id)
            .await?
            .unwrap_or_else(|| {
                RecallRecord::new(
                    &session.user_id,
                    &input.question_id,
                    self.config.initial_recall_strength,
                )
            });

        // Both pure updates read the same snapshot and merge into one value,
        // so there is no intermediate write to lose.
        let next_sm2 = sm2::update(&snapshot.sm2, input.quality, now)?;
        let mut merged = if input.is_correct {
            recall::on_correct(&snapshot, &input.technique_ids, now, &self.config)
        } else {
            recall::on_incorrect(&snapshot, &input.technique_ids, now, &self.config)
        };
        merged.sm2 = next_sm2;

        // Point of no return: recall state lands first.
        self.store.upsert_recall_record(&merged).await?;

        let first_answer = session
            .answers
            .insert(
                input.question_id.clone(),
                SessionAnswer {
                    answer: input.answer,
                    is_correct: input.is_correct,
                },
            )
            .is_none();
        if first_answer {
            session.answered_order.push(input.question_id.clone());
        }
        session.current_question_index += 1;

        let feedback = self.run_due_checkpoint(&mut session).await;
        self.store.upsert_session(&session).await?;

        Ok(AnswerOutcome {
            record: merged,
            feedback,
            feedback_batches_generated: session.feedback_batches_generated,
        })
    }

    /// Serve the next urgency-ranked subset of questions not yet offered.
    pub async fn advance_subset(&self, session_id: &str) -> Result<LearningSession, EngineError> {
        let mut session = self.active_session(session_id).await?;

        let served: HashSet<String> = session.subset_history.iter().flatten().cloned().collect();
        let remaining = session
            .all_question_ids
            .iter()
            .filter(|id| !served.contains(*id))
            .count();
        if remaining == 0 {
            return Err(EngineError::SessionExhausted(session.id));
        }

        let k = session.subset_size().min(remaining);
        let subset = self
            .pick_subset(&session.user_id, &session.all_question_ids, k, &served)
            .await?;
        session.question_ids = subset.clone();
        session.subset_history.push(subset);
        self.store.upsert_session(&session).await?;
        Ok(session)
    }

    /// Close the session: compile strengths/weaknesses and stamp the end
    /// time. Terminal; every later mutation fails with `SessionNotActive`.
    pub async fn end_current_session(
        &self,
        session_id: &str,
    ) -> Result<LearningSession, EngineError> {
        let mut session = self.active_session(session_id).await?;

        let mut summary = SessionSummary::default();
        for question_id in &session.answered_order {
            if let Some(answer) = session.answers.get(question_id) {
                if answer.is_correct {
                    summary.strengths.push(question_id.clone());
                } else {
                    summary.weaknesses.push(question_id.clone());
                }
            }
        }
        session.summary = summary;
        session.ended_at = Some(Utc::now());
        self.store.upsert_session(&session).await?;

        tracing::info!(
            session_id = %session.id,
            answered = session.answers.len(),
            strengths = session.summary.strengths.len(),
            weaknesses = session.summary.weaknesses.len(),
            "learning session ended"
        );
        Ok(session)
    }

    /// Pure read combining question ranking and category classification.
    /// Callable in any session state; mutates nothing.
    pub async fn generate_recommendations(
        &self,
        user_id: &str,
        k: usize,
    ) -> Result<Recommendation, EngineError> {
        let records = self.store.recall_records_for_user(user_id).await?;
        let categories = self.store.categories().await?;
        Ok(Recommendation {
            questions: recommend::rank(&records, k, self.config.ranking_beta),
            categories: recommend::classify(&categories),
        })
    }

    /// Apply elapsed-time decay to every stale record of the user. Returns
    /// the number of records that changed.
    pub async fn decay_recall_strength(&self, user_id: &str) -> Result<usize, EngineError> {
        let now = Utc::now();
        let records = self.store.recall_records_for_user(user_id).await?;
        let mut decayed = 0;
        for record in &records {
            if let Some(next) = recall::decay(record, now, &self.config) {
                self.store.upsert_recall_record(&next).await?;
                decayed += 1;
            }
        }
        if decayed > 0 {
            tracing::debug!(user_id, decayed, "recall strength decay applied");
        }
        Ok(decayed)
    }

    async fn active_session(&self, session_id: &str) -> Result<LearningSession, EngineError> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        if !session.is_active() {
            return Err(EngineError::SessionNotActive(session.id));
        }
        Ok(session)
    }

    async fn pick_subset(
        &self,
        user_id: &str,
        offered: &[String],
        k: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<String>, EngineError> {
        let records = self.store.recall_records_for_user(user_id).await?;
        let by_id: HashMap<&str, &RecallRecord> = records
            .iter()
            .map(|record| (record.question_id.as_str(), record))
            .collect();

        // Questions never attempted rank with the configured prior; no
        // record is created until the first answer.
        let candidates: Vec<RecallRecord> = offered
            .iter()
            .filter(|id| !exclude.contains(*id))
            .map(|id| match by_id.get(id.as_str()) {
                Some(record) => (*record).clone(),
                None => RecallRecord::new(user_id, id, self.config.initial_recall_strength),
            })
            .collect();

        Ok(recommend::select_subset(
            &candidates,
            k,
            self.config.ranking_beta,
        ))
    }

    /// Quarter-by-quarter feedback checkpoints: amortizes generation cost
    /// while surfacing feedback well before session end. Failure leaves the
    /// batch counter alone so the slice retries at the next checkpoint.
    async fn run_due_checkpoint(
        &self,
        session: &mut LearningSession,
    ) -> HashMap<String, QuestionFeedback> {
        let Some((start, end, batches_needed)) = due_batch_bounds(
            session.all_question_ids.len(),
            session.answers.len(),
            session.feedback_batches_generated,
            session.answered_order.len(),
        ) else {
            return HashMap::new();
        };

        let slice = session.answered_order[start..end].to_vec();
        match self.run_feedback_batch(&slice).await {
            Ok(feedback) => {
                session.feedback_batches_generated = batches_needed;
                feedback
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    session_id = %session.id,
                    batch = batches_needed,
                    "feedback batch failed, will retry at next checkpoint"
                );
                HashMap::new()
            }
        }
    }

    async fn run_feedback_batch(
        &self,
        question_ids: &[String],
    ) -> Result<HashMap<String, QuestionFeedback>, FeedbackError> {
        let questions = self
            .store
            .questions(question_ids)
            .await
            .map_err(|err| FeedbackError::Unavailable(err.to_string()))?;
        if questions.is_empty() {
            return Ok(HashMap::new());
        }

        match tokio::time::timeout(
            self.config.feedback_timeout,
            self.feedback.generate_batch(&questions),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FeedbackError::Timeout),
        }
    }
}

/// Bounds of the newly-completed feedback slice, if a checkpoint is due.
/// `threshold = max(1, total / 4)`; the slice covers answered questions
/// `[threshold · generated, threshold · needed)` in first-answer order,
/// which dedups against earlier batches by construction.
fn due_batch_bounds(
    total_questions: usize,
    answered: usize,
    batches_generated: u32,
    order_len: usize,
) -> Option<(usize, usize, u32)> {
    let threshold = (total_questions / 4).max(1);
    let batches_needed = (answered / threshold) as u32;
    if batches_needed <= batches_generated {
        return None;
    }
    let start = (threshold * batches_generated as usize).min(order_len);
    let end = (threshold * batches_needed as usize).min(order_len);
    if start >= end {
        return None;
    }
    Some((start, end, batches_needed))
}
