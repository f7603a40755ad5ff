use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use recall_engine::feedback::{FeedbackError, FeedbackGenerator};
use recall_engine::models::{Category, Question, QuestionFeedback};
use recall_engine::store::Table;
use recall_engine::{EngineConfig, EngineStore, LearningEngine, MemoryStore, Store};

/// Scripted feedback collaborator: fails the first `fail_first` batches,
/// then echoes one feedback entry per question. Counts every call.
pub struct ScriptedFeedback {
    pub calls: AtomicUsize,
    fail_first: usize,
}

impl ScriptedFeedback {
    pub fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        }
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedbackGenerator for ScriptedFeedback {
    async fn generate_batch(
        &self,
        questions: &[Question],
    ) -> Result<HashMap<String, QuestionFeedback>, FeedbackError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(FeedbackError::Unavailable("scripted outage".to_string()));
        }
        Ok(questions
            .iter()
            .map(|q| {
                (
                    q.id.clone(),
                    QuestionFeedback {
                        correct_approach: format!("Pick option {}.", q.correct_option_index),
                        incorrect_approach: "Re-read the prompt.".to_string(),
                    },
                )
            })
            .collect())
    }
}

pub struct TestHarness {
    pub engine: LearningEngine,
    pub backend: Arc<MemoryStore>,
    pub feedback: Arc<ScriptedFeedback>,
}

pub async fn harness_with(feedback: ScriptedFeedback, question_count: usize) -> TestHarness {
    let backend = Arc::new(MemoryStore::new());
    let feedback = Arc::new(feedback);
    let engine = LearningEngine::new(
        EngineStore::new(backend.clone()),
        feedback.clone(),
        EngineConfig::default(),
    );

    for i in 1..=question_count {
        let question = Question {
            id: format!("q{i}"),
            text: format!("Question {i}?"),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            correct_option_index: 0,
            categories: vec!["cat1".to_string()],
        };
        backend
            .create(
                Table::Questions,
                &question.id,
                serde_json::to_value(&question).unwrap(),
            )
            .await
            .unwrap();
    }

    TestHarness {
        engine,
        backend,
        feedback,
    }
}

pub async fn seed_category(harness: &TestHarness, id: &str, mastery_score: f64) {
    let category = Category {
        id: id.to_string(),
        name: id.to_string(),
        mastery_score,
        dirty: false,
    };
    harness
        .backend
        .create(
            Table::Categories,
            id,
            serde_json::to_value(&category).unwrap(),
        )
        .await
        .unwrap();
}

pub fn question_ids(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("q{i}")).collect()
}
