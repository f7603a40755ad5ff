//! Persistence collaborator seam. The engine talks to a generic key/value
//! backend through [`Store`]; [`EngineStore`] layers the typed table access
//! on top and stamps the dirty flag consumed by the external sync layer.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Category, LearningSession, Question, RecallRecord};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    RecallRecords,
    LearningSessions,
    Categories,
    Questions,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::RecallRecords => "recall_records",
            Table::LearningSessions => "learning_sessions",
            Table::Categories => "categories",
            Table::Questions => "questions",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found in {table}: {id}")]
    NotFound { table: &'static str, id: String },
    #[error("already exists in {table}: {id}")]
    Conflict { table: &'static str, id: String },
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Only transient failures are worth retrying; the others require the
    /// caller to fix its input first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Generic record storage over named tables. Backends are supplied by the
/// host; the engine never assumes more than these five operations.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create(&self, table: Table, id: &str, value: Value) -> Result<(), StoreError>;
    async fn get_by_id(&self, table: Table, id: &str) -> Result<Option<Value>, StoreError>;
    async fn get_all(&self, table: Table) -> Result<Vec<Value>, StoreError>;
    async fn update(&self, table: Table, id: &str, value: Value) -> Result<(), StoreError>;
    async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError>;
}

/// Typed access layer used by the orchestrator. Every write path marks the
/// record dirty so the external sync collaborator picks it up.
#[derive(Clone)]
pub struct EngineStore {
    inner: Arc<dyn Store>,
}

impl EngineStore {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }

    pub fn backend(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    pub async fn recall_record(
        &self,
        user_id: &str,
        question_id: &str,
    ) -> Result<Option<RecallRecord>, StoreError> {
        let key = RecallRecord::key(user_id, question_id);
        match self.inner.get_by_id(Table::RecallRecords, &key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn recall_records_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<RecallRecord>, StoreError> {
        let values = self.inner.get_all(Table::RecallRecords).await?;
        let mut records = Vec::new();
        for value in values {
            let record: RecallRecord = serde_json::from_value(value)?;
            if record.user_id == user_id {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(records)
    }

    pub async fn upsert_recall_record(&self, record: &RecallRecord) -> Result<(), StoreError> {
        let mut stored = record.clone();
        stored.dirty = true;
        let key = RecallRecord::key(&stored.user_id, &stored.question_id);
        let value = serde_json::to_value(&stored)?;
        self.upsert(Table::RecallRecords, &key, value).await
    }

    pub async fn session(&self, session_id: &str) -> Result<Option<LearningSession>, StoreError> {
        match self
            .inner
            .get_by_id(Table::LearningSessions, session_id)
            .await?
        {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_session(&self, session: &LearningSession) -> Result<(), StoreError> {
        let mut stored = session.clone();
        stored.dirty = true;
        let value = serde_json::to_value(&stored)?;
        self.upsert(Table::LearningSessions, &stored.id, value).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let values = self.inner.get_all(Table::Categories).await?;
        let mut categories = Vec::new();
        for value in values {
            categories.push(serde_json::from_value(value)?);
        }
        categories.sort_by(|a: &Category, b: &Category| a.id.cmp(&b.id));
        Ok(categories)
    }

    /// Resolve question content for a feedback batch. Unknown ids are
    /// skipped rather than failing the batch.
    pub async fn questions(&self, question_ids: &[String]) -> Result<Vec<Question>, StoreError> {
        let mut questions = Vec::with_capacity(question_ids.len());
        for question_id in question_ids {
            if let Some(value) = self.inner.get_by_id(Table::Questions, question_id).await? {
                questions.push(serde_json::from_value(value)?);
            }
        }
        Ok(questions)
    }

    async fn upsert(&self, table: Table, id: &str, value: Value) -> Result<(), StoreError> {
        if self.inner.get_by_id(table, id).await?.is_some() {
            self.inner.update(table, id, value).await
        } else {
            self.inner.create(table, id, value).await
        }
    }
}
