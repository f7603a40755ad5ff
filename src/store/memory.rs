use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Store, StoreError, Table};

/// In-memory backend for tests and embedded hosts. Values are kept as the
/// raw JSON the engine wrote, dirty flag included, so round-trip behavior
/// matches a real backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create(&self, table: Table, id: &str, value: Value) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();
        if rows.contains_key(id) {
            return Err(StoreError::Conflict {
                table: table.name(),
                id: id.to_string(),
            });
        }
        rows.insert(id.to_string(), value);
        Ok(())
    }

    async fn get_by_id(&self, table: Table, id: &str) -> Result<Option<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn get_all(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, table: Table, id: &str, value: Value) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table).or_default();
        match rows.get_mut(id) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                table: table.name(),
                id: id.to_string(),
            }),
        }
    }

    async fn delete(&self, table: Table, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let removed = tables
            .get_mut(&table)
            .and_then(|rows| rows.remove(id))
            .is_some();
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                table: table.name(),
                id: id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::RecallRecord;
    use crate::store::EngineStore;

    #[tokio::test]
    async fn test_crud_cycle() {
        let store = MemoryStore::new();
        let value = serde_json::json!({"id": "a", "n": 1});

        store
            .create(Table::Questions, "a", value.clone())
            .await
            .unwrap();
        assert!(matches!(
            store.create(Table::Questions, "a", value.clone()).await,
            Err(StoreError::Conflict { .. })
        ));

        assert_eq!(
            store.get_by_id(Table::Questions, "a").await.unwrap(),
            Some(value)
        );
        assert_eq!(store.get_all(Table::Questions).await.unwrap().len(), 1);

        let updated = serde_json::json!({"id": "a", "n": 2});
        store
            .update(Table::Questions, "a", updated.clone())
            .await
            .unwrap();
        assert_eq!(
            store.get_by_id(Table::Questions, "a").await.unwrap(),
            Some(updated)
        );

        store.delete(Table::Questions, "a").await.unwrap();
        assert!(matches!(
            store.delete(Table::Questions, "a").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_missing_row_fails() {
        let store = MemoryStore::new();
        let result = store
            .update(Table::Categories, "missing", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_engine_store_marks_writes_dirty() {
        let backend = Arc::new(MemoryStore::new());
        let store = EngineStore::new(backend.clone());

        let record = RecallRecord::new("u1", "q1", 0.5);
        assert!(!record.dirty);
        store.upsert_recall_record(&record).await.unwrap();

        let key = RecallRecord::key("u1", "q1");
        let raw = backend
            .get_by_id(Table::RecallRecords, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw["dirty"], serde_json::Value::Bool(true));

        let loaded = store.recall_record("u1", "q1").await.unwrap().unwrap();
        assert_eq!(loaded.recall_strength, record.recall_strength);
        assert_eq!(loaded.sm2, record.sm2);
        assert_eq!(loaded.total_attempts, record.total_attempts);
    }

    #[tokio::test]
    async fn test_records_for_user_filters_and_sorts() {
        let backend = Arc::new(MemoryStore::new());
        let store = EngineStore::new(backend);

        for (user, question) in [("u1", "q2"), ("u1", "q1"), ("u2", "q3")] {
            store
                .upsert_recall_record(&RecallRecord::new(user, question, 0.5))
                .await
                .unwrap();
        }

        let records = store.recall_records_for_user("u1").await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.question_id.as_str()).collect();
        assert_eq!(ids, ["q1", "q2"]);
    }
}
