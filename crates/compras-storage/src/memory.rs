//! In-process store with the same transaction contract as PostgreSQL.
//!
//! Writes are buffered per transaction and applied on commit, so a page whose
//! transaction is rolled back or dropped leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compras_core::{DomainRecord, FieldValue, RawPage};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::{IngestStore, PageTransaction, RunStateEntry, StoreError, Target, TargetQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub fields: Vec<(String, FieldValue)>,
    pub payload: JsonValue,
    pub payload_sha256: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn field(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    raw: Vec<RawPage>,
    tables: BTreeMap<String, BTreeMap<Vec<String>, StoredRecord>>,
    state: BTreeMap<String, RunStateEntry>,
    targets: HashMap<String, Vec<Target>>,
    failing_keys: Vec<(String, Vec<String>)>,
    target_fetches: BTreeMap<(String, String), DateTime<Utc>>,
    commits: usize,
}

impl MemoryState {
    fn has_raw(&self, page: &RawPage) -> bool {
        self.raw
            .iter()
            .any(|r| r.endpoint == page.endpoint && r.payload_sha256 == page.payload_sha256)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the rows a [`TargetQuery`] with this name should return.
    pub async fn set_targets(&self, query_name: &str, targets: Vec<Target>) {
        self.inner
            .lock()
            .await
            .targets
            .insert(query_name.to_string(), targets);
    }

    /// Makes every merge of `key` into `table` fail, to exercise rollback.
    pub async fn fail_merges_for(&self, table: &str, key: &[&str]) {
        self.inner.lock().await.failing_keys.push((
            table.to_string(),
            key.iter().map(|k| k.to_string()).collect(),
        ));
    }

    pub async fn raw_pages(&self) -> Vec<RawPage> {
        self.inner.lock().await.raw.clone()
    }

    pub async fn records(&self, table: &str) -> Vec<(Vec<String>, StoredRecord)> {
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    pub async fn record(&self, table: &str, key: &[&str]) -> Option<StoredRecord> {
        let key: Vec<String> = key.iter().map(|k| k.to_string()).collect();
        self.inner
            .lock()
            .await
            .tables
            .get(table)
            .and_then(|rows| rows.get(&key))
            .cloned()
    }

    pub async fn target_fetched_at(&self, query: &str, key: &str) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .await
            .target_fetches
            .get(&(query.to_string(), key.to_string()))
            .copied()
    }

    pub async fn commit_count(&self) -> usize {
        self.inner.lock().await.commits
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn PageTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: Arc::clone(&self.inner),
            raw: Vec::new(),
            merges: Vec::new(),
            marks: Vec::new(),
        }))
    }

    async fn get_state(&self, name: &str) -> Result<Option<RunStateEntry>, StoreError> {
        Ok(self.inner.lock().await.state.get(name).cloned())
    }

    async fn set_state(&self, name: &str, value: &JsonValue) -> Result<(), StoreError> {
        self.inner.lock().await.state.insert(
            name.to_string(),
            RunStateEntry {
                value: value.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn select_targets(&self, query: &TargetQuery) -> Result<Vec<Target>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .targets
            .get(query.name)
            .cloned()
            .unwrap_or_default())
    }
}

struct MemoryTransaction {
    store: Arc<Mutex<MemoryState>>,
    raw: Vec<RawPage>,
    merges: Vec<(Vec<String>, DomainRecord, DateTime<Utc>)>,
    marks: Vec<((String, String), DateTime<Utc>)>,
}

#[async_trait]
impl PageTransaction for MemoryTransaction {
    async fn insert_raw(&mut self, page: &RawPage) -> Result<bool, StoreError> {
        let staged = self
            .raw
            .iter()
            .any(|r| r.endpoint == page.endpoint && r.payload_sha256 == page.payload_sha256);
        if staged || self.store.lock().await.has_raw(page) {
            return Ok(false);
        }
        self.raw.push(page.clone());
        Ok(true)
    }

    async fn merge_record(
        &mut self,
        record: &DomainRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let key = record
            .natural_key()
            .ok_or_else(|| StoreError::MissingKey(record.table.clone()))?;

        let failing = self
            .store
            .lock()
            .await
            .failing_keys
            .iter()
            .any(|(table, k)| *table == record.table && *k == key);
        if failing {
            return Err(StoreError::Injected(format!("{} {:?}", record.table, key)));
        }

        self.merges.push((key, record.clone(), seen_at));
        Ok(1)
    }

    async fn mark_target(
        &mut self,
        query: &str,
        key: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.marks.push(((query.to_string(), key.to_string()), fetched_at));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            raw,
            merges,
            marks,
        } = *self;
        let mut state = store.lock().await;
        for page in raw {
            if !state.has_raw(&page) {
                state.raw.push(page);
            }
        }
        for (key, record, seen_at) in merges {
            let rows = state.tables.entry(record.table.clone()).or_default();
            match rows.get_mut(&key) {
                Some(existing) => {
                    existing.fields = record.fields;
                    existing.payload = record.payload;
                    existing.payload_sha256 = record.payload_sha256;
                    existing.last_seen_at = seen_at;
                }
                None => {
                    rows.insert(
                        key,
                        StoredRecord {
                            fields: record.fields,
                            payload: record.payload,
                            payload_sha256: record.payload_sha256,
                            first_seen_at: seen_at,
                            last_seen_at: seen_at,
                        },
                    );
                }
            }
        }
        state.target_fetches.extend(marks);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compras_core::RequestParams;
    use serde_json::json;

    fn record(key: &str) -> DomainRecord {
        DomainRecord {
            table: "t".into(),
            key_columns: vec!["k".into()],
            fields: vec![("k".into(), FieldValue::Text(Some(key.into())))],
            payload: json!({"k": key}),
            payload_sha256: compras_core::content_digest(&json!({"k": key})),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_raw(&RawPage::new("ep", RequestParams::new(), json!([]), Utc::now()))
            .await
            .unwrap();
        tx.merge_record(&record("a"), Utc::now()).await.unwrap();
        tx.mark_target("q", "a", Utc::now()).await.unwrap();
        assert!(store.raw_pages().await.is_empty());
        tx.rollback().await.unwrap();

        assert!(store.raw_pages().await.is_empty());
        assert!(store.target_fetched_at("q", "a").await.is_none());
        assert!(store.records("t").await.is_empty());
        assert_eq!(store.commit_count().await, 0);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryStore::new();
        store.fail_merges_for("t", &["bad"]).await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.merge_record(&record("ok"), Utc::now()).await.unwrap(), 1);
        assert!(matches!(
            tx.merge_record(&record("bad"), Utc::now()).await,
            Err(StoreError::Injected(_))
        ));
    }

    #[tokio::test]
    async fn state_is_replaced_per_name() {
        let store = MemoryStore::new();
        assert!(store.get_state("arp_last_run").await.unwrap().is_none());
        store.set_state("arp_last_run", &json!({"mode": "full"})).await.unwrap();
        store.set_state("arp_last_run", &json!({"mode": "daily"})).await.unwrap();
        let entry = store.get_state("arp_last_run").await.unwrap().unwrap();
        assert_eq!(entry.value, json!({"mode": "daily"}));
    }
}
