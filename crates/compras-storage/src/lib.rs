//! Persistence seams, durable write paths and HTTP fetch utilities.
//!
//! The engine writes through two paths only: [`archive::archive_page`] for raw
//! upstream pages and [`upsert::upsert_record`] for normalized records. Both run
//! inside a [`PageTransaction`] so one page's raw row and all of its records
//! become visible together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compras_core::{DomainRecord, MappingContext, MappingError, RawPage, RequestParams};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod archive;
pub mod fetch;
pub mod memory;
pub mod postgres;
pub mod upsert;

pub use archive::{archive_page, ArchiveOutcome};
pub use fetch::{
    BackoffPolicy, Endpoint, FetchError, FetchedPage, HttpClientConfig, PageSource, ResilientFetcher,
};
pub use memory::{MemoryStore, StoredRecord};
pub use postgres::PgStore;
pub use upsert::upsert_record;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("record for `{0}` has no natural key")]
    MissingKey(String),
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Last recorded outcome of a named run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStateEntry {
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// A parameterized lookup of detail-fetch targets, e.g. every known purchase id.
///
/// `params` maps result columns to request parameters and `context` maps
/// result columns to mapping-context keys. Result columns must be text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetQuery {
    pub name: &'static str,
    pub sql: &'static str,
    pub binds: Vec<String>,
    pub params: &'static [(&'static str, &'static str)],
    pub context: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    pub params: RequestParams,
    pub context: MappingContext,
}

impl Target {
    /// Identifies the target across runs: its request values joined by `|`.
    pub fn key(&self) -> String {
        self.params
            .pairs()
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Opens the transaction that holds one page's raw row and record merges.
    async fn begin(&self) -> Result<Box<dyn PageTransaction>, StoreError>;

    async fn get_state(&self, name: &str) -> Result<Option<RunStateEntry>, StoreError>;

    /// Unconditionally replaces the state stored under `name`.
    async fn set_state(&self, name: &str, value: &JsonValue) -> Result<(), StoreError>;

    async fn select_targets(&self, query: &TargetQuery) -> Result<Vec<Target>, StoreError>;
}

/// Writes staged for a single page. Dropping without `commit` discards them.
#[async_trait]
pub trait PageTransaction: Send {
    /// Returns `false` when `(endpoint, payload_sha256)` is already archived.
    async fn insert_raw(&mut self, page: &RawPage) -> Result<bool, StoreError>;

    /// Inserts or updates by natural key, keeping `first_seen_at` and setting
    /// `last_seen_at` to `seen_at`. Returns the number of affected rows.
    async fn merge_record(
        &mut self,
        record: &DomainRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Stamps `key` as fetched by `query` at `fetched_at`, whether or not the
    /// fetch returned records.
    async fn mark_target(
        &mut self,
        query: &str,
        key: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
