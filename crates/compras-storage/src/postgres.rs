//! PostgreSQL backend: one connection per run, one transaction per page.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compras_core::mapping::is_identifier;
use compras_core::{DomainRecord, FieldValue, MappingContext, MappingError, RawPage, RequestParams};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::info;

use crate::{IngestStore, PageTransaction, RunStateEntry, StoreError, Target, TargetQuery};

/// Validates and completes a database URL: pasted `psql ...` commands are
/// rejected and `sslmode=require` is added when no sslmode is given.
pub fn normalize_database_url(raw: &str) -> Result<String, StoreError> {
    let url = raw.trim();
    if url.to_ascii_lowercase().starts_with("psql ") {
        return Err(StoreError::InvalidUrl(
            "looks like a `psql ...` command; pass only the postgresql:// url".to_string(),
        ));
    }
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(StoreError::InvalidUrl(
            "expected a postgres:// or postgresql:// url".to_string(),
        ));
    }
    if url.contains("sslmode=") {
        return Ok(url.to_string());
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{url}{separator}sslmode=require"))
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let url = normalize_database_url(database_url)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("migrations applied");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn PageTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPageTransaction { tx }))
    }

    async fn get_state(&self, name: &str) -> Result<Option<RunStateEntry>, StoreError> {
        let row: Option<(Json<JsonValue>, DateTime<Utc>)> =
            sqlx::query_as("SELECT value, updated_at FROM etl_state WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(value), updated_at)| RunStateEntry { value, updated_at }))
    }

    async fn set_state(&self, name: &str, value: &JsonValue) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO etl_state (name, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (name)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(name)
        .bind(Json(value))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn select_targets(&self, query: &TargetQuery) -> Result<Vec<Target>, StoreError> {
        let mut statement = sqlx::query(query.sql);
        for bind in &query.binds {
            statement = statement.bind(bind);
        }
        let rows = statement.fetch_all(&self.pool).await?;

        let mut targets = Vec::with_capacity(rows.len());
        'rows: for row in rows {
            let mut params = RequestParams::new();
            for (column, param) in query.params {
                match row.try_get::<Option<String>, _>(*column)? {
                    Some(value) if !value.trim().is_empty() => params.set(*param, value),
                    _ => continue 'rows,
                }
            }
            let mut context = MappingContext::new();
            for (column, key) in query.context {
                if let Some(value) = row.try_get::<Option<String>, _>(*column)? {
                    context.insert(key.to_string(), value);
                }
            }
            targets.push(Target { params, context });
        }
        Ok(targets)
    }
}

struct PgPageTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PageTransaction for PgPageTransaction {
    async fn insert_raw(&mut self, page: &RawPage) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_raw (endpoint, params, payload, payload_sha256, fetched_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (endpoint, payload_sha256) DO NOTHING
            "#,
        )
        .bind(&page.endpoint)
        .bind(Json(page.params.to_json()))
        .bind(Json(&page.payload))
        .bind(&page.payload_sha256)
        .bind(page.fetched_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn merge_record(
        &mut self,
        record: &DomainRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        if record.natural_key().is_none() {
            return Err(StoreError::MissingKey(record.table.clone()));
        }
        let mut query = build_merge(record, seen_at)?;
        let result = query.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn mark_target(
        &mut self,
        query: &str,
        key: &str,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO etl_target_fetch (query, target_key, fetched_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (query, target_key)
            DO UPDATE SET fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(query)
        .bind(key)
        .bind(fetched_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// `INSERT ... ON CONFLICT (key) DO UPDATE` over every mapped column.
/// `first_seen_at` is only written on insert.
fn build_merge(
    record: &DomainRecord,
    seen_at: DateTime<Utc>,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let identifiers = std::iter::once(&record.table)
        .chain(record.fields.iter().map(|(name, _)| name))
        .chain(record.key_columns.iter());
    for ident in identifiers {
        if !is_identifier(ident) {
            return Err(MappingError::InvalidIdentifier(ident.clone()).into());
        }
    }

    let mut qb = QueryBuilder::new("INSERT INTO ");
    qb.push(&record.table).push(" (");
    {
        let mut columns = qb.separated(", ");
        for (name, _) in &record.fields {
            columns.push(name);
        }
        columns.push("payload_sha256");
        columns.push("payload");
        columns.push("first_seen_at");
        columns.push("last_seen_at");
    }
    qb.push(") VALUES (");
    {
        let mut values = qb.separated(", ");
        for (_, value) in &record.fields {
            push_field(&mut values, value);
        }
        values.push_bind(record.payload_sha256.clone());
        values.push_bind(Json(record.payload.clone()));
        values.push_bind(seen_at);
        values.push_bind(seen_at);
    }
    qb.push(") ON CONFLICT (");
    {
        let mut keys = qb.separated(", ");
        for key in &record.key_columns {
            keys.push(key);
        }
    }
    qb.push(") DO UPDATE SET ");
    {
        let mut updates = qb.separated(", ");
        let mutable = record
            .fields
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| !record.key_columns.iter().any(|k| k == name))
            .chain(["payload_sha256", "payload", "last_seen_at"]);
        for column in mutable {
            updates.push(format!("{column} = EXCLUDED.{column}"));
        }
    }
    Ok(qb)
}

fn push_field(values: &mut Separated<'_, 'static, Postgres, &'static str>, value: &FieldValue) {
    match value {
        FieldValue::Text(v) => values.push_bind(v.clone()),
        FieldValue::Integer(v) => values.push_bind(*v),
        FieldValue::Decimal(v) => values.push_bind(*v),
        FieldValue::Bool(v) => values.push_bind(*v),
        FieldValue::Date(v) => values.push_bind(*v),
        FieldValue::Timestamp(v) => values.push_bind(*v),
        FieldValue::Json(v) => values.push_bind(v.clone().map(Json)),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn database_url_gets_sslmode() {
        assert_eq!(
            normalize_database_url(" postgresql://u:p@db.example/compras ").unwrap(),
            "postgresql://u:p@db.example/compras?sslmode=require"
        );
        assert_eq!(
            normalize_database_url("postgres://u@h/db?application_name=x").unwrap(),
            "postgres://u@h/db?application_name=x&sslmode=require"
        );
        assert_eq!(
            normalize_database_url("postgres://u@h/db?sslmode=disable").unwrap(),
            "postgres://u@h/db?sslmode=disable"
        );
    }

    #[test]
    fn pasted_psql_command_is_rejected() {
        assert!(matches!(
            normalize_database_url("psql postgresql://u@h/db"),
            Err(StoreError::InvalidUrl(_))
        ));
        assert!(normalize_database_url("mysql://h/db").is_err());
    }

    fn sample_record() -> DomainRecord {
        DomainRecord {
            table: "arp".into(),
            key_columns: vec!["codigo_unidade_gerenciadora".into(), "numero_ata_registro_preco".into()],
            fields: vec![
                ("codigo_unidade_gerenciadora".into(), FieldValue::Integer(Some(155125))),
                ("numero_ata_registro_preco".into(), FieldValue::Text(Some("00012/2024".into()))),
                ("valor_total".into(), FieldValue::Decimal(None)),
            ],
            payload: json!({"numeroAtaRegistroPreco": "00012/2024"}),
            payload_sha256: "abc".into(),
        }
    }

    #[test]
    fn merge_statement_updates_mutable_columns_only() {
        let qb = build_merge(&sample_record(), Utc::now()).unwrap();
        let sql = qb.sql().to_string();
        assert!(sql.starts_with(
            "INSERT INTO arp (codigo_unidade_gerenciadora, numero_ata_registro_preco, valor_total, payload_sha256, payload, first_seen_at, last_seen_at) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ));
        assert!(sql.contains("ON CONFLICT (codigo_unidade_gerenciadora, numero_ata_registro_preco) DO UPDATE SET"));
        assert!(sql.contains("valor_total = EXCLUDED.valor_total"));
        assert!(sql.contains("last_seen_at = EXCLUDED.last_seen_at"));
        assert!(!sql.contains("first_seen_at = EXCLUDED"));
        assert!(!sql.contains("codigo_unidade_gerenciadora = EXCLUDED"));
    }

    #[test]
    fn merge_statement_rejects_unsafe_identifiers() {
        let mut record = sample_record();
        record.table = "arp; drop table api_raw".into();
        assert!(matches!(
            build_merge(&record, Utc::now()),
            Err(StoreError::Mapping(MappingError::InvalidIdentifier(_)))
        ));
    }
}
