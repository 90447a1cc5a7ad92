//! Core domain model and pure ingestion primitives for the compras ingestor.
//!
//! Nothing in this crate performs I/O: hashing, date windowing and field
//! mapping are pure functions of their inputs so the engine crates can test
//! them without a network or a database.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub mod digest;
pub mod mapping;
pub mod window;

pub use digest::{canonical_json, content_digest, digest_of, sha256_hex};
pub use mapping::{EntitySpec, FieldMapping, MappingContext, MappingError};
pub use window::{date_windows, DateWindow, DateWindows};

/// Columns every entity table carries besides its mapped fields.
pub const RESERVED_COLUMNS: &[&str] = &["payload", "payload_sha256", "first_seen_at", "last_seen_at"];

/// Ordered query parameters of one upstream request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestParams(Vec<(String, String)>);

impl RequestParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key`, replacing an existing value in place so ordering stays stable.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn extend(&mut self, other: &RequestParams) {
        for (key, value) in &other.0 {
            self.set(key.clone(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (key, value) in &self.0 {
            map.insert(key.clone(), JsonValue::String(value.clone()));
        }
        JsonValue::Object(map)
    }

    pub fn to_context(&self) -> MappingContext {
        self.0.iter().cloned().collect()
    }
}

/// One upstream response page, archived verbatim. Unique by `(endpoint, payload_sha256)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub endpoint: String,
    pub params: RequestParams,
    pub payload: JsonValue,
    pub payload_sha256: String,
    pub fetched_at: DateTime<Utc>,
}

impl RawPage {
    pub fn new(
        endpoint: impl Into<String>,
        params: RequestParams,
        payload: JsonValue,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let payload_sha256 = content_digest(&payload);
        Self {
            endpoint: endpoint.into(),
            params,
            payload,
            payload_sha256,
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
    Bool,
    Date,
    Timestamp,
    Json,
}

/// A typed, nullable column value. The variant carries the column type even
/// when the value is absent so backends can bind typed NULLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Decimal(Option<f64>),
    Bool(Option<bool>),
    Date(Option<NaiveDate>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<JsonValue>),
}

impl FieldValue {
    pub fn null(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(None),
            FieldKind::Integer => FieldValue::Integer(None),
            FieldKind::Decimal => FieldValue::Decimal(None),
            FieldKind::Bool => FieldValue::Bool(None),
            FieldKind::Date => FieldValue::Date(None),
            FieldKind::Timestamp => FieldValue::Timestamp(None),
            FieldKind::Json => FieldValue::Json(None),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Decimal(_) => FieldKind::Decimal,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Json(_) => FieldKind::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Text(v) => v.is_none(),
            FieldValue::Integer(v) => v.is_none(),
            FieldValue::Decimal(v) => v.is_none(),
            FieldValue::Bool(v) => v.is_none(),
            FieldValue::Date(v) => v.is_none(),
            FieldValue::Timestamp(v) => v.is_none(),
            FieldValue::Json(v) => v.is_none(),
        }
    }

    /// Text form used for natural-key comparison. `None` for NULL or blank text.
    pub fn key_text(&self) -> Option<String> {
        let text = match self {
            FieldValue::Text(v) => v.clone(),
            FieldValue::Integer(v) => v.map(|n| n.to_string()),
            FieldValue::Decimal(v) => v.map(|n| n.to_string()),
            FieldValue::Bool(v) => v.map(|b| b.to_string()),
            FieldValue::Date(v) => v.map(|d| d.to_string()),
            FieldValue::Timestamp(v) => v.map(|t| t.to_rfc3339()),
            FieldValue::Json(v) => v.as_ref().map(canonical_json),
        }?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// One normalized business record ready for merge into its entity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub table: String,
    pub key_columns: Vec<String>,
    pub fields: Vec<(String, FieldValue)>,
    pub payload: JsonValue,
    pub payload_sha256: String,
}

impl DomainRecord {
    pub fn field(&self, column: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Natural key in key-column order, or `None` when any component is missing.
    pub fn natural_key(&self) -> Option<Vec<String>> {
        self.key_columns
            .iter()
            .map(|column| self.field(column).and_then(FieldValue::key_text))
            .collect()
    }
}

/// Records of a page: the `resultado` array of an object payload, or the payload
/// itself when it is an array.
pub fn extract_records(payload: &JsonValue) -> &[JsonValue] {
    match payload {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map
            .get("resultado")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// `totalPaginas` as reported by the payload, when present and positive.
pub fn declared_total_pages(payload: &JsonValue) -> Option<u32> {
    payload
        .get("totalPaginas")
        .and_then(JsonValue::as_u64)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_keep_insertion_order_and_replace_in_place() {
        let mut params = RequestParams::new().with("pagina", 1).with("tamanhoPagina", 500);
        params.set("pagina", 2);
        assert_eq!(
            params.pairs(),
            &[
                ("pagina".to_string(), "2".to_string()),
                ("tamanhoPagina".to_string(), "500".to_string())
            ]
        );
        assert_eq!(params.to_json(), json!({"pagina": "2", "tamanhoPagina": "500"}));
    }

    #[test]
    fn records_come_from_resultado_or_bare_array() {
        let wrapped = json!({"resultado": [{"a": 1}, {"a": 2}], "totalPaginas": 3});
        assert_eq!(extract_records(&wrapped).len(), 2);
        assert_eq!(declared_total_pages(&wrapped), Some(3));

        let bare = json!([{"a": 1}]);
        assert_eq!(extract_records(&bare).len(), 1);
        assert_eq!(declared_total_pages(&bare), None);

        assert!(extract_records(&json!({"resultado": null})).is_empty());
        assert!(extract_records(&json!("unexpected")).is_empty());
    }

    #[test]
    fn key_text_treats_blank_as_missing() {
        assert_eq!(FieldValue::Text(Some("  ".into())).key_text(), None);
        assert_eq!(FieldValue::Text(None).key_text(), None);
        assert_eq!(FieldValue::Integer(Some(155125)).key_text(), Some("155125".into()));
    }

    #[test]
    fn raw_page_digest_ignores_key_order() {
        let at = Utc::now();
        let a = RawPage::new("ep", RequestParams::new(), json!({"x": 1, "y": 2}), at);
        let b = RawPage::new("ep", RequestParams::new(), json!({"y": 2, "x": 1}), at);
        assert_eq!(a.payload_sha256, b.payload_sha256);
    }
}
