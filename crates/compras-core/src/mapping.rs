//! Declarative mapping from upstream JSON records to typed table columns.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::{content_digest, DomainRecord, FieldKind, FieldValue, RESERVED_COLUMNS};

/// Values a mapping may fall back to when the record omits a field, such as
/// the query's management unit.
pub type MappingContext = BTreeMap<String, String>;

/// One target column: the upstream keys to try in order, an optional context
/// fallback, and the coercion applied to the first usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub column: &'static str,
    pub kind: FieldKind,
    pub sources: &'static [&'static str],
    pub context: Option<&'static str>,
}

impl FieldMapping {
    pub const fn new(column: &'static str, kind: FieldKind, sources: &'static [&'static str]) -> Self {
        Self {
            column,
            kind,
            sources,
            context: None,
        }
    }

    pub const fn or_context(mut self, key: &'static str) -> Self {
        self.context = Some(key);
        self
    }

    pub fn evaluate(&self, record: &JsonValue, context: &MappingContext) -> FieldValue {
        if let Some(raw) = pick_first(record, self.sources) {
            let value = coerce(self.kind, raw);
            if !value.is_null() {
                return value;
            }
        }
        self.context
            .and_then(|key| context.get(key))
            .map(|text| coerce(self.kind, &JsonValue::String(text.clone())))
            .unwrap_or_else(|| FieldValue::null(self.kind))
    }
}

/// An entity table and the mapping that fills it.
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    pub name: &'static str,
    pub table: &'static str,
    pub natural_key: &'static [&'static str],
    pub fields: &'static [FieldMapping],
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("invalid SQL identifier `{0}`")]
    InvalidIdentifier(String),
    #[error("column `{column}` of `{entity}` is declared more than once")]
    DuplicateColumn { entity: String, column: String },
    #[error("column `{column}` of `{entity}` collides with a provenance column")]
    ReservedColumn { entity: String, column: String },
    #[error("natural key column `{column}` of `{entity}` has no mapping")]
    UnmappedKey { entity: String, column: String },
    #[error("entity `{0}` has an empty natural key")]
    EmptyKey(String),
}

impl EntitySpec {
    pub fn validate(&self) -> Result<(), MappingError> {
        if !is_identifier(self.table) {
            return Err(MappingError::InvalidIdentifier(self.table.to_string()));
        }
        if self.natural_key.is_empty() {
            return Err(MappingError::EmptyKey(self.name.to_string()));
        }

        let mut seen = HashSet::new();
        for field in self.fields {
            if !is_identifier(field.column) {
                return Err(MappingError::InvalidIdentifier(field.column.to_string()));
            }
            if RESERVED_COLUMNS.contains(&field.column) {
                return Err(MappingError::ReservedColumn {
                    entity: self.name.to_string(),
                    column: field.column.to_string(),
                });
            }
            if !seen.insert(field.column) {
                return Err(MappingError::DuplicateColumn {
                    entity: self.name.to_string(),
                    column: field.column.to_string(),
                });
            }
        }

        match self.natural_key.iter().find(|key| !seen.contains(*key)) {
            Some(missing) => Err(MappingError::UnmappedKey {
                entity: self.name.to_string(),
                column: missing.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Maps one upstream record. Returns `None` when any natural-key column
    /// ends up null or blank; such rows cannot be deduplicated.
    pub fn map_record(&self, record: &JsonValue, context: &MappingContext) -> Option<DomainRecord> {
        let fields: Vec<(String, FieldValue)> = self
            .fields
            .iter()
            .map(|mapping| (mapping.column.to_string(), mapping.evaluate(record, context)))
            .collect();

        let mapped = DomainRecord {
            table: self.table.to_string(),
            key_columns: self.natural_key.iter().map(|k| k.to_string()).collect(),
            fields,
            payload: record.clone(),
            payload_sha256: content_digest(record),
        };
        mapped.natural_key().map(|_| mapped)
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn pick_first<'a>(record: &'a JsonValue, keys: &[&str]) -> Option<&'a JsonValue> {
    keys.iter()
        .filter_map(|key| record.get(key))
        .find(|value| match value {
            JsonValue::Null => false,
            JsonValue::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

/// `f` as an integer when it is whole and within `i64` range.
fn whole_to_i64(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or above it overflows
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() != 0.0 || !(-LIMIT..LIMIT).contains(&f) {
        return None;
    }
    i64::try_from(f as i128).ok()
}

/// Coerces an upstream value into `kind`. Values that do not parse become NULL.
pub fn coerce(kind: FieldKind, value: &JsonValue) -> FieldValue {
    match kind {
        FieldKind::Text => FieldValue::Text(match value {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(crate::canonical_json(other)),
        }),
        FieldKind::Integer => FieldValue::Integer(match value {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_to_i64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }),
        FieldKind::Decimal => FieldValue::Decimal(
            match value {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => s.trim().parse().ok(),
                _ => None,
            }
            .filter(|f: &f64| f.is_finite()),
        ),
        FieldKind::Bool => FieldValue::Bool(match value {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::Number(n) => n.as_i64().and_then(|i| match i {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            }),
            JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "s" | "sim" | "1" => Some(true),
                "false" | "n" | "nao" | "não" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }),
        FieldKind::Date => FieldValue::Date(value.as_str().and_then(parse_date)),
        FieldKind::Timestamp => FieldValue::Timestamp(value.as_str().and_then(parse_timestamp)),
        FieldKind::Json => FieldValue::Json(match value {
            JsonValue::Null => None,
            other => Some(other.clone()),
        }),
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// RFC 3339 timestamps keep their offset; naive ones are taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
