//! Record upserter: merge one upstream record into its entity table.

use chrono::{DateTime, Utc};
use compras_core::{EntitySpec, MappingContext};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{PageTransaction, StoreError};

/// Maps `record` through `entity` and merges it by natural key.
///
/// Returns 0 without touching the store when the record has no usable natural
/// key. Otherwise the row is inserted or updated and `last_seen_at` is bumped
/// to `seen_at` even when nothing else changed.
pub async fn upsert_record(
    tx: &mut dyn PageTransaction,
    entity: &EntitySpec,
    record: &JsonValue,
    context: &MappingContext,
    seen_at: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let Some(mapped) = entity.map_record(record, context) else {
        debug!(entity = entity.name, "skipping record without natural key");
        return Ok(0);
    };
    tx.merge_record(&mapped, seen_at).await
}
