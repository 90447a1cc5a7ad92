//! Raw archive: every fetched page is kept verbatim, once per distinct content.

use chrono::{DateTime, Utc};
use compras_core::{RawPage, RequestParams};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{PageTransaction, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub payload_sha256: String,
    /// `false` when an identical payload was already archived for the endpoint.
    pub inserted: bool,
}

/// Archives `payload` under `(endpoint, digest)` inside the page transaction.
/// Re-archiving identical content is a no-op.
pub async fn archive_page(
    tx: &mut dyn PageTransaction,
    endpoint: &str,
    params: &RequestParams,
    payload: &JsonValue,
    fetched_at: DateTime<Utc>,
) -> Result<ArchiveOutcome, StoreError> {
    let page = RawPage::new(endpoint, params.clone(), payload.clone(), fetched_at);
    let inserted = tx.insert_raw(&page).await?;
    debug!(endpoint, payload_sha256 = %page.payload_sha256, inserted, "archived raw page");
    Ok(ArchiveOutcome {
        payload_sha256: page.payload_sha256,
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IngestStore, MemoryStore};
    use serde_json::json;

    #[tokio::test]
    async fn identical_payloads_are_archived_once() {
        let store = MemoryStore::new();
        let params = RequestParams::new().with("pagina", 1);
        let payload = json!({"resultado": [{"id": 1}], "totalRegistros": 1});

        for expected in [true, false] {
            let mut tx = store.begin().await.unwrap();
            let outcome = archive_page(tx.as_mut(), "modulo-arp/1_consultarARP", &params, &payload, Utc::now())
                .await
                .unwrap();
            assert_eq!(outcome.inserted, expected);
            tx.commit().await.unwrap();
        }

        // same content under another endpoint is a distinct row
        let mut tx = store.begin().await.unwrap();
        let other = archive_page(tx.as_mut(), "modulo-legado/1_consultarLicitacao", &params, &payload, Utc::now())
            .await
            .unwrap();
        assert!(other.inserted);
        tx.commit().await.unwrap();

        assert_eq!(store.raw_pages().await.len(), 2);
    }

    #[tokio::test]
    async fn reordered_payload_counts_as_duplicate() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let params = RequestParams::new();
        let a = archive_page(tx.as_mut(), "ep", &params, &json!({"a": 1, "b": [1]}), Utc::now()).await.unwrap();
        let b = archive_page(tx.as_mut(), "ep", &params, &json!({"b": [1], "a": 1}), Utc::now()).await.unwrap();
        tx.commit().await.unwrap();
        assert!(a.inserted);
        assert!(!b.inserted);
        assert_eq!(a.payload_sha256, b.payload_sha256);
    }
}
