//! Pagination driver.
//!
//! Each page moves through `FetchingPage -> PersistingRaw -> UpsertingRecords
//! -> Committed`. The raw row and every record merge of a page share one
//! transaction: any failure after the fetch rolls the page back and aborts the
//! run. Windows, partitions, pages and targets are strictly sequential.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use compras_core::{
    date_windows, declared_total_pages, extract_records, DateWindow, EntitySpec, MappingContext,
    RequestParams,
};
use compras_storage::{
    archive_page, upsert_record, ArchiveOutcome, FetchedPage, IngestStore, PageSource, PageTransaction,
    StoreError, Target,
};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::job::{IngestJob, JobPlan, PAGE_PARAM};

/// What one committed page contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub records: usize,
    pub raw_inserted: bool,
    pub upserts: u64,
    /// Records dropped for lacking a natural key.
    pub skipped: u64,
    pub declared_total: Option<u32>,
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub windows: u64,
    pub targets: u64,
    pub pages: u64,
    pub raw_inserted: u64,
    pub raw_duplicates: u64,
    pub records_seen: u64,
    pub upserts: u64,
    pub skipped: u64,
}

impl RunTotals {
    fn absorb(&mut self, page: &PageOutcome) {
        self.pages += 1;
        if page.raw_inserted {
            self.raw_inserted += 1;
        } else {
            self.raw_duplicates += 1;
        }
        self.records_seen += page.records as u64;
        self.upserts += page.upserts;
        self.skipped += page.skipped;
    }
}

/// Target stamp written in the same transaction as its page.
#[derive(Debug, Clone, Copy)]
pub struct TargetMark<'t> {
    pub query: &'t str,
    pub key: &'t str,
}

enum PageState {
    FetchingPage,
    PersistingRaw {
        page: FetchedPage,
        tx: Box<dyn PageTransaction>,
    },
    UpsertingRecords {
        page: FetchedPage,
        tx: Box<dyn PageTransaction>,
        archived: ArchiveOutcome,
    },
    Committed(PageOutcome),
}

/// Page to fetch after `page` committed, or `None` when the window (or
/// partition) is exhausted.
pub fn next_page(page: u32, outcome: &PageOutcome, stop_on_declared_total: bool) -> Option<u32> {
    if outcome.records == 0 {
        return None;
    }
    if stop_on_declared_total {
        if let Some(total) = outcome.declared_total {
            if page >= total {
                return None;
            }
        }
    }
    page.checked_add(1)
}

pub struct PageDriver<'a> {
    store: &'a dyn IngestStore,
    source: &'a dyn PageSource,
    pacing: Duration,
    fetched: bool,
}

impl<'a> PageDriver<'a> {
    pub fn new(store: &'a dyn IngestStore, source: &'a dyn PageSource, pacing: Duration) -> Self {
        Self {
            store,
            source,
            pacing,
            fetched: false,
        }
    }

    /// Walks every window of `range`, then every partition, page by page.
    pub async fn run_windows(&mut self, job: &IngestJob, range: DateWindow, max_window_days: u32) -> Result<RunTotals> {
        let JobPlan::Windowed { dates, partitions } = &job.plan else {
            anyhow::bail!("job `{}` is not windowed", job.name);
        };
        let unpartitioned = [RequestParams::new()];
        let partitions = if partitions.is_empty() {
            &unpartitioned[..]
        } else {
            partitions.as_slice()
        };

        let mut totals = RunTotals::default();
        for window in date_windows(range.start, range.end, max_window_days) {
            totals.windows += 1;
            let span = info_span!("window", window = %window);
            for partition in partitions {
                let params = job.first_page_params(dates, partition, &window);
                self.drain(job, params, &mut totals)
                    .instrument(span.clone())
                    .await
                    .with_context(|| format!("window {window}"))?;
            }
        }
        Ok(totals)
    }

    /// One fetch per target, each committed on its own.
    pub async fn run_targets(&mut self, job: &IngestJob) -> Result<RunTotals> {
        let JobPlan::Targeted { query } = &job.plan else {
            anyhow::bail!("job `{}` is not targeted", job.name);
        };
        let targets = self
            .store
            .select_targets(query)
            .await
            .with_context(|| format!("selecting targets with `{}`", query.name))?;
        info!(query = query.name, targets = targets.len(), "targets selected");

        let mut totals = RunTotals::default();
        let count = targets.len();
        for (index, target) in targets.into_iter().enumerate() {
            let key = target.key();
            let Target { params: target_params, context: target_context } = target;
            let mut params = job.params.clone();
            params.extend(&target_params);
            let mut context = params.to_context();
            context.extend(target_context);

            let mark = TargetMark { query: query.name, key: &key };
            let outcome = self
                .ingest_page(job, &params, &context, Some(mark))
                .await
                .with_context(|| format!("target {}/{count} ({})", index + 1, describe(&params)))?;
            totals.targets += 1;
            totals.absorb(&outcome);
            info!(
                index = index + 1,
                of = count,
                items = outcome.records,
                upserts_total = totals.upserts,
                "target committed"
            );
        }
        Ok(totals)
    }

    /// Pages through one window/partition starting from `params`' page.
    async fn drain(&mut self, job: &IngestJob, mut params: RequestParams, totals: &mut RunTotals) -> Result<()> {
        let mut page: u32 = params
            .get(PAGE_PARAM)
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        loop {
            params.set(PAGE_PARAM, page);
            let context = params.to_context();
            let outcome = self
                .ingest_page(job, &params, &context, None)
                .instrument(info_span!("page", page))
                .await
                .with_context(|| format!("page {page} ({})", describe(&params)))?;
            totals.absorb(&outcome);

            match next_page(page, &outcome, job.stop_on_declared_total) {
                Some(next) => {
                    info!(page, items = outcome.records, upserts_total = totals.upserts, "page committed");
                    page = next;
                }
                None => {
                    info!(page, items = outcome.records, "window exhausted");
                    return Ok(());
                }
            }
        }
    }

    /// Fetches one page and commits its raw row, its records and the optional
    /// target stamp atomically.
    pub async fn ingest_page(
        &mut self,
        job: &IngestJob,
        params: &RequestParams,
        context: &MappingContext,
        mark: Option<TargetMark<'_>>,
    ) -> Result<PageOutcome> {
        let mut state = PageState::FetchingPage;
        loop {
            state = match state {
                PageState::FetchingPage => {
                    self.pace().await;
                    let page = self
                        .source
                        .fetch_page(&job.endpoint, params)
                        .await
                        .with_context(|| format!("fetching `{}`", job.endpoint.name))?;
                    debug!(url = %page.url, attempts = page.attempts, "page fetched");
                    let tx = self.store.begin().await.context("opening page transaction")?;
                    PageState::PersistingRaw { page, tx }
                }
                PageState::PersistingRaw { page, mut tx } => {
                    let archived = archive_page(tx.as_mut(), &job.endpoint.name, params, &page.body, page.fetched_at).await;
                    match archived {
                        Ok(archived) => PageState::UpsertingRecords { page, tx, archived },
                        Err(err) => return Err(abort(tx, err, "archiving raw page").await),
                    }
                }
                PageState::UpsertingRecords { page, mut tx, archived } => {
                    match upsert_page(tx.as_mut(), job.entity, &page.body, context, page.fetched_at, mark).await {
                        Ok((upserts, skipped)) => {
                            tx.commit().await.context("committing page")?;
                            PageState::Committed(PageOutcome {
                                records: extract_records(&page.body).len(),
                                raw_inserted: archived.inserted,
                                upserts,
                                skipped,
                                declared_total: declared_total_pages(&page.body),
                            })
                        }
                        Err(err) => return Err(abort(tx, err, "upserting records").await),
                    }
                }
                PageState::Committed(outcome) => return Ok(outcome),
            };
        }
    }

    async fn pace(&mut self) {
        if self.fetched && !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
        self.fetched = true;
    }
}

/// Upserts every record of `payload` in upstream order, then stamps the
/// target if any. Returns `(upserts, skipped)`; the first failure stops the page.
async fn upsert_page(
    tx: &mut dyn PageTransaction,
    entity: &EntitySpec,
    payload: &serde_json::Value,
    context: &MappingContext,
    seen_at: DateTime<Utc>,
    mark: Option<TargetMark<'_>>,
) -> Result<(u64, u64), StoreError> {
    let mut upserts = 0;
    let mut skipped = 0;
    for record in extract_records(payload) {
        match upsert_record(&mut *tx, entity, record, context, seen_at).await? {
            0 => skipped += 1,
            n => upserts += n,
        }
    }
    if let Some(mark) = mark {
        tx.mark_target(mark.query, mark.key, seen_at).await?;
    }
    Ok((upserts, skipped))
}

async fn abort(tx: Box<dyn PageTransaction>, err: StoreError, stage: &str) -> anyhow::Error {
    if let Err(rollback) = tx.rollback().await {
        warn!(error = %rollback, "rollback failed");
    }
    warn!(error = %err, stage, "page rolled back");
    anyhow::Error::new(err).context(stage.to_string())
}

fn describe(params: &RequestParams) -> String {
    params
        .pairs()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
