//! Ingestion runs: mode selection, pagination and run-state bookkeeping.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use compras_storage::{IngestStore, PageSource, PgStore, ResilientFetcher};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub mod catalog;
pub mod config;
pub mod driver;
pub mod job;
pub mod mode;

pub use catalog::JobKind;
pub use config::SyncConfig;
pub use driver::{next_page, PageDriver, PageOutcome, RunTotals, TargetMark};
pub use job::{IngestJob, JobPlan};
pub use mode::{RunMode, RunPlan};

/// Outcome of one job run; also the value stored under `<job>_last_run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub job: String,
    pub mode: RunMode,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: RunTotals,
}

impl RunSummary {
    pub fn state_value(&self) -> Result<JsonValue> {
        serde_json::to_value(self).context("serializing run state")
    }
}

/// Picks the run plan from prior state, then runs the job.
pub async fn run_job(
    config: &SyncConfig,
    job: &IngestJob,
    store: &dyn IngestStore,
    source: &dyn PageSource,
) -> Result<RunSummary> {
    let plan = if job.is_targeted() {
        RunPlan::targets()
    } else {
        let prior = store
            .get_state(&job.state_name())
            .await
            .with_context(|| format!("reading state `{}`", job.state_name()))?;
        RunPlan::windowed(config, prior.as_ref(), Utc::now().date_naive())
    };
    execute(config, job, plan, store, source).await
}

/// Runs `job` under an already chosen `plan` and records its state.
pub async fn execute(
    config: &SyncConfig,
    job: &IngestJob,
    plan: RunPlan,
    store: &dyn IngestStore,
    source: &dyn PageSource,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let span = info_span!("run", run_id = %run_id, job = %job.name);

    async move {
        info!(
            mode = %plan.mode,
            range = ?plan.range.map(|r| r.to_string()),
            page_size = job.page_size,
            "START"
        );

        let mut driver = PageDriver::new(store, source, config.pacing);
        let totals = match plan.range {
            Some(range) => driver.run_windows(job, range, config.max_window_days).await,
            None => driver.run_targets(job).await,
        }
        .with_context(|| format!("job `{}` ({} mode)", job.name, plan.mode))?;

        let summary = RunSummary {
            run_id,
            job: job.name.clone(),
            mode: plan.mode,
            start: plan.range.map(|r| r.start),
            end: plan.range.map(|r| r.end),
            started_at,
            ended_at: Utc::now(),
            totals,
        };
        store
            .set_state(&job.state_name(), &summary.state_value()?)
            .await
            .with_context(|| format!("writing state `{}`", job.state_name()))?;

        info!(
            pages = summary.totals.pages,
            raw_inserted = summary.totals.raw_inserted,
            records = summary.totals.records_seen,
            upserts = summary.totals.upserts,
            skipped = summary.totals.skipped,
            "DONE"
        );
        Ok(summary)
    }
    .instrument(span)
    .await
}

/// Connects with `DATABASE_URL`, runs `kind` against the live API and closes
/// the connection whatever the outcome.
pub async fn run_job_from_env(kind: JobKind) -> Result<RunSummary> {
    let config = SyncConfig::from_env();
    let store = PgStore::connect(config.require_database_url()?)
        .await
        .context("connecting to database")?;
    let fetcher = ResilientFetcher::new(config.http_client_config())?;
    let job = kind.build(&config);

    let result = run_job(&config, &job, &store, &fetcher).await;
    store.close().await;
    result
}

pub async fn migrate_from_env() -> Result<()> {
    let config = SyncConfig::from_env();
    let store = PgStore::connect(config.require_database_url()?)
        .await
        .context("connecting to database")?;
    let result = store.migrate().await.context("applying migrations");
    store.close().await;
    result
}
