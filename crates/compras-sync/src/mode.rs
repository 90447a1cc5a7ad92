//! Full-vs-incremental window selection.

use std::fmt;

use chrono::{Days, NaiveDate};
use compras_core::DateWindow;
use compras_storage::RunStateEntry;
use serde::Serialize;

use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Backfill from the configured start date.
    Full,
    /// Re-walk the last `lookback_days`.
    Daily,
    /// Detail job driven by targets from the store.
    Targets,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Full => "full",
            RunMode::Daily => "daily",
            RunMode::Targets => "targets",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub mode: RunMode,
    /// Inclusive date range to walk; `None` for targeted jobs.
    pub range: Option<DateWindow>,
}

impl RunPlan {
    pub fn targets() -> Self {
        Self {
            mode: RunMode::Targets,
            range: None,
        }
    }

    /// Forced or first runs backfill; later runs re-walk the lookback period.
    /// The previous run's recorded range is not used as a resume point.
    pub fn windowed(config: &SyncConfig, prior: Option<&RunStateEntry>, today: NaiveDate) -> Self {
        if config.force_full || prior.is_none() {
            return Self {
                mode: RunMode::Full,
                range: Some(DateWindow {
                    start: config.start_date,
                    end: today,
                }),
            };
        }
        let start = today
            .checked_sub_days(Days::new(config.lookback_days))
            .unwrap_or(config.start_date);
        Self {
            mode: RunMode::Daily,
            range: Some(DateWindow { start, end: today }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn prior() -> RunStateEntry {
        RunStateEntry {
            value: json!({"mode": "full", "end": "2025-06-01"}),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn first_run_is_full_backfill() {
        let plan = RunPlan::windowed(&SyncConfig::default(), None, day(2025, 6, 10));
        assert_eq!(plan.mode, RunMode::Full);
        assert_eq!(
            plan.range,
            Some(DateWindow {
                start: day(2021, 1, 1),
                end: day(2025, 6, 10)
            })
        );
    }

    #[test]
    fn later_runs_use_lookback_and_ignore_watermark() {
        let plan = RunPlan::windowed(&SyncConfig::default(), Some(&prior()), day(2025, 6, 10));
        assert_eq!(plan.mode, RunMode::Daily);
        assert_eq!(
            plan.range,
            Some(DateWindow {
                start: day(2025, 6, 3),
                end: day(2025, 6, 10)
            })
        );
    }

    #[test]
    fn force_full_overrides_prior_state() {
        let config = SyncConfig {
            force_full: true,
            ..SyncConfig::default()
        };
        let plan = RunPlan::windowed(&config, Some(&prior()), day(2025, 6, 10));
        assert_eq!(plan.mode, RunMode::Full);
    }

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RunMode::Daily).unwrap(), json!("daily"));
        assert_eq!(RunMode::Targets.to_string(), "targets");
    }
}
