//! Inclusive date-range chunking under an upstream span limit.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Lazy iterator over contiguous windows of at most `max_days` days.
#[derive(Debug, Clone)]
pub struct DateWindows {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
    max_days: u32,
}

/// Splits `[start, end]` into ordered windows of at most `max_days` days each.
/// Yields nothing when `end < start`; a `max_days` of zero is treated as one.
pub fn date_windows(start: NaiveDate, end: NaiveDate, max_days: u32) -> DateWindows {
    DateWindows {
        next_start: Some(start),
        end,
        max_days: max_days.max(1),
    }
}

impl Iterator for DateWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.next_start?;
        if start > self.end {
            self.next_start = None;
            return None;
        }

        let span_end = start
            .checked_add_days(Days::new(u64::from(self.max_days) - 1))
            .unwrap_or(NaiveDate::MAX);
        let end = span_end.min(self.end);
        self.next_start = end.succ_opt();
        Some(DateWindow { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn ninety_day_windows_over_half_a_year() {
        let windows: Vec<_> = date_windows(d("2024-01-01"), d("2024-07-05"), 90).collect();
        assert_eq!(
            windows,
            vec![
                DateWindow { start: d("2024-01-01"), end: d("2024-03-30") },
                DateWindow { start: d("2024-03-31"), end: d("2024-06-28") },
                DateWindow { start: d("2024-06-29"), end: d("2024-07-05") },
            ]
        );
    }

    #[test]
    fn reversed_range_is_empty() {
        assert_eq!(date_windows(d("2024-02-02"), d("2024-02-01"), 30).count(), 0);
    }

    #[test]
    fn single_day_range_yields_one_window() {
        let windows: Vec<_> = date_windows(d("2024-02-29"), d("2024-02-29"), 365).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].days(), 1);
    }

    #[test]
    fn zero_span_behaves_like_one_day() {
        let windows: Vec<_> = date_windows(d("2024-01-01"), d("2024-01-03"), 0).collect();
        assert_eq!(windows.len(), 3);
        assert!(windows.iter().all(|w| w.start == w.end));
    }

    #[test]
    fn windows_cover_range_exactly_for_many_inputs() {
        let start = d("2021-01-01");
        for span in [0i64, 1, 2, 30, 364, 365, 366, 800, 1900] {
            let end = start + chrono::Duration::days(span);
            for max_days in [1u32, 2, 7, 31, 90, 365, 10_000] {
                let windows: Vec<_> = date_windows(start, end, max_days).collect();
                assert_eq!(windows.first().map(|w| w.start), Some(start));
                assert_eq!(windows.last().map(|w| w.end), Some(end));
                for w in &windows {
                    assert!(w.start <= w.end);
                    assert!(w.days() <= i64::from(max_days));
                }
                for pair in windows.windows(2) {
                    assert_eq!(pair[0].end.succ_opt(), Some(pair[1].start));
                }
                let covered: i64 = windows.iter().map(DateWindow::days).sum();
                assert_eq!(covered, span + 1);
            }
        }
    }

    #[test]
    fn iteration_is_restartable() {
        let windows = date_windows(d("2023-01-01"), d("2024-12-31"), 365);
        let first: Vec<_> = windows.clone().collect();
        let second: Vec<_> = windows.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }
}
