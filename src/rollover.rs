//! End-of-day archiving of daily counters

use crate::models::{DailyCounters, HistoryEntry};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of a rollover check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollover {
    /// History records to append, empty when the day has not changed
    pub archive_entries: Vec<HistoryEntry>,

    /// Daily counters to persist
    pub reset_counters: DailyCounters,

    /// Value to persist as the new last-active date
    pub last_active_date: NaiveDate,

    /// Whether the check started a new day
    pub rolled_over: bool,
}

/// Archive the finished day and zero the daily counters when `today` differs
/// from `last_active_date`
///
/// Lifetime totals and streaks are not touched. Once the caller persists the
/// returned `last_active_date`, calling again with the same `today` is a no-op with
/// an empty archive. A missing last-active date is taken to be today.
pub fn rollover_if_new_day(
    last_active_date: Option<NaiveDate>,
    today: NaiveDate,
    current: DailyCounters,
) -> Rollover {
    let last_active = last_active_date.unwrap_or(today);

    if last_active == today {
        return Rollover {
            archive_entries: Vec::new(),
            reset_counters: current,
            last_active_date: today,
            rolled_over: false,
        };
    }

    if last_active > today {
        warn!(%last_active, %today, "Last active date is in the future; rolling over anyway");
    }

    let mut archive_entries = Vec::new();
    if current.steps > 0 {
        archive_entries.push(HistoryEntry::steps(last_active, current.steps));
    }

    info!(
        %last_active,
        %today,
        archived_steps = current.steps,
        "Daily counters rolled over"
    );

    Rollover {
        archive_entries,
        reset_counters: DailyCounters::default(),
        last_active_date: today,
        rolled_over: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryDate, HistoryKind};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn counters() -> DailyCounters {
        DailyCounters {
            steps: 8_500,
            hydration_today: 750,
            calories_today: 320,
            workouts_today: 2,
        }
    }

    #[test]
    fn test_same_day_is_noop() {
        let result = rollover_if_new_day(Some(day(23)), day(23), counters());
        assert!(result.archive_entries.is_empty());
        assert_eq!(result.reset_counters, counters());
        assert_eq!(result.last_active_date, day(23));
        assert!(!result.rolled_over);
    }

    #[test]
    fn test_new_day_archives_steps_and_resets() {
        let result = rollover_if_new_day(Some(day(22)), day(23), counters());

        assert_eq!(result.archive_entries.len(), 1);
        let archived = &result.archive_entries[0];
        assert_eq!(archived.date, EntryDate::Day(day(22)));
        assert_eq!(archived.kind, HistoryKind::Steps { count: Some(8_500) });
        assert_eq!(result.reset_counters, DailyCounters::default());
        assert_eq!(result.last_active_date, day(23));
    }

    #[test]
    fn test_second_call_same_day_is_idempotent() {
        let first = rollover_if_new_day(Some(day(20)), day(23), counters());
        assert!(first.rolled_over);
        let second = rollover_if_new_day(Some(first.last_active_date), day(23), first.reset_counters);
        assert!(!second.rolled_over);
        assert!(second.archive_entries.is_empty());
        assert_eq!(second.reset_counters, DailyCounters::default());
    }

    #[test]
    fn test_zero_steps_not_archived() {
        let idle = DailyCounters {
            steps: 0,
            ..counters()
        };
        let result = rollover_if_new_day(Some(day(22)), day(23), idle);
        assert!(result.archive_entries.is_empty());
        assert_eq!(result.reset_counters, DailyCounters::default());
    }

    #[test]
    fn test_missing_last_active_date() {
        let result = rollover_if_new_day(None, day(23), counters());
        assert!(result.archive_entries.is_empty());
        assert_eq!(result.reset_counters, counters());
    }
}
