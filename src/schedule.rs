//! Merged chronological schedule of busy blocks and free-time gaps

use crate::models::{BusyInterval, BusyKind, Gap, ScheduleItem};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Item counts for a single day of the schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    /// Calendar classes and user-authored events
    pub classes: usize,
    pub workouts: usize,
    pub gaps: usize,
}

impl DaySummary {
    pub fn total(&self) -> usize {
        self.classes + self.workouts + self.gaps
    }
}

/// Merge busy intervals and gaps into one list ordered by start instant
///
/// The sort is stable, so items starting at the same instant keep busy-before-gap
/// order. Invalid busy intervals are left out.
pub fn build_schedule(busy: &[BusyInterval], gaps: &[Gap]) -> Vec<ScheduleItem> {
    let mut schedule: Vec<ScheduleItem> = busy
        .iter()
        .filter(|interval| interval.is_valid())
        .cloned()
        .map(ScheduleItem::Busy)
        .chain(gaps.iter().cloned().map(ScheduleItem::Gap))
        .collect();

    schedule.sort_by_key(|item| item.start());
    schedule
}

/// Items of one local day in start order
pub fn items_for_day(schedule: &[ScheduleItem], date: NaiveDate) -> Vec<&ScheduleItem> {
    let mut items: Vec<&ScheduleItem> = schedule
        .iter()
        .filter(|item| item.date_key() == date)
        .collect();
    items.sort_by_key(|item| item.start());
    items
}

/// The gap of `date` that contains `now`, if the user is currently in one
pub fn current_gap(schedule: &[ScheduleItem], date: NaiveDate, now: DateTime<Utc>) -> Option<&Gap> {
    schedule
        .iter()
        .filter_map(ScheduleItem::as_gap)
        .find(|gap| gap.date_key == date && gap.contains(now))
}

/// The first gap of `date` that has not ended yet
pub fn next_gap(schedule: &[ScheduleItem], date: NaiveDate, now: DateTime<Utc>) -> Option<&Gap> {
    schedule
        .iter()
        .filter_map(ScheduleItem::as_gap)
        .filter(|gap| gap.date_key == date && gap.end > now)
        .min_by_key(|gap| gap.start)
}

/// Count classes, workouts and gaps scheduled on `date`
pub fn day_summary(schedule: &[ScheduleItem], date: NaiveDate) -> DaySummary {
    schedule
        .iter()
        .filter(|item| item.date_key() == date)
        .fold(DaySummary::default(), |mut summary, item| {
            match item {
                ScheduleItem::Gap(_) => summary.gaps += 1,
                ScheduleItem::Busy(busy) => match busy.kind {
                    BusyKind::Class | BusyKind::Custom => summary.classes += 1,
                    BusyKind::Workout => summary.workouts += 1,
                },
            }
            summary
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::GapFinder;
    use chrono::{FixedOffset, TimeZone};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&day().and_hms_opt(hour, minute, 0).unwrap())
    }

    fn busy(id: &str, kind: BusyKind, start: (u32, u32), end: (u32, u32)) -> BusyInterval {
        BusyInterval {
            id: id.to_string(),
            date_key: day(),
            title: id.to_string(),
            start: at(start.0, start.1),
            end: at(end.0, end.1),
            kind,
            color: None,
        }
    }

    fn sample() -> Vec<ScheduleItem> {
        let events = vec![
            busy("lecture", BusyKind::Class, (10, 0), (11, 0)),
            busy("gym", BusyKind::Workout, (12, 0), (13, 0)),
            busy("study", BusyKind::Custom, (8, 0), (9, 0)),
        ];
        let finder = GapFinder::new(FixedOffset::east_opt(0).unwrap());
        let report = finder.find_gaps(&events, day(), 1);
        build_schedule(&events, &report.gaps)
    }

    #[test]
    fn test_schedule_is_chronological() {
        let schedule = sample();
        let starts: Vec<DateTime<Utc>> = schedule.iter().map(ScheduleItem::start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
        assert_eq!(schedule.first().map(ScheduleItem::title), Some("Morning Workout"));
    }

    #[test]
    fn test_day_summary_counts() {
        let summary = day_summary(&sample(), day());
        assert_eq!(summary.classes, 2);
        assert_eq!(summary.workouts, 1);
        // 07-08, 09-10, 11-12, 13-22
        assert_eq!(summary.gaps, 4);
        assert_eq!(summary.total(), 7);
    }

    #[test]
    fn test_current_and_next_gap() {
        let schedule = sample();
        let gap = current_gap(&schedule, day(), at(11, 30)).unwrap();
        assert_eq!((gap.start, gap.end), (at(11, 0), at(12, 0)));

        assert!(current_gap(&schedule, day(), at(10, 30)).is_none());
        let next = next_gap(&schedule, day(), at(10, 30)).unwrap();
        assert_eq!(next.start, at(11, 0));
    }

    #[test]
    fn test_invalid_busy_left_out() {
        let events = vec![busy("bad", BusyKind::Class, (12, 0), (11, 0))];
        assert!(build_schedule(&events, &[]).is_empty());
    }

    #[test]
    fn test_items_for_day() {
        let schedule = sample();
        assert_eq!(items_for_day(&schedule, day()).len(), schedule.len());
        assert!(items_for_day(&schedule, day().succ_opt().unwrap()).is_empty());
    }
}
