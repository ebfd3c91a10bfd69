//! Free-time window discovery over a rolling range of calendar days
//!
//! For every day in the scan window the busy intervals of that day are turned into
//! occupied blocks and the spaces around them become [`Gap`]s:
//!
//! - a day without any busy interval yields one gap over the default window
//!   (09:00–18:00 local),
//! - otherwise a morning gap from the day-start anchor (07:00) to the first block,
//!   one gap between each pair of consecutive blocks, and an evening gap from the
//!   last block to the day-end anchor (22:00).
//!
//! Gaps shorter than the configured minimum are dropped. The computation is pure:
//! identical inputs always produce identical output, identifiers included.

use crate::error::ScheduleError;
use crate::models::{format_duration, minutes_between, BusyInterval, Gap, GapTag, QualityTier};
use crate::zone::LocalZone;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

const EMPTY_DAY_TITLE: &str = "Free Day Opportunity";
const MORNING_TITLE: &str = "Morning Workout";
const BETWEEN_TITLE: &str = "Fitness Opportunity";
const EVENING_TITLE: &str = "Evening Workout";

/// How overlapping busy intervals are treated before gaps are derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Union overlapping intervals into occupied blocks first
    #[default]
    Merge,
    /// Walk intervals in start order and measure from each interval's own end.
    /// A long interval followed by a shorter one it contains can then produce a
    /// gap that overlaps busy time.
    StartOrdered,
}

/// Gap finder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapConfig {
    /// Gaps shorter than this are not emitted
    pub min_gap_minutes: u32,

    /// Number of days scanned per sync
    pub scan_days: u32,

    /// Morning anchor for days with events
    pub day_start: NaiveTime,

    /// Evening anchor for days with events
    pub day_end: NaiveTime,

    /// Window reported for days without events
    pub default_window_start: NaiveTime,
    pub default_window_end: NaiveTime,

    pub overlap_policy: OverlapPolicy,
}

impl Default for GapConfig {
    fn default() -> Self {
        GapConfig {
            min_gap_minutes: 20,
            scan_days: 365,
            day_start: hm(7, 0),
            day_end: hm(22, 0),
            default_window_start: hm(9, 0),
            default_window_end: hm(18, 0),
            overlap_policy: OverlapPolicy::Merge,
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Contiguous span of busy time on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupiedBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Output of one gap scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapReport {
    /// Gaps in day order, chronological within a day
    pub gaps: Vec<Gap>,

    /// Records skipped because they could not be used
    pub diagnostics: Vec<ScheduleError>,
}

/// Classify a free window by its length
pub fn quality_tier(duration_minutes: u32) -> QualityTier {
    QualityTier::from_minutes(duration_minutes)
}

/// Union start-sorted intervals into non-overlapping blocks
///
/// Intervals that touch (one ends exactly when the next starts) are joined.
pub fn merge_busy_intervals(sorted: &[&BusyInterval]) -> Vec<OccupiedBlock> {
    let mut blocks: Vec<OccupiedBlock> = Vec::with_capacity(sorted.len());

    for interval in sorted {
        match blocks.last_mut() {
            Some(last) if interval.start <= last.end => {
                if interval.end > last.end {
                    last.end = interval.end;
                }
            }
            _ => blocks.push(OccupiedBlock {
                start: interval.start,
                end: interval.end,
            }),
        }
    }

    blocks
}

/// Scan `num_days` days from `scan_start` with the default configuration
pub fn find_gaps(
    busy: &[BusyInterval],
    scan_start: NaiveDate,
    num_days: u32,
    min_gap_minutes: u32,
    zone: impl Into<LocalZone>,
) -> GapReport {
    let config = GapConfig {
        min_gap_minutes,
        ..GapConfig::default()
    };
    GapFinder::with_config(config, zone).find_gaps(busy, scan_start, num_days)
}

/// Gap discovery engine
#[derive(Debug, Clone)]
pub struct GapFinder {
    config: GapConfig,
    zone: LocalZone,
}

impl GapFinder {
    /// Create a gap finder with default configuration for the given local zone
    pub fn new(zone: impl Into<LocalZone>) -> Self {
        GapFinder {
            config: GapConfig::default(),
            zone: zone.into(),
        }
    }

    /// Create a gap finder with custom configuration
    pub fn with_config(config: GapConfig, zone: impl Into<LocalZone>) -> Self {
        GapFinder {
            config,
            zone: zone.into(),
        }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Scan the configured number of days starting at `scan_start`
    pub fn scan(&self, busy: &[BusyInterval], scan_start: NaiveDate) -> GapReport {
        self.find_gaps(busy, scan_start, self.config.scan_days)
    }

    /// Derive gaps for each of `num_days` consecutive days starting at `scan_start`
    pub fn find_gaps(
        &self,
        busy: &[BusyInterval],
        scan_start: NaiveDate,
        num_days: u32,
    ) -> GapReport {
        let mut report = GapReport::default();
        let by_day = self.group_by_day(busy, &mut report.diagnostics);

        for day_index in 0..num_days {
            let Some(date) = scan_start.checked_add_days(Days::new(u64::from(day_index))) else {
                warn!(%scan_start, day_index, "Scan window runs past the supported date range");
                break;
            };

            let before = report.gaps.len();
            match by_day.get(&date) {
                None => report.gaps.push(self.build_gap(
                    date,
                    self.local_instant(date, self.config.default_window_start),
                    self.local_instant(date, self.config.default_window_end),
                    EMPTY_DAY_TITLE,
                )),
                Some(day_events) => self.scan_day(date, day_events, &mut report.gaps),
            }
            trace!(%date, gaps = report.gaps.len() - before, "Scanned day");
        }

        debug!(
            %scan_start,
            num_days,
            gaps = report.gaps.len(),
            skipped = report.diagnostics.len(),
            "Gap scan complete"
        );
        report
    }

    fn group_by_day<'a>(
        &self,
        busy: &'a [BusyInterval],
        diagnostics: &mut Vec<ScheduleError>,
    ) -> BTreeMap<NaiveDate, Vec<&'a BusyInterval>> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&BusyInterval>> = BTreeMap::new();

        for interval in busy {
            if !interval.is_valid() {
                warn!(
                    id = %interval.id,
                    date = %interval.date_key,
                    "Skipping busy interval that does not start before it ends"
                );
                diagnostics.push(ScheduleError::InvalidInterval {
                    id: interval.id.clone(),
                    date: interval.date_key,
                    start: interval.start,
                    end: interval.end,
                });
                continue;
            }
            by_day.entry(interval.date_key).or_default().push(interval);
        }

        for day_events in by_day.values_mut() {
            // stable: equal starts keep their input order
            day_events.sort_by_key(|interval| interval.start);
        }

        by_day
    }

    fn scan_day(&self, date: NaiveDate, day_events: &[&BusyInterval], gaps: &mut Vec<Gap>) {
        let blocks = match self.config.overlap_policy {
            OverlapPolicy::Merge => merge_busy_intervals(day_events),
            OverlapPolicy::StartOrdered => day_events
                .iter()
                .map(|interval| OccupiedBlock {
                    start: interval.start,
                    end: interval.end,
                })
                .collect(),
        };

        let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
            return;
        };

        let day_start = self.local_instant(date, self.config.day_start);
        if first.start > day_start {
            self.push_if_long_enough(gaps, date, day_start, first.start, MORNING_TITLE);
        }

        for pair in blocks.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            if next.start > current.end {
                self.push_if_long_enough(gaps, date, current.end, next.start, BETWEEN_TITLE);
            }
        }

        let day_end = self.local_instant(date, self.config.day_end);
        if last.end < day_end {
            self.push_if_long_enough(gaps, date, last.end, day_end, EVENING_TITLE);
        }
    }

    fn push_if_long_enough(
        &self,
        gaps: &mut Vec<Gap>,
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        title: &str,
    ) {
        if minutes_between(start, end) >= self.config.min_gap_minutes {
            gaps.push(self.build_gap(date, start, end, title));
        }
    }

    fn build_gap(&self, date: NaiveDate, start: DateTime<Utc>, end: DateTime<Utc>, title: &str) -> Gap {
        let duration_minutes = minutes_between(start, end);
        let quality = quality_tier(duration_minutes);

        Gap {
            id: format!("gap_{}_{}", date.format("%Y-%m-%d"), start.timestamp_millis()),
            date_key: date,
            title: title.to_string(),
            start,
            end,
            tag: GapTag::Gap,
            duration_minutes,
            duration: format_duration(duration_minutes),
            quality,
            suggestion: quality.suggestion().to_string(),
            color: quality.color().to_string(),
        }
    }

    /// Absolute instant of a local wall-clock time on `date`
    fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.zone.at(date, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BusyKind;
    use chrono::{FixedOffset, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
    }

    fn busy(id: &str, date: NaiveDate, start: (u32, u32), end: (u32, u32)) -> BusyInterval {
        BusyInterval {
            id: id.to_string(),
            date_key: date,
            title: format!("Event {}", id),
            start: at(date, start.0, start.1),
            end: at(date, end.0, end.1),
            kind: BusyKind::Class,
            color: None,
        }
    }

    fn spans(report: &GapReport) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        report.gaps.iter().map(|gap| (gap.start, gap.end)).collect()
    }

    #[test]
    fn test_empty_day_gets_default_window() {
        let finder = GapFinder::new(utc());
        let report = finder.find_gaps(&[], day(), 1);

        assert_eq!(report.gaps.len(), 1);
        let gap = &report.gaps[0];
        assert_eq!(gap.start, at(day(), 9, 0));
        assert_eq!(gap.end, at(day(), 18, 0));
        assert_eq!(gap.duration_minutes, 540);
        assert_eq!(gap.quality, QualityTier::Diamond);
        assert_eq!(gap.title, EMPTY_DAY_TITLE);
        assert_eq!(gap.duration, "9h");
    }

    #[test]
    fn test_morning_between_and_evening_gaps() {
        let finder = GapFinder::new(utc());
        let events = vec![
            busy("a", day(), (9, 0), (10, 0)),
            busy("b", day(), (10, 30), (11, 0)),
        ];
        let report = finder.find_gaps(&events, day(), 1);

        assert_eq!(
            spans(&report),
            vec![
                (at(day(), 7, 0), at(day(), 9, 0)),
                (at(day(), 10, 0), at(day(), 10, 30)),
                (at(day(), 11, 0), at(day(), 22, 0)),
            ]
        );
        assert_eq!(report.gaps[0].title, MORNING_TITLE);
        assert_eq!(report.gaps[1].title, BETWEEN_TITLE);
        assert_eq!(report.gaps[1].quality, QualityTier::Silver);
        assert_eq!(report.gaps[2].title, EVENING_TITLE);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_minimum_gap_threshold() {
        let finder = GapFinder::new(utc());

        let nineteen = vec![
            busy("a", day(), (7, 0), (9, 0)),
            busy("b", day(), (9, 19), (22, 0)),
        ];
        assert!(finder.find_gaps(&nineteen, day(), 1).gaps.is_empty());

        let twenty = vec![
            busy("a", day(), (7, 0), (9, 0)),
            busy("b", day(), (9, 20), (22, 0)),
        ];
        let report = finder.find_gaps(&twenty, day(), 1);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].duration_minutes, 20);
        assert_eq!(report.gaps[0].quality, quality_tier(20));
    }

    #[test]
    fn test_lower_threshold_emits_bronze() {
        let events = vec![
            busy("a", day(), (7, 0), (9, 0)),
            busy("b", day(), (9, 10), (22, 0)),
        ];
        let report = find_gaps(&events, day(), 1, 5, utc());
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].quality, QualityTier::Bronze);
        assert_eq!(report.gaps[0].suggestion, "Free Time");
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_start() {
        let finder = GapFinder::new(utc());
        let events = vec![
            busy("late", day(), (15, 0), (16, 0)),
            busy("early", day(), (8, 0), (9, 0)),
        ];
        let report = finder.find_gaps(&events, day(), 1);
        assert_eq!(
            spans(&report),
            vec![
                (at(day(), 7, 0), at(day(), 8, 0)),
                (at(day(), 9, 0), at(day(), 15, 0)),
                (at(day(), 16, 0), at(day(), 22, 0)),
            ]
        );
    }

    #[test]
    fn test_overlapping_intervals_are_merged() {
        let finder = GapFinder::new(utc());
        // 09:00-13:00 contains 10:00-11:00; 12:00-14:00 overlaps the tail
        let events = vec![
            busy("long", day(), (9, 0), (13, 0)),
            busy("inner", day(), (10, 0), (11, 0)),
            busy("tail", day(), (12, 0), (14, 0)),
        ];
        let report = finder.find_gaps(&events, day(), 1);
        assert_eq!(
            spans(&report),
            vec![
                (at(day(), 7, 0), at(day(), 9, 0)),
                (at(day(), 14, 0), at(day(), 22, 0)),
            ]
        );
    }

    #[test]
    fn test_start_ordered_policy_keeps_overlap_artifact() {
        let config = GapConfig {
            overlap_policy: OverlapPolicy::StartOrdered,
            ..GapConfig::default()
        };
        let finder = GapFinder::with_config(config, utc());
        let events = vec![
            busy("long", day(), (9, 0), (13, 0)),
            busy("inner", day(), (10, 0), (11, 0)),
            busy("tail", day(), (12, 0), (14, 0)),
        ];
        let report = finder.find_gaps(&events, day(), 1);
        // 11:00-12:00 is reported although "long" still occupies it
        assert!(spans(&report).contains(&(at(day(), 11, 0), at(day(), 12, 0))));
    }

    #[test]
    fn test_invalid_intervals_are_reported_and_skipped() {
        let finder = GapFinder::new(utc());
        let events = vec![
            busy("bad", day(), (12, 0), (11, 0)),
            busy("empty", day(), (13, 0), (13, 0)),
        ];
        let report = finder.find_gaps(&events, day(), 1);

        assert_eq!(report.diagnostics.len(), 2);
        assert!(matches!(
            &report.diagnostics[0],
            ScheduleError::InvalidInterval { id, .. } if id == "bad"
        ));
        // with every interval skipped the day is treated as empty
        assert_eq!(spans(&report), vec![(at(day(), 9, 0), at(day(), 18, 0))]);
    }

    #[test]
    fn test_events_outside_anchors() {
        let finder = GapFinder::new(utc());
        let events = vec![busy("all", day(), (6, 0), (23, 0))];
        assert!(finder.find_gaps(&events, day(), 1).gaps.is_empty());
    }

    #[test]
    fn test_multi_day_scan_and_stable_ids() {
        let finder = GapFinder::new(utc());
        let second = day().succ_opt().unwrap();
        let events = vec![busy("a", second, (12, 0), (13, 0))];

        let first_run = finder.find_gaps(&events, day(), 3);
        let second_run = finder.find_gaps(&events, day(), 3);
        assert_eq!(first_run, second_run);

        // day 1 empty, day 2 morning + evening, day 3 empty
        assert_eq!(first_run.gaps.len(), 4);
        assert_eq!(first_run.gaps[1].date_key, second);
        assert_eq!(
            first_run.gaps[1].id,
            format!("gap_2024-09-24_{}", at(second, 7, 0).timestamp_millis())
        );

        let mut ids: Vec<&str> = first_run.gaps.iter().map(|g| g.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), first_run.gaps.len());
    }

    #[test]
    fn test_anchors_follow_local_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let finder = GapFinder::new(plus_two);
        let report = finder.find_gaps(&[], day(), 1);
        // 09:00 at +02:00 is 07:00 UTC
        assert_eq!(report.gaps[0].start, at(day(), 7, 0));
        assert_eq!(report.gaps[0].end, at(day(), 16, 0));
    }

    #[test]
    fn test_scan_across_daylight_saving_change() {
        let berlin: LocalZone = "Europe/Berlin".parse().unwrap();
        let finder = GapFinder::new(berlin);
        // Clocks go back on 2024-10-27: +02:00 before, +01:00 from then on
        let saturday = NaiveDate::from_ymd_opt(2024, 10, 26).unwrap();
        let report = finder.find_gaps(&[], saturday, 3);

        assert_eq!(report.gaps.len(), 3);
        assert_eq!(report.gaps[0].start, at(saturday, 7, 0));
        assert_eq!(report.gaps[0].end, at(saturday, 16, 0));
        for gap in &report.gaps[1..] {
            assert_eq!(berlin.to_local(gap.start).time(), NaiveTime::from_hms_opt(9, 0, 0).unwrap());
            assert_eq!(berlin.to_local(gap.end).time(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
            assert_eq!(gap.duration_minutes, 540);
        }
        let monday = NaiveDate::from_ymd_opt(2024, 10, 28).unwrap();
        assert_eq!(report.gaps[2].start, at(monday, 8, 0));
    }

    #[test]
    fn test_scan_uses_configured_days() {
        let config = GapConfig {
            scan_days: 7,
            ..GapConfig::default()
        };
        let finder = GapFinder::with_config(config, utc());
        assert_eq!(finder.scan(&[], day()).gaps.len(), 7);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_quality_tier_is_monotonic(a in 0u32..10_000, b in 0u32..10_000) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(quality_tier(low) <= quality_tier(high));
        }

        #[test]
        fn test_find_gaps_is_deterministic(
            raw in proptest::collection::vec((0u32..3, 0u32..1440, 1u32..300), 0..12),
            min_gap in 1u32..90,
        ) {
            let events: Vec<BusyInterval> = raw
                .iter()
                .enumerate()
                .map(|(i, (day_offset, start_min, len))| {
                    let date = day().checked_add_days(Days::new(u64::from(*day_offset))).unwrap();
                    let start = at(date, 0, 0) + chrono::Duration::minutes(i64::from(*start_min));
                    BusyInterval {
                        id: format!("e{}", i),
                        date_key: date,
                        title: String::new(),
                        start,
                        end: start + chrono::Duration::minutes(i64::from(*len)),
                        kind: BusyKind::Custom,
                        color: None,
                    }
                })
                .collect();

            let first = find_gaps(&events, day(), 3, min_gap, utc());
            let second = find_gaps(&events, day(), 3, min_gap, utc());
            prop_assert_eq!(&first, &second);

            for gap in &first.gaps {
                prop_assert!(gap.duration_minutes >= min_gap || gap.title == EMPTY_DAY_TITLE);
                prop_assert_eq!(gap.quality, quality_tier(gap.duration_minutes));
                // merged blocks never leave a gap overlapping busy time
                for event in events.iter().filter(|e| e.date_key == gap.date_key) {
                    prop_assert!(gap.end <= event.start || gap.start >= event.end);
                }
            }
        }
    }
}
