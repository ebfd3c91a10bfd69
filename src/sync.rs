//! Busy-interval sources and the schedule sync pass
//!
//! A sync gathers busy intervals from every registered [`BusySource`] (the device
//! calendar and the user's own custom events), runs one gap scan over them and
//! merges both into a single chronological schedule. A source that fails is
//! recorded as a diagnostic and the sync continues with the remaining sources.

use crate::error::ScheduleError;
use crate::gaps::GapFinder;
use crate::models::{format_duration, BusyInterval, BusyKind, ScheduleItem};
use crate::schedule::build_schedule;
use crate::zone::LocalZone;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Note attached to device-calendar copies of custom events
pub const APP_EVENT_MARKER: &str = "Added via UFitness Schedule";

const DEVICE_EVENT_COLOR: &str = "#555";
const CUSTOM_EVENT_COLOR: &str = "#FF9500";

/// Anything that can report busy time for a window
pub trait BusySource {
    /// Short name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Busy intervals overlapping `[window_start, window_end)`
    fn busy_intervals(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ScheduleError>;
}

/// Event as read from the device calendar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub calendar_color: Option<String>,
}

impl DeviceEvent {
    /// Whether this event is the app's own mirror of a custom event
    pub fn is_app_created(&self) -> bool {
        self.notes
            .as_deref()
            .or(self.description.as_deref())
            .is_some_and(|note| note.contains(APP_EVENT_MARKER))
    }
}

/// Snapshot of device-calendar events
#[derive(Debug, Clone)]
pub struct DeviceCalendar {
    events: Vec<DeviceEvent>,
    zone: LocalZone,
}

impl DeviceCalendar {
    pub fn new(events: Vec<DeviceEvent>, zone: impl Into<LocalZone>) -> Self {
        DeviceCalendar {
            events,
            zone: zone.into(),
        }
    }
}

impl BusySource for DeviceCalendar {
    fn name(&self) -> &str {
        "device-calendar"
    }

    fn busy_intervals(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ScheduleError> {
        Ok(self
            .events
            .iter()
            .filter(|event| !event.is_app_created())
            .enumerate()
            .filter(|(_, event)| event.start_date < window_end && event.end_date > window_start)
            .map(|(index, event)| BusyInterval {
                id: format!("local_{}_{}", index, event.id),
                date_key: self.zone.date_of(event.start_date),
                title: event
                    .title
                    .clone()
                    .filter(|title| !title.is_empty())
                    .unwrap_or_else(|| "Event".to_string()),
                start: event.start_date,
                end: event.end_date,
                kind: BusyKind::Class,
                color: Some(
                    event
                        .calendar_color
                        .clone()
                        .unwrap_or_else(|| DEVICE_EVENT_COLOR.to_string()),
                ),
            })
            .collect())
    }
}

/// User-authored busy block, persisted with the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    pub id: String,

    pub title: String,

    #[serde(rename = "dateString")]
    pub date_key: NaiveDate,

    /// Local start time as `HH:MM`
    #[serde(rename = "startTime")]
    pub start_time: String,

    /// Minutes
    pub duration: u32,

    #[serde(rename = "rawStart", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,

    #[serde(rename = "rawEnd", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
}

impl CustomEvent {
    /// Build an event starting at local `time` (`HH:MM`) on `date`
    pub fn new(
        title: &str,
        date: NaiveDate,
        time: &str,
        duration_minutes: u32,
        zone: impl Into<LocalZone>,
    ) -> Result<Self, ScheduleError> {
        let start_time = parse_time_of_day(time)?;
        let start = zone.into().at(date, start_time);
        let end = start + chrono::Duration::minutes(i64::from(duration_minutes));
        let title = title.trim();

        Ok(CustomEvent {
            id: format!("custom_{}", uuid::Uuid::new_v4().simple()),
            title: if title.is_empty() {
                "Workout".to_string()
            } else {
                title.to_string()
            },
            date_key: date,
            start_time: start_time.format("%H:%M").to_string(),
            duration: duration_minutes,
            start,
            end,
        })
    }

    pub fn to_busy_interval(&self) -> BusyInterval {
        BusyInterval {
            id: self.id.clone(),
            date_key: self.date_key,
            title: self.title.clone(),
            start: self.start,
            end: self.end,
            kind: BusyKind::Custom,
            color: Some(CUSTOM_EVENT_COLOR.to_string()),
        }
    }

    /// Display length, e.g. `1h 30m`
    pub fn duration_label(&self) -> String {
        format_duration(self.duration)
    }
}

/// The user's custom events as a busy source
#[derive(Debug, Clone, Default)]
pub struct CustomEventSource {
    events: Vec<CustomEvent>,
}

impl CustomEventSource {
    pub fn new(events: Vec<CustomEvent>) -> Self {
        CustomEventSource { events }
    }
}

impl BusySource for CustomEventSource {
    fn name(&self) -> &str {
        "custom-events"
    }

    fn busy_intervals(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ScheduleError> {
        Ok(self
            .events
            .iter()
            .filter(|event| event.start < window_end && event.end > window_start)
            .map(CustomEvent::to_busy_interval)
            .collect())
    }
}

/// Parse an `HH:MM` (or `H:MM`) local time of day
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ScheduleError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ScheduleError::InvalidTimeOfDay {
        value: value.to_string(),
    })
}

/// Result of one sync pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    pub schedule: Vec<ScheduleItem>,
    pub busy_count: usize,
    pub gap_count: usize,
    pub diagnostics: Vec<ScheduleError>,
}

/// Gather busy time from `sources`, find gaps and merge both into one schedule
///
/// The scan covers the finder's configured number of days starting at `today`.
pub fn sync_schedule(
    sources: &[&dyn BusySource],
    finder: &GapFinder,
    today: NaiveDate,
    zone: impl Into<LocalZone>,
) -> SyncOutcome {
    let zone = zone.into();
    let scan_days = finder.config().scan_days;
    let window_start = zone.midnight(today);
    let window_end = today
        .checked_add_days(Days::new(u64::from(scan_days)))
        .map(|end| zone.midnight(end))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut busy = Vec::new();
    let mut diagnostics = Vec::new();

    for source in sources {
        match source.busy_intervals(window_start, window_end) {
            Ok(intervals) => busy.extend(intervals),
            Err(err) => {
                warn!(source = source.name(), error = %err, "Busy source skipped");
                diagnostics.push(err);
            }
        }
    }

    let report = finder.find_gaps(&busy, today, scan_days);
    diagnostics.extend(report.diagnostics);
    let schedule = build_schedule(&busy, &report.gaps);

    info!(
        %today,
        busy = busy.len(),
        gaps = report.gaps.len(),
        skipped = diagnostics.len(),
        "Schedule synced"
    );

    SyncOutcome {
        busy_count: schedule.len() - report.gaps.len(),
        gap_count: report.gaps.len(),
        schedule,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::GapConfig;
    use chrono::{FixedOffset, TimeZone};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 23).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&day().and_hms_opt(hour, minute, 0).unwrap())
    }

    fn device_event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>, notes: Option<&str>) -> DeviceEvent {
        DeviceEvent {
            id: id.to_string(),
            title: Some(format!("Class {}", id)),
            start_date: start,
            end_date: end,
            notes: notes.map(str::to_string),
            description: None,
            calendar_color: None,
        }
    }

    struct FailingSource;

    impl BusySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn busy_intervals(
            &self,
            _window_start: DateTime<Utc>,
            _window_end: DateTime<Utc>,
        ) -> Result<Vec<BusyInterval>, ScheduleError> {
            Err(ScheduleError::SourceUnavailable {
                source_name: "failing".to_string(),
                reason: "permission denied".to_string(),
            })
        }
    }

    fn one_day_finder() -> GapFinder {
        GapFinder::with_config(
            GapConfig {
                scan_days: 1,
                ..GapConfig::default()
            },
            utc(),
        )
    }

    #[test]
    fn test_custom_event_construction() {
        let event = CustomEvent::new("  ", day(), "9:30", 45, utc()).unwrap();
        assert_eq!(event.title, "Workout");
        assert_eq!(event.start_time, "09:30");
        assert_eq!(event.start, at(9, 30));
        assert_eq!(event.end, at(10, 15));
        assert!(event.id.starts_with("custom_"));
        assert_eq!(event.duration_label(), "45m");

        let busy = event.to_busy_interval();
        assert_eq!(busy.kind, BusyKind::Custom);
        assert_eq!(busy.color.as_deref(), Some(CUSTOM_EVENT_COLOR));
    }

    #[test]
    fn test_custom_event_rejects_bad_time() {
        let err = CustomEvent::new("Run", day(), "25:61", 30, utc()).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::InvalidTimeOfDay {
                value: "25:61".to_string()
            }
        );
    }

    #[test]
    fn test_device_calendar_skips_app_created_events() {
        let calendar = DeviceCalendar::new(
            vec![
                device_event("1", at(10, 0), at(11, 0), None),
                device_event("2", at(12, 0), at(13, 0), Some(APP_EVENT_MARKER)),
            ],
            utc(),
        );
        let intervals = calendar.busy_intervals(at(0, 0), at(23, 59)).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].id, "local_0_1");
        assert_eq!(intervals[0].kind, BusyKind::Class);
        assert_eq!(intervals[0].color.as_deref(), Some(DEVICE_EVENT_COLOR));
    }

    #[test]
    fn test_device_event_ids_independent_of_window() {
        let yesterday = at(10, 0) - chrono::Duration::days(1);
        let calendar = DeviceCalendar::new(
            vec![
                device_event("A", yesterday, yesterday + chrono::Duration::hours(1), None),
                device_event("B", at(10, 0), at(11, 0), None),
            ],
            utc(),
        );

        let today_only = calendar.busy_intervals(at(0, 0), at(23, 59)).unwrap();
        assert_eq!(today_only.len(), 1);
        assert_eq!(today_only[0].id, "local_1_B");

        let both_days = calendar
            .busy_intervals(at(0, 0) - chrono::Duration::days(1), at(23, 59))
            .unwrap();
        assert_eq!(both_days.len(), 2);
        assert_eq!(both_days[1].id, today_only[0].id);
    }

    #[test]
    fn test_sync_merges_sources() {
        let calendar = DeviceCalendar::new(vec![device_event("1", at(10, 0), at(11, 0), None)], utc());
        let custom = CustomEventSource::new(vec![CustomEvent::new("Run", day(), "17:00", 60, utc()).unwrap()]);

        let outcome = sync_schedule(&[&calendar, &custom], &one_day_finder(), day(), utc());

        assert_eq!(outcome.busy_count, 2);
        // 07-10, 11-17, 18-22
        assert_eq!(outcome.gap_count, 3);
        assert_eq!(outcome.schedule.len(), 5);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_sync_survives_failing_source() {
        let custom = CustomEventSource::new(vec![CustomEvent::new("Run", day(), "17:00", 60, utc()).unwrap()]);
        let outcome = sync_schedule(&[&FailingSource, &custom], &one_day_finder(), day(), utc());

        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.busy_count, 1);
        assert_eq!(outcome.gap_count, 2);
    }

    #[test]
    fn test_events_outside_window_ignored() {
        let tomorrow = day().succ_opt().unwrap();
        let custom = CustomEventSource::new(vec![CustomEvent::new("Run", tomorrow, "17:00", 60, utc()).unwrap()]);
        let outcome = sync_schedule(&[&custom], &one_day_finder(), day(), utc());
        assert_eq!(outcome.busy_count, 0);
        assert_eq!(outcome.gap_count, 1);
    }
}
