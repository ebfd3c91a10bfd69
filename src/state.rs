//! Application state and user actions
//!
//! [`AppState`] owns the persisted user document together with the engines that
//! derive data from it, and is handed explicitly to whatever needs it. Every
//! action that touches the history rebuilds the stats snapshot wholesale.

use crate::error::{Result, ScheduleError, UFitnessError};
use crate::gaps::GapFinder;
use crate::models::{
    lenient, GoalOverrides, HistoryEntry, ScheduleItem, StatsSnapshot, DEFAULT_HYDRATION_GOAL_ML,
    DEFAULT_STEP_GOAL,
};
use crate::rollover::{rollover_if_new_day, Rollover};
use crate::stats::StatsAggregator;
use crate::steps::StepSession;
use crate::sync::{sync_schedule, BusySource, CustomEvent, CustomEventSource, DeviceCalendar, DeviceEvent, SyncOutcome};
use crate::units::UnitPreferences;
use crate::zone::LocalZone;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Personal details; body measurements in canonical units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,

    /// Kilograms
    #[serde(
        deserialize_with = "lenient::decimal",
        serialize_with = "lenient::serialize_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub weight: Option<Decimal>,

    /// Centimeters
    #[serde(
        deserialize_with = "lenient::decimal",
        serialize_with = "lenient::serialize_decimal",
        skip_serializing_if = "Option::is_none"
    )]
    pub height: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub units: UnitPreferences,

    /// Re-sync the calendar whenever the app comes to the foreground
    #[serde(rename = "isAutoSyncEnabled")]
    pub auto_sync: bool,
}

/// The user record as stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDocument {
    #[serde(flatten)]
    pub profile: UserProfile,

    pub is_setup_complete: bool,

    pub history: Vec<HistoryEntry>,

    pub custom_events: Vec<CustomEvent>,

    pub schedule: Vec<ScheduleItem>,

    pub stats: StatsSnapshot,

    pub preferences: Preferences,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<NaiveDate>,
}

/// Answers from the first-run setup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupData {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub dob: Option<NaiveDate>,
    pub weight: Option<Decimal>,
    pub height: Option<Decimal>,
    pub step_goal: Option<u32>,
    pub hydration_goal_ml: Option<u32>,
    pub units: UnitPreferences,
    pub auto_sync: bool,
}

/// Explicit application state
#[derive(Debug, Clone)]
pub struct AppState {
    document: UserDocument,
    aggregator: StatsAggregator,
    finder: GapFinder,
    zone: LocalZone,
    step_session: StepSession,
    /// Last device-calendar snapshot, kept so custom-event edits can rebuild the schedule
    device_events: Vec<DeviceEvent>,
}

impl AppState {
    pub fn new(
        document: UserDocument,
        aggregator: StatsAggregator,
        finder: GapFinder,
        zone: impl Into<LocalZone>,
    ) -> Self {
        let mut step_session = StepSession::new();
        step_session.seed(document.stats.steps);
        AppState {
            document,
            aggregator,
            finder,
            zone: zone.into(),
            step_session,
            device_events: Vec::new(),
        }
    }

    /// State with default engines for the given local zone
    pub fn with_zone(document: UserDocument, zone: impl Into<LocalZone>) -> Self {
        let zone = zone.into();
        Self::new(document, StatsAggregator::new(zone), GapFinder::new(zone), zone)
    }

    pub fn document(&self) -> &UserDocument {
        &self.document
    }

    pub fn into_document(self) -> UserDocument {
        self.document
    }

    pub fn stats(&self) -> &StatsSnapshot {
        &self.document.stats
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.document.history
    }

    pub fn schedule(&self) -> &[ScheduleItem] {
        &self.document.schedule
    }

    pub fn custom_events(&self) -> &[CustomEvent] {
        &self.document.custom_events
    }

    pub fn step_session(&self) -> &StepSession {
        &self.step_session
    }

    pub fn zone(&self) -> LocalZone {
        self.zone
    }

    /// Local civil date of `now`
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.zone.date_of(now)
    }

    /// Rebuild the snapshot from the full history
    pub fn refresh_stats(&mut self, today: NaiveDate) -> &StatsSnapshot {
        self.document.stats = self
            .aggregator
            .recompute(&self.document.history, &self.document.stats, today);
        &self.document.stats
    }

    pub fn complete_workout(
        &mut self,
        duration_minutes: u32,
        calories: u32,
        now: DateTime<Utc>,
    ) -> &StatsSnapshot {
        self.document
            .history
            .push(HistoryEntry::workout(now, duration_minutes, calories));
        info!(duration_minutes, calories, "Workout completed");
        self.refresh_stats(self.today(now))
    }

    /// Log one serving of water
    pub fn add_water(&mut self, now: DateTime<Utc>) -> &StatsSnapshot {
        let serving = self.aggregator.config().hydration_serving_ml;
        self.document.history.push(HistoryEntry::hydration(now, serving));
        debug!(serving, "Water logged");
        self.refresh_stats(self.today(now))
    }

    /// Record new body measurements (kilograms, centimeters)
    pub fn update_body_stats(
        &mut self,
        weight_kg: Option<Decimal>,
        height_cm: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for (label, value) in [("weight", weight_kg), ("height", height_cm)] {
            if value.is_some_and(|v| v <= Decimal::ZERO) {
                return Err(UFitnessError::Validation(format!("{} must be positive", label)));
            }
        }

        if let Some(kg) = weight_kg {
            self.document.profile.weight = Some(kg);
            self.document.history.push(HistoryEntry::weight(now, kg));
        }
        if let Some(cm) = height_cm {
            self.document.profile.height = Some(cm);
            self.document.history.push(HistoryEntry::height(now, cm));
        }
        self.refresh_stats(self.today(now));
        Ok(())
    }

    /// Store the first-run answers and mark setup as done
    pub fn complete_setup(&mut self, setup: SetupData, now: DateTime<Utc>) -> Result<()> {
        self.update_body_stats(setup.weight, setup.height, now)?;
        self.document.profile.name = setup.name;
        self.document.profile.age = setup.age;
        self.document.profile.dob = setup.dob;
        self.document.preferences = Preferences {
            units: setup.units,
            auto_sync: setup.auto_sync,
        };

        let overrides = GoalOverrides {
            step_goal: Some(setup.step_goal.filter(|g| *g > 0).unwrap_or(DEFAULT_STEP_GOAL)),
            hydration_goal_ml: Some(
                setup
                    .hydration_goal_ml
                    .filter(|g| *g > 0)
                    .unwrap_or(DEFAULT_HYDRATION_GOAL_ML),
            ),
            weekly_goal_target: None,
        };
        self.apply_overrides(overrides, self.today(now));
        self.document.is_setup_complete = true;
        info!("Setup completed");
        Ok(())
    }

    /// Change daily targets; `None` or zero keeps the current value
    pub fn update_daily_goals(
        &mut self,
        step_goal: Option<u32>,
        hydration_goal_ml: Option<u32>,
        now: DateTime<Utc>,
    ) -> &StatsSnapshot {
        let overrides = GoalOverrides {
            step_goal: step_goal.filter(|g| *g > 0),
            hydration_goal_ml: hydration_goal_ml.filter(|g| *g > 0),
            weekly_goal_target: None,
        };
        self.apply_overrides(overrides, self.today(now));
        &self.document.stats
    }

    fn apply_overrides(&mut self, overrides: GoalOverrides, today: NaiveDate) {
        self.document.stats = self.aggregator.recompute_with_overrides(
            &self.document.history,
            &self.document.stats,
            today,
            overrides,
        );
    }

    /// Add a busy block at local `time` (`HH:MM`) on `date` and rebuild the schedule
    pub fn add_custom_event(
        &mut self,
        title: &str,
        date: NaiveDate,
        time: &str,
        duration_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<&CustomEvent> {
        if duration_minutes == 0 {
            return Err(UFitnessError::Validation(
                "duration must be at least one minute".to_string(),
            ));
        }
        let event = CustomEvent::new(title, date, time, duration_minutes, self.zone)?;
        info!(id = %event.id, %date, time, duration_minutes, "Custom event added");
        self.document.custom_events.push(event);
        self.rebuild_schedule(self.today(now));

        let index = self.document.custom_events.len() - 1;
        Ok(&self.document.custom_events[index])
    }

    pub fn delete_custom_event(&mut self, id: &str, now: DateTime<Utc>) -> Result<CustomEvent> {
        let position = self
            .document
            .custom_events
            .iter()
            .position(|event| event.id == id)
            .ok_or_else(|| ScheduleError::EventNotFound { id: id.to_string() })?;
        let removed = self.document.custom_events.remove(position);
        info!(id, "Custom event deleted");
        self.rebuild_schedule(self.today(now));
        Ok(removed)
    }

    /// Full-history reset: clears the log, custom events and every derived counter
    /// including the best streak. Targets are kept.
    pub fn reset_progress(&mut self, now: DateTime<Utc>) {
        let stats = &self.document.stats;
        self.document.stats = StatsSnapshot {
            step_goal: stats.step_goal,
            hydration_goal_ml: stats.hydration_goal_ml,
            weekly_goal_target: stats.weekly_goal_target,
            ..StatsSnapshot::default()
        };
        self.document.history.clear();
        self.document.custom_events.clear();
        self.step_session.reset();
        self.rebuild_schedule(self.today(now));
        info!("Progress reset");
    }

    /// App came to the foreground: roll the day over if needed, then recompute
    pub fn on_foreground(&mut self, now: DateTime<Utc>) -> Rollover {
        let today = self.today(now);
        if self.step_session.commit().is_some() {
            self.document.stats.steps = self.step_session.total();
        }

        let rollover = rollover_if_new_day(
            self.document.last_active_date,
            today,
            self.document.stats.daily_counters(),
        );
        self.document
            .history
            .extend(rollover.archive_entries.iter().cloned());
        self.document.stats.apply_daily_counters(&rollover.reset_counters);
        self.document.last_active_date = Some(rollover.last_active_date);

        if rollover.rolled_over {
            self.step_session.reset();
        }
        self.refresh_stats(today);
        rollover
    }

    /// Replace the device-calendar snapshot and regenerate the whole schedule
    pub fn sync_schedule(&mut self, device_events: Vec<DeviceEvent>, now: DateTime<Utc>) -> SyncOutcome {
        self.device_events = device_events;
        self.rebuild_schedule(self.today(now))
    }

    fn rebuild_schedule(&mut self, today: NaiveDate) -> SyncOutcome {
        let calendar = DeviceCalendar::new(self.device_events.clone(), self.zone);
        let custom = CustomEventSource::new(self.document.custom_events.clone());
        let sources: [&dyn BusySource; 2] = [&calendar, &custom];

        let outcome = sync_schedule(&sources, &self.finder, today, self.zone);
        self.document.schedule = outcome.schedule.clone();
        outcome
    }

    pub fn start_step_tracking(&mut self) {
        self.step_session.start(self.document.stats.steps);
    }

    /// Feed a pedometer reading; updates the live step count
    pub fn record_step_reading(&mut self, reading: u64) -> Option<u64> {
        let total = self.step_session.observe(reading)?;
        self.document.stats.steps = total;
        Some(total)
    }

    /// Persist live steps; returns the committed total when anything changed
    pub fn commit_steps(&mut self) -> Option<u64> {
        let total = self.step_session.commit()?;
        self.document.stats.steps = total;
        Some(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryKind;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal_macros::dec;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, day, hour, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn state() -> AppState {
        AppState::with_zone(UserDocument::default(), utc())
    }

    #[test]
    fn test_workout_and_water_recompute_stats() {
        let mut app = state();
        app.complete_workout(30, 250, at(23, 8));
        app.add_water(at(23, 9));
        let stats = app.add_water(at(23, 10)).clone();

        assert_eq!(stats.workouts_total, 1);
        assert_eq!(stats.calories_today, 250);
        assert_eq!(stats.active_minutes_total, 30);
        assert_eq!(stats.hydration_today, 500);
        assert_eq!(stats.streak_days, 1);
        assert_eq!(app.history().len(), 3);
    }

    #[test]
    fn test_body_stats_validation() {
        let mut app = state();
        assert!(app.update_body_stats(Some(dec!(-1)), None, at(23, 8)).is_err());
        assert!(app.history().is_empty());

        app.update_body_stats(Some(dec!(72.5)), Some(dec!(180)), at(23, 8))
            .unwrap();
        assert_eq!(app.document().profile.weight, Some(dec!(72.5)));
        assert_eq!(app.history().len(), 2);
        assert!(matches!(app.history()[0].kind, HistoryKind::Weight { .. }));
    }

    #[test]
    fn test_complete_setup_applies_goal_fallbacks() {
        let mut app = state();
        app.complete_setup(
            SetupData {
                name: Some("Sam".to_string()),
                weight: Some(dec!(70)),
                step_goal: Some(8_000),
                hydration_goal_ml: Some(0),
                ..SetupData::default()
            },
            at(23, 8),
        )
        .unwrap();

        assert!(app.document().is_setup_complete);
        assert_eq!(app.stats().step_goal, 8_000);
        assert_eq!(app.stats().hydration_goal_ml, 2_500);
        assert_eq!(app.history().len(), 1);
    }

    #[test]
    fn test_update_daily_goals_ignores_zero() {
        let mut app = state();
        app.update_daily_goals(Some(12_000), None, at(23, 8));
        let stats = app.update_daily_goals(Some(0), Some(3_000), at(23, 8));
        assert_eq!(stats.step_goal, 12_000);
        assert_eq!(stats.hydration_goal_ml, 3_000);
    }

    #[test]
    fn test_custom_events_rebuild_schedule() {
        let mut app = state();
        let id = app
            .add_custom_event("Run", date(23), "17:00", 60, at(23, 8))
            .unwrap()
            .id
            .clone();
        let busy = app
            .schedule()
            .iter()
            .filter(|item| matches!(item, ScheduleItem::Busy(_)))
            .count();
        assert_eq!(busy, 1);

        let removed = app.delete_custom_event(&id, at(23, 8)).unwrap();
        assert_eq!(removed.title, "Run");
        assert!(app.custom_events().is_empty());
        assert!(app
            .schedule()
            .iter()
            .all(|item| matches!(item, ScheduleItem::Gap(_))));

        let err = app.delete_custom_event(&id, at(23, 8)).unwrap_err();
        assert!(matches!(
            err,
            UFitnessError::Schedule(ScheduleError::EventNotFound { .. })
        ));
    }

    #[test]
    fn test_zero_duration_event_rejected() {
        let mut app = state();
        assert!(app.add_custom_event("Run", date(23), "17:00", 0, at(23, 8)).is_err());
        assert!(app.custom_events().is_empty());
    }

    #[test]
    fn test_reset_progress_clears_best_streak_but_keeps_goals() {
        let mut app = state();
        app.update_daily_goals(Some(9_000), None, at(23, 8));
        app.complete_workout(30, 200, at(22, 8));
        app.complete_workout(30, 200, at(23, 8));
        app.add_custom_event("Run", date(23), "17:00", 60, at(23, 8))
            .unwrap();
        assert_eq!(app.stats().best_streak_days, 2);

        app.reset_progress(at(23, 9));
        assert_eq!(app.stats().best_streak_days, 0);
        assert_eq!(app.stats().calories_total, 0);
        assert_eq!(app.stats().step_goal, 9_000);
        assert!(app.history().is_empty());
        assert!(app.custom_events().is_empty());
    }

    #[test]
    fn test_foreground_rolls_over_once() {
        let mut app = state();
        app.on_foreground(at(22, 8));
        app.start_step_tracking();
        app.record_step_reading(4_200);
        app.add_water(at(22, 9));

        let first = app.on_foreground(at(23, 7));
        assert!(first.rolled_over);
        assert_eq!(first.archive_entries.len(), 1);
        assert_eq!(app.stats().steps, 0);
        assert_eq!(app.stats().hydration_today, 0);

        let second = app.on_foreground(at(23, 12));
        assert!(!second.rolled_over);
        assert!(second.archive_entries.is_empty());
        assert_eq!(app.document().last_active_date, Some(date(23)));
    }

    #[test]
    fn test_step_readings_update_live_count() {
        let mut app = state();
        app.start_step_tracking();
        assert_eq!(app.record_step_reading(300), Some(300));
        assert_eq!(app.commit_steps(), Some(300));
        assert_eq!(app.record_step_reading(450), Some(450));
        assert_eq!(app.stats().steps, 450);
    }

    #[test]
    fn test_document_roundtrip_uses_store_names() {
        let mut app = state();
        app.complete_workout(45, 300, at(23, 8));
        app.on_foreground(at(23, 9));
        let json = serde_json::to_value(app.document()).unwrap();

        assert!(json.get("customEvents").is_some());
        assert!(json.get("isSetupComplete").is_some());
        assert_eq!(json["lastActiveDate"], "2024-09-23");
        assert_eq!(json["stats"]["caloriesBurnedTotal"], 300);

        let parsed: UserDocument = serde_json::from_value(json).unwrap();
        assert_eq!(&parsed, app.document());
    }
}
