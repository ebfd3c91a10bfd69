//! Aggregate activity statistics derived from the history log
//!
//! Every derived counter of [`StatsSnapshot`] is rebuilt from the complete history
//! on each call; nothing is patched incrementally. The one exception is the best
//! streak, which only ever grows: once old entries leave the history the past
//! streaks can no longer be reconstructed, so the previous value is carried forward.

use crate::error::HistoryError;
use crate::models::{GoalOverrides, HistoryEntry, HistoryKind, StatsSnapshot};
use crate::zone::LocalZone;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Statistics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// First day of the week used for the weekly goal
    pub week_start: Weekday,

    /// Volume logged by one "add water" action, in milliliters
    pub hydration_serving_ml: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            week_start: Weekday::Sun,
            hydration_serving_ml: 250,
        }
    }
}

/// Recompute a snapshot with the default configuration
pub fn recompute(
    history: &[HistoryEntry],
    previous: &StatsSnapshot,
    today: NaiveDate,
    zone: impl Into<LocalZone>,
) -> StatsSnapshot {
    StatsAggregator::new(zone).recompute(history, previous, today)
}

/// Most recent `week_start` day on or before `today`
pub fn week_start_on_or_before(today: NaiveDate, week_start: Weekday) -> NaiveDate {
    let back = (7 + today.weekday().num_days_from_sunday() - week_start.num_days_from_sunday()) % 7;
    today
        .checked_sub_days(Days::new(u64::from(back)))
        .unwrap_or(today)
}

/// Consecutive workout days ending today, or ending yesterday when today has none yet
pub fn current_streak(workout_days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let anchor = if workout_days.contains(&today) {
        Some(today)
    } else {
        today.pred_opt().filter(|yesterday| workout_days.contains(yesterday))
    };

    let Some(mut cursor) = anchor else {
        return 0;
    };

    let mut streak = 1;
    while let Some(previous) = cursor.pred_opt() {
        if !workout_days.contains(&previous) {
            break;
        }
        streak += 1;
        cursor = previous;
    }
    streak
}

/// Statistics aggregation engine
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    config: StatsConfig,
    zone: LocalZone,
}

impl StatsAggregator {
    /// Create an aggregator with default configuration for the given local zone
    pub fn new(zone: impl Into<LocalZone>) -> Self {
        StatsAggregator {
            config: StatsConfig::default(),
            zone: zone.into(),
        }
    }

    /// Create an aggregator with custom configuration
    pub fn with_config(config: StatsConfig, zone: impl Into<LocalZone>) -> Self {
        StatsAggregator {
            config,
            zone: zone.into(),
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Rebuild all derived fields from `history`, keeping the previous targets
    pub fn recompute(
        &self,
        history: &[HistoryEntry],
        previous: &StatsSnapshot,
        today: NaiveDate,
    ) -> StatsSnapshot {
        self.recompute_with_overrides(history, previous, today, GoalOverrides::default())
    }

    /// Rebuild all derived fields, replacing targets the caller supplies
    pub fn recompute_with_overrides(
        &self,
        history: &[HistoryEntry],
        previous: &StatsSnapshot,
        today: NaiveDate,
        overrides: GoalOverrides,
    ) -> StatsSnapshot {
        let week_start = week_start_on_or_before(today, self.config.week_start);
        let week_end = week_start
            .checked_add_days(Days::new(6))
            .unwrap_or(NaiveDate::MAX);

        let mut snapshot = StatsSnapshot {
            streak_days: 0,
            best_streak_days: 0,
            workouts_total: 0,
            workouts_today: 0,
            calories_total: 0,
            calories_today: 0,
            active_minutes_total: 0,
            hydration_today: 0,
            weekly_goal_current: 0,
            steps: previous.steps,
            step_goal: overrides.step_goal.unwrap_or(previous.step_goal),
            hydration_goal_ml: overrides
                .hydration_goal_ml
                .unwrap_or(previous.hydration_goal_ml),
            weekly_goal_target: overrides
                .weekly_goal_target
                .unwrap_or(previous.weekly_goal_target),
        }
        .with_fallback_goals();

        let mut workout_days = BTreeSet::new();
        let mut skipped = 0usize;

        for entry in history {
            let Some(date) = entry.local_date(&self.zone) else {
                skipped += 1;
                continue;
            };

            match &entry.kind {
                HistoryKind::Workout { duration, calories } => {
                    let calories = u64::from(calories.unwrap_or(0));
                    let minutes = u64::from(duration.unwrap_or(0));

                    snapshot.workouts_total = snapshot.workouts_total.saturating_add(1);
                    snapshot.calories_total = snapshot.calories_total.saturating_add(calories);
                    snapshot.active_minutes_total =
                        snapshot.active_minutes_total.saturating_add(minutes);

                    if date == today {
                        snapshot.workouts_today = snapshot.workouts_today.saturating_add(1);
                        snapshot.calories_today = snapshot.calories_today.saturating_add(calories);
                    }
                    if date >= week_start && date <= week_end {
                        snapshot.weekly_goal_current = snapshot.weekly_goal_current.saturating_add(1);
                    }
                    workout_days.insert(date);
                }
                HistoryKind::Hydration { amount } => {
                    if date == today {
                        snapshot.hydration_today = snapshot
                            .hydration_today
                            .saturating_add(u64::from(amount.unwrap_or(0)));
                    }
                }
                HistoryKind::Weight { .. }
                | HistoryKind::Height { .. }
                | HistoryKind::Steps { .. }
                | HistoryKind::Unknown(_) => {}
            }
        }

        snapshot.streak_days = current_streak(&workout_days, today);
        snapshot.best_streak_days = previous.best_streak_days.max(snapshot.streak_days);

        debug!(
            %today,
            entries = history.len(),
            skipped,
            workouts = snapshot.workouts_total,
            streak = snapshot.streak_days,
            "Stats recomputed"
        );

        snapshot
    }

    /// Workout calories per day of the Monday-first week containing `today`
    pub fn weekly_calories(&self, history: &[HistoryEntry], today: NaiveDate) -> [u64; 7] {
        let monday = week_start_on_or_before(today, Weekday::Mon);
        let mut buckets = [0u64; 7];

        for entry in history {
            let HistoryKind::Workout { calories, .. } = &entry.kind else {
                continue;
            };
            let Some(date) = entry.local_date(&self.zone) else {
                continue;
            };
            let offset_days = (date - monday).num_days();
            if (0..7).contains(&offset_days) {
                let slot = &mut buckets[offset_days as usize];
                *slot = slot.saturating_add(u64::from(calories.unwrap_or(0)));
            }
        }

        buckets
    }

    /// List records that contribute nothing, or only partially, to the aggregates
    pub fn audit(&self, history: &[HistoryEntry]) -> Vec<HistoryError> {
        let mut problems = Vec::new();

        for (index, entry) in history.iter().enumerate() {
            if entry.local_date(&self.zone).is_none() {
                problems.push(HistoryError::UnusableTimestamp { index });
                continue;
            }

            let fields: Vec<(&str, bool)> = match &entry.kind {
                HistoryKind::Workout { duration, calories } => {
                    vec![("duration", duration.is_none()), ("calories", calories.is_none())]
                }
                HistoryKind::Hydration { amount } => vec![("amount", amount.is_none())],
                HistoryKind::Weight { value } | HistoryKind::Height { value } => {
                    vec![("value", value.is_none())]
                }
                HistoryKind::Steps { count } => vec![("count", count.is_none())],
                HistoryKind::Unknown(_) => Vec::new(),
            };

            problems.extend(
                fields
                    .into_iter()
                    .filter(|(_, is_missing)| *is_missing)
                    .map(|(field, _)| HistoryError::NonNumericPayload {
                        index,
                        field: field.to_string(),
                    }),
            );
        }

        problems
    }
}
