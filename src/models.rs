use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::trace;

use crate::zone::LocalZone;

/// Fallback daily step target when none has been configured
pub const DEFAULT_STEP_GOAL: u32 = 10_000;

/// Fallback daily hydration target in milliliters
pub const DEFAULT_HYDRATION_GOAL_ML: u32 = 2_500;

/// Fallback weekly workout target
pub const DEFAULT_WEEKLY_GOAL_TARGET: u32 = 5;

/// Source category of an occupied calendar block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyKind {
    /// Imported from the device calendar
    Class,
    /// A scheduled workout
    Workout,
    /// Authored by the user inside the app
    Custom,
}

/// One occupied block of time on a calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusyInterval {
    /// Identifier assigned by the source
    pub id: String,

    /// Local civil date this block belongs to
    #[serde(rename = "dateString")]
    pub date_key: NaiveDate,

    /// Display title
    pub title: String,

    /// Start instant, stored as epoch milliseconds
    #[serde(rename = "rawStart", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,

    /// End instant, stored as epoch milliseconds
    #[serde(rename = "rawEnd", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: BusyKind,

    /// Display hint only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl BusyInterval {
    /// An interval is usable only when it starts strictly before it ends
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Whole minutes covered by the interval (floor), zero when invalid
    pub fn duration_minutes(&self) -> u32 {
        minutes_between(self.start, self.end)
    }
}

/// Free-time quality classification, ordered from least to most valuable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl QualityTier {
    /// Minimum minutes for a Silver window
    pub const SILVER_MINUTES: u32 = 20;
    /// Minimum minutes for a Gold window
    pub const GOLD_MINUTES: u32 = 45;
    /// Minimum minutes for a Diamond window
    pub const DIAMOND_MINUTES: u32 = 120;

    /// Classify a free window by its length
    pub fn from_minutes(minutes: u32) -> Self {
        if minutes >= Self::DIAMOND_MINUTES {
            QualityTier::Diamond
        } else if minutes >= Self::GOLD_MINUTES {
            QualityTier::Gold
        } else if minutes >= Self::SILVER_MINUTES {
            QualityTier::Silver
        } else {
            QualityTier::Bronze
        }
    }

    /// Suggested activity shown alongside the window
    pub fn suggestion(&self) -> &'static str {
        match self {
            QualityTier::Diamond => "FREE DAY: Long Workout",
            QualityTier::Gold => "BEST TIME: Full Workout",
            QualityTier::Silver => "Great for HIIT / Micro",
            QualityTier::Bronze => "Free Time",
        }
    }

    /// Display color for the tier
    pub fn color(&self) -> &'static str {
        match self {
            QualityTier::Diamond => "#0A84FF",
            QualityTier::Gold => "#34C759",
            QualityTier::Silver => "#FF3B30",
            QualityTier::Bronze => "#FFCC00",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Bronze => write!(f, "Bronze"),
            QualityTier::Silver => write!(f, "Silver"),
            QualityTier::Gold => write!(f, "Gold"),
            QualityTier::Diamond => write!(f, "Diamond"),
        }
    }
}

/// Marker serialized as `"type": "gap"` so gaps and busy blocks can share a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GapTag {
    #[default]
    #[serde(rename = "gap")]
    Gap,
}

/// A discovered free-time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    /// Stable identifier derived from the day and start instant
    pub id: String,

    #[serde(rename = "dateString")]
    pub date_key: NaiveDate,

    pub title: String,

    #[serde(rename = "rawStart", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,

    #[serde(rename = "rawEnd", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,

    #[serde(rename = "type", default)]
    pub tag: GapTag,

    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u32,

    /// Human readable length, e.g. `1h 30m`
    pub duration: String,

    #[serde(rename = "gapQuality")]
    pub quality: QualityTier,

    pub suggestion: String,

    pub color: String,
}

impl Gap {
    /// Whether `instant` falls inside the window (start inclusive, end exclusive)
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// One entry of the merged, chronological schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleItem {
    Gap(Gap),
    Busy(BusyInterval),
}

impl ScheduleItem {
    pub fn start(&self) -> DateTime<Utc> {
        match self {
            ScheduleItem::Gap(gap) => gap.start,
            ScheduleItem::Busy(busy) => busy.start,
        }
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self {
            ScheduleItem::Gap(gap) => gap.end,
            ScheduleItem::Busy(busy) => busy.end,
        }
    }

    pub fn date_key(&self) -> NaiveDate {
        match self {
            ScheduleItem::Gap(gap) => gap.date_key,
            ScheduleItem::Busy(busy) => busy.date_key,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ScheduleItem::Gap(gap) => &gap.title,
            ScheduleItem::Busy(busy) => &busy.title,
        }
    }

    pub fn as_gap(&self) -> Option<&Gap> {
        match self {
            ScheduleItem::Gap(gap) => Some(gap),
            ScheduleItem::Busy(_) => None,
        }
    }
}

/// Timestamp of a history record as found in the store
///
/// Records written by older clients carry a full RFC 3339 instant, a bare
/// `YYYY-MM-DD` day (archived step counts), an epoch-millisecond number or an
/// exported timestamp object (`{"seconds", "nanoseconds"}`, optionally with
/// leading underscores). Anything else is retained verbatim so the record
/// round-trips, but it contributes to no aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntryDate {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
    Invalid(Value),
    #[default]
    Missing,
}

impl EntryDate {
    pub fn is_missing(&self) -> bool {
        matches!(self, EntryDate::Missing)
    }

    /// Local civil date of the record, `None` when the timestamp is unusable
    pub fn local_date(&self, zone: &LocalZone) -> Option<NaiveDate> {
        match self {
            EntryDate::Instant(instant) => Some(zone.date_of(*instant)),
            EntryDate::Day(day) => Some(*day),
            EntryDate::Invalid(_) | EntryDate::Missing => None,
        }
    }

    /// Decode a stored date value; never fails
    pub fn from_value(raw: Value) -> Self {
        let decoded = match &raw {
            Value::Null => return EntryDate::Missing,
            Value::String(text) => Self::parse(text),
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().filter(|ms| ms.is_finite()).map(|ms| ms as i64))
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(EntryDate::Instant),
            Value::Object(fields) => Self::from_timestamp_object(fields),
            Value::Bool(_) | Value::Array(_) => None,
        };
        decoded.unwrap_or(EntryDate::Invalid(raw))
    }

    fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(EntryDate::Instant(instant.with_timezone(&Utc)));
        }
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(EntryDate::Instant(Utc.from_utc_datetime(&naive)));
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(EntryDate::Day)
    }

    fn from_timestamp_object(fields: &Map<String, Value>) -> Option<Self> {
        let field = |name: &str| {
            fields
                .get(name)
                .or_else(|| fields.get(&format!("_{}", name)))
        };
        let seconds = field("seconds")?.as_i64()?;
        let nanos = match field("nanoseconds") {
            Some(value) => u32::try_from(value.as_u64()?).ok()?,
            None => 0,
        };
        Utc.timestamp_opt(seconds, nanos).single().map(EntryDate::Instant)
    }
}

impl Serialize for EntryDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EntryDate::Instant(instant) => {
                serializer.serialize_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            EntryDate::Day(day) => serializer.serialize_str(&day.format("%Y-%m-%d").to_string()),
            EntryDate::Invalid(raw) => raw.serialize(serializer),
            EntryDate::Missing => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for EntryDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(EntryDate::from_value(Value::deserialize(deserializer)?))
    }
}

/// Kind-specific payload of a history record
///
/// Numeric payloads are decoded leniently: numbers, numeric strings and floats are
/// accepted, anything else becomes `None` and counts as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HistoryKind {
    Workout {
        /// Minutes of activity
        #[serde(default, deserialize_with = "lenient::u32", skip_serializing_if = "Option::is_none")]
        duration: Option<u32>,
        /// Kilocalories burned
        #[serde(default, deserialize_with = "lenient::u32", skip_serializing_if = "Option::is_none")]
        calories: Option<u32>,
    },
    #[serde(alias = "water")]
    Hydration {
        /// Milliliters consumed
        #[serde(default, deserialize_with = "lenient::u32", skip_serializing_if = "Option::is_none")]
        amount: Option<u32>,
    },
    Weight {
        /// Kilograms
        #[serde(
            default,
            deserialize_with = "lenient::decimal",
            serialize_with = "lenient::serialize_decimal",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Decimal>,
    },
    Height {
        /// Centimeters
        #[serde(
            default,
            deserialize_with = "lenient::decimal",
            serialize_with = "lenient::serialize_decimal",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Decimal>,
    },
    /// Archived final step count of a finished day
    Steps {
        #[serde(default, deserialize_with = "lenient::u64", skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
    },
    /// Record of an unrecognised or missing type, kept as stored (minus `date`)
    #[serde(skip)]
    Unknown(Value),
}

/// Immutable, append-only record of one user action
///
/// Decoding never fails: a record without a usable `type` becomes
/// [`HistoryKind::Unknown`] and is written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub date: EntryDate,
    pub kind: HistoryKind,
}

#[derive(Serialize)]
struct StoredEntry<'a> {
    #[serde(skip_serializing_if = "EntryDate::is_missing")]
    date: &'a EntryDate,

    #[serde(flatten)]
    kind: &'a HistoryKind,
}

impl Serialize for HistoryEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let HistoryKind::Unknown(raw) = &self.kind else {
            return StoredEntry {
                date: &self.date,
                kind: &self.kind,
            }
            .serialize(serializer);
        };

        match raw {
            Value::Object(fields) if !self.date.is_missing() => {
                let mut fields = fields.clone();
                let date = serde_json::to_value(&self.date).map_err(serde::ser::Error::custom)?;
                fields.insert("date".to_string(), date);
                fields.serialize(serializer)
            }
            other => other.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for HistoryEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = Value::deserialize(deserializer)?;
        let date = raw
            .as_object_mut()
            .and_then(|fields| fields.remove("date"))
            .map(EntryDate::from_value)
            .unwrap_or_default();
        let decoded = HistoryKind::deserialize(&raw);
        let kind = match decoded {
            Ok(kind) => kind,
            Err(err) => {
                trace!(error = %err, "Keeping history record of unknown type");
                HistoryKind::Unknown(raw)
            }
        };
        Ok(HistoryEntry { date, kind })
    }
}

impl HistoryEntry {
    pub fn workout(at: DateTime<Utc>, duration_minutes: u32, calories: u32) -> Self {
        HistoryEntry {
            date: EntryDate::Instant(at),
            kind: HistoryKind::Workout {
                duration: Some(duration_minutes),
                calories: Some(calories),
            },
        }
    }

    pub fn hydration(at: DateTime<Utc>, volume_ml: u32) -> Self {
        HistoryEntry {
            date: EntryDate::Instant(at),
            kind: HistoryKind::Hydration {
                amount: Some(volume_ml),
            },
        }
    }

    pub fn weight(at: DateTime<Utc>, kilograms: Decimal) -> Self {
        HistoryEntry {
            date: EntryDate::Instant(at),
            kind: HistoryKind::Weight {
                value: Some(kilograms),
            },
        }
    }

    pub fn height(at: DateTime<Utc>, centimeters: Decimal) -> Self {
        HistoryEntry {
            date: EntryDate::Instant(at),
            kind: HistoryKind::Height {
                value: Some(centimeters),
            },
        }
    }

    /// Archive record for the final step count of `day`
    pub fn steps(day: NaiveDate, count: u64) -> Self {
        HistoryEntry {
            date: EntryDate::Day(day),
            kind: HistoryKind::Steps { count: Some(count) },
        }
    }

    pub fn is_workout(&self) -> bool {
        matches!(self.kind, HistoryKind::Workout { .. })
    }

    pub fn local_date(&self, zone: &LocalZone) -> Option<NaiveDate> {
        self.date.local_date(zone)
    }
}

/// Cached aggregate over the history log plus the user's targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    #[serde(rename = "streak")]
    pub streak_days: u32,

    /// Monotonically non-decreasing; never rebuilt from history
    #[serde(rename = "bestStreak")]
    pub best_streak_days: u32,

    #[serde(rename = "workoutsCompletedTotal")]
    pub workouts_total: u32,

    #[serde(rename = "workoutsCompletedToday")]
    pub workouts_today: u32,

    /// Kilocalories
    #[serde(rename = "caloriesBurnedTotal")]
    pub calories_total: u64,

    /// Kilocalories
    #[serde(rename = "caloriesBurnedToday")]
    pub calories_today: u64,

    /// Lifetime workout minutes
    #[serde(rename = "minutes")]
    pub active_minutes_total: u64,

    /// Milliliters
    #[serde(rename = "hydrationCurrent")]
    pub hydration_today: u64,

    #[serde(rename = "weeklyGoalCurrent")]
    pub weekly_goal_current: u32,

    /// Live step counter for today, owned by the step session
    pub steps: u64,

    #[serde(rename = "stepGoal")]
    pub step_goal: u32,

    /// Milliliters
    #[serde(rename = "hydrationGoal")]
    pub hydration_goal_ml: u32,

    #[serde(rename = "weeklyGoalTarget")]
    pub weekly_goal_target: u32,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        StatsSnapshot {
            streak_days: 0,
            best_streak_days: 0,
            workouts_total: 0,
            workouts_today: 0,
            calories_total: 0,
            calories_today: 0,
            active_minutes_total: 0,
            hydration_today: 0,
            weekly_goal_current: 0,
            steps: 0,
            step_goal: DEFAULT_STEP_GOAL,
            hydration_goal_ml: DEFAULT_HYDRATION_GOAL_ML,
            weekly_goal_target: DEFAULT_WEEKLY_GOAL_TARGET,
        }
    }
}

impl StatsSnapshot {
    /// Replace zeroed targets with the documented fallbacks
    pub fn with_fallback_goals(mut self) -> Self {
        if self.step_goal == 0 {
            self.step_goal = DEFAULT_STEP_GOAL;
        }
        if self.hydration_goal_ml == 0 {
            self.hydration_goal_ml = DEFAULT_HYDRATION_GOAL_ML;
        }
        if self.weekly_goal_target == 0 {
            self.weekly_goal_target = DEFAULT_WEEKLY_GOAL_TARGET;
        }
        self
    }

    pub fn daily_counters(&self) -> DailyCounters {
        DailyCounters {
            steps: self.steps,
            hydration_today: self.hydration_today,
            calories_today: self.calories_today,
            workouts_today: self.workouts_today,
        }
    }

    pub fn apply_daily_counters(&mut self, counters: &DailyCounters) {
        self.steps = counters.steps;
        self.hydration_today = counters.hydration_today;
        self.calories_today = counters.calories_today;
        self.workouts_today = counters.workouts_today;
    }
}

/// Explicit target values supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalOverrides {
    pub step_goal: Option<u32>,
    pub hydration_goal_ml: Option<u32>,
    pub weekly_goal_target: Option<u32>,
}

/// Counters that reset at the start of every local day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounters {
    pub steps: u64,
    pub hydration_today: u64,
    pub calories_today: u64,
    pub workouts_today: u32,
}

/// Whole minutes from `start` to `end`, zero when the span is empty or negative
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let minutes = (end - start).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

/// Render a minute count as `45m`, `2h` or `1h 30m`
pub fn format_duration(minutes: u32) -> String {
    if minutes < 60 {
        return format!("{}m", minutes);
    }
    let hours = minutes / 60;
    let mins = minutes % 60;
    if mins == 0 {
        format!("{}h", hours)
    } else {
        format!("{}h {}m", hours, mins)
    }
}

pub(crate) mod lenient {
    use rust_decimal::prelude::*;
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Signed(i64),
        Float(f64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    fn to_decimal(raw: Option<Raw>) -> Option<Decimal> {
        match raw? {
            Raw::Int(value) => Some(Decimal::from(value)),
            Raw::Signed(value) => Some(Decimal::from(value)),
            Raw::Float(value) => Decimal::from_f64(value),
            Raw::Text(text) => Decimal::from_str(text.trim()).ok(),
            Raw::Other(_) => None,
        }
    }

    pub fn decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
        Ok(to_decimal(Option::<Raw>::deserialize(deserializer)?))
    }

    pub fn u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = to_decimal(Option::<Raw>::deserialize(deserializer)?);
        Ok(value
            .filter(|v| !v.is_sign_negative())
            .and_then(|v| v.trunc().to_u64()))
    }

    pub fn u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let value = to_decimal(Option::<Raw>::deserialize(deserializer)?);
        Ok(value
            .filter(|v| !v.is_sign_negative())
            .and_then(|v| v.trunc().to_u32()))
    }

    pub fn serialize_decimal<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value.and_then(|v| v.to_f64()) {
            Some(number) => serializer.serialize_f64(number),
            None => serializer.serialize_none(),
        }
    }
}
