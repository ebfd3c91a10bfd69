use anyhow::{bail, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::gaps::{GapConfig, GapFinder};
use crate::models::{StatsSnapshot, DEFAULT_HYDRATION_GOAL_ML, DEFAULT_STEP_GOAL, DEFAULT_WEEKLY_GOAL_TARGET};
use crate::state::{AppState, UserDocument};
use crate::stats::{StatsAggregator, StatsConfig};
use crate::units::UnitPreferences;
use crate::zone::LocalZone;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// General application settings
    pub settings: AppSettings,

    /// Gap finder settings
    pub schedule: GapConfig,

    /// Statistics settings
    pub stats: StatsConfig,

    /// Targets given to new profiles
    pub goals: GoalSettings,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Data directory path
    pub data_dir: PathBuf,

    /// User document file name inside the data directory
    pub document_file: String,

    /// Offset of local civil time from UTC, in minutes; used when `timezone` is empty
    pub utc_offset_minutes: i32,

    /// IANA zone name such as `Europe/Berlin`, or `local` for the system zone
    pub timezone: String,

    /// Display units
    pub units: UnitPreferences,
}

/// Fallback targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalSettings {
    pub step_goal: u32,
    pub hydration_goal_ml: u32,
    pub weekly_goal_target: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            metadata: ConfigMetadata::default(),
            settings: AppSettings::default(),
            schedule: GapConfig::default(),
            stats: StatsConfig::default(),
            goals: GoalSettings::default(),
        }
    }
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        let now = Utc::now();

        ConfigMetadata {
            version: "1.0".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            data_dir: PathBuf::from("./data"),
            document_file: "user.json".to_string(),
            utc_offset_minutes: 0,
            timezone: String::new(),
            units: UnitPreferences::default(),
        }
    }
}

impl Default for GoalSettings {
    fn default() -> Self {
        GoalSettings {
            step_goal: DEFAULT_STEP_GOAL,
            hydration_goal_ml: DEFAULT_HYDRATION_GOAL_ML,
            weekly_goal_target: DEFAULT_WEEKLY_GOAL_TARGET,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        debug!(path = %path.as_ref().display(), "Configuration saved");
        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ufitness")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Save configuration to default location
    pub fn save_default(&mut self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to_file(config_path)
    }

    /// Reject values the engines cannot work with
    pub fn validate(&self) -> Result<()> {
        self.local_zone()?;

        let schedule = &self.schedule;
        if schedule.min_gap_minutes == 0 {
            bail!("schedule.min_gap_minutes must be at least 1");
        }
        if schedule.scan_days == 0 {
            bail!("schedule.scan_days must be at least 1");
        }
        if schedule.day_start >= schedule.day_end {
            bail!("schedule.day_start must be before schedule.day_end");
        }
        if schedule.default_window_start >= schedule.default_window_end {
            bail!("schedule.default_window_start must be before schedule.default_window_end");
        }
        if self.stats.hydration_serving_ml == 0 {
            bail!("stats.hydration_serving_ml must be at least 1");
        }
        Ok(())
    }

    /// Local civil time offset
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        let minutes = self.settings.utc_offset_minutes;
        FixedOffset::east_opt(minutes.saturating_mul(60))
            .with_context(|| format!("settings.utc_offset_minutes out of range: {}", minutes))
    }

    /// Zone for local civil dates: the named `timezone`, else the fixed offset
    pub fn local_zone(&self) -> Result<LocalZone> {
        let name = self.settings.timezone.trim();
        if name.is_empty() {
            return Ok(LocalZone::from(self.utc_offset()?));
        }
        name.parse::<LocalZone>()
            .with_context(|| format!("Invalid settings.timezone: {}", name))
    }

    pub fn gap_finder(&self) -> Result<GapFinder> {
        Ok(GapFinder::with_config(self.schedule.clone(), self.local_zone()?))
    }

    pub fn stats_aggregator(&self) -> Result<StatsAggregator> {
        Ok(StatsAggregator::with_config(self.stats.clone(), self.local_zone()?))
    }

    /// Location of the user document
    pub fn document_path(&self) -> PathBuf {
        self.settings.data_dir.join(&self.settings.document_file)
    }

    /// Empty user document carrying the configured targets and units
    pub fn new_document(&self) -> UserDocument {
        let mut document = UserDocument::default();
        document.stats = StatsSnapshot {
            step_goal: self.goals.step_goal,
            hydration_goal_ml: self.goals.hydration_goal_ml,
            weekly_goal_target: self.goals.weekly_goal_target,
            ..StatsSnapshot::default()
        }
        .with_fallback_goals();
        document.preferences.units = self.settings.units;
        document
    }

    /// Application state over `document` with engines built from this configuration
    pub fn app_state(&self, document: UserDocument) -> Result<AppState> {
        Ok(AppState::new(
            document,
            self.stats_aggregator()?,
            self.gap_finder()?,
            self.local_zone()?,
        ))
    }

    /// Every leaf setting as `(dotted.key, value)`, in file order
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let value = toml::Value::try_from(self).context("Failed to serialize configuration")?;
        let mut entries = Vec::new();
        flatten_into("", &value, &mut entries);
        Ok(entries)
    }

    /// Value of a dotted key such as `schedule.min_gap_minutes`
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = toml::Value::try_from(self).context("Failed to serialize configuration")?;
        Ok(key
            .split('.')
            .try_fold(&value, |node, part| node.get(part))
            .map(display_value))
    }

    /// Set a dotted key; the value is read with the type of the current setting
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let mut root = toml::Value::try_from(&*self).context("Failed to serialize configuration")?;

        let (parents, leaf) = match key.rsplit_once('.') {
            Some((parents, leaf)) => (Some(parents), leaf),
            None => (None, key),
        };
        let mut node = &mut root;
        for part in parents.into_iter().flat_map(|p| p.split('.')) {
            node = node
                .get_mut(part)
                .with_context(|| format!("Unknown configuration key: {}", key))?;
        }
        let table = node
            .as_table_mut()
            .with_context(|| format!("Unknown configuration key: {}", key))?;
        let current = table
            .get(leaf)
            .with_context(|| format!("Unknown configuration key: {}", key))?;
        if current.is_table() {
            bail!("{} is a section, not a setting", key);
        }

        let parsed = parse_like(current, raw)
            .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
        table.insert(leaf.to_string(), parsed);

        let updated: AppConfig = root
            .try_into()
            .with_context(|| format!("Invalid value for {}: {}", key, raw))?;
        updated.validate()?;

        *self = updated;
        self.metadata.updated_at = Utc::now();
        Ok(())
    }
}

fn flatten_into(prefix: &str, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, child, out);
            }
        }
        leaf => out.push((prefix.to_string(), display_value(leaf))),
    }
}

fn display_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parse_like(current: &toml::Value, raw: &str) -> Result<toml::Value> {
    let raw = raw.trim();
    Ok(match current {
        toml::Value::Integer(_) => toml::Value::Integer(raw.parse()?),
        toml::Value::Float(_) => toml::Value::Float(raw.parse()?),
        toml::Value::Boolean(_) => toml::Value::Boolean(raw.parse()?),
        toml::Value::Datetime(_) => toml::Value::Datetime(raw.parse()?),
        _ => toml::Value::String(raw.to_string()),
    })
}
