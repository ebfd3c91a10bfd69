// Library interface for UFitness modules
// The binary and the integration tests both build on these

pub mod config;
pub mod error;
pub mod gaps;
pub mod import;
pub mod logging;
pub mod models;
pub mod rollover;
pub mod schedule;
pub mod state;
pub mod stats;
pub mod steps;
pub mod sync;
pub mod units;
pub mod zone;

// Re-export commonly used types for convenience
pub use models::*;
pub use gaps::{find_gaps, quality_tier, GapConfig, GapFinder, GapReport, OverlapPolicy};
pub use stats::{recompute, StatsAggregator, StatsConfig};
pub use rollover::{rollover_if_new_day, Rollover};
pub use schedule::{build_schedule, current_gap, day_summary, DaySummary};
pub use state::{AppState, UserDocument};
pub use steps::{SessionState, StepSession};
pub use sync::{sync_schedule, BusySource, CustomEvent, DeviceEvent, SyncOutcome};
pub use units::{EnergyUnit, HeightUnit, UnitPreferences, VolumeUnit, WeightUnit};
pub use config::AppConfig;
pub use zone::LocalZone;
pub use error::{UFitnessError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat, DiagnosticReport};
