//! Unified error hierarchy for UFitness
//!
//! The scheduling and statistics core never aborts on bad input; the variants in
//! [`ScheduleError`] and [`HistoryError`] are collected as diagnostics next to the
//! computed result. The remaining variants cover file, configuration and CLI work.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all UFitness operations
#[derive(Debug, Error)]
pub enum UFitnessError {
    /// Calendar / gap computation problems
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// History log problems
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Loading records from files
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Problems with busy intervals and calendar records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Interval does not start strictly before it ends
    #[error("Interval {id} on {date} does not start before it ends ({start} >= {end})")]
    InvalidInterval {
        id: String,
        date: NaiveDate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Time of day string could not be parsed
    #[error("Invalid time of day '{value}': expected HH:MM")]
    InvalidTimeOfDay { value: String },

    /// Custom event not found
    #[error("Custom event not found: {id}")]
    EventNotFound { id: String },

    /// A busy source failed to produce intervals
    #[error("Busy source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
}

/// Problems with history records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// Record timestamp missing or unparseable
    #[error("History record {index} has no usable timestamp")]
    UnusableTimestamp { index: usize },

    /// Numeric payload missing or not a number
    #[error("History record {index} has a non-numeric {field}")]
    NonNumericPayload { index: usize, field: String },
}

/// File import errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// Unsupported file format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Format-specific parsing error
    #[error("Parse error in {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    /// File not found at specified path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },
}

/// Result type alias for UFitness operations
pub type Result<T> = std::result::Result<T, UFitnessError>;

impl UFitnessError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            UFitnessError::Schedule(_) => ErrorSeverity::Warning,
            UFitnessError::History(_) => ErrorSeverity::Warning,
            UFitnessError::Validation(_) => ErrorSeverity::Warning,
            UFitnessError::Import(ImportError::FileNotFound { .. }) => ErrorSeverity::Warning,
            UFitnessError::Configuration(_) => ErrorSeverity::Error,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            UFitnessError::Import(ImportError::FileNotFound { path }) => {
                format!("Could not find data file: {}", path.display())
            }
            UFitnessError::Import(ImportError::UnsupportedFormat { format }) => {
                format!("Files of type '{}' cannot be read. Use JSON or CSV.", format)
            }
            UFitnessError::Schedule(ScheduleError::InvalidInterval { id, .. }) => {
                format!("Calendar entry '{}' has an end time before its start and was skipped.", id)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}
