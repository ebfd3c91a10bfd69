//! Loading and saving records from files
//!
//! Busy intervals can come from JSON (the stored record shape) or CSV. History,
//! device-calendar snapshots and whole user documents are JSON.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::models::{BusyInterval, HistoryEntry};
use crate::state::UserDocument;
use crate::sync::{CustomEvent, DeviceEvent};
use crate::zone::LocalZone;

pub mod csv;
pub mod json;

/// Trait for reading busy intervals from different file formats
pub trait BusyImportFormat {
    /// Check if this importer can handle the given file
    fn can_import(&self, file_path: &Path) -> bool;

    /// Read busy intervals from the file
    fn import_file(&self, file_path: &Path) -> Result<Vec<BusyInterval>>;

    /// Get the format name for this importer
    fn get_format_name(&self) -> &'static str;
}

/// Picks the importer matching a file's extension
pub struct ImportManager {
    importers: Vec<Box<dyn BusyImportFormat>>,
}

impl ImportManager {
    /// Create a manager with all available importers; CSV times are local to `zone`
    pub fn new(zone: impl Into<LocalZone>) -> Self {
        let importers: Vec<Box<dyn BusyImportFormat>> = vec![
            Box::new(json::JsonImporter::new()),
            Box::new(csv::CsvImporter::new(zone)),
        ];

        Self { importers }
    }

    /// Import busy intervals from a single file, detecting the format
    pub fn import_busy(&self, file_path: &Path) -> Result<Vec<BusyInterval>> {
        ensure_exists(file_path)?;

        let importer = self
            .importers
            .iter()
            .find(|importer| importer.can_import(file_path))
            .ok_or_else(|| ImportError::UnsupportedFormat {
                format: file_path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "(none)".to_string()),
            })?;

        let intervals = importer.import_file(file_path)?;
        info!(
            path = %file_path.display(),
            format = importer.get_format_name(),
            count = intervals.len(),
            "Busy intervals imported"
        );
        Ok(intervals)
    }

    /// Import and concatenate busy intervals from several files
    pub fn import_all(&self, paths: &[PathBuf]) -> Result<Vec<BusyInterval>> {
        let mut all = Vec::new();
        for path in paths {
            all.extend(self.import_busy(path)?);
        }
        Ok(all)
    }
}

/// History file: a bare array of entries or a whole user document
pub fn load_history(path: &Path) -> Result<Vec<HistoryEntry>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HistoryFile {
        Entries(Vec<HistoryEntry>),
        Document(Box<UserDocument>),
    }

    let history = match read_json::<HistoryFile>(path)? {
        HistoryFile::Entries(entries) => entries,
        HistoryFile::Document(document) => document.history,
    };
    debug!(path = %path.display(), entries = history.len(), "History loaded");
    Ok(history)
}

pub fn load_device_events(path: &Path) -> Result<Vec<DeviceEvent>> {
    read_json(path)
}

pub fn load_custom_events(path: &Path) -> Result<Vec<CustomEvent>> {
    read_json(path)
}

pub fn load_document(path: &Path) -> Result<UserDocument> {
    read_json(path)
}

/// Write a user document as pretty JSON
pub fn save_document(path: &Path, document: &UserDocument) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(document)?)?;
    debug!(path = %path.display(), "User document saved");
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ImportError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    ensure_exists(path)?;
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        ImportError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}
