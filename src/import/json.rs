use std::fs;
use std::path::Path;

use crate::error::{ImportError, Result};
use crate::import::BusyImportFormat;
use crate::models::{BusyInterval, ScheduleItem};

/// JSON importer for busy intervals in the stored record shape
///
/// Accepts a plain array of busy records or a saved schedule; gap items in a
/// schedule are dropped since gaps are always regenerated.
pub struct JsonImporter;

impl JsonImporter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyImportFormat for JsonImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == "json")
            .unwrap_or(false)
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<BusyInterval>> {
        let contents = fs::read_to_string(file_path)?;
        let items: Vec<ScheduleItem> =
            serde_json::from_str(&contents).map_err(|e| ImportError::ParseError {
                path: file_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                ScheduleItem::Busy(busy) => Some(busy),
                ScheduleItem::Gap(_) => None,
            })
            .collect())
    }

    fn get_format_name(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BusyKind;
    use std::io::Write;

    #[test]
    fn test_reads_busy_and_drops_gaps() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r##"[
                {{"id": "local_0_1", "dateString": "2024-09-23", "title": "Lecture",
                  "rawStart": 1727078400000, "rawEnd": 1727082000000, "type": "class", "color": "#555"}},
                {{"id": "gap_2024-09-23_1727082000000", "dateString": "2024-09-23",
                  "title": "Fitness Opportunity", "rawStart": 1727082000000, "rawEnd": 1727085600000,
                  "type": "gap", "durationMinutes": 60, "duration": "1h", "gapQuality": "Gold",
                  "suggestion": "BEST TIME: Full Workout", "color": "#34C759"}}
            ]"##
        )
        .unwrap();

        let importer = JsonImporter::new();
        assert!(importer.can_import(file.path()));
        let intervals = importer.import_file(file.path()).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].kind, BusyKind::Class);
        assert_eq!(intervals[0].duration_minutes(), 60);
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{not json").unwrap();
        let err = JsonImporter::new().import_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Parse error"));
    }
}
