use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::error::{ImportError, Result};
use crate::import::BusyImportFormat;
use crate::models::{BusyInterval, BusyKind};
use crate::sync::parse_time_of_day;
use crate::zone::LocalZone;

/// CSV importer for busy intervals with flexible column names
///
/// Required columns are a date plus start and end. Start/end cells are either a
/// local `HH:MM` on the row's date or a full timestamp.
pub struct CsvImporter {
    column_mapping: HashMap<String, String>,
    zone: LocalZone,
}

impl CsvImporter {
    pub fn new(zone: impl Into<LocalZone>) -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(&mut column_mapping, "id", &["id", "event_id", "uid"]);
        Self::add_mapping(
            &mut column_mapping,
            "date",
            &["date", "day", "datestring", "date_string"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "title",
            &["title", "name", "summary", "event"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "start",
            &["start", "start_time", "starttime", "from", "begin", "rawstart"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "end",
            &["end", "end_time", "endtime", "to", "finish", "rawend"],
        );
        Self::add_mapping(&mut column_mapping, "kind", &["type", "kind", "category"]);
        Self::add_mapping(&mut column_mapping, "color", &["color", "colour"]);

        Self {
            column_mapping,
            zone: zone.into(),
        }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    fn parse_kind(kind: &str) -> BusyKind {
        match kind.trim().to_lowercase().as_str() {
            "workout" | "training" | "gym" => BusyKind::Workout,
            "custom" | "personal" => BusyKind::Custom,
            _ => BusyKind::Class,
        }
    }

    /// A cell holding either `HH:MM` on `date` or a full timestamp
    fn parse_instant(&self, date: NaiveDate, cell: &str) -> Option<DateTime<Utc>> {
        let cell = cell.trim();

        if let Ok(time) = parse_time_of_day(cell) {
            return Some(self.zone.at(date, time));
        }

        if let Ok(instant) = DateTime::parse_from_rfc3339(cell) {
            return Some(instant.with_timezone(&Utc));
        }

        let formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
        for format in &formats {
            if let Ok(naive) = NaiveDateTime::parse_from_str(cell, format) {
                return Some(self.zone.instant_at(naive));
            }
        }

        // epoch milliseconds, as stored in rawStart/rawEnd
        cell.parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl BusyImportFormat for CsvImporter {
    fn can_import(&self, file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase() == "csv")
            .unwrap_or(false)
    }

    fn import_file(&self, file_path: &Path) -> Result<Vec<BusyInterval>> {
        let parse_error = |reason: String| ImportError::ParseError {
            path: file_path.to_path_buf(),
            reason,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(file_path)
            .map_err(|e| parse_error(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| parse_error(e.to_string()))?
            .iter()
            .map(|h| self.normalize_column_name(h))
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let (Some(date_col), Some(start_col), Some(end_col)) =
            (column("date"), column("start"), column("end"))
        else {
            return Err(parse_error("expected date, start and end columns".to_string()).into());
        };
        let id_col = column("id");
        let title_col = column("title");
        let kind_col = column("kind");
        let color_col = column("color");

        let mut intervals = Vec::new();

        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| parse_error(e.to_string()))?;
            let line = row + 2;
            let cell = |index: Option<usize>| index.and_then(|i| record.get(i)).filter(|v| !v.is_empty());

            let Some(date) = cell(Some(date_col))
                .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
            else {
                warn!(line, "Skipping CSV row without a valid date");
                continue;
            };

            let start = cell(Some(start_col)).and_then(|value| self.parse_instant(date, value));
            let end = cell(Some(end_col)).and_then(|value| self.parse_instant(date, value));
            let (Some(start), Some(end)) = (start, end) else {
                warn!(line, %date, "Skipping CSV row with unreadable start or end");
                continue;
            };

            intervals.push(BusyInterval {
                id: cell(id_col)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("csv_{}_{}", date.format("%Y-%m-%d"), line)),
                date_key: date,
                title: cell(title_col).unwrap_or("Event").to_string(),
                start,
                end,
                kind: cell(kind_col).map(Self::parse_kind).unwrap_or(BusyKind::Class),
                color: cell(color_col).map(str::to_string),
            });
        }

        Ok(intervals)
    }

    fn get_format_name(&self) -> &'static str {
        "CSV"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn importer() -> CsvImporter {
        CsvImporter::new(FixedOffset::east_opt(2 * 3600).unwrap())
    }

    #[test]
    fn test_reads_local_times_with_column_variations() {
        let file = csv_file(
            "Date,Name,Start Time,End Time,Type\n\
             2024-09-23,Lecture,09:00,10:00,class\n\
             2024-09-23,Gym,17:30,18:15,workout\n",
        );
        let intervals = importer().import_file(file.path()).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].title, "Lecture");
        assert_eq!(
            intervals[0].start,
            Utc.with_ymd_and_hms(2024, 9, 23, 7, 0, 0).unwrap()
        );
        assert_eq!(intervals[1].kind, BusyKind::Workout);
        assert_eq!(intervals[1].duration_minutes(), 45);
        assert_eq!(intervals[0].id, "csv_2024-09-23_2");
    }

    #[test]
    fn test_accepts_full_timestamps() {
        let file = csv_file(
            "id,date,start,end\n\
             a1,2024-09-23,2024-09-23T08:00:00Z,1727085600000\n",
        );
        let intervals = importer().import_file(file.path()).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].id, "a1");
        assert_eq!(intervals[0].kind, BusyKind::Class);
        assert_eq!(
            intervals[0].end,
            Utc.with_ymd_and_hms(2024, 9, 23, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_skips_bad_rows() {
        let file = csv_file(
            "date,start,end\n\
             not-a-date,09:00,10:00\n\
             2024-09-23,late,10:00\n\
             2024-09-23,11:00,12:00\n",
        );
        let intervals = importer().import_file(file.path()).unwrap();
        assert_eq!(intervals.len(), 1);
    }

    #[test]
    fn test_missing_columns_is_error() {
        let file = csv_file("title,start\nLecture,09:00\n");
        assert!(importer().import_file(file.path()).is_err());
    }
}
