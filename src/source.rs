//! Day file readers.
//!
//! The pipeline only needs "give me the series stored at this path, in this
//! timezone". [`DaySource`] is that seam; [`CsvDaySource`] reads the
//! formatted per-day CSV files and [`MemorySource`] serves in-memory series
//! for tests and benchmarks.
//!
//! # CSV Layout
//!
//! ```text
//! datetime,GHI AP1,csm AP1,GHI AP3,...
//! 2010-03-20 06:00:00,12.1,14.0,11.8,...
//! ```
//!
//! Timestamps without an offset are read as UTC and then shown in the
//! target timezone. Timestamps with an offset (RFC 3339, as written by
//! [`crate::export`]) are taken as-is. Empty cells and `NaN`/`NA` are missing.

use crate::error::{Error, Result};
use crate::timeseries::{EpochMillis, TimeSeries, MISSING};
use ahash::AHashMap;
use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use csv::ReaderBuilder;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default name of the timestamp column.
pub const DEFAULT_TIME_COLUMN: &str = "datetime";

/// Reads one day of observations.
pub trait DaySource: Send + Sync {
    /// Load the series stored at `path`, rendered in `tz`.
    fn read_day(&self, path: &Path, tz: Tz) -> Result<TimeSeries>;

    /// File extension of day files this source understands (no dot).
    fn extension(&self) -> &str;
}

// ============================================================================
// CSV
// ============================================================================

/// CSV day reader with optional column projection.
#[derive(Debug, Clone)]
pub struct CsvDaySource {
    time_column: String,
    delimiter: u8,
    /// Columns to keep; `None` keeps every column.
    columns: Option<Vec<String>>,
}

impl Default for CsvDaySource {
    fn default() -> Self {
        Self {
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            delimiter: b',',
            columns: None,
        }
    }
}

impl CsvDaySource {
    /// Reader for comma-separated files with a `datetime` column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different timestamp column.
    pub fn with_time_column(mut self, name: impl Into<String>) -> Self {
        self.time_column = name.into();
        self
    }

    /// Use a different field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Keep only these columns when present in the file.
    ///
    /// Absent columns are skipped here; the pipeline reports the ones it
    /// actually needs.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    fn wanted(&self, header: &str) -> bool {
        match &self.columns {
            Some(cols) => cols.iter().any(|c| c == header),
            None => true,
        }
    }
}

impl DaySource for CsvDaySource {
    fn read_day(&self, path: &Path, tz: Tz) -> Result<TimeSeries> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .from_path(path)?;
        let headers = reader.headers()?.clone();

        let time_idx = headers
            .iter()
            .position(|h| h == self.time_column)
            .ok_or_else(|| Error::MissingColumn(self.time_column.clone()))?;

        let selected: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|&(i, h)| i != time_idx && self.wanted(h))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut index = Vec::new();
        let mut cells = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            let parse_err = |reason: String| Error::Parse {
                path: path.to_path_buf(),
                row: row + 1,
                reason,
            };

            let raw_ts = record
                .get(time_idx)
                .ok_or_else(|| parse_err("missing timestamp".to_string()))?;
            index.push(parse_timestamp(raw_ts).map_err(parse_err)?);

            for (i, name) in &selected {
                let raw = record.get(*i).unwrap_or("");
                let value = parse_value(raw)
                    .map_err(|_| parse_err(format!("bad value '{raw}' in column '{name}'")))?;
                cells.push(value);
            }
        }

        let n = index.len();
        let values = Array2::from_shape_vec((n, selected.len()), cells)?;
        let columns = selected.into_iter().map(|(_, name)| name).collect();
        let series = TimeSeries::new(index, columns, values, tz).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            row: 0,
            reason: e.to_string(),
        })?;

        log::debug!(
            "Read {} rows x {} columns from {}",
            series.len(),
            series.n_columns(),
            path.display()
        );
        Ok(series)
    }

    fn extension(&self) -> &str {
        "csv"
    }
}

/// Parse a timestamp cell into epoch milliseconds.
///
/// Accepts RFC 3339 (`2010-03-20T06:00:00-10:00`) and naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` or `YYYY-MM-DDTHH:MM:SS[.fff]`, read as UTC.
pub fn parse_timestamp(raw: &str) -> std::result::Result<EpochMillis, String> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.timestamp_millis());
    }
    if let Ok(t) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(t.timestamp_millis());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(t.and_utc().timestamp_millis());
        }
    }
    Err(format!("unrecognized timestamp '{raw}'"))
}

fn parse_value(raw: &str) -> std::result::Result<f64, std::num::ParseFloatError> {
    match raw.trim() {
        "" | "NaN" | "nan" | "NA" | "N/A" | "null" => Ok(MISSING),
        s => s.parse(),
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Serves pre-built series keyed by path.
///
/// Each series is handed out at most once, mirroring "read, process, drop".
#[derive(Debug, Default)]
pub struct MemorySource {
    days: Mutex<AHashMap<PathBuf, TimeSeries>>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a series under `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, series: TimeSeries) -> Result<()> {
        self.days
            .lock()
            .map_err(|_| Error::generic("memory source lock poisoned"))?
            .insert(path.into(), series);
        Ok(())
    }

    /// Number of series not yet read.
    pub fn remaining(&self) -> usize {
        self.days.lock().map(|d| d.len()).unwrap_or(0)
    }
}

impl DaySource for MemorySource {
    fn read_day(&self, path: &Path, tz: Tz) -> Result<TimeSeries> {
        let mut days = self
            .days
            .lock()
            .map_err(|_| Error::generic("memory source lock poisoned"))?;
        days.remove(path)
            .map(|series| series.with_timezone(tz))
            .ok_or_else(|| Error::generic(format!("no series registered for {}", path.display())))
    }

    fn extension(&self) -> &str {
        "mem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_naive_utc() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "20100320.csv",
            "datetime,GHI AP1,GHI AP3\n\
             2010-03-20 16:00:00,1.5,\n\
             2010-03-20 16:01:00,2.5,NaN\n",
        );
        let s = CsvDaySource::new()
            .read_day(&path, chrono_tz::Pacific::Honolulu)
            .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.index()[1] - s.index()[0], 60_000);
        assert_eq!(s.get(1, "GHI AP1"), Some(2.5));
        assert!(s.get(0, "GHI AP3").unwrap().is_nan());
        assert_eq!(
            s.timestamp(0).unwrap().to_rfc3339(),
            "2010-03-20T06:00:00-10:00"
        );
    }

    #[test]
    fn test_projection_skips_absent_columns() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "d.csv",
            "datetime,a,b,c\n2010-03-20T00:00:00+00:00,1,2,3\n",
        );
        let s = CsvDaySource::new()
            .with_columns(vec!["c".to_string(), "a".to_string(), "zzz".to_string()])
            .read_day(&path, Tz::UTC)
            .unwrap();
        assert_eq!(s.columns(), &["a", "c"]);
    }

    #[test]
    fn test_malformed_value() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "d.csv", "datetime,a\n2010-03-20 00:00:00,abc\n");
        let err = CsvDaySource::new().read_day(&path, Tz::UTC).unwrap_err();
        assert!(matches!(err, Error::Parse { row: 1, .. }));
    }

    #[test]
    fn test_missing_time_column() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "d.csv", "time,a\n2010-03-20 00:00:00,1\n");
        let err = CsvDaySource::new().read_day(&path, Tz::UTC).unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "datetime"));
    }

    #[test]
    fn test_unsorted_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "d.csv",
            "datetime,a\n2010-03-20 00:01:00,1\n2010-03-20 00:00:00,2\n",
        );
        assert!(CsvDaySource::new().read_day(&path, Tz::UTC).is_err());
    }

    #[test]
    fn test_unreadable_file() {
        let err = CsvDaySource::new()
            .read_day(Path::new("/nonexistent/day.csv"), Tz::UTC)
            .unwrap_err();
        assert!(!err.is_config());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("1970-01-01 00:00:01"), Ok(1_000));
        assert_eq!(parse_timestamp("1970-01-01T00:00:00.250"), Ok(250));
        assert_eq!(parse_timestamp("1970-01-01T01:00:00+01:00"), Ok(0));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_memory_source_hands_out_once() {
        let src = MemorySource::new();
        let s = TimeSeries::from_columns(vec![0], vec![("a".to_string(), vec![1.0])], Tz::UTC)
            .unwrap();
        src.insert("day1", s).unwrap();
        assert!(src.read_day(Path::new("day1"), Tz::UTC).is_ok());
        assert!(src.read_day(Path::new("day1"), Tz::UTC).is_err());
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn test_memory_source_renders_in_requested_timezone() {
        let src = MemorySource::new();
        let s = TimeSeries::from_columns(vec![0], vec![("a".to_string(), vec![1.0])], Tz::UTC)
            .unwrap();
        src.insert("day1", s).unwrap();
        let day = src
            .read_day(Path::new("day1"), chrono_tz::Pacific::Honolulu)
            .unwrap();
        assert_eq!(day.tz(), chrono_tz::Pacific::Honolulu);
        assert_eq!(day.index(), &[0]);
        assert_eq!(
            day.timestamp(0).unwrap().to_rfc3339(),
            "1969-12-31T14:00:00-10:00"
        );
    }
}
