//! Data Export Module
//!
//! Persists one day's aligned matrices under the output root.
//!
//! # Files
//!
//! For day `20100320` and format `csv`:
//!
//! | File | Contents |
//! |------|----------|
//! | `20100320_features.csv` | `datetime` column + feature columns |
//! | `20100320_targets.csv` | `datetime` column + target columns |
//! | `20100320_metadata.json` | Column names, row counts, stage stats |
//!
//! With format `npy` the matrices are written as `[rows × columns]` `f64`
//! arrays and the shared index as `{day}_index.npy` (`i64` epoch
//! milliseconds); column names live in the metadata file.
//!
//! Every path depends only on the day identifier, so concurrent jobs for
//! different days never touch the same file. A day with no aligned rows is
//! still written, as header-only CSV or `[0 × columns]` arrays.

use crate::error::{Error, Result};
use crate::pipeline::{DayStats, PipelineOutput};
use crate::timeseries::TimeSeries;
use ndarray::Array1;
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Header of the timestamp column in CSV output.
pub const INDEX_COLUMN: &str = "datetime";

/// On-disk matrix format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated text with an RFC 3339 `datetime` column.
    #[default]
    Csv,
    /// NumPy `.npy` arrays.
    Npy,
}

impl ExportFormat {
    /// File extension (no dot).
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Npy => "npy",
        }
    }
}

/// Metadata written next to each day's matrices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayMetadata {
    /// Day identifier.
    pub day: String,

    /// Aligned rows.
    pub n_rows: usize,

    /// Feature column names, in matrix order.
    pub feature_columns: Vec<String>,

    /// Target column names, in matrix order.
    pub target_columns: Vec<String>,

    /// Matrix format.
    pub format: ExportFormat,

    /// Timezone of the rendered timestamps.
    pub timezone: String,

    /// First aligned timestamp (RFC 3339), if any.
    pub first_timestamp: Option<String>,

    /// Last aligned timestamp (RFC 3339), if any.
    pub last_timestamp: Option<String>,

    /// Row accounting per stage.
    pub stats: DayStats,

    /// Export timestamp.
    pub export_timestamp: String,
}

/// Paths and counts of one exported day.
#[derive(Debug, Clone)]
pub struct DayExportResult {
    pub day: String,
    pub n_rows: usize,
    pub features_path: PathBuf,
    pub targets_path: PathBuf,
    pub metadata_path: PathBuf,
}

/// Writes day outputs under one root directory.
#[derive(Debug, Clone)]
pub struct DayExporter {
    output_dir: PathBuf,
    format: ExportFormat,
}

impl DayExporter {
    /// Exporter writing `format` files under `output_dir`.
    pub fn new<P: AsRef<Path>>(output_dir: P, format: ExportFormat) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            format,
        }
    }

    /// Output root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Matrix format.
    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// `{day}_features.{ext}`
    pub fn features_path(&self, day: &str) -> PathBuf {
        self.role_path(day, "features")
    }

    /// `{day}_targets.{ext}`
    pub fn targets_path(&self, day: &str) -> PathBuf {
        self.role_path(day, "targets")
    }

    /// `{day}_metadata.json`
    pub fn metadata_path(&self, day: &str) -> PathBuf {
        self.output_dir.join(format!("{day}_metadata.json"))
    }

    fn index_path(&self, day: &str) -> PathBuf {
        self.output_dir.join(format!("{day}_index.npy"))
    }

    fn role_path(&self, day: &str, role: &str) -> PathBuf {
        self.output_dir
            .join(format!("{day}_{role}.{}", self.format.extension()))
    }

    /// Whether both matrices of `day` are already on disk.
    pub fn outputs_exist(&self, day: &str) -> bool {
        self.features_path(day).is_file() && self.targets_path(day).is_file()
    }

    /// Write the matrices and metadata of one day.
    pub fn export_day(&self, day: &str, output: &PipelineOutput) -> Result<DayExportResult> {
        if output.features.index() != output.targets.index() {
            return Err(Error::Export(format!(
                "day {day}: feature and target rows differ"
            )));
        }
        fs::create_dir_all(&self.output_dir)?;

        let features_path = self.features_path(day);
        let targets_path = self.targets_path(day);
        match self.format {
            ExportFormat::Csv => {
                write_csv(&output.features, &features_path)?;
                write_csv(&output.targets, &targets_path)?;
            }
            ExportFormat::Npy => {
                write_npy(&output.features, &features_path)?;
                write_npy(&output.targets, &targets_path)?;
                let index = Array1::from(output.features.index().to_vec());
                index.write_npy(BufWriter::new(File::create(self.index_path(day))?))?;
            }
        }

        let last_row = output.features.len().checked_sub(1);
        let metadata = DayMetadata {
            day: day.to_string(),
            n_rows: output.rows(),
            feature_columns: output.features.columns().to_vec(),
            target_columns: output.targets.columns().to_vec(),
            format: self.format,
            timezone: output.features.tz().name().to_string(),
            first_timestamp: output.features.timestamp(0).map(|t| t.to_rfc3339()),
            last_timestamp: last_row
                .and_then(|i| output.features.timestamp(i))
                .map(|t| t.to_rfc3339()),
            stats: output.stats,
            export_timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let metadata_path = self.metadata_path(day);
        serde_json::to_writer_pretty(BufWriter::new(File::create(&metadata_path)?), &metadata)?;

        log::debug!(
            "Exported day {day}: {} rows to {}",
            output.rows(),
            self.output_dir.display()
        );

        Ok(DayExportResult {
            day: day.to_string(),
            n_rows: output.rows(),
            features_path,
            targets_path,
            metadata_path,
        })
    }
}

fn write_csv(series: &TimeSeries, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(series.n_columns() + 1);
    header.push(INDEX_COLUMN.to_string());
    header.extend(series.columns().iter().cloned());
    writer.write_record(&header)?;

    for (i, row) in series.values().rows().into_iter().enumerate() {
        let ts = series
            .timestamp(i)
            .ok_or_else(|| Error::Export(format!("row {i} has no valid timestamp")))?;
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(ts.to_rfc3339());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_npy(series: &TimeSeries, path: &Path) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    series.values().write_npy(file)?;
    Ok(())
}

/// Read back the metadata of an exported day.
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<DayMetadata> {
    let file = File::open(path.as_ref())?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| Error::Export(format!("{}: {e}", path.as_ref().display())))
}
