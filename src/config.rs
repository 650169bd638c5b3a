//! Pipeline configuration management.
//!
//! One explicit structure lists every field and its default. It is loaded
//! from TOML or JSON, validated once by [`PipelineConfig::build_spec`], and
//! turned into the immutable [`PipelineSpec`] shared by every job.
//!
//! # Example
//!
//! ```toml
//! [dataset]
//! name = "hawaii-nrel"
//! timezone = "Pacific/Honolulu"
//! input_dir = "data/formatted"
//! stations = [{ name = "AP1" }, { name = "AP3" }]
//!
//! [features]
//! period = "5min"
//! window = "15min"
//! station_lagged = ["K_ineichen"]
//!
//! [[transforms]]
//! kind = "ratio"
//! numerator = "GHI"
//! denominator = "ineichen_ghi"
//! output = "K_ineichen"
//!
//! [[horizons]]
//! variable = "K_ineichen"
//! stations = ["AP1"]
//! lead = "60min"
//! interval = "+30min"
//!
//! [output]
//! dir = "data/matrices"
//! format = "csv"
//! skip_existing = true
//!
//! [batch]
//! threads = 4
//! ```

use crate::batch::BatchConfig;
use crate::error::{Error, Result};
use crate::export::ExportFormat;
use crate::schema::{
    parse_duration, ColumnGroup, ColumnScope, FeatureSpec, HorizonSpec, PipelineSpec, Station,
};
use crate::transforms::TransformKind;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Unified pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input dataset and stations.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Sampling period, lookback window and feature columns.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Derived columns computed before resampling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformKind>,

    /// Forecast horizons.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<HorizonConfig>,

    /// Output location and format.
    #[serde(default)]
    pub output: OutputConfig,

    /// Parallelism.
    #[serde(default)]
    pub batch: BatchSection,
}

/// Input dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Dataset name (informational).
    pub name: String,

    /// IANA timezone of the index, e.g. `"Pacific/Honolulu"`.
    pub timezone: String,

    /// Directory holding one CSV file per day.
    pub input_dir: PathBuf,

    /// Selected stations.
    pub stations: Vec<Station>,
}

/// Feature definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Sampling period P, e.g. `"5min"`.
    pub period: String,

    /// Lookback window W, an exact multiple of P.
    pub window: String,

    /// Per-station variables that are lag-expanded.
    pub station_lagged: Vec<String>,

    /// Per-station variables copied unshifted.
    pub station_unlagged: Vec<String>,

    /// Global variables that are lag-expanded.
    pub lagged: Vec<String>,

    /// Global variables copied unshifted.
    pub unlagged: Vec<String>,
}

/// One forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonConfig {
    /// Target variable.
    pub variable: String,

    /// Target stations.
    pub stations: Vec<String>,

    /// Lead time, e.g. `"60min"`.
    pub lead: String,

    /// Signed interval: `"-10min"` backward, `"+10min"` forward, `"10min"` plain.
    pub interval: String,

    /// Keep means over windows that run past the day's data.
    #[serde(default)]
    pub allow_partial_windows: bool,
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output root.
    pub dir: PathBuf,

    /// Matrix file format.
    pub format: ExportFormat,

    /// Skip days whose outputs already exist.
    pub skip_existing: bool,
}

/// Batch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Worker count; available parallelism when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_horizons() -> Vec<HorizonConfig> {
    vec![HorizonConfig {
        variable: "GHI".to_string(),
        stations: vec!["AP1".to_string()],
        lead: "60min".to_string(),
        interval: "+30min".to_string(),
        allow_partial_windows: false,
    }]
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            timezone: "UTC".to_string(),
            input_dir: PathBuf::from("data/formatted"),
            stations: vec![Station::named("AP1")],
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            period: "5min".to_string(),
            window: "15min".to_string(),
            station_lagged: vec!["GHI".to_string()],
            station_unlagged: Vec::new(),
            lagged: Vec::new(),
            unlagged: Vec::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/matrices"),
            format: ExportFormat::Csv,
            skip_existing: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            features: FeaturesConfig::default(),
            transforms: Vec::new(),
            horizons: default_horizons(),
            output: OutputConfig::default(),
            batch: BatchSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stations.
    pub fn with_stations(mut self, stations: Vec<Station>) -> Self {
        self.dataset.stations = stations;
        self
    }

    /// Set the timezone.
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.dataset.timezone = tz.into();
        self
    }

    /// Set the feature definition.
    pub fn with_features(mut self, features: FeaturesConfig) -> Self {
        self.features = features;
        self
    }

    /// Set the horizons.
    pub fn with_horizons(mut self, horizons: Vec<HorizonConfig>) -> Self {
        self.horizons = horizons;
        self
    }

    /// Add a transform.
    pub fn with_transform(mut self, transform: TransformKind) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Set the output root.
    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output.dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.batch.threads = Some(threads);
        self
    }

    /// Parsed timezone.
    pub fn timezone(&self) -> Result<Tz> {
        self.dataset.timezone.parse::<Tz>().map_err(|_| {
            Error::config(format!("unknown timezone '{}'", self.dataset.timezone))
        })
    }

    /// Validate everything and build the immutable run specification.
    ///
    /// # Errors
    ///
    /// Configuration error for unparseable durations, a window that is not
    /// a multiple of the period, an unknown timezone, an unrecognized
    /// horizon sign, a horizon on an unknown station, duplicate output
    /// columns, or an empty feature or horizon list.
    pub fn build_spec(&self) -> Result<PipelineSpec> {
        let period = parse_duration(&self.features.period)?;
        let window = parse_duration(&self.features.window)?;

        let groups = [
            (ColumnScope::PerStation, true, &self.features.station_lagged),
            (ColumnScope::Global, true, &self.features.lagged),
            (ColumnScope::PerStation, false, &self.features.station_unlagged),
            (ColumnScope::Global, false, &self.features.unlagged),
        ]
        .into_iter()
        .filter(|(_, _, vars)| !vars.is_empty())
        .map(|(scope, lagged, vars)| ColumnGroup {
            scope,
            lagged,
            variables: vars.clone(),
        })
        .collect();
        let features = FeatureSpec::new(period, window, groups)?;

        let horizons = self
            .horizons
            .iter()
            .map(|h| {
                HorizonSpec::parse(
                    &h.variable,
                    h.stations.clone(),
                    &h.lead,
                    &h.interval,
                    h.allow_partial_windows,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        PipelineSpec::new(
            features,
            horizons,
            self.dataset.stations.clone(),
            self.transforms.clone(),
            self.timezone()?,
        )
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dataset.stations.is_empty() {
            return Err("at least one station is required".to_string());
        }
        if self.output.dir.as_os_str().is_empty() {
            return Err("output.dir must not be empty".to_string());
        }
        self.build_spec().map(|_| ()).map_err(|e| e.to_string())
    }

    /// Batch settings for the runner.
    pub fn batch_config(&self) -> BatchConfig {
        let config = BatchConfig::new().with_skip_existing(self.output.skip_existing);
        match self.batch.threads {
            Some(n) => config.with_threads(n),
            None => config,
        }
    }

    /// Save configuration to TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load configuration from TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Save configuration to JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }

    /// Load configuration from JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::config(format!("JSON: {e}")))?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Load by extension: `.json` as JSON, anything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            _ => Self::load_toml(path),
        }
    }

    /// Save by extension: `.json` as JSON, anything else as TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("json") => self.save_json(path),
            _ => self.save_toml(path),
        }
    }
}
