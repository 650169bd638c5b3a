//! Solar Nowcasting Feature Matrices
//!
//! Builds supervised-learning matrices for irradiance nowcasting from daily
//! multi-station time series.
//!
//! # Overview
//!
//! For every day file the pipeline produces a feature matrix `X` (lagged
//! station measurements at sampling period `P`) and a target matrix `Y`
//! (mean of a variable over an interval placed a lead time ahead), restricted
//! to the rows where both are complete. Days are independent and are
//! processed in parallel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Matrix Builder                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  config/        - TOML/JSON configuration, validation           │
//! │  schema/        - Typed run spec, column naming, horizons       │
//! │  source/        - Day file readers                              │
//! │  transforms/    - Derived columns (ratios, differences)         │
//! │  preprocessing/ - Resampling to the period P                    │
//! │  features/      - Lag expansion                                 │
//! │  labeling/      - Horizon interval-mean targets                 │
//! │  alignment/     - Common complete rows                          │
//! │  export/        - CSV / NumPy output per day                    │
//! │  batch/         - Parallel job runner and manifest              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use solarnc_features::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::load("solar.toml")?;
//! let spec = Arc::new(config.build_spec()?);
//! let pipeline = Pipeline::new(spec);
//!
//! let output = pipeline.process_file(&CsvDaySource::new(), "data/20100320.csv".as_ref())?;
//! println!("{} rows", output.rows());
//! ```

pub mod alignment;
pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod labeling;
pub mod pipeline;
pub mod prelude;
pub mod preprocessing;
pub mod schema;
pub mod source;
pub mod timeseries;
pub mod transforms;

// Re-exports - Core
pub use error::{Error, Result};
pub use timeseries::{FeatureMatrix, TargetMatrix, TimeSeries, MISSING};

// Re-exports - Schema and config
pub use config::PipelineConfig;
pub use schema::{FeatureSpec, HorizonSign, HorizonSpec, PipelineSpec, Station};
pub use transforms::TransformKind;

// Re-exports - Stages
pub use alignment::RowAligner;
pub use features::{FeatureBuilder, LagExpander};
pub use labeling::HorizonTargetBuilder;
pub use preprocessing::Resampler;

// Re-exports - Pipeline and I/O
pub use export::{DayExporter, ExportFormat};
pub use pipeline::{Pipeline, PipelineOutput};
pub use source::{CsvDaySource, DaySource};

// Re-exports - Batch
pub use batch::{BatchConfig, BatchManifest, BatchProcessor, JobRunner, JobState};
