//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use solarnc_features::prelude::*;
//!
//! let config = PipelineConfig::load("solar.toml")?;
//! let pipeline = Pipeline::new(std::sync::Arc::new(config.build_spec()?));
//! ```

// ============================================================================
// Core Pipeline
// ============================================================================

pub use crate::config::{
    BatchSection, DatasetConfig, FeaturesConfig, HorizonConfig, OutputConfig, PipelineConfig,
};
pub use crate::error::{Error, Result};
pub use crate::pipeline::{DayStats, Pipeline, PipelineOutput};

// ============================================================================
// Schema
// ============================================================================

pub use crate::schema::{
    parse_duration, ColumnGroup, ColumnScope, FeatureSpec, HorizonSign, HorizonSpec,
    PipelineSpec, Station,
};
pub use crate::transforms::TransformKind;

// ============================================================================
// Data
// ============================================================================

pub use crate::source::{CsvDaySource, DaySource, MemorySource};
pub use crate::timeseries::{FeatureMatrix, TargetMatrix, TimeSeries, MISSING};

// ============================================================================
// Stages
// ============================================================================

pub use crate::alignment::{AlignmentStats, RowAligner};
pub use crate::features::{FeatureBuilder, LagExpander};
pub use crate::labeling::HorizonTargetBuilder;
pub use crate::preprocessing::Resampler;

// ============================================================================
// Export
// ============================================================================

pub use crate::export::{DayExportResult, DayExporter, DayMetadata, ExportFormat};

// ============================================================================
// Batch Processing
// ============================================================================

pub use crate::batch::{
    BatchConfig, BatchManifest, BatchProcessor, CancellationToken, ConsoleProgress, Job,
    JobRecord, JobRunner, JobState, ProgressCallback, ProgressInfo,
};
