//! Per-day pipeline: raw series in, aligned matrices out.
//!
//! # Architecture
//!
//! ```text
//! raw day ─► transforms ─► select source columns ─► Resampler (P)
//!                                                       │
//!                                   ┌───────────────────┴───────────────┐
//!                                   ▼                                   ▼
//!                            FeatureBuilder                   HorizonTargetBuilder
//!                          (lags + unlagged)                  (interval means)
//!                                   └───────────────┬───────────────────┘
//!                                                   ▼
//!                                              RowAligner
//!                                                   ▼
//!                                 (FeatureMatrix, TargetMatrix, stats)
//! ```
//!
//! A [`Pipeline`] holds no mutable state. One instance is shared (`Arc`) by
//! every worker of a batch and each call to [`Pipeline::process`] owns its
//! series from start to finish.
//!
//! # Output Structure
//!
//! | Field | Type | Description |
//! |-------|------|-------------|
//! | `features` | `FeatureMatrix` | Aligned features, no missing values |
//! | `targets` | `TargetMatrix` | Aligned targets, same index |
//! | `stats` | `DayStats` | Row accounting per stage |

use crate::alignment::{AlignmentStats, RowAligner};
use crate::error::Result;
use crate::features::FeatureBuilder;
use crate::labeling::HorizonTargetBuilder;
use crate::preprocessing::Resampler;
use crate::schema::PipelineSpec;
use crate::source::DaySource;
use crate::timeseries::{FeatureMatrix, TargetMatrix, TimeSeries};
use crate::transforms;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Row accounting for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStats {
    /// Rows in the day file.
    pub raw_rows: usize,
    /// Derived columns added by transforms.
    pub derived_columns: usize,
    /// Rows on the resampled grid.
    pub resampled_rows: usize,
    /// Alignment breakdown.
    pub alignment: AlignmentStats,
}

/// Output from processing one day.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Aligned feature matrix.
    pub features: FeatureMatrix,

    /// Aligned target matrix.
    pub targets: TargetMatrix,

    /// Row accounting.
    pub stats: DayStats,
}

impl PipelineOutput {
    /// Number of aligned rows.
    pub fn rows(&self) -> usize {
        self.features.len()
    }

    /// Whether alignment left no row.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Immutable per-day processing pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    spec: Arc<PipelineSpec>,
    source_columns: Vec<String>,
    resampler: Resampler,
    features: FeatureBuilder,
    targets: HorizonTargetBuilder,
    aligner: RowAligner,
}

impl Pipeline {
    /// Build the stage objects for `spec`.
    pub fn new(spec: Arc<PipelineSpec>) -> Self {
        let period = spec.features().period();
        Self {
            source_columns: spec.source_columns(),
            resampler: Resampler::new(period),
            features: FeatureBuilder::new(spec.features(), spec.stations()),
            targets: HorizonTargetBuilder::new(spec.horizons().to_vec(), period),
            aligner: RowAligner::new(),
            spec,
        }
    }

    /// The run specification.
    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    /// Run every stage on one day's raw series.
    ///
    /// # Errors
    ///
    /// Per-day errors: a required column is absent, the native sampling
    /// period cannot be inferred, or a transform input is missing.
    pub fn process(&self, mut raw: TimeSeries) -> Result<PipelineOutput> {
        let raw_rows = raw.len();
        let derived_columns =
            transforms::apply_all(self.spec.transforms(), &mut raw, self.spec.stations())?;

        let projected = raw.select(&self.source_columns)?;
        drop(raw);

        let resampled = self.resampler.resample(&projected)?;
        let features = self.features.build(&resampled)?;
        let targets = self.targets.build(&resampled)?;
        let aligned = self.aligner.align(&features, &targets)?;

        let stats = DayStats {
            raw_rows,
            derived_columns,
            resampled_rows: resampled.len(),
            alignment: aligned.stats,
        };
        log::debug!(
            "Day processed: {} raw rows -> {} buckets -> {} aligned rows",
            stats.raw_rows,
            stats.resampled_rows,
            stats.alignment.aligned_rows
        );

        Ok(PipelineOutput {
            features: aligned.features,
            targets: aligned.targets,
            stats,
        })
    }

    /// Read a day through `source` and process it.
    pub fn process_file(&self, source: &dyn DaySource, path: &Path) -> Result<PipelineOutput> {
        let raw = source.read_day(path, self.spec.timezone())?;
        self.process(raw)
    }
}
