//! Row alignment of feature and target matrices.
//!
//! A row survives only if it is complete in both matrices. Both outputs end
//! up with the same ascending index and no missing value. An empty result is
//! a normal outcome (night-time or very short days) and is returned as
//! zero-row matrices with the full column layout.

use crate::error::Result;
use crate::timeseries::{EpochMillis, FeatureMatrix, TargetMatrix};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Row accounting for one alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentStats {
    /// Rows in the raw feature matrix.
    pub feature_rows: usize,
    /// Rows in the raw target matrix.
    pub target_rows: usize,
    /// Feature rows holding at least one missing value.
    pub incomplete_feature_rows: usize,
    /// Target rows holding at least one missing value.
    pub incomplete_target_rows: usize,
    /// Rows kept.
    pub aligned_rows: usize,
}

/// Aligned matrix pair.
#[derive(Debug, Clone)]
pub struct Aligned {
    pub features: FeatureMatrix,
    pub targets: TargetMatrix,
    pub stats: AlignmentStats,
}

impl Aligned {
    /// Whether no row survived.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Restricts a feature/target pair to their common complete rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowAligner;

impl RowAligner {
    pub fn new() -> Self {
        Self
    }

    /// Align `features` and `targets`.
    ///
    /// The matrices need not share an index; only timestamps present and
    /// complete in both are kept.
    pub fn align(&self, features: &FeatureMatrix, targets: &TargetMatrix) -> Result<Aligned> {
        let f_ok = features.complete_rows();
        let t_ok = targets.complete_rows();

        let target_complete: AHashSet<EpochMillis> = targets
            .index()
            .iter()
            .zip(&t_ok)
            .filter_map(|(&t, &ok)| ok.then_some(t))
            .collect();

        // Feature index is ascending, so the kept rows are too.
        let mut f_rows = Vec::new();
        let mut kept = AHashSet::new();
        for (i, (&t, &ok)) in features.index().iter().zip(&f_ok).enumerate() {
            if ok && target_complete.contains(&t) {
                f_rows.push(i);
                kept.insert(t);
            }
        }
        let t_rows: Vec<usize> = targets
            .index()
            .iter()
            .enumerate()
            .filter_map(|(i, t)| kept.contains(t).then_some(i))
            .collect();

        let stats = AlignmentStats {
            feature_rows: features.len(),
            target_rows: targets.len(),
            incomplete_feature_rows: f_ok.iter().filter(|ok| !**ok).count(),
            incomplete_target_rows: t_ok.iter().filter(|ok| !**ok).count(),
            aligned_rows: f_rows.len(),
        };

        let aligned = Aligned {
            features: features.take_rows(&f_rows)?,
            targets: targets.take_rows(&t_rows)?,
            stats,
        };

        log::debug!(
            "Aligned {} rows ({} incomplete feature rows, {} incomplete target rows)",
            stats.aligned_rows,
            stats.incomplete_feature_rows,
            stats.incomplete_target_rows
        );
        Ok(aligned)
    }
}
