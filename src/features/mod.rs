//! Feature matrix construction.
//!
//! The raw feature matrix of a day is the lag expansion of every lagged
//! column followed by the unlagged columns copied as-is:
//!
//! ```text
//! [ "GHI AP1 lag0" .. "GHI AP1 lag{L-1}" ] ... [ "azimuth AP1" ... ]
//! ```
//!
//! Column order follows [`FeatureSpec::feature_names`]. Rows with missing
//! history are kept; see [`crate::alignment`].

pub mod lags;

pub use lags::LagExpander;

use crate::error::Result;
use crate::schema::{FeatureSpec, Station};
use crate::timeseries::{FeatureMatrix, TimeSeries};

/// Builds raw (unaligned) feature matrices from resampled series.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    lagged: Vec<String>,
    unlagged: Vec<String>,
    expander: LagExpander,
}

impl FeatureBuilder {
    /// Resolve the column lists of `spec` for `stations` once.
    pub fn new(spec: &FeatureSpec, stations: &[Station]) -> Self {
        Self {
            lagged: spec.lagged_columns(stations),
            unlagged: spec.unlagged_columns(stations),
            expander: LagExpander::new(spec.period(), spec.lag_count()),
        }
    }

    /// Number of output columns.
    pub fn feature_count(&self) -> usize {
        self.lagged.len() * self.expander.lag_count() + self.unlagged.len()
    }

    /// Build the raw feature matrix of a resampled day.
    pub fn build(&self, resampled: &TimeSeries) -> Result<FeatureMatrix> {
        let mut parts = Vec::with_capacity(2);
        if !self.lagged.is_empty() {
            parts.push(self.expander.expand(resampled, &self.lagged)?);
        }
        if !self.unlagged.is_empty() {
            parts.push(resampled.select(&self.unlagged)?);
        }
        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        TimeSeries::concat_columns(&parts)
    }
}
