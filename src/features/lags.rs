//! Backward-shifted copies of feature columns.
//!
//! Lag `l` of column `c` at row `t` holds the value of `c` at `t − l·P`.
//! Lag 0 is the unshifted value. The first `l` rows of lag `l` have no
//! history and are `NaN`; they are kept here and dropped by the row aligner.

use crate::error::{Error, Result};
use crate::schema::lag_column;
use crate::timeseries::{millis, TimeSeries, MISSING};
use chrono::TimeDelta;
use ndarray::{s, Array2};

/// Expands columns into `L` lagged copies.
#[derive(Debug, Clone, Copy)]
pub struct LagExpander {
    period: TimeDelta,
    lag_count: usize,
}

impl LagExpander {
    /// Expander producing lags `0..lag_count` at spacing `period`.
    pub fn new(period: TimeDelta, lag_count: usize) -> Self {
        Self { period, lag_count }
    }

    /// Number of lags per column.
    pub fn lag_count(&self) -> usize {
        self.lag_count
    }

    /// Lag-expand `columns` of `series`.
    ///
    /// Output columns are `"{col} lag0" .. "{col} lag{L-1}"` for each input
    /// column in order. Rows are shifted positionally, so the series must sit
    /// on a uniform `P` grid (the resampler's output does).
    ///
    /// # Errors
    ///
    /// - [`Error::MissingColumn`] if a column is absent
    /// - [`Error::InvalidSeries`] if the index is not uniformly spaced by `P`
    pub fn expand<S: AsRef<str>>(&self, series: &TimeSeries, columns: &[S]) -> Result<TimeSeries> {
        if series.len() > 1 && !series.is_uniform(self.period) {
            return Err(Error::InvalidSeries(format!(
                "lag expansion needs a uniform {} ms grid",
                millis(self.period)
            )));
        }

        let n = series.len();
        let l = self.lag_count;
        let mut values = Array2::from_elem((n, columns.len() * l), MISSING);
        let mut names = Vec::with_capacity(columns.len() * l);

        for (c, name) in columns.iter().enumerate() {
            let src = series.column(name.as_ref())?;
            for lag in 0..l {
                names.push(lag_column(name.as_ref(), lag));
                if lag < n {
                    values
                        .slice_mut(s![lag.., c * l + lag])
                        .assign(&src.slice(s![..n - lag]));
                }
            }
        }

        let out = TimeSeries::new(series.index().to_vec(), names, values, series.tz())?;
        Ok(match series.period() {
            Some(p) => out.with_period(p),
            None => out,
        })
    }
}
