//! Bucket-mean resampling onto a uniform grid.
//!
//! # Bucket Convention
//!
//! Buckets are right-closed and right-labeled: the row labeled `t` averages
//! every source sample with timestamp in `(t − P, t]`.
//!
//! The grid is anchored at local midnight of the day's first sample (in the
//! series timezone) and offset by `P − P₀`, where `P₀` is the native
//! sampling period of the source. Labels are `midnight + k·P + (P − P₀)`.
//! With 1-minute data and `P = 5min` the labels fall on 00:04, 00:09, ...
//! and each bucket holds five complete samples:
//!
//! ```text
//! source:  00:00 00:01 00:02 00:03 00:04 | 00:05 ... 00:09 | ...
//! labels:                          00:04 |           00:09 | ...
//! ```
//!
//! Days whose data starts later (daylight-only files) share the same grid:
//! a first sample at 06:03 lands in the bucket labeled 06:04.
//!
//! A series already at `P` (`P₀ = P`) keeps its own timestamps as labels, so
//! resampling a resampled series changes nothing.
//!
//! The first label is the first grid point at or after the first source
//! timestamp, the last label the first grid point at or after the last one.
//! Empty buckets yield `NaN`, never zero.

use crate::error::{Error, Result};
use crate::timeseries::{millis, TimeSeries, MISSING};
use chrono::{TimeDelta, TimeZone, Timelike};
use chrono_tz::Tz;
use ndarray::Array2;

/// Uniform-grid resampler.
///
/// # Example
///
/// ```
/// use chrono::TimeDelta;
/// use chrono_tz::Tz;
/// use solarnc_features::preprocessing::Resampler;
/// use solarnc_features::timeseries::TimeSeries;
///
/// let minute = 60_000;
/// let index: Vec<i64> = (0..10).map(|i| i * minute).collect();
/// let raw = TimeSeries::from_columns(
///     index,
///     vec![("GHI AP1".to_string(), (0..10).map(|i| i as f64).collect())],
///     Tz::UTC,
/// )
/// .unwrap();
///
/// let out = Resampler::new(TimeDelta::minutes(5)).resample(&raw).unwrap();
/// assert_eq!(out.index(), &[4 * minute, 9 * minute]);
/// assert_eq!(out.get(0, "GHI AP1"), Some(2.0));
/// assert_eq!(out.get(1, "GHI AP1"), Some(7.0));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Resampler {
    /// Target period P.
    period: TimeDelta,

    /// Native period P₀; inferred from the source when `None`.
    native_period: Option<TimeDelta>,
}

impl Resampler {
    /// Resampler to period `period`, inferring the native period per series.
    pub fn new(period: TimeDelta) -> Self {
        Self {
            period,
            native_period: None,
        }
    }

    /// Use a known native period instead of inferring it.
    pub fn with_native_period(mut self, native: TimeDelta) -> Self {
        self.native_period = Some(native);
        self
    }

    /// Target period.
    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Resample every column of `series` onto the `P` grid.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the target period is not positive
    /// - [`Error::IrregularSeries`] if `P₀` cannot be inferred
    /// - [`Error::InvalidSeries`] if `P` is finer than `P₀`
    pub fn resample(&self, series: &TimeSeries) -> Result<TimeSeries> {
        let p = millis(self.period);
        if p <= 0 {
            return Err(Error::config("resampling period must be positive"));
        }

        let native = match self.native_period.or(series.period()) {
            Some(n) => n,
            None => series.infer_period()?,
        };
        let p0 = millis(native);
        if p0 <= 0 || p0 > p {
            return Err(Error::InvalidSeries(format!(
                "resampling period {p} ms is finer than the native period {p0} ms"
            )));
        }

        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return TimeSeries::empty(series.columns().to_vec(), series.tz())
                .map(|s| s.with_period(self.period));
        };

        let first_label = if p0 == p {
            first
        } else {
            let anchor = local_midnight(first, series.tz()) + (p - p0);
            anchor + (first - anchor + p - 1).div_euclid(p) * p
        };
        let n_buckets = if last <= first_label {
            1
        } else {
            ((last - first_label + p - 1) / p + 1) as usize
        };

        let n_cols = series.n_columns();
        let mut sums = Array2::<f64>::zeros((n_buckets, n_cols));
        let mut counts = Array2::<u32>::zeros((n_buckets, n_cols));

        for (row, &ts) in series.index().iter().enumerate() {
            let k = bucket_of(ts - first_label, p);
            for (j, &v) in series.values().row(row).iter().enumerate() {
                if !v.is_nan() {
                    sums[[k, j]] += v;
                    counts[[k, j]] += 1;
                }
            }
        }

        let values = Array2::from_shape_fn((n_buckets, n_cols), |(k, j)| {
            match counts[[k, j]] {
                0 => MISSING,
                c => sums[[k, j]] / c as f64,
            }
        });
        let index = (0..n_buckets as i64).map(|k| first_label + k * p).collect();

        let out = TimeSeries::new(index, series.columns().to_vec(), values, series.tz())?;
        log::debug!(
            "Resampled {} rows to {} buckets (P0={} ms, P={} ms, {} empty cells)",
            series.len(),
            out.len(),
            p0,
            p,
            out.missing_count()
        );
        Ok(out.with_period(self.period))
    }
}

/// Local midnight of the day containing `ts`, in epoch millis.
///
/// Falls back to the wall-clock offset at `ts` when midnight itself does not
/// exist in `tz`.
fn local_midnight(ts: i64, tz: Tz) -> i64 {
    let Some(local) = tz.timestamp_millis_opt(ts).single() else {
        return ts - ts.rem_euclid(86_400_000);
    };
    let midnight = local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| tz.from_local_datetime(&naive).earliest());
    match midnight {
        Some(m) => m.timestamp_millis(),
        None => {
            let since = i64::from(local.num_seconds_from_midnight()) * 1000
                + i64::from(local.nanosecond() / 1_000_000);
            ts - since
        }
    }
}

/// Bucket position for a sample `offset` ms after the first label.
///
/// `offset` is always greater than `-P` because the first label is the
/// first grid point at or after the first sample.
#[inline]
fn bucket_of(offset: i64, p: i64) -> usize {
    if offset <= 0 {
        0
    } else {
        ((offset + p - 1) / p) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    const MIN: i64 = 60_000;

    fn minute_series(values: Vec<f64>) -> TimeSeries {
        let index = (0..values.len() as i64).map(|i| i * MIN).collect();
        TimeSeries::from_columns(index, vec![("x".to_string(), values)], Tz::UTC).unwrap()
    }

    #[test]
    fn test_first_bucket_is_complete() {
        let s = minute_series((0..15).map(|i| i as f64).collect());
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(out.index(), &[4 * MIN, 9 * MIN, 14 * MIN]);
        assert_eq!(out.get(0, "x"), Some(2.0));
        assert_eq!(out.get(2, "x"), Some(12.0));
        assert_eq!(out.period(), Some(TimeDelta::minutes(5)));
    }

    #[test]
    fn test_trailing_partial_bucket() {
        // Last sample at 00:11 falls in the bucket labeled 00:14.
        let s = minute_series((0..12).map(|i| i as f64).collect());
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(out.last(), Some(14 * MIN));
        assert_eq!(out.get(2, "x"), Some(10.5));
    }

    #[test]
    fn test_empty_bucket_is_missing() {
        let index = vec![0, MIN, 2 * MIN, 3 * MIN, 4 * MIN, 10 * MIN, 11 * MIN];
        let s = TimeSeries::from_columns(
            index,
            vec![("x".to_string(), vec![1.0; 7])],
            Tz::UTC,
        )
        .unwrap();
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(out.index(), &[4 * MIN, 9 * MIN, 14 * MIN]);
        assert!(out.get(1, "x").unwrap().is_nan());
        assert_eq!(out.get(2, "x"), Some(1.0));
    }

    #[test]
    fn test_missing_samples_ignored_in_mean() {
        let s = minute_series(vec![1.0, MISSING, 3.0, MISSING, 5.0]);
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.get(0, "x"), Some(3.0));
    }

    #[test]
    fn test_idempotent() {
        let s = minute_series((0..60).map(|i| (i as f64).sin()).collect());
        let r = Resampler::new(TimeDelta::minutes(5));
        let once = r.resample(&s).unwrap();
        let twice = r.resample(&once).unwrap();
        assert_eq!(once.index(), twice.index());
        for (a, b) in once.values().iter().zip(twice.values().iter()) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn test_idempotent_single_bucket() {
        let s = minute_series(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let r = Resampler::new(TimeDelta::minutes(5));
        let once = r.resample(&s).unwrap();
        assert_eq!(once.index(), &[4 * MIN]);
        let twice = r.resample(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_idempotent_empty() {
        let s = TimeSeries::empty(vec!["x".to_string()], Tz::UTC)
            .unwrap()
            .with_period(TimeDelta::minutes(5));
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_grid_anchored_at_midnight() {
        // Daylight-only day: first sample at 06:03.
        let start = (6 * 60 + 3) * MIN;
        let index = (0..12).map(|i| start + i * MIN).collect();
        let s = TimeSeries::from_columns(
            index,
            vec![("x".to_string(), (0..12).map(|i| i as f64).collect())],
            Tz::UTC,
        )
        .unwrap();
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(
            out.index(),
            &[(6 * 60 + 4) * MIN, (6 * 60 + 9) * MIN, (6 * 60 + 14) * MIN]
        );
        // 06:03 and 06:04
        assert_eq!(out.get(0, "x"), Some(0.5));
        // 06:05 ..= 06:09
        assert_eq!(out.get(1, "x"), Some(4.0));
    }

    #[test]
    fn test_grid_anchored_at_local_midnight() {
        // 06:03 Honolulu (UTC-10) on 2010-03-20.
        let tz = Tz::Pacific__Honolulu;
        let start = tz
            .with_ymd_and_hms(2010, 3, 20, 6, 3, 0)
            .single()
            .unwrap()
            .timestamp_millis();
        let index = (0..7).map(|i| start + i * MIN).collect();
        let s = TimeSeries::from_columns(index, vec![("x".to_string(), vec![1.0; 7])], tz)
            .unwrap();
        let out = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap();
        assert_eq!(out.first(), Some(start + MIN));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_irregular_source() {
        let s = TimeSeries::from_columns(
            vec![0, MIN, 2 * MIN + 7_000],
            vec![("x".to_string(), vec![1.0; 3])],
            Tz::UTC,
        )
        .unwrap();
        let err = Resampler::new(TimeDelta::minutes(5)).resample(&s).unwrap_err();
        assert!(matches!(err, Error::IrregularSeries(_)));
    }

    #[test]
    fn test_finer_period_rejected() {
        let s = minute_series(vec![1.0, 2.0, 3.0]);
        let err = Resampler::new(TimeDelta::seconds(30)).resample(&s).unwrap_err();
        assert!(matches!(err, Error::InvalidSeries(_)));
    }

    #[test]
    fn test_known_native_period() {
        let s = minute_series(vec![2.0]);
        let out = Resampler::new(TimeDelta::minutes(5))
            .with_native_period(TimeDelta::minutes(1))
            .resample(&s)
            .unwrap();
        assert_eq!(out.index(), &[4 * MIN]);
        assert_eq!(out.get(0, "x"), Some(2.0));
    }
}
