//! Interval-mean forecast targets.
//!
//! For anchor `t` the target is the mean of the source column over the
//! horizon's window (see [`HorizonSpec::window`]). Missing samples inside the
//! window are skipped; a window holding no valid sample yields `NaN`.
//!
//! # Coverage
//!
//! A window reaching past the first or last sample of the day would be
//! averaged over fewer samples than intended. Such anchors get `NaN` unless
//! the horizon sets `allow_partial_windows`. Coverage is judged against the
//! grid period: an open bound may lie up to one period beyond the data.
//!
//! # Complexity
//!
//! Anchors are increasing and every window has the same width, so the window
//! bounds only ever move forward. Two cursors track them, carrying a running
//! sum and count, and each sample enters and leaves the window once: `O(n)`
//! per column.

use crate::error::Result;
use crate::schema::{HorizonSpec, Window};
use crate::timeseries::{millis, EpochMillis, TargetMatrix, TimeSeries, MISSING};
use chrono::TimeDelta;
use ndarray::{Array1, Array2, ArrayView1};

/// Builds the target matrix for a set of horizons.
#[derive(Debug, Clone)]
pub struct HorizonTargetBuilder {
    horizons: Vec<HorizonSpec>,
    period: TimeDelta,
}

impl HorizonTargetBuilder {
    /// Builder for `horizons` over series sampled every `period`.
    pub fn new(horizons: Vec<HorizonSpec>, period: TimeDelta) -> Self {
        Self { horizons, period }
    }

    /// Target column names in output order.
    pub fn target_names(&self) -> Vec<String> {
        self.horizons
            .iter()
            .flat_map(|h| h.columns().into_iter().map(|(_, target)| target))
            .collect()
    }

    /// Compute every target column over the rows of `resampled`.
    pub fn build(&self, resampled: &TimeSeries) -> Result<TargetMatrix> {
        let names = self.target_names();
        let mut values = Array2::from_elem((resampled.len(), names.len()), MISSING);

        let mut j = 0;
        for h in &self.horizons {
            for (source, _) in h.columns() {
                let col = resampled.column(&source)?;
                let out = interval_means(h, resampled.index(), col, millis(self.period));
                values.column_mut(j).assign(&Array1::from(out));
                j += 1;
            }
        }

        let out = TimeSeries::new(resampled.index().to_vec(), names, values, resampled.tz())?;
        Ok(match resampled.period() {
            Some(p) => out.with_period(p),
            None => out,
        })
    }
}

/// Interval mean of `values` for every anchor in `index`.
fn interval_means(
    horizon: &HorizonSpec,
    index: &[EpochMillis],
    values: ArrayView1<'_, f64>,
    period: i64,
) -> Vec<f64> {
    let (Some(&first), Some(&last)) = (index.first(), index.last()) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(index.len());
    // Running sum and count of the valid samples in index[lo..hi].
    let mut lo = 0;
    let mut hi = 0;
    let mut sum = 0.0;
    let mut count = 0usize;

    for &t in index {
        let w = horizon.window(t);
        if !horizon.allow_partial_windows && !w.is_covered(first, last, period) {
            out.push(MISSING);
            continue;
        }

        while lo < index.len() && !above_lower(&w, index[lo]) {
            if lo < hi && !values[lo].is_nan() {
                sum -= values[lo];
                count -= 1;
            }
            lo += 1;
        }
        if hi < lo {
            hi = lo;
        }
        while hi < index.len() && w.contains(index[hi]) {
            if !values[hi].is_nan() {
                sum += values[hi];
                count += 1;
            }
            hi += 1;
        }

        if count == 0 {
            sum = 0.0;
            out.push(MISSING);
        } else {
            out.push(sum / count as f64);
        }
    }
    out
}

#[inline]
fn above_lower(w: &Window, t: EpochMillis) -> bool {
    if w.lo_closed {
        t >= w.lo
    } else {
        t > w.lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Tz;

    const MIN: i64 = 60_000;

    fn minute_series(n: i64) -> TimeSeries {
        TimeSeries::from_columns(
            (0..n).map(|i| i * MIN).collect(),
            vec![("GHI AP1".to_string(), (0..n).map(|i| i as f64).collect())],
            Tz::UTC,
        )
        .unwrap()
    }

    fn build(interval: &str, lead: &str, partial: bool, s: &TimeSeries) -> TargetMatrix {
        let h = HorizonSpec::parse("GHI", vec!["AP1".to_string()], lead, interval, partial)
            .unwrap();
        HorizonTargetBuilder::new(vec![h], TimeDelta::minutes(1))
            .build(s)
            .unwrap()
    }

    #[test]
    fn test_forward_mean() {
        let s = minute_series(20);
        let tm = build("+5min", "10min", false, &s);
        assert_eq!(tm.columns(), &["GHI AP1 10min"]);
        // [10, 15) -> 10..14
        assert_eq!(tm.get(0, "GHI AP1 10min"), Some(12.0));
        // Row 5: [15, 20) is covered since the open end is one period past 19.
        assert_eq!(tm.get(5, "GHI AP1 10min"), Some(17.0));
        assert!(tm.get(6, "GHI AP1 10min").unwrap().is_nan());
    }

    #[test]
    fn test_plain_is_inclusive() {
        let s = minute_series(20);
        let tm = build("5min", "10min", false, &s);
        // [10, 15] -> 10..15
        assert_eq!(tm.get(0, "GHI AP1 10min"), Some(12.5));
        assert_eq!(tm.get(4, "GHI AP1 10min"), Some(16.5));
        assert!(tm.get(5, "GHI AP1 10min").unwrap().is_nan());
    }

    #[test]
    fn test_partial_windows_allowed() {
        let s = minute_series(20);
        let tm = build("+5min", "10min", true, &s);
        // [18, 23) holds 18 and 19 only.
        assert_eq!(tm.get(8, "GHI AP1 10min"), Some(18.5));
        // [20, 25) is empty.
        assert!(tm.get(10, "GHI AP1 10min").unwrap().is_nan());
    }

    #[test]
    fn test_missing_values_skipped() {
        let mut values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        values[3] = MISSING;
        values[4] = MISSING;
        let s = TimeSeries::from_columns(
            (0..10).map(|i| i * MIN).collect(),
            vec![("GHI AP1".to_string(), values)],
            Tz::UTC,
        )
        .unwrap();
        let tm = build("+3min", "2min", false, &s);
        // [2, 5) -> 2, NaN, NaN
        assert_eq!(tm.get(0, "GHI AP1 2min"), Some(2.0));
        // [3, 6) -> NaN, NaN, 5
        assert_eq!(tm.get(1, "GHI AP1 2min"), Some(5.0));
    }

    #[test]
    fn test_all_missing_window() {
        let s = TimeSeries::from_columns(
            (0..6).map(|i| i * MIN).collect(),
            vec![("GHI AP1".to_string(), vec![1.0, MISSING, MISSING, 4.0, 5.0, 6.0])],
            Tz::UTC,
        )
        .unwrap();
        let tm = build("+2min", "1min", false, &s);
        assert!(tm.get(0, "GHI AP1 1min").unwrap().is_nan());
    }

    #[test]
    fn test_sliding_sum_matches_direct_mean() {
        let values: Vec<f64> = (0..60)
            .map(|i| if i % 7 == 3 { MISSING } else { ((i * 13) % 11) as f64 })
            .collect();
        let s = TimeSeries::from_columns(
            (0..60).map(|i| i * MIN).collect(),
            vec![("GHI AP1".to_string(), values.clone())],
            Tz::UTC,
        )
        .unwrap();
        let tm = build("+8min", "12min", false, &s);

        for row in 0..=40 {
            // [row + 12, row + 20)
            let window: Vec<f64> = values[row + 12..row + 20]
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();
            let expected = window.iter().sum::<f64>() / window.len() as f64;
            let got = tm.get(row, "GHI AP1 12min").unwrap();
            assert!((got - expected).abs() < 1e-9, "row {row}: {got} != {expected}");
        }
    }

    #[test]
    fn test_windows_across_data_gap() {
        // Samples at minutes 0..=5 and 20..=25.
        let index: Vec<i64> = (0..6).chain(20..26).map(|m| m * MIN).collect();
        let values: Vec<f64> = (0..6).chain(20..26).map(|m| m as f64).collect();
        let s = TimeSeries::from_columns(index, vec![("GHI AP1".to_string(), values)], Tz::UTC)
            .unwrap();

        let tm = build("+2min", "0min", false, &s);
        // [5, 7) -> 5
        assert_eq!(tm.get(5, "GHI AP1 0min"), Some(5.0));
        // [20, 22) -> 20, 21
        assert_eq!(tm.get(6, "GHI AP1 0min"), Some(20.5));

        let tm = build("+2min", "14min", false, &s);
        // [14, 16) falls in the gap.
        assert!(tm.get(0, "GHI AP1 14min").unwrap().is_nan());
        assert!(tm.get(4, "GHI AP1 14min").unwrap().is_nan());
        // [19, 21) -> 20
        assert_eq!(tm.get(5, "GHI AP1 14min"), Some(20.0));
    }

    #[test]
    fn test_empty_series() {
        let s = TimeSeries::empty(vec!["GHI AP1".to_string()], Tz::UTC).unwrap();
        let tm = build("+5min", "10min", false, &s);
        assert!(tm.is_empty());
        assert_eq!(tm.n_columns(), 1);
    }
}
