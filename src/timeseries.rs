//! Column-oriented time series container.
//!
//! A [`TimeSeries`] is a strictly increasing timestamp index, a list of
//! unique column names and a `[rows × columns]` matrix of `f64` values.
//! Missing values are `NaN` ([`MISSING`]).
//!
//! Timestamps are stored as milliseconds since the Unix epoch together with
//! the timezone used to render them, so every window computation is plain
//! integer arithmetic.
//!
//! The same container backs the feature and target matrices; see
//! [`FeatureMatrix`] and [`TargetMatrix`].

use crate::error::{Error, Result};
use ahash::AHashMap;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};

/// Milliseconds since the Unix epoch (UTC).
pub type EpochMillis = i64;

/// Missing-value sentinel.
pub const MISSING: f64 = f64::NAN;

/// Feature matrix: lagged and unlagged feature columns.
pub type FeatureMatrix = TimeSeries;

/// Target matrix: one column per (variable, station, horizon).
pub type TargetMatrix = TimeSeries;

/// Convert a duration to whole milliseconds.
#[inline]
pub fn millis(d: TimeDelta) -> EpochMillis {
    d.num_milliseconds()
}

/// Ordered, timezone-aware, column-named matrix of observations.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    index: Vec<EpochMillis>,
    columns: Vec<String>,
    lookup: AHashMap<String, usize>,
    values: Array2<f64>,
    tz: Tz,
    /// Uniform spacing of the index, when known (set by the resampler).
    period: Option<TimeDelta>,
}

impl TimeSeries {
    /// Create a series, checking every structural invariant.
    ///
    /// # Errors
    ///
    /// - `values` shape differs from `(index.len(), columns.len())`
    /// - timestamps are not strictly increasing
    /// - column names are not unique
    pub fn new(
        index: Vec<EpochMillis>,
        columns: Vec<String>,
        values: Array2<f64>,
        tz: Tz,
    ) -> Result<Self> {
        if values.dim() != (index.len(), columns.len()) {
            return Err(Error::InvalidSeries(format!(
                "values shape {:?} does not match {} rows x {} columns",
                values.dim(),
                index.len(),
                columns.len()
            )));
        }

        if let Some(pos) = index.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::InvalidSeries(format!(
                "timestamps not strictly increasing at row {}",
                pos + 1
            )));
        }

        let mut lookup = AHashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if lookup.insert(name.clone(), i).is_some() {
                return Err(Error::InvalidSeries(format!("duplicate column '{name}'")));
            }
        }

        Ok(Self {
            index,
            columns,
            lookup,
            values,
            tz,
            period: None,
        })
    }

    /// Create a series from named column vectors sharing one index.
    pub fn from_columns(
        index: Vec<EpochMillis>,
        columns: Vec<(String, Vec<f64>)>,
        tz: Tz,
    ) -> Result<Self> {
        let n = index.len();
        if let Some((name, col)) = columns.iter().find(|(_, c)| c.len() != n) {
            return Err(Error::InvalidSeries(format!(
                "column '{name}' has {} values, index has {n}",
                col.len()
            )));
        }
        let values = Array2::from_shape_fn((n, columns.len()), |(i, j)| columns[j].1[i]);
        let names = columns.into_iter().map(|(name, _)| name).collect();
        Self::new(index, names, values, tz)
    }

    /// A zero-row series with the given columns.
    pub fn empty(columns: Vec<String>, tz: Tz) -> Result<Self> {
        let values = Array2::zeros((0, columns.len()));
        Self::new(Vec::new(), columns, values, tz)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the series has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Timestamp index in epoch milliseconds.
    pub fn index(&self) -> &[EpochMillis] {
        &self.index
    }

    /// Column names in storage order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw `[rows × columns]` values.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Timezone used to render timestamps.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Uniform spacing of the index, if the series is known to be on a grid.
    pub fn period(&self) -> Option<TimeDelta> {
        self.period
    }

    /// Same instants rendered in `tz`.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub(crate) fn with_period(mut self, period: TimeDelta) -> Self {
        self.period = Some(period);
        self
    }

    /// Timestamp of row `i` in the series timezone.
    pub fn timestamp(&self, i: usize) -> Option<DateTime<Tz>> {
        let ms = *self.index.get(i)?;
        Utc.timestamp_millis_opt(ms)
            .single()
            .map(|t| t.with_timezone(&self.tz))
    }

    /// First index value.
    pub fn first(&self) -> Option<EpochMillis> {
        self.index.first().copied()
    }

    /// Last index value.
    pub fn last(&self) -> Option<EpochMillis> {
        self.index.last().copied()
    }

    /// Position of a column by name.
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Whether a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// View of one column.
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let j = self
            .column_position(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))?;
        Ok(self.values.column(j))
    }

    /// Value at (row, column name).
    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        let j = self.column_position(name)?;
        self.values.get((row, j)).copied()
    }

    /// Append a column. The new column must match the row count.
    pub fn push_column(&mut self, name: impl Into<String>, data: Array1<f64>) -> Result<()> {
        let name = name.into();
        if data.len() != self.len() {
            return Err(Error::InvalidSeries(format!(
                "column '{name}' has {} values, series has {} rows",
                data.len(),
                self.len()
            )));
        }
        if self.lookup.contains_key(&name) {
            return Err(Error::InvalidSeries(format!("duplicate column '{name}'")));
        }
        let col = data.insert_axis(Axis(1));
        self.values = concatenate(Axis(1), &[self.values.view(), col.view()])?;
        self.lookup.insert(name.clone(), self.columns.len());
        self.columns.push(name);
        Ok(())
    }

    /// Project onto the given columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let positions = names
            .iter()
            .map(|n| {
                self.column_position(n.as_ref())
                    .ok_or_else(|| Error::MissingColumn(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        let values = self.values.select(Axis(1), &positions);
        let columns = names.iter().map(|n| n.as_ref().to_string()).collect();
        let mut out = Self::new(self.index.clone(), columns, values, self.tz)?;
        out.period = self.period;
        Ok(out)
    }

    /// Keep only the given rows (ascending positions).
    ///
    /// The result is no longer assumed to be on a uniform grid.
    pub fn take_rows(&self, rows: &[usize]) -> Result<Self> {
        let index = rows.iter().map(|&i| self.index[i]).collect();
        let values = self.values.select(Axis(0), rows);
        Self::new(index, self.columns.clone(), values, self.tz)
    }

    /// Per-row flag: `true` when the row holds no missing value.
    pub fn complete_rows(&self) -> Vec<bool> {
        self.values
            .axis_iter(Axis(0))
            .map(|row| row.iter().all(|v| !v.is_nan()))
            .collect()
    }

    /// Number of missing cells.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Join several series column-wise. All parts must share the same index.
    pub fn concat_columns(parts: &[TimeSeries]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| Error::InvalidSeries("nothing to concatenate".to_string()))?;
        if let Some(bad) = parts.iter().find(|p| p.index != first.index) {
            return Err(Error::InvalidSeries(format!(
                "cannot join columns {:?}: index differs",
                bad.columns
            )));
        }
        let views: Vec<_> = parts.iter().map(|p| p.values.view()).collect();
        let values = concatenate(Axis(1), &views)?;
        let columns = parts.iter().flat_map(|p| p.columns.iter().cloned()).collect();
        let mut out = Self::new(first.index.clone(), columns, values, first.tz)?;
        out.period = first.period;
        Ok(out)
    }

    /// Whether consecutive timestamps are exactly `period` apart.
    pub fn is_uniform(&self, period: TimeDelta) -> bool {
        let p = millis(period);
        p > 0 && self.index.windows(2).all(|w| w[1] - w[0] == p)
    }

    /// Infer the native sampling period.
    ///
    /// The period is the most frequent spacing between consecutive rows.
    /// Gaps are tolerated as long as every spacing is a whole multiple of it.
    ///
    /// # Errors
    ///
    /// [`Error::IrregularSeries`] for fewer than two rows or for a spacing
    /// that is not a multiple of the inferred period.
    pub fn infer_period(&self) -> Result<TimeDelta> {
        if self.len() < 2 {
            return Err(Error::IrregularSeries(format!(
                "need at least 2 samples to infer the sampling period, have {}",
                self.len()
            )));
        }

        let mut counts: AHashMap<i64, usize> = AHashMap::new();
        for w in self.index.windows(2) {
            *counts.entry(w[1] - w[0]).or_insert(0) += 1;
        }

        // Most frequent spacing; ties resolved towards the smaller spacing.
        let mut best: Option<(i64, usize)> = None;
        for (&gap, &count) in &counts {
            best = match best {
                Some((g, c)) if c > count || (c == count && g < gap) => Some((g, c)),
                _ => Some((gap, count)),
            };
        }
        let (gap, _) = best.ok_or_else(|| Error::IrregularSeries("no spacing".to_string()))?;

        if let Some(bad) = counts.keys().find(|&&g| g % gap != 0) {
            return Err(Error::IrregularSeries(format!(
                "spacing of {bad} ms is not a multiple of the dominant {gap} ms"
            )));
        }

        Ok(TimeDelta::milliseconds(gap))
    }
}

impl PartialEq for TimeSeries {
    /// Equality treats two `NaN` cells as equal.
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
            && self.columns == other.columns
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}
