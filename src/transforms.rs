//! Derived columns computed per sample, before resampling.
//!
//! The set of transforms is closed: every kind is a variant of
//! [`TransformKind`], selected by the `kind` key in configuration. An
//! unknown kind fails deserialization and therefore configuration loading.
//!
//! ```toml
//! [[transforms]]
//! kind = "ratio"
//! numerator = "GHI"
//! denominator = "ineichen_ghi"
//! output = "K_ineichen"
//! ```
//!
//! With per-station scope (the default) the transform above produces
//! `"K_ineichen AP1" = "GHI AP1" / "ineichen_ghi AP1"` for every station.
//! An output column that already exists in the day file is left untouched.

use crate::error::Result;
use crate::schema::{ColumnScope, Station};
use crate::timeseries::{TimeSeries, MISSING};
use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

fn per_station() -> ColumnScope {
    ColumnScope::PerStation
}

/// Supported derived-column kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformKind {
    /// `output = numerator / denominator`; zero or missing denominator gives `NaN`.
    ///
    /// Typical use: clearness index from measured and clear-sky irradiance.
    Ratio {
        numerator: String,
        denominator: String,
        output: String,
        #[serde(default = "per_station")]
        scope: ColumnScope,
    },

    /// `output = minuend - subtrahend`.
    Difference {
        minuend: String,
        subtrahend: String,
        output: String,
        #[serde(default = "per_station")]
        scope: ColumnScope,
    },

    /// `output = column + amount`.
    Offset {
        column: String,
        amount: f64,
        output: String,
        #[serde(default = "per_station")]
        scope: ColumnScope,
    },
}

impl TransformKind {
    /// Variable name this transform produces.
    pub fn output(&self) -> &str {
        match self {
            TransformKind::Ratio { output, .. }
            | TransformKind::Difference { output, .. }
            | TransformKind::Offset { output, .. } => output,
        }
    }

    /// Scope of inputs and output.
    pub fn scope(&self) -> ColumnScope {
        match self {
            TransformKind::Ratio { scope, .. }
            | TransformKind::Difference { scope, .. }
            | TransformKind::Offset { scope, .. } => *scope,
        }
    }

    /// Input variable names.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            TransformKind::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
            TransformKind::Difference {
                minuend,
                subtrahend,
                ..
            } => vec![minuend.as_str(), subtrahend.as_str()],
            TransformKind::Offset { column, .. } => vec![column.as_str()],
        }
    }

    /// Concrete output column names.
    pub fn output_columns(&self, stations: &[Station]) -> Vec<String> {
        self.scope().expand(self.output(), stations)
    }

    /// Concrete input column names (deduplicated, in first-use order).
    pub fn input_columns(&self, stations: &[Station]) -> Vec<String> {
        let mut cols = Vec::new();
        for input in self.inputs() {
            for c in self.scope().expand(input, stations) {
                if !cols.contains(&c) {
                    cols.push(c);
                }
            }
        }
        cols
    }

    /// Add the derived columns to `series`.
    ///
    /// Returns the number of columns added.
    pub fn apply(&self, series: &mut TimeSeries, stations: &[Station]) -> Result<usize> {
        let scope = self.scope();
        let targets: Vec<(Vec<String>, String)> = match scope {
            ColumnScope::PerStation => stations
                .iter()
                .map(|s| {
                    let one = std::slice::from_ref(s);
                    let inputs = self
                        .inputs()
                        .iter()
                        .flat_map(|i| scope.expand(i, one))
                        .collect();
                    (inputs, scope.expand(self.output(), one).remove(0))
                })
                .collect(),
            ColumnScope::Global => vec![(
                self.inputs().iter().map(|s| s.to_string()).collect(),
                self.output().to_string(),
            )],
        };

        let mut added = 0;
        for (inputs, output) in targets {
            if series.has_column(&output) {
                continue;
            }
            let data = self.compute(series, &inputs)?;
            series.push_column(output, data)?;
            added += 1;
        }
        Ok(added)
    }

    fn compute(&self, series: &TimeSeries, inputs: &[String]) -> Result<Array1<f64>> {
        let a = series.column(&inputs[0])?;
        let out = match self {
            TransformKind::Ratio { .. } => {
                let b = series.column(&inputs[1])?;
                Zip::from(&a).and(&b).map_collect(|&num, &den| {
                    if den == 0.0 || den.is_nan() {
                        MISSING
                    } else {
                        num / den
                    }
                })
            }
            TransformKind::Difference { .. } => {
                let b = series.column(&inputs[1])?;
                Zip::from(&a).and(&b).map_collect(|&x, &y| x - y)
            }
            TransformKind::Offset { amount, .. } => a.mapv(|x| x + amount),
        };
        Ok(out)
    }
}

/// Apply transforms in order, so later transforms may use earlier outputs.
pub fn apply_all(
    transforms: &[TransformKind],
    series: &mut TimeSeries,
    stations: &[Station],
) -> Result<usize> {
    let mut added = 0;
    for t in transforms {
        added += t.apply(series, stations)?;
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono_tz::Tz;

    fn day() -> TimeSeries {
        TimeSeries::from_columns(
            vec![0, 60_000, 120_000],
            vec![
                ("GHI AP1".to_string(), vec![100.0, 200.0, 50.0]),
                ("csm AP1".to_string(), vec![200.0, 0.0, MISSING]),
            ],
            Tz::UTC,
        )
        .unwrap()
    }

    fn ratio() -> TransformKind {
        TransformKind::Ratio {
            numerator: "GHI".to_string(),
            denominator: "csm".to_string(),
            output: "K".to_string(),
            scope: ColumnScope::PerStation,
        }
    }

    #[test]
    fn test_ratio_undefined_is_missing() {
        let mut s = day();
        let added = ratio().apply(&mut s, &[Station::named("AP1")]).unwrap();
        assert_eq!(added, 1);
        let k = s.column("K AP1").unwrap();
        assert!((k[0] - 0.5).abs() < 1e-12);
        assert!(k[1].is_nan());
        assert!(k[2].is_nan());
    }

    #[test]
    fn test_existing_output_is_skipped() {
        let mut s = day();
        let stations = [Station::named("AP1")];
        ratio().apply(&mut s, &stations).unwrap();
        assert_eq!(ratio().apply(&mut s, &stations).unwrap(), 0);
    }

    #[test]
    fn test_missing_input_column() {
        let mut s = day();
        let err = ratio()
            .apply(&mut s, &[Station::named("AP9")])
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn(c) if c == "GHI AP9"));
    }

    #[test]
    fn test_chained_transforms() {
        let mut s = day();
        let offset = TransformKind::Offset {
            column: "K".to_string(),
            amount: 1.0,
            output: "K1".to_string(),
            scope: ColumnScope::PerStation,
        };
        let added = apply_all(&[ratio(), offset], &mut s, &[Station::named("AP1")]).unwrap();
        assert_eq!(added, 2);
        assert!((s.get(0, "K1 AP1").unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_global_difference() {
        let mut s = TimeSeries::from_columns(
            vec![0],
            vec![("a".to_string(), vec![3.0]), ("b".to_string(), vec![1.0])],
            Tz::UTC,
        )
        .unwrap();
        let diff = TransformKind::Difference {
            minuend: "a".to_string(),
            subtrahend: "b".to_string(),
            output: "d".to_string(),
            scope: ColumnScope::Global,
        };
        diff.apply(&mut s, &[]).unwrap();
        assert_eq!(s.get(0, "d"), Some(2.0));
    }

    #[test]
    fn test_unknown_kind_fails_to_parse() {
        let err = toml::from_str::<TransformKind>(
            r#"kind = "page_clear_sky"
               output = "x""#,
        );
        assert!(err.is_err());

        let ok: TransformKind = toml::from_str(
            r#"kind = "ratio"
               numerator = "GHI"
               denominator = "csm"
               output = "K""#,
        )
        .unwrap();
        assert_eq!(ok, ratio());
    }
}
