//! Feature column definitions.
//!
//! Columns come in groups. A group is either expanded once per station
//! (`"GHI"` → `"GHI AP1"`, `"GHI AP3"`, …) or used as-is (global), and is
//! either lagged (expanded into `L` shifted copies) or unlagged.
//!
//! # Column Layout
//!
//! ```text
//! [ lagged col 0: lag0 .. lag(L-1) ] [ lagged col 1: lag0 .. ] ... [ unlagged cols ]
//! ```
//!
//! Per-station groups are expanded station-major, matching how the
//! formatted day files name their columns.

use crate::error::{Error, Result};
use crate::timeseries::millis;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Name of a per-station column: `"{variable} {station}"`.
pub fn station_column(variable: &str, station: &str) -> String {
    format!("{variable} {station}")
}

/// Name of a lagged copy: `"{column} lag{lag}"`.
pub fn lag_column(column: &str, lag: usize) -> String {
    format!("{column} lag{lag}")
}

/// A measurement station.
///
/// Only the name is used by the core (for column naming); the coordinates
/// are carried for the upstream clear-sky stage and for bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station identifier as it appears in column names.
    pub name: String,

    /// Latitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    /// Longitude in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    /// Altitude in meters above sea level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl Station {
    /// Station with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latitude: None,
            longitude: None,
            altitude: None,
        }
    }
}

/// Whether a column group is instantiated per station or once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnScope {
    /// One column per station, named `"{variable} {station}"`.
    PerStation,
    /// A single column, named `"{variable}"`.
    Global,
}

impl ColumnScope {
    /// Concrete column names for `variable` under this scope.
    pub fn expand(&self, variable: &str, stations: &[Station]) -> Vec<String> {
        match self {
            ColumnScope::PerStation => stations
                .iter()
                .map(|s| station_column(variable, &s.name))
                .collect(),
            ColumnScope::Global => vec![variable.to_string()],
        }
    }
}

/// A group of feature variables sharing scope and lag treatment.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroup {
    /// Per-station or global.
    pub scope: ColumnScope,
    /// Whether the group is lag-expanded.
    pub lagged: bool,
    /// Variable names.
    pub variables: Vec<String>,
}

impl ColumnGroup {
    /// Concrete column names, station-major for per-station groups.
    pub fn expand(&self, stations: &[Station]) -> Vec<String> {
        match self.scope {
            ColumnScope::PerStation => stations
                .iter()
                .flat_map(|s| {
                    self.variables
                        .iter()
                        .map(move |v| station_column(v, &s.name))
                })
                .collect(),
            ColumnScope::Global => self.variables.clone(),
        }
    }
}

/// Immutable feature specification, built once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSpec {
    period: TimeDelta,
    window: TimeDelta,
    lag_count: usize,
    groups: Vec<ColumnGroup>,
}

impl FeatureSpec {
    /// Create a feature specification.
    ///
    /// # Errors
    ///
    /// Configuration error when the period is not positive, the window is not
    /// positive, or the window is not an exact multiple of the period.
    pub fn new(period: TimeDelta, window: TimeDelta, groups: Vec<ColumnGroup>) -> Result<Self> {
        let p = millis(period);
        let w = millis(window);
        if p <= 0 {
            return Err(Error::config("sampling period must be positive"));
        }
        if w <= 0 {
            return Err(Error::config("lookback window must be positive"));
        }
        if w % p != 0 {
            return Err(Error::config(format!(
                "window ({w} ms) should be a multiple of the sampling period ({p} ms)"
            )));
        }

        Ok(Self {
            period,
            window,
            lag_count: (w / p) as usize,
            groups,
        })
    }

    /// Sampling period P.
    pub fn period(&self) -> TimeDelta {
        self.period
    }

    /// Lookback window W.
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Lag count L = W / P.
    pub fn lag_count(&self) -> usize {
        self.lag_count
    }

    /// Column groups in configured order.
    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    /// Source columns that are lag-expanded.
    pub fn lagged_columns(&self, stations: &[Station]) -> Vec<String> {
        self.columns_where(stations, true)
    }

    /// Source columns copied unshifted.
    pub fn unlagged_columns(&self, stations: &[Station]) -> Vec<String> {
        self.columns_where(stations, false)
    }

    fn columns_where(&self, stations: &[Station], lagged: bool) -> Vec<String> {
        self.groups
            .iter()
            .filter(|g| g.lagged == lagged)
            .flat_map(|g| g.expand(stations))
            .collect()
    }

    /// Final feature matrix column names, in matrix order.
    pub fn feature_names(&self, stations: &[Station]) -> Vec<String> {
        let mut names = Vec::new();
        for col in self.lagged_columns(stations) {
            names.extend((0..self.lag_count).map(|l| lag_column(&col, l)));
        }
        names.extend(self.unlagged_columns(stations));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stations() -> Vec<Station> {
        vec![Station::named("AP1"), Station::named("AP3")]
    }

    fn groups() -> Vec<ColumnGroup> {
        vec![
            ColumnGroup {
                scope: ColumnScope::PerStation,
                lagged: true,
                variables: vec!["GHI".to_string(), "K".to_string()],
            },
            ColumnGroup {
                scope: ColumnScope::Global,
                lagged: true,
                variables: vec!["elevation".to_string()],
            },
            ColumnGroup {
                scope: ColumnScope::PerStation,
                lagged: false,
                variables: vec!["azimuth".to_string()],
            },
        ]
    }

    #[test]
    fn test_lag_count_is_exact() {
        let spec =
            FeatureSpec::new(TimeDelta::minutes(5), TimeDelta::minutes(15), groups()).unwrap();
        assert_eq!(spec.lag_count(), 3);
    }

    #[test]
    fn test_non_multiple_window_rejected() {
        let err = FeatureSpec::new(TimeDelta::minutes(5), TimeDelta::minutes(12), groups())
            .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_zero_period_rejected() {
        let err =
            FeatureSpec::new(TimeDelta::zero(), TimeDelta::minutes(10), groups()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_station_major_expansion() {
        let spec =
            FeatureSpec::new(TimeDelta::minutes(5), TimeDelta::minutes(5), groups()).unwrap();
        assert_eq!(
            spec.lagged_columns(&stations()),
            vec!["GHI AP1", "K AP1", "GHI AP3", "K AP3", "elevation"]
        );
        assert_eq!(
            spec.unlagged_columns(&stations()),
            vec!["azimuth AP1", "azimuth AP3"]
        );
    }

    #[test]
    fn test_feature_names_layout() {
        let spec =
            FeatureSpec::new(TimeDelta::minutes(5), TimeDelta::minutes(10), groups()).unwrap();
        let names = spec.feature_names(&stations());
        assert_eq!(names.len(), 5 * 2 + 2);
        assert_eq!(names[0], "GHI AP1 lag0");
        assert_eq!(names[1], "GHI AP1 lag1");
        assert_eq!(names[8], "elevation lag0");
        assert_eq!(names[10], "azimuth AP1");
    }

    #[test]
    fn test_scope_expand() {
        assert_eq!(
            ColumnScope::PerStation.expand("GHI", &stations()),
            vec!["GHI AP1", "GHI AP3"]
        );
        assert_eq!(ColumnScope::Global.expand("GHI", &stations()), vec!["GHI"]);
    }
}
