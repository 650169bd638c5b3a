//! Matrix Schema Module
//!
//! Typed, immutable description of what a run produces: which columns are
//! lagged, how many lags, which horizons become targets, and how every
//! output column is named.
//!
//! A [`PipelineSpec`] is built once from [`crate::config::PipelineConfig`],
//! validated, and then shared read-only (`Arc`) by every worker.
//!
//! # Example
//!
//! ```
//! use chrono::TimeDelta;
//! use solarnc_features::schema::{
//!     ColumnGroup, ColumnScope, FeatureSpec, HorizonSpec, PipelineSpec, Station,
//! };
//!
//! let features = FeatureSpec::new(
//!     TimeDelta::minutes(5),
//!     TimeDelta::minutes(15),
//!     vec![ColumnGroup {
//!         scope: ColumnScope::PerStation,
//!         lagged: true,
//!         variables: vec!["GHI".to_string()],
//!     }],
//! )
//! .unwrap();
//! let horizon =
//!     HorizonSpec::parse("GHI", vec!["AP1".to_string()], "60min", "+30min", false).unwrap();
//!
//! let spec = PipelineSpec::new(
//!     features,
//!     vec![horizon],
//!     vec![Station::named("AP1")],
//!     vec![],
//!     chrono_tz::Tz::UTC,
//! )
//! .unwrap();
//!
//! assert_eq!(spec.feature_names(), vec!["GHI AP1 lag0", "GHI AP1 lag1", "GHI AP1 lag2"]);
//! assert_eq!(spec.target_names(), vec!["GHI AP1 60min"]);
//! ```

mod duration;
mod feature_def;
mod horizon;

pub use duration::{format_duration, parse_duration};
pub use feature_def::{
    lag_column, station_column, ColumnGroup, ColumnScope, FeatureSpec, Station,
};
pub use horizon::{HorizonSign, HorizonSpec, Window};

use crate::error::{Error, Result};
use crate::transforms::TransformKind;
use ahash::AHashSet;
use chrono_tz::Tz;

/// Complete, validated run specification.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    features: FeatureSpec,
    horizons: Vec<HorizonSpec>,
    stations: Vec<Station>,
    transforms: Vec<TransformKind>,
    timezone: Tz,
}

impl PipelineSpec {
    /// Assemble and validate a run specification.
    ///
    /// # Errors
    ///
    /// Configuration error when there are no feature columns or no horizons,
    /// when a horizon targets an unknown station, or when two output columns
    /// would share a name.
    pub fn new(
        features: FeatureSpec,
        horizons: Vec<HorizonSpec>,
        stations: Vec<Station>,
        transforms: Vec<TransformKind>,
        timezone: Tz,
    ) -> Result<Self> {
        let spec = Self {
            features,
            horizons,
            stations,
            transforms,
            timezone,
        };
        spec.validate()?;
        Ok(spec)
    }

    fn validate(&self) -> Result<()> {
        let mut station_names = AHashSet::new();
        for s in &self.stations {
            if !station_names.insert(s.name.as_str()) {
                return Err(Error::config(format!("duplicate station '{}'", s.name)));
            }
        }

        if self.horizons.is_empty() {
            return Err(Error::config("at least one forecast horizon is required"));
        }
        for h in &self.horizons {
            if let Some(bad) = h
                .stations
                .iter()
                .find(|s| !station_names.contains(s.as_str()))
            {
                return Err(Error::config(format!(
                    "horizon '{} {}' targets unknown station '{bad}'",
                    h.variable, h.lead_label
                )));
            }
        }

        let features = self.feature_names();
        if features.is_empty() {
            return Err(Error::config("no feature columns selected"));
        }
        check_unique("feature", &features)?;
        check_unique("target", &self.target_names())?;
        Ok(())
    }

    /// Feature definition.
    pub fn features(&self) -> &FeatureSpec {
        &self.features
    }

    /// Forecast horizons.
    pub fn horizons(&self) -> &[HorizonSpec] {
        &self.horizons
    }

    /// Selected stations.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Derived-column transforms, in application order.
    pub fn transforms(&self) -> &[TransformKind] {
        &self.transforms
    }

    /// Timezone of the day files' index.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Feature matrix column names.
    pub fn feature_names(&self) -> Vec<String> {
        self.features.feature_names(&self.stations)
    }

    /// Target matrix column names.
    pub fn target_names(&self) -> Vec<String> {
        self.horizons
            .iter()
            .flat_map(|h| h.columns().into_iter().map(|(_, target)| target))
            .collect()
    }

    /// Columns the pipeline reads from a day file after transforms.
    pub fn source_columns(&self) -> Vec<String> {
        let mut cols = self.features.lagged_columns(&self.stations);
        cols.extend(self.features.unlagged_columns(&self.stations));
        cols.extend(
            self.horizons
                .iter()
                .flat_map(|h| h.columns().into_iter().map(|(source, _)| source)),
        );
        dedup_in_order(cols)
    }

    /// Columns worth loading from a day file: transform inputs and every
    /// source column (transform outputs may already be present on disk).
    pub fn input_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self
            .transforms
            .iter()
            .flat_map(|t| t.input_columns(&self.stations))
            .collect();
        cols.extend(self.source_columns());
        dedup_in_order(cols)
    }
}

fn check_unique(role: &str, names: &[String]) -> Result<()> {
    let mut seen = AHashSet::with_capacity(names.len());
    for n in names {
        if !seen.insert(n.as_str()) {
            return Err(Error::config(format!("duplicate {role} column '{n}'")));
        }
    }
    Ok(())
}

fn dedup_in_order(cols: Vec<String>) -> Vec<String> {
    let mut seen = AHashSet::with_capacity(cols.len());
    cols.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn features() -> FeatureSpec {
        FeatureSpec::new(
            TimeDelta::minutes(5),
            TimeDelta::minutes(15),
            vec![
                ColumnGroup {
                    scope: ColumnScope::PerStation,
                    lagged: true,
                    variables: vec!["K".to_string()],
                },
                ColumnGroup {
                    scope: ColumnScope::Global,
                    lagged: false,
                    variables: vec!["hour".to_string()],
                },
            ],
        )
        .unwrap()
    }

    fn stations() -> Vec<Station> {
        vec![Station::named("AP1"), Station::named("AP3")]
    }

    fn horizon(stations: &[&str], lead: &str) -> HorizonSpec {
        HorizonSpec::parse(
            "GHI",
            stations.iter().map(|s| s.to_string()).collect(),
            lead,
            "+30min",
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_names() {
        let spec = PipelineSpec::new(
            features(),
            vec![horizon(&["AP1", "AP3"], "60min")],
            stations(),
            vec![],
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(spec.feature_names().len(), 2 * 3 + 1);
        assert_eq!(spec.target_names(), vec!["GHI AP1 60min", "GHI AP3 60min"]);
        assert_eq!(
            spec.source_columns(),
            vec!["K AP1", "K AP3", "hour", "GHI AP1", "GHI AP3"]
        );
    }

    #[test]
    fn test_unknown_target_station() {
        let err = PipelineSpec::new(
            features(),
            vec![horizon(&["AP9"], "60min")],
            stations(),
            vec![],
            Tz::UTC,
        )
        .unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("AP9"));
    }

    #[test]
    fn test_duplicate_targets() {
        let err = PipelineSpec::new(
            features(),
            vec![horizon(&["AP1"], "60min"), horizon(&["AP1"], "60min")],
            stations(),
            vec![],
            Tz::UTC,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate target"));
    }

    #[test]
    fn test_no_horizons() {
        let err = PipelineSpec::new(features(), vec![], stations(), vec![], Tz::UTC).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_input_columns_include_transform_inputs() {
        let ratio = TransformKind::Ratio {
            numerator: "GHI".to_string(),
            denominator: "csm".to_string(),
            output: "K".to_string(),
            scope: ColumnScope::PerStation,
        };
        let spec = PipelineSpec::new(
            features(),
            vec![horizon(&["AP1"], "60min")],
            stations(),
            vec![ratio],
            Tz::UTC,
        )
        .unwrap();
        let cols = spec.input_columns();
        assert_eq!(&cols[..4], &["GHI AP1", "csm AP1", "GHI AP3", "csm AP3"]);
        assert!(cols.contains(&"K AP1".to_string()));
    }
}
