//! Forecast target generation.
//!
//! Each horizon produces one target column per target station, named
//! `"{variable} {station} {lead}"`. Its value at anchor `t` is the mean of
//! the source column over an interval placed relative to `t + lead`:
//!
//! ```text
//!              t          t+LT-I        t+LT         t+LT+I
//!  backward    |-------------(============]
//!  forward     |---------------------------[============)
//!  plain       |---------------------------[============]
//! ```
//!
//! # Example
//!
//! ```
//! use chrono::TimeDelta;
//! use chrono_tz::Tz;
//! use solarnc_features::labeling::HorizonTargetBuilder;
//! use solarnc_features::schema::HorizonSpec;
//! use solarnc_features::timeseries::TimeSeries;
//!
//! let minute = 60_000;
//! let day = TimeSeries::from_columns(
//!     (0..40).map(|i| i * minute).collect(),
//!     vec![("GHI AP1".to_string(), (0..40).map(|i| i as f64).collect())],
//!     Tz::UTC,
//! )
//! .unwrap();
//!
//! let h = HorizonSpec::parse("GHI", vec!["AP1".to_string()], "30min", "-10min", false).unwrap();
//! let targets = HorizonTargetBuilder::new(vec![h], TimeDelta::minutes(1))
//!     .build(&day)
//!     .unwrap();
//!
//! // (20min, 30min] -> samples 21..=30
//! assert_eq!(targets.get(0, "GHI AP1 30min"), Some(25.5));
//! ```

pub mod horizon;

pub use horizon::HorizonTargetBuilder;
