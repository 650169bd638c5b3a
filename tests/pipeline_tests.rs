//! Pipeline Integration Tests
//!
//! Whole-day runs over synthetic data with hand-checked row counts and
//! target values.

use chrono::TimeDelta;
use chrono_tz::Tz;
use solarnc_features::schema::{
    ColumnGroup, ColumnScope, FeatureSpec, HorizonSpec, PipelineSpec, Station,
};
use solarnc_features::{
    HorizonTargetBuilder, LagExpander, Pipeline, Resampler, RowAligner, TimeSeries,
    TransformKind, MISSING,
};
use std::sync::Arc;

const MIN: i64 = 60_000;

/// One full day at 1-minute resolution for `stations`, plus a global
/// `hour` column. No value is missing.
fn synthetic_day(stations: &[&str]) -> TimeSeries {
    let n = 1440i64;
    let index: Vec<i64> = (0..n).map(|i| i * MIN).collect();
    let mut columns: Vec<(String, Vec<f64>)> = stations
        .iter()
        .enumerate()
        .map(|(s, name)| {
            let values = (0..n).map(|i| 100.0 + (i % 97) as f64 + s as f64).collect();
            (format!("GHI {name}"), values)
        })
        .collect();
    columns.push(("hour".to_string(), (0..n).map(|i| (i / 60) as f64).collect()));
    TimeSeries::from_columns(index, columns, Tz::UTC).unwrap()
}

fn two_station_spec() -> Arc<PipelineSpec> {
    let features = FeatureSpec::new(
        TimeDelta::minutes(5),
        TimeDelta::minutes(15),
        vec![
            ColumnGroup {
                scope: ColumnScope::PerStation,
                lagged: true,
                variables: vec!["GHI".to_string()],
            },
            ColumnGroup {
                scope: ColumnScope::Global,
                lagged: false,
                variables: vec!["hour".to_string()],
            },
        ],
    )
    .unwrap();
    let horizon = HorizonSpec::parse(
        "GHI",
        vec!["AP1".to_string(), "AP3".to_string()],
        "60min",
        "+30min",
        false,
    )
    .unwrap();
    Arc::new(
        PipelineSpec::new(
            features,
            vec![horizon],
            vec![Station::named("AP1"), Station::named("AP3")],
            vec![],
            Tz::UTC,
        )
        .unwrap(),
    )
}

#[test]
fn test_end_to_end_day() {
    let pipeline = Pipeline::new(two_station_spec());
    let out = pipeline.process(synthetic_day(&["AP1", "AP3"])).unwrap();

    // 2 stations × 1 lagged variable × 3 lags + 1 unlagged
    assert_eq!(out.features.n_columns(), 7);
    assert_eq!(out.targets.columns(), &["GHI AP1 60min", "GHI AP3 60min"]);

    // 288 buckets - 2 warm-up rows - 17 anchors whose window runs past 23:59
    assert_eq!(out.stats.resampled_rows, 288);
    assert_eq!(out.rows(), 269);
    assert_eq!(out.stats.alignment.incomplete_feature_rows, 2);
    assert_eq!(out.stats.alignment.incomplete_target_rows, 17);

    assert_eq!(out.features.first(), Some(14 * MIN));
    assert_eq!(out.features.last(), Some((22 * 60 + 34) * MIN));
    assert_eq!(out.features.index(), out.targets.index());
    assert_eq!(out.features.missing_count(), 0);
    assert_eq!(out.targets.missing_count(), 0);
}

#[test]
fn test_end_to_end_feature_values() {
    let pipeline = Pipeline::new(two_station_spec());
    let day = synthetic_day(&["AP1", "AP3"]);
    let out = pipeline.process(day).unwrap();

    // Bucket labelled 00:14 averages minutes 10..=14 of station AP1.
    let expected_lag0 = (110.0 + 111.0 + 112.0 + 113.0 + 114.0) / 5.0;
    assert_eq!(out.features.get(0, "GHI AP1 lag0"), Some(expected_lag0));
    // lag2 is the bucket labelled 00:04 (minutes 0..=4).
    assert_eq!(out.features.get(0, "GHI AP1 lag2"), Some(102.0));
    assert_eq!(out.features.get(0, "GHI AP3 lag2"), Some(103.0));
    assert_eq!(out.features.get(0, "hour"), Some(0.0));
}

#[test]
fn test_backward_target_hand_check() {
    // lead 30min, interval -10min: window (t+20min, t+30min]
    let known = [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0, 5.0, 3.0];
    let mut values = vec![0.0; 40];
    values[21..31].copy_from_slice(&known);
    let series = TimeSeries::from_columns(
        (0..40).map(|i| i * MIN).collect(),
        vec![("GHI AP1".to_string(), values)],
        Tz::UTC,
    )
    .unwrap();

    let horizon =
        HorizonSpec::parse("GHI", vec!["AP1".to_string()], "30min", "-10min", false).unwrap();
    let targets = HorizonTargetBuilder::new(vec![horizon], TimeDelta::minutes(1))
        .build(&series)
        .unwrap();

    let expected = known.iter().sum::<f64>() / 10.0;
    let got = targets.get(0, "GHI AP1 30min").unwrap();
    assert!((got - expected).abs() < 1e-12);

    // Window upper bound t+30 must not pass the last sample (minute 39).
    assert!(!targets.get(9, "GHI AP1 30min").unwrap().is_nan());
    assert!(targets.get(10, "GHI AP1 30min").unwrap().is_nan());
}

#[test]
fn test_resample_idempotent_on_grid() {
    let resampler = Resampler::new(TimeDelta::minutes(5));
    let once = resampler.resample(&synthetic_day(&["AP1"])).unwrap();
    let twice = resampler.resample(&once).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_single_lag_is_identity() {
    let resampled = Resampler::new(TimeDelta::minutes(5))
        .resample(&synthetic_day(&["AP1"]))
        .unwrap();
    let lagged = LagExpander::new(TimeDelta::minutes(5), 1)
        .expand(&resampled, &["GHI AP1"])
        .unwrap();

    assert_eq!(lagged.columns(), &["GHI AP1 lag0"]);
    assert_eq!(lagged.index(), resampled.index());
    assert_eq!(
        lagged.column("GHI AP1 lag0").unwrap(),
        resampled.column("GHI AP1").unwrap()
    );
}

#[test]
fn test_aligner_postcondition() {
    let index: Vec<i64> = (0..6).map(|i| i * 5 * MIN).collect();
    let features = TimeSeries::from_columns(
        index.clone(),
        vec![
            ("a".to_string(), vec![MISSING, 1.0, 2.0, 3.0, 4.0, 5.0]),
            ("b".to_string(), vec![0.0, 1.0, MISSING, 3.0, 4.0, 5.0]),
        ],
        Tz::UTC,
    )
    .unwrap();
    let targets = TimeSeries::from_columns(
        index,
        vec![("y".to_string(), vec![0.0, 1.0, 2.0, 3.0, MISSING, MISSING])],
        Tz::UTC,
    )
    .unwrap();

    let aligned = RowAligner::new().align(&features, &targets).unwrap();

    assert_eq!(aligned.features.index(), aligned.targets.index());
    assert_eq!(aligned.features.index(), &[5 * MIN, 15 * MIN]);
    assert_eq!(aligned.features.missing_count(), 0);
    assert_eq!(aligned.targets.missing_count(), 0);
    // Every kept timestamp was complete on both sides.
    for &t in aligned.features.index() {
        let row = features.index().iter().position(|&x| x == t).unwrap();
        assert!(features.complete_rows()[row]);
        assert!(targets.complete_rows()[row]);
    }
}

#[test]
fn test_clear_sky_ratio_targets() {
    // K = GHI / clear-sky; targets on a derived column.
    let n = 120i64;
    let raw = TimeSeries::from_columns(
        (0..n).map(|i| i * MIN).collect(),
        vec![
            ("GHI AP1".to_string(), vec![400.0; n as usize]),
            ("csm AP1".to_string(), vec![800.0; n as usize]),
        ],
        Tz::UTC,
    )
    .unwrap();

    let features = FeatureSpec::new(
        TimeDelta::minutes(5),
        TimeDelta::minutes(10),
        vec![ColumnGroup {
            scope: ColumnScope::PerStation,
            lagged: true,
            variables: vec!["K".to_string()],
        }],
    )
    .unwrap();
    let horizon = HorizonSpec::parse("K", vec!["AP1".to_string()], "30min", "15min", false).unwrap();
    let spec = PipelineSpec::new(
        features,
        vec![horizon],
        vec![Station::named("AP1")],
        vec![TransformKind::Ratio {
            numerator: "GHI".to_string(),
            denominator: "csm".to_string(),
            output: "K".to_string(),
            scope: ColumnScope::PerStation,
        }],
        Tz::UTC,
    )
    .unwrap();

    let out = Pipeline::new(Arc::new(spec)).process(raw).unwrap();
    assert!(!out.is_empty());
    for i in 0..out.rows() {
        assert_eq!(out.targets.get(i, "K AP1 30min"), Some(0.5));
        assert_eq!(out.features.get(i, "K AP1 lag1"), Some(0.5));
    }
}
