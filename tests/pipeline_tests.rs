/// End-to-end pipeline tests against a stub model store.
///
/// Run with: cargo test --test pipeline_tests -- --nocapture

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use aq_predictor::catalog::{Catalog, HORIZONS, POLLUTANTS};
use aq_predictor::dispatch::Dispatcher;
use aq_predictor::error::PredictError;
use aq_predictor::features;
use aq_predictor::index;
use aq_predictor::model::{ModelStore, Predictor, Registry};
use aq_predictor::types::Observation;

struct ConstantPredictor(f64);

impl Predictor for ConstantPredictor {
    fn predict(&self, _features: &[f32]) -> anyhow::Result<f64> {
        Ok(self.0)
    }
}

struct StubStore {
    available: Vec<(&'static str, u32, f64)>,
}

impl ModelStore for StubStore {
    fn load(
        &self,
        target: &str,
        horizon_hours: u32,
    ) -> anyhow::Result<Option<Arc<dyn Predictor>>> {
        Ok(self
            .available
            .iter()
            .find(|(t, h, _)| *t == target && *h == horizon_hours)
            .map(|(_, _, v)| Arc::new(ConstantPredictor(*v)) as Arc<dyn Predictor>))
    }
}

fn dispatcher(available: Vec<(&'static str, u32, f64)>) -> Dispatcher {
    let catalog = Arc::new(Catalog::new().unwrap());
    let registry = Arc::new(Registry::new(Box::new(StubStore { available })));
    Dispatcher::new(catalog, registry)
}

fn hourly_observations(start: NaiveDateTime, n: usize) -> Vec<Observation> {
    (0..n)
        .map(|i| Observation {
            time: start + chrono::Duration::hours(i as i64),
            pm2_5: 12.0 + (i % 10) as f64,
            pm10: 24.0 + (i % 14) as f64,
            ozone: 50.0 + (i % 20) as f64,
            nitrogen_dioxide: 18.0 + (i % 8) as f64,
            temperature_2m: 20.0 + (i % 24) as f64 * 0.4,
            relative_humidity_2m: 58.0,
            wind_speed_10m: 4.2,
            wind_direction_10m: 210.0,
            precipitation: 0.0,
            surface_pressure: 1013.0,
        })
        .collect()
}

fn start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn partial_failure_keeps_sibling_horizons() {
    let dispatcher = dispatcher(vec![("pm2_5", 1, 14.0), ("pm2_5", 24, 19.0)]);
    let observations = hourly_observations(start_time(), 48);

    let response = dispatcher
        .forecast("pm2_5", &[1, 24, 72], &observations)
        .unwrap();

    let one = &response.predictions[&1];
    let day = &response.predictions[&24];
    let three_days = &response.predictions[&72];

    assert_eq!(one.value, Some(14.0));
    assert_eq!(day.value, Some(19.0));
    assert!(one.error.is_none() && day.error.is_none());

    assert!(three_days.value.is_none());
    assert!(three_days.predicted_time.is_none());
    let error = three_days.error.as_deref().unwrap();
    assert!(error.contains("Model not found"), "got: {error}");

    println!("✓ 72h failed inline while 1h/24h succeeded");
}

#[test]
fn predicted_time_crosses_the_year_boundary() {
    let input_time = NaiveDate::from_ymd_opt(2025, 12, 31)
        .unwrap()
        .and_hms_opt(23, 0, 0)
        .unwrap();
    // 30 hourly rows ending exactly at the year's last hour
    let start = input_time - chrono::Duration::hours(29);
    let observations = hourly_observations(start, 30);

    let dispatcher = dispatcher(vec![("ozone", 1, 61.0), ("ozone", 168, 55.0)]);
    let response = dispatcher.forecast("ozone", &[1, 168], &observations).unwrap();

    assert_eq!(response.input_time, input_time);
    assert_eq!(
        response.predictions[&1].predicted_time.unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    );
    assert_eq!(
        response.predictions[&168].predicted_time.unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 7)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
    );
}

#[test]
fn current_time_is_the_most_recent_observation() {
    let observations = hourly_observations(start_time(), 30);
    let last = observations.last().unwrap().time;

    let dispatcher = dispatcher(vec![("pm10", 12, 33.0)]);
    let response = dispatcher.forecast("pm10", &[12], &observations).unwrap();

    assert_eq!(response.input_time, last);
    assert_eq!(
        response.predictions[&12].predicted_time.unwrap(),
        last + chrono::Duration::hours(12)
    );
}

#[test]
fn composite_index_takes_the_worst_pollutant() {
    // Four 1h forecasts, each in a different tier of its own table:
    // pm2_5 15 -> 1, pm10 45 -> 3, ozone 70 -> 2, no2 40 -> 2.
    let dispatcher = dispatcher(vec![
        ("pm2_5", 1, 15.0),
        ("pm10", 1, 45.0),
        ("ozone", 1, 70.0),
        ("nitrogen_dioxide", 1, 40.0),
    ]);
    let observations = hourly_observations(start_time(), 48);

    assert_eq!(dispatcher.composite_index(&observations).unwrap(), 3);
}

#[test]
fn composite_index_requires_every_pollutant_model() {
    let dispatcher = dispatcher(vec![
        ("pm2_5", 1, 15.0),
        ("pm10", 1, 45.0),
        ("ozone", 1, 70.0),
    ]);
    let observations = hourly_observations(start_time(), 48);

    match dispatcher.composite_index(&observations) {
        Err(PredictError::ModelNotFound { target, .. }) => {
            assert_eq!(target, "nitrogen_dioxide")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn request_level_errors_abort_before_any_model_call() {
    let dispatcher = dispatcher(vec![]);
    let observations = hourly_observations(start_time(), 10);

    assert!(matches!(
        dispatcher.forecast("lead", &[1], &observations),
        Err(PredictError::InvalidTarget(_))
    ));

    let mut unordered = observations.clone();
    unordered.swap(2, 3);
    assert!(matches!(
        dispatcher.forecast("pm2_5", &[1], &unordered),
        Err(PredictError::InvalidSequence(_))
    ));
}

#[test]
fn short_history_degrades_with_warnings() {
    let dispatcher = dispatcher(vec![("pm2_5", 1, 11.0)]);
    let observations = hourly_observations(start_time(), 3);

    let response = dispatcher.forecast("pm2_5", &[1], &observations).unwrap();

    // Best-effort prediction still produced
    assert_eq!(response.predictions[&1].value, Some(11.0));
    // lag_24 of the cross-pollutant series cannot exist with 3 rows
    assert!(response
        .warnings
        .iter()
        .any(|w| w.contains("pm10_lag_24")));
    // the active target's own columns are not part of the input at all
    assert!(!response.warnings.iter().any(|w| w.contains("pm2_5_lag_24")));

    println!("✓ warnings: {:?}", response.warnings);
}

#[test]
fn long_history_produces_no_warnings() {
    let dispatcher = dispatcher(vec![("pm2_5", 1, 11.0)]);
    let observations = hourly_observations(start_time(), 48);

    let response = dispatcher.forecast("pm2_5", &[1], &observations).unwrap();
    assert!(response.warnings.is_empty());
}

#[test]
fn default_horizon_set_covers_the_catalog() {
    let horizons = Dispatcher::parse_horizons(None).unwrap();
    assert_eq!(horizons, HORIZONS.to_vec());

    let available: Vec<(&'static str, u32, f64)> =
        HORIZONS.iter().map(|&h| ("pm2_5", h, 10.0)).collect();
    let dispatcher = dispatcher(available);
    let observations = hourly_observations(start_time(), 48);

    let response = dispatcher
        .forecast("pm2_5", &horizons, &observations)
        .unwrap();
    assert_eq!(response.predictions.len(), HORIZONS.len());
    for h in HORIZONS {
        assert_eq!(response.predictions[&h].value, Some(10.0));
    }
}

#[test]
fn feature_rows_are_identical_across_runs() {
    let observations = hourly_observations(start_time(), 72);
    let first = features::build_features(&observations).unwrap();
    let second = features::build_features(&observations).unwrap();
    assert_eq!(first, second);
}

#[test]
fn selector_and_builder_agree_on_every_column() {
    // Every column the catalog selects must be produced by the builder
    // once enough history exists; a mismatch here is the fatal
    // configuration error the startup validation guards against.
    let catalog = Catalog::new().unwrap();
    let observations = hourly_observations(start_time(), 48);
    let rows = features::build_features(&observations).unwrap();
    let latest = rows.last().unwrap();

    for target in POLLUTANTS {
        let spec = catalog.get(target).unwrap();
        let (vector, missing) = latest.ordered_vector(&spec.features);
        assert_eq!(vector.len(), spec.features.len());
        assert!(
            missing.is_empty(),
            "{target} input degraded unexpectedly: {missing:?}"
        );
    }
}

#[test]
fn risk_classification_of_the_one_hour_forecast() {
    for (value, expected) in [
        (15.5, index::RiskLevel::Low),
        (45.0, index::RiskLevel::Medium),
        (60.0, index::RiskLevel::High),
    ] {
        let dispatcher = dispatcher(vec![("pm2_5", 1, value)]);
        let observations = hourly_observations(start_time(), 30);
        let (prediction, _) = dispatcher.predict_one("pm2_5", 1, &observations).unwrap();
        assert_eq!(index::risk_level("pm2_5", prediction.value).unwrap(), expected);
    }
}
