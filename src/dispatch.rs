//! Prediction orchestration: horizon parsing, per-target feature-vector
//! assembly, predictor invocation and calendar timestamping.
//!
//! A multi-horizon request evaluates every requested horizon
//! independently; one horizon's missing model is reported inline for that
//! horizon and never aborts its siblings. "Current time" is always the
//! last observation of the supplied sequence.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};

use crate::catalog::{Catalog, TargetSpec, HORIZONS, POLLUTANTS};
use crate::error::PredictError;
use crate::features;
use crate::index;
use crate::model::Registry;
use crate::types::{ForecastResponse, HorizonOutcome, Observation, Prediction, UNIT};

pub struct Dispatcher {
    catalog: Arc<Catalog>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>, registry: Arc<Registry>) -> Self {
        Self { catalog, registry }
    }

    /// Parse a `"1,24,72"` horizon list. `None` selects the full catalog
    /// set.
    pub fn parse_horizons(spec: Option<&str>) -> Result<Vec<u32>, PredictError> {
        let raw = match spec {
            None => return Ok(HORIZONS.to_vec()),
            Some(raw) => raw,
        };
        let mut horizons = Vec::new();
        for part in raw.split(',') {
            let horizon: u32 = part
                .trim()
                .parse()
                .map_err(|_| PredictError::InvalidHorizonSpec(raw.to_string()))?;
            if horizon == 0 {
                return Err(PredictError::InvalidHorizonSpec(raw.to_string()));
            }
            horizons.push(horizon);
        }
        Ok(horizons)
    }

    /// Forecast `target` at each requested horizon from the latest
    /// observation. Horizon failures are isolated; request-level errors
    /// (unknown target, invalid sequence) abort before any model call.
    pub fn forecast(
        &self,
        target: &str,
        horizons: &[u32],
        observations: &[Observation],
    ) -> Result<ForecastResponse, PredictError> {
        let spec = self.catalog.get(target)?;
        let (vector, input_time, warnings) = self.latest_vector(spec, observations)?;

        let mut predictions = BTreeMap::new();
        for &horizon in horizons {
            let outcome = match self.predict_vector(spec, horizon, &vector, input_time) {
                Ok(prediction) => HorizonOutcome {
                    horizon_hours: horizon,
                    value: Some(prediction.value),
                    predicted_time: Some(prediction.predicted_time),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("horizon {}h for {} failed: {}", horizon, target, e);
                    HorizonOutcome {
                        horizon_hours: horizon,
                        value: None,
                        predicted_time: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            predictions.insert(horizon, outcome);
        }

        Ok(ForecastResponse {
            target: target.to_string(),
            input_time,
            predictions,
            unit: UNIT,
            warnings,
        })
    }

    /// Single-horizon forecast with hard errors, used by the risk and
    /// composite-index surfaces.
    pub fn predict_one(
        &self,
        target: &str,
        horizon_hours: u32,
        observations: &[Observation],
    ) -> Result<(Prediction, Vec<String>), PredictError> {
        let spec = self.catalog.get(target)?;
        let (vector, input_time, warnings) = self.latest_vector(spec, observations)?;
        let prediction = self.predict_vector(spec, horizon_hours, &vector, input_time)?;
        Ok((prediction, warnings))
    }

    /// Composite air-quality index from the four pollutants'
    /// 1-hour-ahead forecasts: worst per-pollutant tier wins.
    pub fn composite_index(&self, observations: &[Observation]) -> Result<u8, PredictError> {
        let mut tiers = Vec::with_capacity(POLLUTANTS.len());
        for target in POLLUTANTS {
            let (prediction, _) = self.predict_one(target, 1, observations)?;
            let tier = index::aqi_tier(target, prediction.value)?;
            tracing::debug!(
                "{}: predicted {:.2} -> tier {}",
                target,
                prediction.value,
                tier
            );
            tiers.push(tier);
        }
        Ok(index::composite_index(tiers))
    }

    /// Build the target's ordered model input from the most recent
    /// feature row, degrading unavailable columns to 0.0 with a warning.
    fn latest_vector(
        &self,
        spec: &TargetSpec,
        observations: &[Observation],
    ) -> Result<(Vec<f32>, NaiveDateTime, Vec<String>), PredictError> {
        let rows = features::build_features(observations)?;
        let latest = rows.last().ok_or_else(|| {
            PredictError::InvalidSequence("empty observation list".to_string())
        })?;
        let (vector, missing) = latest.ordered_vector(&spec.features);
        let warnings = missing
            .into_iter()
            .map(|column| {
                PredictError::InsufficientHistory {
                    column,
                    available: observations.len(),
                }
                .to_string()
            })
            .collect();
        Ok((vector, latest.time, warnings))
    }

    fn predict_vector(
        &self,
        spec: &TargetSpec,
        horizon_hours: u32,
        vector: &[f32],
        input_time: NaiveDateTime,
    ) -> Result<Prediction, PredictError> {
        let predictor = self.registry.resolve(spec.name, horizon_hours)?;
        let value = predictor
            .predict(vector)
            .map_err(|e| PredictError::PredictionFailed {
                target: spec.name.to_string(),
                horizon_hours,
                message: e.to_string(),
            })?;
        Ok(Prediction {
            target: spec.name.to_string(),
            horizon_hours,
            value,
            predicted_time: input_time + Duration::hours(i64::from(horizon_hours)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_horizon_set_is_the_full_catalog() {
        assert_eq!(Dispatcher::parse_horizons(None).unwrap(), HORIZONS.to_vec());
    }

    #[test]
    fn horizon_lists_parse_with_whitespace() {
        assert_eq!(
            Dispatcher::parse_horizons(Some("1, 24 ,72")).unwrap(),
            vec![1, 24, 72]
        );
    }

    #[test]
    fn malformed_horizon_specs_are_rejected() {
        for bad in ["abc", "1,two", "-3", "1,,24", "0", ""] {
            assert!(
                matches!(
                    Dispatcher::parse_horizons(Some(bad)),
                    Err(PredictError::InvalidHorizonSpec(_))
                ),
                "spec '{bad}' should be rejected"
            );
        }
    }
}
