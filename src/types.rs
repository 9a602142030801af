use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::index::RiskLevel;

/// Concentration unit shared by all four pollutant series.
pub const UNIT: &str = "μg/m³";

/// One hourly sensor/meteorology reading, as supplied by the caller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Observation {
    pub time: NaiveDateTime,
    pub pm2_5: f64,
    pub pm10: f64,
    pub ozone: f64,
    pub nitrogen_dioxide: f64,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub wind_speed_10m: f64,
    pub wind_direction_10m: f64,
    pub precipitation: f64,
    pub surface_pressure: f64,
}

impl Observation {
    /// Raw pollutant concentration by series name.
    pub fn pollutant(&self, name: &str) -> Option<f64> {
        match name {
            "pm2_5" => Some(self.pm2_5),
            "pm10" => Some(self.pm10),
            "ozone" => Some(self.ozone),
            "nitrogen_dioxide" => Some(self.nitrogen_dioxide),
            _ => None,
        }
    }
}

/// Feature values derived from one observation.
///
/// `None` marks an "unavailable" feature: its lag or window reaches past
/// the start of the supplied sequence. Rows are immutable once the builder
/// returns them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub time: NaiveDateTime,
    values: HashMap<String, Option<f64>>,
}

impl FeatureRow {
    pub fn new(time: NaiveDateTime) -> Self {
        Self {
            time,
            values: HashMap::new(),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        self.values.insert(name.into(), value);
    }

    /// Feature value, or `None` if unavailable or never produced.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// Assemble the model input in the authoritative column order.
    ///
    /// Unavailable features contribute `0.0` to the vector; their column
    /// names are returned separately so the caller can surface a warning.
    pub fn ordered_vector(&self, columns: &[String]) -> (Vec<f32>, Vec<String>) {
        let mut vector = Vec::with_capacity(columns.len());
        let mut missing = Vec::new();
        for column in columns {
            match self.values.get(column) {
                Some(Some(v)) => vector.push(*v as f32),
                _ => {
                    vector.push(0.0);
                    missing.push(column.clone());
                }
            }
        }
        (vector, missing)
    }
}

/// A single resolved forecast.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub target: String,
    pub horizon_hours: u32,
    pub value: f64,
    pub predicted_time: NaiveDateTime,
}

/// Outcome for one horizon of a multi-horizon request.
///
/// `value` and `predicted_time` are null when that horizon's predictor was
/// unavailable; sibling horizons are unaffected.
#[derive(Debug, Clone, Serialize)]
pub struct HorizonOutcome {
    pub horizon_hours: u32,
    pub value: Option<f64>,
    pub predicted_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Multi-horizon forecast for one target, keyed by horizon label.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub target: String,
    pub input_time: NaiveDateTime,
    #[serde(serialize_with = "serialize_horizon_keyed")]
    pub predictions: BTreeMap<u32, HorizonOutcome>,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Risk classification of the 1-hour-ahead forecast for one target.
#[derive(Debug, Clone, Serialize)]
pub struct RiskResponse {
    pub target: String,
    pub predicted_value: f64,
    pub risk_level: RiskLevel,
    pub unit: &'static str,
    pub message: &'static str,
}

fn serialize_horizon_keyed<S>(
    predictions: &BTreeMap<u32, HorizonOutcome>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(predictions.len()))?;
    for (horizon, outcome) in predictions {
        map.serialize_entry(&format!("{horizon}h"), outcome)?;
    }
    map.end()
}
