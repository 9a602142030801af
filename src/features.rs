//! Deterministic feature engineering.
//!
//! Turns an ordered sequence of hourly observations into model-ready
//! feature rows: cyclical time encodings, wind vectorization, fixed-offset
//! lags and trailing rolling statistics for every pollutant series, and
//! (for training batches) forward-shifted label columns.
//!
//! The same builder runs for training and inference; the only difference
//! is that label columns are produced by [`shift_targets`] separately and
//! never enter a feature row.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::catalog::POLLUTANTS;
use crate::error::PredictError;
use crate::types::{FeatureRow, Observation};

/// Trailing window length for rolling statistics, in rows.
pub const ROLLING_WINDOW: usize = 24;

/// Lag offsets computed per pollutant series, in rows.
pub const LAG_STEPS: [usize; 2] = [1, 24];

/// Cyclical encodings for one timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclicalEncoding {
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

/// Encode hour-of-day (period 24) and month (period 12, using the
/// 1-based month number directly).
pub fn encode_time(time: &NaiveDateTime) -> CyclicalEncoding {
    let hour = f64::from(time.hour());
    let month = f64::from(time.month());
    CyclicalEncoding {
        hour_sin: (2.0 * PI * hour / 24.0).sin(),
        hour_cos: (2.0 * PI * hour / 24.0).cos(),
        month_sin: (2.0 * PI * month / 12.0).sin(),
        month_cos: (2.0 * PI * month / 12.0).cos(),
    }
}

/// Decompose wind speed/direction into orthogonal components.
///
/// Convention: `u = speed * cos(dir)`, `v = speed * sin(dir)` with the
/// direction in degrees, so 0° maps to (speed, 0), 90° to (0, speed),
/// 180° to (-speed, 0) and 270° to (0, -speed). Directions outside
/// [0, 360) are accepted as-is.
pub fn wind_components(speed: f64, direction_deg: f64) -> (f64, f64) {
    let rad = direction_deg * PI / 180.0;
    (speed * rad.cos(), speed * rad.sin())
}

/// Check the boundary precondition once: timestamps strictly increasing,
/// at least one row. Downstream lag/window math assumes this.
pub fn validate_sequence(observations: &[Observation]) -> Result<(), PredictError> {
    if observations.is_empty() {
        return Err(PredictError::InvalidSequence(
            "empty observation list".to_string(),
        ));
    }
    for pair in observations.windows(2) {
        if pair[1].time <= pair[0].time {
            return Err(PredictError::InvalidSequence(format!(
                "timestamps not strictly increasing at {}",
                pair[1].time
            )));
        }
    }
    Ok(())
}

/// Build one feature row per observation.
///
/// Lag features are `None` until enough history exists. Rolling statistics
/// use the trailing window of up to [`ROLLING_WINDOW`] rows ending at the
/// current row inclusive, with a minimum window of one row, so they are
/// defined from the first row onward (a single-sample window has std 0).
pub fn build_features(observations: &[Observation]) -> Result<Vec<FeatureRow>, PredictError> {
    validate_sequence(observations)?;

    let series: Vec<(&str, Vec<f64>)> = POLLUTANTS
        .iter()
        .map(|name| {
            let values = observations
                .iter()
                .map(|obs| obs.pollutant(name).unwrap_or_default())
                .collect();
            (*name, values)
        })
        .collect();

    let mut rows = Vec::with_capacity(observations.len());
    for (t, obs) in observations.iter().enumerate() {
        let mut row = FeatureRow::new(obs.time);

        for (name, values) in &series {
            row.set(*name, Some(values[t]));
        }
        row.set("temperature_2m", Some(obs.temperature_2m));
        row.set("relative_humidity_2m", Some(obs.relative_humidity_2m));
        row.set("precipitation", Some(obs.precipitation));
        row.set("surface_pressure", Some(obs.surface_pressure));

        let (wind_u, wind_v) = wind_components(obs.wind_speed_10m, obs.wind_direction_10m);
        row.set("wind_u", Some(wind_u));
        row.set("wind_v", Some(wind_v));

        let encoding = encode_time(&obs.time);
        row.set("hour_sin", Some(encoding.hour_sin));
        row.set("hour_cos", Some(encoding.hour_cos));
        row.set("month_sin", Some(encoding.month_sin));
        row.set("month_cos", Some(encoding.month_cos));

        for (name, values) in &series {
            for lag in LAG_STEPS {
                let lagged = if t >= lag { Some(values[t - lag]) } else { None };
                row.set(format!("{name}_lag_{lag}"), lagged);
            }
            let (mean, std) = rolling_stats(values, t, ROLLING_WINDOW);
            row.set(format!("{name}_rolling_mean_24"), Some(mean));
            row.set(format!("{name}_rolling_std_24"), Some(std));
        }

        rows.push(row);
    }
    Ok(rows)
}

/// Mean and population standard deviation over the trailing window of up
/// to `window` values ending at index `t` inclusive.
fn rolling_stats(values: &[f64], t: usize, window: usize) -> (f64, f64) {
    let start = (t + 1).saturating_sub(window);
    let slice = &values[start..=t];
    let n = slice.len() as f64;
    let mean = slice.iter().sum::<f64>() / n;
    let variance = slice.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt().max(0.0))
}

/// Forward-shifted label columns for training batches:
/// `target_{h}h[t] = value[t + h]`, `None` within `h` rows of the end.
///
/// Training-time only; inference batches never carry these columns.
pub fn shift_targets(values: &[f64], horizons: &[u32]) -> BTreeMap<String, Vec<Option<f64>>> {
    let mut columns = BTreeMap::new();
    for &h in horizons {
        let offset = h as usize;
        let shifted = (0..values.len())
            .map(|t| values.get(t + offset).copied())
            .collect();
        columns.insert(format!("target_{h}h"), shifted);
    }
    columns
}
