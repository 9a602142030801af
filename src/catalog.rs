//! Static target catalog: which pollutants can be forecast, which feature
//! columns are legal model input for each, and the classification tables.
//!
//! The catalog is resolved once at startup and never mutated. Feature
//! selection is table-driven here rather than matched against column names
//! at call sites, and the leakage rule is validated before the service
//! accepts traffic.

use crate::error::PredictError;

/// Pollutant series in catalog order. This order is authoritative for
/// feature-vector assembly.
pub const POLLUTANTS: [&str; 4] = ["pm2_5", "pm10", "ozone", "nitrogen_dioxide"];

/// Forecast horizons supported by every target, in hours.
pub const HORIZONS: [u32; 5] = [1, 12, 24, 72, 168];

/// Meteorological pass-through columns, always legal model input.
pub const METEO_FEATURES: [&str; 4] = [
    "temperature_2m",
    "relative_humidity_2m",
    "precipitation",
    "surface_pressure",
];

/// Wind-vector columns produced by the encoder (replace raw speed/direction).
pub const WIND_FEATURES: [&str; 2] = ["wind_u", "wind_v"];

/// Cyclical time encodings, always legal model input.
pub const CYCLICAL_FEATURES: [&str; 4] = ["hour_sin", "hour_cos", "month_sin", "month_cos"];

/// Derived-column suffixes produced per pollutant by the feature builder.
pub const DERIVED_SUFFIXES: [&str; 4] = ["lag_1", "lag_24", "rolling_mean_24", "rolling_std_24"];

/// Catalog entry for one forecastable pollutant.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub name: &'static str,
    pub horizons: Vec<u32>,
    /// Ordered model-input columns for this target.
    pub features: Vec<String>,
    /// Columns that would leak the label; never legal input for this target.
    pub excluded: Vec<String>,
}

/// The full target catalog, leakage-validated at construction.
#[derive(Debug)]
pub struct Catalog {
    specs: Vec<TargetSpec>,
}

impl Catalog {
    pub fn new() -> Result<Self, PredictError> {
        let specs = POLLUTANTS.iter().map(|name| build_spec(name)).collect();
        let catalog = Self { specs };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn get(&self, target: &str) -> Result<&TargetSpec, PredictError> {
        self.specs
            .iter()
            .find(|spec| spec.name == target)
            .ok_or_else(|| PredictError::InvalidTarget(target.to_string()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|spec| spec.name)
    }

    /// Reject any spec whose legal-feature set contains a column derived
    /// from its own label. A hit here is a configuration error, so this
    /// runs at startup, not per-request.
    pub fn validate(&self) -> Result<(), PredictError> {
        for spec in &self.specs {
            for column in &spec.features {
                if forbidden_columns(spec.name).iter().any(|f| f == column) {
                    return Err(PredictError::LeakageConfiguration {
                        target: spec.name.to_string(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The raw column plus the four derived columns of `target`.
fn forbidden_columns(target: &str) -> Vec<String> {
    let mut columns = vec![target.to_string()];
    for suffix in DERIVED_SUFFIXES {
        columns.push(format!("{target}_{suffix}"));
    }
    columns
}

fn build_spec(name: &'static str) -> TargetSpec {
    let mut features = Vec::new();

    // Cross-pollutant signal: raw value and derived columns of every
    // pollutant except the active label.
    for pollutant in POLLUTANTS {
        if pollutant != name {
            features.push(pollutant.to_string());
        }
    }
    for column in METEO_FEATURES {
        features.push(column.to_string());
    }
    for column in WIND_FEATURES {
        features.push(column.to_string());
    }
    for column in CYCLICAL_FEATURES {
        features.push(column.to_string());
    }
    for pollutant in POLLUTANTS {
        if pollutant != name {
            for suffix in DERIVED_SUFFIXES {
                features.push(format!("{pollutant}_{suffix}"));
            }
        }
    }

    TargetSpec {
        name,
        horizons: HORIZONS.to_vec(),
        features,
        excluded: forbidden_columns(name),
    }
}

/// Upper breakpoints for the six-level air-quality index. Tier `n + 1`
/// starts at `breakpoints[n]`; a value equal to a breakpoint belongs to
/// the higher tier. Below the lowest breakpoint is tier 1, at or above
/// the highest is tier 6.
#[derive(Debug, Clone, Copy)]
pub struct AqiTable {
    pub pollutant: &'static str,
    pub breakpoints: [f64; 5],
}

pub const AQI_TABLES: [AqiTable; 4] = [
    AqiTable {
        pollutant: "pm2_5",
        breakpoints: [25.0, 35.0, 55.0, 75.0, 110.0],
    },
    AqiTable {
        pollutant: "pm10",
        breakpoints: [20.0, 40.0, 50.0, 100.0, 150.0],
    },
    AqiTable {
        pollutant: "ozone",
        breakpoints: [50.0, 100.0, 130.0, 240.0, 380.0],
    },
    AqiTable {
        pollutant: "nitrogen_dioxide",
        breakpoints: [40.0, 90.0, 120.0, 230.0, 340.0],
    },
];

pub fn aqi_table(target: &str) -> Option<&'static AqiTable> {
    AQI_TABLES.iter().find(|table| table.pollutant == target)
}

/// Three-tier risk cut points: low below `medium`, medium in
/// `[medium, high)`, high at or above `high`. Same boundary rule as the
/// index tables: the boundary value belongs to the higher tier.
#[derive(Debug, Clone, Copy)]
pub struct RiskTable {
    pub pollutant: &'static str,
    pub medium: f64,
    pub high: f64,
}

pub const RISK_TABLES: [RiskTable; 4] = [
    RiskTable {
        pollutant: "pm2_5",
        medium: 35.0,
        high: 55.0,
    },
    RiskTable {
        pollutant: "pm10",
        medium: 50.0,
        high: 100.0,
    },
    RiskTable {
        pollutant: "ozone",
        medium: 100.0,
        high: 180.0,
    },
    RiskTable {
        pollutant: "nitrogen_dioxide",
        medium: 90.0,
        high: 200.0,
    },
];

pub fn risk_table(target: &str) -> Option<&'static RiskTable> {
    RISK_TABLES.iter().find(|table| table.pollutant == target)
}
