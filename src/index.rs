//! Concentration-to-severity classification: the per-pollutant 3-tier
//! risk level and the 6-level composite air-quality index.
//!
//! Both classifications are table-driven from [`crate::catalog`] and share
//! one boundary rule: a value equal to a cut point belongs to the higher
//! tier.

use serde::Serialize;

use crate::catalog;
use crate::error::PredictError;

/// Three-tier risk classification of a predicted concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Advisory message surfaced with the classification.
    pub fn message(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Air quality is satisfactory; outdoor activity is safe.",
            RiskLevel::Medium => "Sensitive groups should limit prolonged outdoor exertion.",
            RiskLevel::High => "Everyone may experience health effects; avoid outdoor exertion.",
        }
    }
}

/// Classify one pollutant's predicted concentration against its 3-tier
/// cut points.
pub fn risk_level(target: &str, value: f64) -> Result<RiskLevel, PredictError> {
    let table = catalog::risk_table(target)
        .ok_or_else(|| PredictError::InvalidTarget(target.to_string()))?;
    let level = if value >= table.high {
        RiskLevel::High
    } else if value >= table.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };
    Ok(level)
}

/// Map one pollutant's predicted concentration to its 1-6 index tier.
///
/// Below the lowest breakpoint is tier 1; at or above the highest is
/// tier 6.
pub fn aqi_tier(target: &str, value: f64) -> Result<u8, PredictError> {
    let table = catalog::aqi_table(target)
        .ok_or_else(|| PredictError::InvalidTarget(target.to_string()))?;
    let tier = 1 + table
        .breakpoints
        .iter()
        .filter(|breakpoint| value >= **breakpoint)
        .count();
    Ok(tier as u8)
}

/// Composite index across pollutants: the worst per-pollutant tier wins.
pub fn composite_index<I>(tiers: I) -> u8
where
    I: IntoIterator<Item = u8>,
{
    tiers.into_iter().max().unwrap_or(1)
}
