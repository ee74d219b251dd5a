//! Strategy contracts, one trait per metric family.
//!
//! Each family has a fixed method signature returning its metrics record, so
//! swapping algorithms never changes the shape of the extracted features.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{AnalysisError, BarFrame, Result, StrategyParams};

use crate::metrics::{
    DivergenceMetrics, ShapeMetrics, StrategyInfo, SwingMetrics, VolatilityMetrics, VolumeMetrics,
};

/// Metric family a strategy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Swing,
    Shape,
    Divergence,
    Volatility,
    Volume,
}

impl StrategyFamily {
    pub const ALL: [Self; 5] = [
        Self::Swing,
        Self::Shape,
        Self::Divergence,
        Self::Volatility,
        Self::Volume,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Swing => "swing",
            Self::Shape => "shape",
            Self::Divergence => "divergence",
            Self::Volatility => "volatility",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by every strategy.
pub trait Strategy: Send + Sync {
    /// Registered name of the strategy.
    fn name(&self) -> &str;

    /// Effective parameters, recorded for reproducibility.
    fn params(&self) -> Value;

    fn info(&self) -> StrategyInfo {
        StrategyInfo::new(self.name(), self.params())
    }
}

/// Peak/trough detection and swing statistics.
pub trait SwingStrategy: Strategy {
    /// Computes swing metrics for one zone.
    ///
    /// Zones shorter than the algorithm's minimum window yield
    /// [`SwingMetrics::empty`] rather than an error.
    ///
    /// # Errors
    /// Returns an error only when the price data is unusable (e.g. non-positive prices).
    fn compute(&self, zone: &BarFrame) -> Result<SwingMetrics>;
}

/// Distribution shape of the signal column.
pub trait ShapeStrategy: Strategy {
    /// Computes shape metrics of a signal series.
    ///
    /// # Errors
    /// Implementations may fail on unusable input; fewer than three points is
    /// not an error.
    fn compute(&self, signal: &[f64]) -> Result<ShapeMetrics>;
}

/// Price/signal divergence detection.
pub trait DivergenceStrategy: Strategy {
    /// # Errors
    /// Returns an error if the configured signal column is missing.
    fn compute(&self, zone: &BarFrame) -> Result<DivergenceMetrics>;
}

/// Dispersion measures. Never used for turning-point detection.
pub trait VolatilityStrategy: Strategy {
    /// # Errors
    /// Returns an error if the zone is too short to measure dispersion.
    fn compute(&self, zone: &BarFrame) -> Result<VolatilityMetrics>;
}

/// Volume confirmation.
pub trait VolumeStrategy: Strategy {
    /// Computes volume metrics; a missing volume column or baseline degrades
    /// to null fields.
    ///
    /// # Errors
    /// Implementations may fail on malformed data.
    fn compute(&self, zone: &BarFrame, baseline_volume: Option<f64>) -> Result<VolumeMetrics>;
}

/// Decodes a strategy's typed configuration from its JSON parameters.
///
/// # Errors
/// Returns [`AnalysisError::Configuration`] naming `family.name.params` when
/// a key is unknown or has the wrong type.
pub fn parse_params<T: DeserializeOwned>(
    family: StrategyFamily,
    name: &str,
    params: &StrategyParams,
) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| {
        AnalysisError::configuration(format!("{family}.{name}.params"), e.to_string())
    })
}

/// Serializes a strategy configuration for [`Strategy::params`].
pub(crate) fn params_value<T: Serialize>(config: &T) -> Value {
    serde_json::to_value(config).unwrap_or(Value::Null)
}
