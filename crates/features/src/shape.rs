//! Distribution-shape strategy for the signal column.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{stats, Result, StrategyParams};

use crate::metrics::{ShapeClass, ShapeMetrics};
use crate::strategy::{params_value, parse_params, ShapeStrategy, Strategy, StrategyFamily};

/// Gaussian kurtosis, reported when the moments are undefined.
pub const GAUSSIAN_KURTOSIS: f64 = 3.0;

const MIN_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MomentsConfig {
    pub compute_smoothness: bool,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        Self {
            compute_smoothness: true,
        }
    }
}

/// Skewness and Pearson kurtosis of the signal, plus first-difference smoothness.
#[derive(Debug, Clone, Default)]
pub struct MomentsShape {
    config: MomentsConfig,
}

impl MomentsShape {
    pub const NAME: &'static str = "moments";

    #[must_use]
    pub fn new(config: MomentsConfig) -> Self {
        Self { config }
    }

    /// # Errors
    /// Returns a configuration error on unknown keys.
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Ok(Self::new(parse_params(StrategyFamily::Shape, Self::NAME, params)?))
    }
}

impl Strategy for MomentsShape {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl ShapeStrategy for MomentsShape {
    fn compute(&self, signal: &[f64]) -> Result<ShapeMetrics> {
        let values: Vec<f64> = signal.iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < MIN_POINTS {
            return Ok(ShapeMetrics::degenerate(values.len()));
        }

        // zero variance: moments undefined, report a symmetric Gaussian-like shape
        let skewness = stats::skewness(&values).unwrap_or(0.0);
        let kurtosis = stats::kurtosis(&values).unwrap_or(GAUSSIAN_KURTOSIS);

        let smoothness = if self.config.compute_smoothness {
            stats::sample_std(&stats::diff(&values))
        } else {
            None
        };

        Ok(ShapeMetrics {
            skewness,
            kurtosis,
            smoothness,
            shape_class: ShapeClass::from_kurtosis(kurtosis),
            sample_size: values.len(),
        })
    }
}
