use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{AnalysisError, BarFrame, Result, StrategyParams};

use super::{check_prices, metrics_from_pivots};
use crate::extrema::{alternate, Pivot};
use crate::metrics::SwingMetrics;
use crate::strategy::{params_value, parse_params, Strategy, StrategyFamily, SwingStrategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NBarConfig {
    /// Bars on each side that must be strictly lower (higher) than a pivot high (low).
    pub bars: usize,
    pub min_amplitude_pct: f64,
}

impl Default for NBarConfig {
    fn default() -> Self {
        Self {
            bars: 2,
            min_amplitude_pct: 0.0,
        }
    }
}

/// Fixed-window N-bar (fractal) confirmation on highs and lows.
///
/// Slow to confirm but rarely reports a pivot that later gets invalidated.
#[derive(Debug, Clone)]
pub struct NBarSwing {
    config: NBarConfig,
}

impl NBarSwing {
    pub const NAME: &'static str = "n_bar";

    /// # Errors
    /// Returns a configuration error if `bars` is zero.
    pub fn new(config: NBarConfig) -> Result<Self> {
        if config.bars == 0 {
            return Err(AnalysisError::configuration("swing.n_bar.params.bars", "must be >= 1"));
        }
        if config.min_amplitude_pct < 0.0 {
            return Err(AnalysisError::configuration(
                "swing.n_bar.params.min_amplitude_pct",
                "must be >= 0",
            ));
        }
        Ok(Self { config })
    }

    /// # Errors
    /// Returns a configuration error on unknown keys or invalid values.
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Self::new(parse_params(StrategyFamily::Swing, Self::NAME, params)?)
    }

    fn min_window(&self) -> usize {
        2 * self.config.bars + 1
    }

    fn pivots(&self, highs: &[f64], lows: &[f64]) -> Vec<Pivot> {
        let n = self.config.bars;
        let mut pivots = Vec::new();
        for i in n..highs.len() - n {
            let window = (i - n)..=(i + n);
            if window.clone().all(|j| j == i || highs[j] < highs[i]) {
                pivots.push(Pivot::high(i, highs[i]));
            }
            if window.into_iter().all(|j| j == i || lows[j] > lows[i]) {
                pivots.push(Pivot::low(i, lows[i]));
            }
        }
        alternate(pivots)
    }
}

impl Strategy for NBarSwing {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl SwingStrategy for NBarSwing {
    fn compute(&self, zone: &BarFrame) -> Result<SwingMetrics> {
        if zone.len() < self.min_window() {
            return Ok(SwingMetrics::empty(self.info()));
        }
        check_prices(Self::NAME, &[zone.high(), zone.low()])?;

        let pivots = self.pivots(zone.high(), zone.low());
        Ok(metrics_from_pivots(
            &pivots,
            self.config.min_amplitude_pct,
            self.info(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swing::test_support::{frame_from_closes, zigzag_closes};

    #[test]
    fn confirms_interior_pivots_only() {
        let frame = frame_from_closes(&zigzag_closes());
        let swing = NBarSwing::new(NBarConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();

        assert_eq!(m.rally_count, 1);
        assert_eq!(m.drop_count, 1);
        assert!((m.avg_drop_pct - 5.0).abs() < 1e-9);
        assert_eq!(m.max_rally_bars, 3);
    }

    #[test]
    fn zone_shorter_than_window_is_empty() {
        let frame = frame_from_closes(&[100.0, 101.0, 102.0, 101.0]);
        let swing = NBarSwing::new(NBarConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();
        assert_eq!(m.total_swings(), 0);
        assert_eq!(m.max_rally_pct, 0.0);
    }

    #[test]
    fn flat_top_is_not_a_pivot() {
        let frame = frame_from_closes(&[100.0, 101.0, 102.0, 102.0, 101.0, 100.0]);
        let swing = NBarSwing::new(NBarConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();
        assert_eq!(m.total_swings(), 0);
    }

    #[test]
    fn rejects_zero_bars() {
        assert!(NBarSwing::new(NBarConfig {
            bars: 0,
            min_amplitude_pct: 0.0
        })
        .is_err());
    }
}
