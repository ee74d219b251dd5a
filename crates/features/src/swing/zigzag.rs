use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{AnalysisError, BarFrame, Result, StrategyParams};

use super::{check_prices, metrics_from_pivots, pivot_series};
use crate::extrema::{alternate, Pivot};
use crate::metrics::SwingMetrics;
use crate::strategy::{params_value, parse_params, Strategy, StrategyFamily, SwingStrategy};

/// Parameters of the deviation-filtered swing detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZigZagConfig {
    /// Reversal needed to confirm a pivot, in percent of the pivot price.
    pub deviation_pct: f64,
    /// Bars between a candidate pivot and the bar that confirms it.
    pub min_bars: usize,
    /// Legs smaller than this are ignored in the statistics.
    pub min_amplitude_pct: f64,
    /// Detect on highs/lows instead of closes.
    pub use_high_low: bool,
    /// Count the final, unconfirmed leg up to the last extreme.
    pub include_last_leg: bool,
}

impl Default for ZigZagConfig {
    fn default() -> Self {
        Self {
            deviation_pct: 1.0,
            min_bars: 1,
            min_amplitude_pct: 0.0,
            use_high_low: true,
            include_last_leg: true,
        }
    }
}

/// Deviation-filtered ("zigzag") swing detection.
///
/// A running extreme becomes a pivot once price reverses from it by at least
/// `deviation_pct`. Noise smaller than the deviation never produces a swing,
/// which keeps rally and drop counts balanced.
#[derive(Debug, Clone)]
pub struct ZigZagSwing {
    config: ZigZagConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trend {
    Unknown,
    Up,
    Down,
}

impl ZigZagSwing {
    pub const NAME: &'static str = "zigzag";

    /// # Errors
    /// Returns a configuration error if `deviation_pct` is not positive.
    pub fn new(config: ZigZagConfig) -> Result<Self> {
        if !(config.deviation_pct.is_finite() && config.deviation_pct > 0.0) {
            return Err(AnalysisError::configuration(
                "swing.zigzag.params.deviation_pct",
                format!("must be > 0, got {}", config.deviation_pct),
            ));
        }
        if config.min_amplitude_pct < 0.0 {
            return Err(AnalysisError::configuration(
                "swing.zigzag.params.min_amplitude_pct",
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

    #[must_use]
    pub fn config(&self) -> &ZigZagConfig {
        &self.config
    }

    fn min_window(&self) -> usize {
        self.config.min_bars + 2
    }

    fn pivots(&self, highs: &[f64], lows: &[f64]) -> Vec<Pivot> {
        let up = 1.0 + self.config.deviation_pct / 100.0;
        let down = 1.0 - self.config.deviation_pct / 100.0;

        let mut pivots = Vec::new();
        let mut trend = Trend::Unknown;
        let (mut hi_idx, mut hi) = (0, highs[0]);
        let (mut lo_idx, mut lo) = (0, lows[0]);

        for i in 1..highs.len() {
            match trend {
                Trend::Unknown => {
                    if highs[i] >= lo * up {
                        pivots.push(Pivot::low(lo_idx, lo));
                        trend = Trend::Up;
                        (hi_idx, hi) = (i, highs[i]);
                    } else if lows[i] <= hi * down {
                        pivots.push(Pivot::high(hi_idx, hi));
                        trend = Trend::Down;
                        (lo_idx, lo) = (i, lows[i]);
                    } else {
                        if highs[i] > hi {
                            (hi_idx, hi) = (i, highs[i]);
                        }
                        if lows[i] < lo {
                            (lo_idx, lo) = (i, lows[i]);
                        }
                    }
                }
                Trend::Up => {
                    if highs[i] > hi {
                        (hi_idx, hi) = (i, highs[i]);
                    } else if lows[i] <= hi * down && i - hi_idx >= self.config.min_bars {
                        pivots.push(Pivot::high(hi_idx, hi));
                        trend = Trend::Down;
                        (lo_idx, lo) = (i, lows[i]);
                    }
                }
                Trend::Down => {
                    if lows[i] < lo {
                        (lo_idx, lo) = (i, lows[i]);
                    } else if highs[i] >= lo * up && i - lo_idx >= self.config.min_bars {
                        pivots.push(Pivot::low(lo_idx, lo));
                        trend = Trend::Up;
                        (hi_idx, hi) = (i, highs[i]);
                    }
                }
            }
        }

        if self.config.include_last_leg {
            match trend {
                Trend::Up => pivots.push(Pivot::high(hi_idx, hi)),
                Trend::Down => pivots.push(Pivot::low(lo_idx, lo)),
                Trend::Unknown => {}
            }
        }

        alternate(pivots)
    }
}

impl Strategy for ZigZagSwing {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl SwingStrategy for ZigZagSwing {
    fn compute(&self, zone: &BarFrame) -> Result<SwingMetrics> {
        if zone.len() < self.min_window() {
            return Ok(SwingMetrics::empty(self.info()));
        }
        let (highs, lows) = pivot_series(zone, self.config.use_high_low);
        check_prices(Self::NAME, &[highs, lows])?;

        let pivots = self.pivots(highs, lows);
        tracing::debug!(strategy = Self::NAME, pivots = pivots.len(), "zigzag pivots");
        Ok(metrics_from_pivots(
            &pivots,
            self.config.min_amplitude_pct,
            self.info(),
        ))
    }
}
