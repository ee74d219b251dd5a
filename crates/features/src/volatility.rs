//! Band- and range-based volatility scoring.
//!
//! Measures dispersion only. Turning points come from the swing family.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{stats, AnalysisError, BarFrame, Result, StrategyParams};

use crate::metrics::{VolatilityMetrics, VolatilityRegime, VolatilityTrend};
use crate::strategy::{params_value, parse_params, Strategy, StrategyFamily, VolatilityStrategy};

const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BandsRangeConfig {
    /// Rolling window of the bands (expanding until it fills).
    pub band_period: usize,
    /// Band half-width in standard deviations.
    pub band_std: f64,
    /// Closes within this percentage of a band count as a touch.
    pub touch_tolerance_pct: f64,
    /// True-range change beyond +/- this percentage sets the trend.
    pub trend_threshold_pct: f64,
    pub band_weight: f64,
    pub range_weight: f64,
    /// Band width (percent) that maps to the maximum band component.
    pub band_width_scale_pct: f64,
    /// ATR (percent of price) that maps to the maximum range component.
    pub atr_scale_pct: f64,
}

impl Default for BandsRangeConfig {
    fn default() -> Self {
        Self {
            band_period: 20,
            band_std: 2.0,
            touch_tolerance_pct: 1.0,
            trend_threshold_pct: 20.0,
            band_weight: 0.5,
            range_weight: 0.5,
            band_width_scale_pct: 10.0,
            atr_scale_pct: 5.0,
        }
    }
}

/// Bollinger-style band statistics combined with an ATR-style range measure.
#[derive(Debug, Clone)]
pub struct BandsRangeVolatility {
    config: BandsRangeConfig,
}

struct Band {
    lower: f64,
    upper: f64,
    width_pct: f64,
    spread: f64,
}

impl BandsRangeVolatility {
    pub const NAME: &'static str = "bands_range";
    const MIN_BARS: usize = 2;

    /// # Errors
    /// Returns a configuration error for a period below 2, non-positive
    /// scales, or weights that do not sum to a positive value.
    pub fn new(config: BandsRangeConfig) -> Result<Self> {
        let param = |name: &str| format!("volatility.bands_range.params.{name}");
        if config.band_period < 2 {
            return Err(AnalysisError::configuration(param("band_period"), "must be >= 2"));
        }
        for (name, value) in [
            ("band_std", config.band_std),
            ("band_width_scale_pct", config.band_width_scale_pct),
            ("atr_scale_pct", config.atr_scale_pct),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::configuration(
                    param(name),
                    format!("must be > 0, got {value}"),
                ));
            }
        }
        if config.touch_tolerance_pct < 0.0 || config.trend_threshold_pct < 0.0 {
            return Err(AnalysisError::configuration(
                param("touch_tolerance_pct"),
                "tolerances must be >= 0",
            ));
        }
        if config.band_weight < 0.0
            || config.range_weight < 0.0
            || config.band_weight + config.range_weight <= 0.0
        {
            return Err(AnalysisError::configuration(
                param("band_weight"),
                "weights must be >= 0 with a positive sum",
            ));
        }
        Ok(Self { config })
    }

    /// # Errors
    /// Returns a configuration error on unknown keys or invalid values.
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Self::new(parse_params(StrategyFamily::Volatility, Self::NAME, params)?)
    }

    fn bands(&self, closes: &[f64]) -> Vec<(usize, Band)> {
        let k = self.config.band_std;
        (1..closes.len())
            .filter_map(|i| {
                let start = (i + 1).saturating_sub(self.config.band_period);
                let window = &closes[start..=i];
                let middle = stats::mean(window)?;
                let spread = stats::sample_std(window)?;
                if middle <= 0.0 {
                    return None;
                }
                let (lower, upper) = (middle - k * spread, middle + k * spread);
                Some((
                    i,
                    Band {
                        lower,
                        upper,
                        width_pct: (upper - lower) / middle * 100.0,
                        spread,
                    },
                ))
            })
            .collect()
    }

    fn trend(&self, change_pct: f64) -> VolatilityTrend {
        if change_pct > self.config.trend_threshold_pct {
            VolatilityTrend::Increasing
        } else if change_pct < -self.config.trend_threshold_pct {
            VolatilityTrend::Decreasing
        } else {
            VolatilityTrend::Stable
        }
    }

    fn score(&self, band_width_pct: f64, atr_pct: f64) -> f64 {
        let band = (band_width_pct / self.config.band_width_scale_pct * MAX_SCORE).clamp(0.0, MAX_SCORE);
        let range = (atr_pct / self.config.atr_scale_pct * MAX_SCORE).clamp(0.0, MAX_SCORE);
        let weights = self.config.band_weight + self.config.range_weight;
        ((self.config.band_weight * band + self.config.range_weight * range) / weights)
            .clamp(0.0, MAX_SCORE)
    }
}

/// True range per bar; the first bar has no previous close and uses high - low.
fn true_ranges(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..close.len())
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                hl
            } else {
                let prev = close[i - 1];
                hl.max((high[i] - prev).abs()).max((low[i] - prev).abs())
            }
        })
        .collect()
}

/// Percentage change of mean true range from the first to the second half.
fn range_change_pct(tr: &[f64]) -> f64 {
    let mid = tr.len() / 2;
    match (stats::mean(&tr[..mid]), stats::mean(&tr[mid..])) {
        (Some(first), Some(second)) if first > f64::EPSILON => (second - first) / first * 100.0,
        _ => 0.0,
    }
}

impl Strategy for BandsRangeVolatility {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl VolatilityStrategy for BandsRangeVolatility {
    fn compute(&self, zone: &BarFrame) -> Result<VolatilityMetrics> {
        let n = zone.len();
        if n < Self::MIN_BARS {
            return Err(AnalysisError::insufficient("volatility.bands_range", Self::MIN_BARS, n));
        }
        let closes = zone.close();
        let tolerance = self.config.touch_tolerance_pct / 100.0;

        let bands = self.bands(closes);
        let widths: Vec<f64> = bands.iter().map(|(_, b)| b.width_pct).collect();
        let band_width_mean_pct = stats::mean(&widths).unwrap_or(0.0);
        let band_width_std_pct = stats::sample_std(&widths).unwrap_or(0.0);
        let squeeze_ratio = match widths.last() {
            Some(last) if band_width_mean_pct > f64::EPSILON => last / band_width_mean_pct,
            _ => 0.0,
        };

        let (mut upper_touches, mut lower_touches) = (0, 0);
        for (i, band) in bands.iter().filter(|(_, b)| b.spread > f64::EPSILON) {
            if closes[*i] >= band.upper * (1.0 - tolerance) {
                upper_touches += 1;
            }
            if closes[*i] <= band.lower * (1.0 + tolerance) {
                lower_touches += 1;
            }
        }

        let tr = true_ranges(zone.high(), zone.low(), closes);
        let atr = stats::mean(&tr).unwrap_or(0.0);
        let mean_close = stats::mean(closes).unwrap_or(0.0);
        let atr_pct = if mean_close > 0.0 { atr / mean_close * 100.0 } else { 0.0 };

        let zone_high = zone.high().iter().copied().fold(f64::MIN, f64::max);
        let zone_low = zone.low().iter().copied().fold(f64::MAX, f64::min);
        let normalized_range = if atr > f64::EPSILON {
            ((zone_high - zone_low) / n as f64 / atr).max(0.0)
        } else {
            0.0
        };

        let atr_change_pct = range_change_pct(&tr);
        let score = self.score(band_width_mean_pct, atr_pct);

        Ok(VolatilityMetrics {
            band_width_mean_pct,
            band_width_std_pct,
            squeeze_ratio,
            upper_touches,
            lower_touches,
            normalized_range,
            atr,
            atr_pct,
            atr_change_pct,
            trend: self.trend(atr_change_pct),
            score,
            regime: VolatilityRegime::from_score(score),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn frame(high: &[f64], low: &[f64], close: &[f64]) -> BarFrame {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        BarFrame::builder()
            .index((0..close.len()).map(|i| start + Duration::days(i as i64)).collect())
            .ohlc(close.to_vec(), high.to_vec(), low.to_vec(), close.to_vec())
            .build()
            .unwrap()
    }

    fn widening(n: usize) -> BarFrame {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.7).sin() * 2.0).collect();
        let high: Vec<f64> = close
            .iter()
            .enumerate()
            .map(|(i, c)| c + 0.2 + i as f64 * 0.1)
            .collect();
        let low: Vec<f64> = close
            .iter()
            .enumerate()
            .map(|(i, c)| c - 0.2 - i as f64 * 0.1)
            .collect();
        frame(&high, &low, &close)
    }

    // ============================================
    // Metrics
    // ============================================

    #[test]
    fn flat_prices_have_zero_volatility() {
        let close = vec![100.0; 10];
        let m = BandsRangeVolatility::new(BandsRangeConfig::default())
            .unwrap()
            .compute(&frame(&close, &close, &close))
            .unwrap();
        assert_eq!(m.band_width_mean_pct, 0.0);
        assert_eq!(m.upper_touches + m.lower_touches, 0);
        assert_eq!(m.normalized_range, 0.0);
        assert_eq!(m.score, 0.0);
        assert_eq!(m.regime, VolatilityRegime::Low);
        assert_eq!(m.trend, VolatilityTrend::Stable);
    }

    #[test]
    fn widening_ranges_trend_upwards() {
        let m = BandsRangeVolatility::new(BandsRangeConfig::default())
            .unwrap()
            .compute(&widening(20))
            .unwrap();
        assert_eq!(m.trend, VolatilityTrend::Increasing);
        assert!(m.atr_change_pct > 20.0);
        assert!(m.atr > 0.0);
        assert!(m.normalized_range > 0.0);
        assert!(m.squeeze_ratio >= 0.0);
        assert!((0.0..=10.0).contains(&m.score));
        assert_eq!(m.regime, VolatilityRegime::from_score(m.score));
    }

    #[test]
    fn true_range_uses_previous_close_gaps() {
        let tr = true_ranges(&[10.0, 15.0], &[9.0, 14.0], &[9.5, 14.5]);
        assert!((tr[0] - 1.0).abs() < 1e-12);
        assert!((tr[1] - 5.5).abs() < 1e-12);
    }

    #[test]
    fn breakout_touches_upper_band() {
        let mut close = vec![100.0, 100.5, 99.5, 100.0, 100.5, 99.5, 100.0];
        close.push(110.0);
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let m = BandsRangeVolatility::new(BandsRangeConfig {
            band_std: 1.0,
            ..BandsRangeConfig::default()
        })
        .unwrap()
        .compute(&frame(&high, &low, &close))
        .unwrap();
        assert!(m.upper_touches >= 1);
        assert!(m.squeeze_ratio > 1.0);
    }

    #[test]
    fn score_is_weighted_and_capped() {
        let v = BandsRangeVolatility::new(BandsRangeConfig::default()).unwrap();
        assert!((v.score(5.0, 2.5) - 5.0).abs() < 1e-12);
        assert!((v.score(100.0, 100.0) - 10.0).abs() < 1e-12);
        assert_eq!(v.score(0.0, 0.0), 0.0);
    }

    // ============================================
    // Errors
    // ============================================

    #[test]
    fn single_bar_is_insufficient() {
        let err = BandsRangeVolatility::new(BandsRangeConfig::default())
            .unwrap()
            .compute(&frame(&[101.0], &[99.0], &[100.0]))
            .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn rejects_zero_weights() {
        let err = BandsRangeVolatility::new(BandsRangeConfig {
            band_weight: 0.0,
            range_weight: 0.0,
            ..BandsRangeConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("band_weight"));
    }
}
