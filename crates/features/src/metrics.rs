//! Fixed-shape metric records produced by the feature strategies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name and parameters of the strategy that produced a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub params: Value,
}

impl StrategyInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Rally/drop statistics inside one zone.
///
/// Amplitudes are in percent, durations in bars, speeds in percent per bar.
/// All fields are zero when no swing of that direction was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingMetrics {
    pub rally_count: usize,
    pub drop_count: usize,

    pub avg_rally_pct: f64,
    pub max_rally_pct: f64,
    pub min_rally_pct: f64,
    pub std_rally_pct: f64,
    pub median_rally_pct: f64,

    pub avg_drop_pct: f64,
    pub max_drop_pct: f64,
    pub min_drop_pct: f64,
    pub std_drop_pct: f64,
    pub median_drop_pct: f64,

    pub avg_rally_bars: f64,
    pub max_rally_bars: usize,
    pub avg_drop_bars: f64,
    pub max_drop_bars: usize,

    pub avg_rally_speed: f64,
    pub max_rally_speed: f64,
    pub avg_drop_speed: f64,
    pub max_drop_speed: f64,

    /// Average rally amplitude over average drop amplitude (0 when undefined).
    pub rally_to_drop_ratio: f64,
    /// Average rally duration over average drop duration (0 when undefined).
    pub duration_symmetry: f64,

    /// Strategy that detected the swings.
    pub strategy: StrategyInfo,
}

impl SwingMetrics {
    /// All-zero record for zones too short for the detection algorithm.
    #[must_use]
    pub fn empty(strategy: StrategyInfo) -> Self {
        Self {
            rally_count: 0,
            drop_count: 0,
            avg_rally_pct: 0.0,
            max_rally_pct: 0.0,
            min_rally_pct: 0.0,
            std_rally_pct: 0.0,
            median_rally_pct: 0.0,
            avg_drop_pct: 0.0,
            max_drop_pct: 0.0,
            min_drop_pct: 0.0,
            std_drop_pct: 0.0,
            median_drop_pct: 0.0,
            avg_rally_bars: 0.0,
            max_rally_bars: 0,
            avg_drop_bars: 0.0,
            max_drop_bars: 0,
            avg_rally_speed: 0.0,
            max_rally_speed: 0.0,
            avg_drop_speed: 0.0,
            max_drop_speed: 0.0,
            rally_to_drop_ratio: 0.0,
            duration_symmetry: 0.0,
            strategy,
        }
    }

    #[must_use]
    pub fn total_swings(&self) -> usize {
        self.rally_count + self.drop_count
    }
}

/// Coarse label of the signal distribution's peakedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    /// Kurtosis below 2.5: flat, sustained histogram.
    Plateau,
    /// Kurtosis between 2.5 and 3.5.
    Normal,
    /// Kurtosis above 3.5: concentrated spike.
    SharpPeak,
}

impl ShapeClass {
    #[must_use]
    pub fn from_kurtosis(kurtosis: f64) -> Self {
        if kurtosis < 2.5 {
            Self::Plateau
        } else if kurtosis <= 3.5 {
            Self::Normal
        } else {
            Self::SharpPeak
        }
    }
}

/// Distribution shape of the signal/histogram column within a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeMetrics {
    pub skewness: f64,
    /// Pearson kurtosis (Gaussian = 3).
    pub kurtosis: f64,
    /// Standard deviation of the first difference.
    pub smoothness: Option<f64>,
    pub shape_class: ShapeClass,
    pub sample_size: usize,
}

impl ShapeMetrics {
    /// Defaults returned for fewer than three points.
    #[must_use]
    pub fn degenerate(sample_size: usize) -> Self {
        Self {
            skewness: 0.0,
            kurtosis: 3.0,
            smoothness: None,
            shape_class: ShapeClass::Normal,
            sample_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    None,
    Regular,
    Hidden,
    /// Both regular and hidden events were found.
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceDirection {
    Bullish,
    Bearish,
    None,
}

/// Price/signal divergence summary.
///
/// `count == 0` implies `kind == None` and `direction == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceMetrics {
    pub kind: DivergenceKind,
    pub count: usize,
    pub regular_count: usize,
    pub hidden_count: usize,
    pub bullish_count: usize,
    pub bearish_count: usize,
    /// Mean of `|price_slope| * |signal_slope|` over accepted events.
    pub strength: f64,
    pub direction: DivergenceDirection,
}

impl DivergenceMetrics {
    #[must_use]
    pub fn none() -> Self {
        Self {
            kind: DivergenceKind::None,
            count: 0,
            regular_count: 0,
            hidden_count: 0,
            bullish_count: 0,
            bearish_count: 0,
            strength: 0.0,
            direction: DivergenceDirection::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
    Extreme,
}

impl VolatilityRegime {
    /// Fixed thresholds: < 2.5 low, < 5.0 medium, < 7.5 high, else extreme.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 2.5 {
            Self::Low
        } else if score < 5.0 {
            Self::Medium
        } else if score < 7.5 {
            Self::High
        } else {
            Self::Extreme
        }
    }
}

/// Band- and range-based volatility summary of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    /// Mean band width as percent of the middle band.
    pub band_width_mean_pct: f64,
    pub band_width_std_pct: f64,
    /// Last band width over the mean band width.
    pub squeeze_ratio: f64,
    pub upper_touches: usize,
    pub lower_touches: usize,
    /// Zone high-low range per bar over the average true range.
    pub normalized_range: f64,
    /// Average true range over the zone.
    pub atr: f64,
    /// Average true range as percent of mean close.
    pub atr_pct: f64,
    /// Change of true range from the first to the second half of the zone, in percent.
    pub atr_change_pct: f64,
    pub trend: VolatilityTrend,
    /// Composite score in [0, 10].
    pub score: f64,
    pub regime: VolatilityRegime,
}

/// Volume confirmation metrics; any field may be null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMetrics {
    /// Average zone volume over the baseline volume.
    pub volume_zone_ratio: Option<f64>,
    /// Entry-bar volume change versus the baseline, in percent.
    pub entry_volume_change_pct: Option<f64>,
    /// Pearson correlation of volume and the signal column.
    pub volume_signal_correlation: Option<f64>,
    pub avg_volume_zone: Option<f64>,
}

impl VolumeMetrics {
    /// Record used when the zone carries no volume column.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            volume_zone_ratio: None,
            entry_volume_change_pct: None,
            volume_signal_correlation: None,
            avg_volume_zone: None,
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.volume_zone_ratio.is_none()
            && self.entry_volume_change_pct.is_none()
            && self.volume_signal_correlation.is_none()
            && self.avg_volume_zone.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regime_thresholds_are_monotonic() {
        assert_eq!(VolatilityRegime::from_score(0.0), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::from_score(2.49), VolatilityRegime::Low);
        assert_eq!(VolatilityRegime::from_score(2.5), VolatilityRegime::Medium);
        assert_eq!(VolatilityRegime::from_score(5.0), VolatilityRegime::High);
        assert_eq!(VolatilityRegime::from_score(7.5), VolatilityRegime::Extreme);
        assert_eq!(VolatilityRegime::from_score(10.0), VolatilityRegime::Extreme);

        let mut last = VolatilityRegime::Low;
        for step in 0..=100 {
            let regime = VolatilityRegime::from_score(f64::from(step) / 10.0);
            assert!(regime >= last);
            last = regime;
        }
    }

    #[test]
    fn shape_class_from_kurtosis() {
        assert_eq!(ShapeClass::from_kurtosis(1.8), ShapeClass::Plateau);
        assert_eq!(ShapeClass::from_kurtosis(3.0), ShapeClass::Normal);
        assert_eq!(ShapeClass::from_kurtosis(6.0), ShapeClass::SharpPeak);
    }

    #[test]
    fn empty_swing_metrics_are_all_zero() {
        let m = SwingMetrics::empty(StrategyInfo::new("zigzag", Value::Null));
        assert_eq!(m.total_swings(), 0);
        assert_eq!(m.avg_rally_pct, 0.0);
        assert_eq!(m.rally_to_drop_ratio, 0.0);
    }

    #[test]
    fn divergence_none_respects_invariants() {
        let m = DivergenceMetrics::none();
        assert_eq!(m.count, 0);
        assert_eq!(m.kind, DivergenceKind::None);
        assert_eq!(m.direction, DivergenceDirection::None);
    }

    #[test]
    fn unavailable_volume_has_all_nulls() {
        assert!(VolumeMetrics::unavailable().is_unavailable());
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ShapeClass::SharpPeak).unwrap(),
            "\"sharp_peak\""
        );
        assert_eq!(
            serde_json::to_string(&VolatilityRegime::Extreme).unwrap(),
            "\"extreme\""
        );
    }
}
