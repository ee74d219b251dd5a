//! Swing detection strategies.
//!
//! Three algorithms share one statistics builder:
//! - `zigzag` (default): deviation-filtered reversals, best rally/drop balance
//! - `local_extrema`: distance/prominence local maxima and minima
//! - `n_bar`: fixed-window fractal confirmation

mod local_extrema;
mod n_bar;
mod zigzag;

pub use local_extrema::{LocalExtremaConfig, LocalExtremaSwing};
pub use n_bar::{NBarConfig, NBarSwing};
pub use zigzag::{ZigZagConfig, ZigZagSwing};

use zone_analysis_core::{stats, AnalysisError, Result};

use crate::extrema::{Pivot, PivotKind};
use crate::metrics::{StrategyInfo, SwingMetrics};
use crate::strategy::StrategyFamily;

/// One directional leg between two alternating pivots.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    amplitude_pct: f64,
    bars: usize,
}

impl Leg {
    fn speed(&self) -> f64 {
        self.amplitude_pct / self.bars.max(1) as f64
    }
}

/// Builds swing statistics from alternating pivots.
///
/// Legs below `min_amplitude_pct` are discarded before any statistic is taken.
pub(crate) fn metrics_from_pivots(
    pivots: &[Pivot],
    min_amplitude_pct: f64,
    strategy: StrategyInfo,
) -> SwingMetrics {
    let mut rallies = Vec::new();
    let mut drops = Vec::new();

    for pair in pivots.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.index <= a.index || a.price <= 0.0 {
            continue;
        }
        let bars = b.index - a.index;
        match (a.kind, b.kind) {
            (PivotKind::Low, PivotKind::High) => {
                let amplitude_pct = (b.price - a.price) / a.price * 100.0;
                if amplitude_pct > 0.0 && amplitude_pct >= min_amplitude_pct {
                    rallies.push(Leg { amplitude_pct, bars });
                }
            }
            (PivotKind::High, PivotKind::Low) => {
                let amplitude_pct = (a.price - b.price) / a.price * 100.0;
                if amplitude_pct > 0.0 && amplitude_pct >= min_amplitude_pct {
                    drops.push(Leg { amplitude_pct, bars });
                }
            }
            _ => {}
        }
    }

    let mut metrics = SwingMetrics::empty(strategy);
    let rally = LegStats::from_legs(&rallies);
    let drop = LegStats::from_legs(&drops);

    metrics.rally_count = rallies.len();
    metrics.avg_rally_pct = rally.avg;
    metrics.max_rally_pct = rally.max;
    metrics.min_rally_pct = rally.min;
    metrics.std_rally_pct = rally.std;
    metrics.median_rally_pct = rally.median;
    metrics.avg_rally_bars = rally.avg_bars;
    metrics.max_rally_bars = rally.max_bars;
    metrics.avg_rally_speed = rally.avg_speed;
    metrics.max_rally_speed = rally.max_speed;

    metrics.drop_count = drops.len();
    metrics.avg_drop_pct = drop.avg;
    metrics.max_drop_pct = drop.max;
    metrics.min_drop_pct = drop.min;
    metrics.std_drop_pct = drop.std;
    metrics.median_drop_pct = drop.median;
    metrics.avg_drop_bars = drop.avg_bars;
    metrics.max_drop_bars = drop.max_bars;
    metrics.avg_drop_speed = drop.avg_speed;
    metrics.max_drop_speed = drop.max_speed;

    metrics.rally_to_drop_ratio = safe_ratio(rally.avg, drop.avg);
    metrics.duration_symmetry = safe_ratio(rally.avg_bars, drop.avg_bars);
    metrics
}

#[derive(Debug, Default)]
struct LegStats {
    avg: f64,
    max: f64,
    min: f64,
    std: f64,
    median: f64,
    avg_bars: f64,
    max_bars: usize,
    avg_speed: f64,
    max_speed: f64,
}

impl LegStats {
    fn from_legs(legs: &[Leg]) -> Self {
        if legs.is_empty() {
            return Self::default();
        }
        let amplitudes: Vec<f64> = legs.iter().map(|l| l.amplitude_pct).collect();
        let bars: Vec<f64> = legs.iter().map(|l| l.bars as f64).collect();
        let speeds: Vec<f64> = legs.iter().map(Leg::speed).collect();

        Self {
            avg: stats::mean(&amplitudes).unwrap_or(0.0),
            max: amplitudes.iter().copied().fold(f64::MIN, f64::max),
            min: amplitudes.iter().copied().fold(f64::MAX, f64::min),
            std: stats::sample_std(&amplitudes).unwrap_or(0.0),
            median: stats::median(&amplitudes).unwrap_or(0.0),
            avg_bars: stats::mean(&bars).unwrap_or(0.0),
            max_bars: legs.iter().map(|l| l.bars).max().unwrap_or(0),
            avg_speed: stats::mean(&speeds).unwrap_or(0.0),
            max_speed: speeds.iter().copied().fold(0.0, f64::max),
        }
    }
}

fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > f64::EPSILON && numerator.is_finite() {
        (numerator / denominator).max(0.0)
    } else {
        0.0
    }
}

/// Price series used for pivot detection: (highs, lows).
pub(crate) fn pivot_series<'a>(
    zone: &'a zone_analysis_core::BarFrame,
    use_high_low: bool,
) -> (&'a [f64], &'a [f64]) {
    if use_high_low {
        (zone.high(), zone.low())
    } else {
        (zone.close(), zone.close())
    }
}

/// Rejects non-positive or non-finite prices, which make percentages meaningless.
pub(crate) fn check_prices(name: &str, series: &[&[f64]]) -> Result<()> {
    for values in series {
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(AnalysisError::strategy(
                StrategyFamily::Swing.as_str(),
                name,
                format!("price series contains unusable value {bad}"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use zone_analysis_core::BarFrame;

    /// Frame whose high/low/open equal the close.
    pub fn frame_from_closes(closes: &[f64]) -> BarFrame {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let index = (0..closes.len())
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        BarFrame::builder()
            .index(index)
            .ohlc(
                closes.to_vec(),
                closes.to_vec(),
                closes.to_vec(),
                closes.to_vec(),
            )
            .build()
            .unwrap()
    }

    /// Up 100 -> 110, down to 104.5, up to 115, down to 109.25.
    pub fn zigzag_closes() -> Vec<f64> {
        vec![
            100.0, 102.0, 105.0, 108.0, 110.0, 108.0, 106.0, 104.5, 107.0, 111.0, 115.0, 113.0,
            111.0, 109.25,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn info() -> StrategyInfo {
        StrategyInfo::new("test", Value::Null)
    }

    #[test]
    fn metrics_from_alternating_pivots() {
        let pivots = vec![
            Pivot::low(0, 100.0),
            Pivot::high(4, 110.0),
            Pivot::low(7, 99.0),
            Pivot::high(10, 108.9),
        ];
        let m = metrics_from_pivots(&pivots, 0.0, info());

        assert_eq!(m.rally_count, 2);
        assert_eq!(m.drop_count, 1);
        assert!((m.avg_rally_pct - 10.0).abs() < 1e-9);
        assert!((m.avg_drop_pct - 10.0).abs() < 1e-9);
        assert_eq!(m.max_rally_bars, 4);
        assert!((m.avg_rally_bars - 3.5).abs() < 1e-9);
        assert!((m.avg_drop_speed - 10.0 / 3.0).abs() < 1e-9);
        assert!((m.rally_to_drop_ratio - 1.0).abs() < 1e-9);
        assert!((m.duration_symmetry - 3.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn min_amplitude_filters_legs() {
        let pivots = vec![
            Pivot::low(0, 100.0),
            Pivot::high(2, 100.5),
            Pivot::low(4, 100.2),
            Pivot::high(8, 110.0),
        ];
        let m = metrics_from_pivots(&pivots, 1.0, info());
        assert_eq!(m.rally_count, 1);
        assert_eq!(m.drop_count, 0);
        assert_eq!(m.avg_drop_pct, 0.0);
        assert_eq!(m.max_drop_pct, 0.0);
        assert_eq!(m.rally_to_drop_ratio, 0.0);
    }

    #[test]
    fn no_pivots_means_zeroes_without_nan() {
        let m = metrics_from_pivots(&[], 0.0, info());
        assert_eq!(m.total_swings(), 0);
        assert!(!m.avg_rally_speed.is_nan());
        assert_eq!(m.min_rally_pct, 0.0);
    }
}
