use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{stats, AnalysisError, BarFrame, Result, StrategyParams};

use super::{check_prices, metrics_from_pivots};
use crate::extrema::{alternate, find_peaks, find_troughs, Pivot, PivotKind};
use crate::metrics::SwingMetrics;
use crate::strategy::{params_value, parse_params, Strategy, StrategyFamily, SwingStrategy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalExtremaConfig {
    /// Minimum separation between two peaks (or two troughs), in bars.
    pub distance: usize,
    /// Minimum prominence as percent of the mean close.
    pub prominence_pct: f64,
    pub min_amplitude_pct: f64,
    /// Treat the first and last bar as pivots.
    pub include_endpoints: bool,
}

impl Default for LocalExtremaConfig {
    fn default() -> Self {
        Self {
            distance: 2,
            prominence_pct: 0.0,
            min_amplitude_pct: 0.0,
            include_endpoints: true,
        }
    }
}

/// Distance/prominence local-extrema swing detection on closes.
#[derive(Debug, Clone)]
pub struct LocalExtremaSwing {
    config: LocalExtremaConfig,
}

impl LocalExtremaSwing {
    pub const NAME: &'static str = "local_extrema";
    const MIN_WINDOW: usize = 3;

    /// # Errors
    /// Returns a configuration error if `distance` is zero or a threshold is negative.
    pub fn new(config: LocalExtremaConfig) -> Result<Self> {
        if config.distance == 0 {
            return Err(AnalysisError::configuration(
                "swing.local_extrema.params.distance",
                "must be >= 1",
            ));
        }
        if config.prominence_pct < 0.0 || config.min_amplitude_pct < 0.0 {
            return Err(AnalysisError::configuration(
                "swing.local_extrema.params.prominence_pct",
                "thresholds must be >= 0",
            ));
        }
        Ok(Self { config })
    }

    /// # Errors
    /// Returns a configuration error on unknown keys or invalid values.
    pub fn from_params(params: &StrategyParams) -> Result<Self> {
        Self::new(parse_params(StrategyFamily::Swing, Self::NAME, params)?)
    }

    fn pivots(&self, closes: &[f64]) -> Vec<Pivot> {
        let mean_close = stats::mean(closes).unwrap_or(0.0);
        let min_prominence = mean_close.abs() * self.config.prominence_pct / 100.0;

        let mut pivots: Vec<Pivot> = find_peaks(closes, self.config.distance, min_prominence)
            .into_iter()
            .map(|i| Pivot::high(i, closes[i]))
            .chain(
                find_troughs(closes, self.config.distance, min_prominence)
                    .into_iter()
                    .map(|i| Pivot::low(i, closes[i])),
            )
            .collect();
        pivots.sort_by_key(|p| p.index);

        if self.config.include_endpoints {
            let last = closes.len() - 1;
            let (first_kind, last_kind) = match (pivots.first(), pivots.last()) {
                (Some(first), Some(end)) => (opposite(first.kind), opposite(end.kind)),
                _ if closes[last] >= closes[0] => (PivotKind::Low, PivotKind::High),
                _ => (PivotKind::High, PivotKind::Low),
            };
            pivots.insert(0, endpoint(0, closes[0], first_kind));
            pivots.push(endpoint(last, closes[last], last_kind));
        }

        alternate(pivots)
    }
}

fn opposite(kind: PivotKind) -> PivotKind {
    match kind {
        PivotKind::High => PivotKind::Low,
        PivotKind::Low => PivotKind::High,
    }
}

fn endpoint(index: usize, price: f64, kind: PivotKind) -> Pivot {
    Pivot { index, price, kind }
}

impl Strategy for LocalExtremaSwing {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl SwingStrategy for LocalExtremaSwing {
    fn compute(&self, zone: &BarFrame) -> Result<SwingMetrics> {
        if zone.len() < Self::MIN_WINDOW {
            return Ok(SwingMetrics::empty(self.info()));
        }
        let closes = zone.close();
        check_prices(Self::NAME, &[closes])?;

        let pivots = self.pivots(closes);
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
    fn matches_clean_zigzag() {
        let frame = frame_from_closes(&zigzag_closes());
        let swing = LocalExtremaSwing::new(LocalExtremaConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();

        assert_eq!(m.rally_count, 2);
        assert_eq!(m.drop_count, 2);
        assert!((m.avg_drop_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn endpoints_can_be_excluded() {
        let frame = frame_from_closes(&zigzag_closes());
        let swing = LocalExtremaSwing::new(LocalExtremaConfig {
            include_endpoints: false,
            ..LocalExtremaConfig::default()
        })
        .unwrap();
        let m = swing.compute(&frame).unwrap();
        // H4 -> L7 -> H10 only
        assert_eq!(m.rally_count, 1);
        assert_eq!(m.drop_count, 1);
    }

    #[test]
    fn monotonic_zone_is_one_rally_with_endpoints() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + f64::from(i)).collect();
        let frame = frame_from_closes(&closes);
        let swing = LocalExtremaSwing::new(LocalExtremaConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();
        assert_eq!(m.rally_count, 1);
        assert_eq!(m.drop_count, 0);
        assert!((m.avg_rally_pct - 9.0).abs() < 1e-9);
    }

    #[test]
    fn short_zone_returns_empty_metrics() {
        let frame = frame_from_closes(&[100.0, 101.0]);
        let swing = LocalExtremaSwing::new(LocalExtremaConfig::default()).unwrap();
        let m = swing.compute(&frame).unwrap();
        assert_eq!(m.total_swings(), 0);
        assert_eq!(m.avg_rally_pct, 0.0);
    }

    #[test]
    fn rejects_zero_distance() {
        let err = LocalExtremaSwing::new(LocalExtremaConfig {
            distance: 0,
            ..LocalExtremaConfig::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("distance"));
    }
}
