//! Volume confirmation against a pre-zone baseline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{stats, AnalysisError, BarFrame, ColumnConfig, Result, StrategyParams};

use crate::metrics::VolumeMetrics;
use crate::strategy::{params_value, parse_params, Strategy, StrategyFamily, VolumeStrategy};

const MIN_CORRELATION_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaselineVolumeConfig {
    /// Leading bars that make up the entry volume.
    pub entry_bars: usize,
}

impl Default for BaselineVolumeConfig {
    fn default() -> Self {
        Self { entry_bars: 3 }
    }
}

/// Zone volume relative to a baseline, plus volume/signal correlation.
///
/// A missing volume column yields [`VolumeMetrics::unavailable`]; a missing
/// baseline only nulls the baseline-relative fields.
#[derive(Debug, Clone)]
pub struct BaselineVolume {
    config: BaselineVolumeConfig,
    volume_column: String,
    signal_column: String,
}

impl BaselineVolume {
    pub const NAME: &'static str = "baseline";

    /// # Errors
    /// Returns a configuration error if `entry_bars` is zero.
    pub fn new(config: BaselineVolumeConfig, columns: &ColumnConfig) -> Result<Self> {
        if config.entry_bars == 0 {
            return Err(AnalysisError::configuration(
                "volume.baseline.params.entry_bars",
                "must be >= 1",
            ));
        }
        Ok(Self {
            config,
            volume_column: columns.volume.clone(),
            signal_column: columns.signal.clone(),
        })
    }

    /// # Errors
    /// Returns a configuration error on unknown keys or invalid values.
    pub fn from_params(params: &StrategyParams, columns: &ColumnConfig) -> Result<Self> {
        Self::new(parse_params(StrategyFamily::Volume, Self::NAME, params)?, columns)
    }
}

impl Strategy for BaselineVolume {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        params_value(&self.config)
    }
}

impl VolumeStrategy for BaselineVolume {
    fn compute(&self, zone: &BarFrame, baseline_volume: Option<f64>) -> Result<VolumeMetrics> {
        let Some(volume) = zone.try_column(&self.volume_column) else {
            return Ok(VolumeMetrics::unavailable());
        };
        let Some(avg_volume) = stats::mean(volume).filter(|v| v.is_finite()) else {
            return Ok(VolumeMetrics::unavailable());
        };

        let baseline = baseline_volume.filter(|b| b.is_finite() && *b > 0.0);
        let volume_zone_ratio = baseline.map(|b| avg_volume / b);

        let entry = &volume[..self.config.entry_bars.min(volume.len())];
        let entry_volume_change_pct = match (baseline, stats::mean(entry)) {
            (Some(b), Some(entry_avg)) => Some((entry_avg - b) / b * 100.0),
            _ => None,
        };

        let volume_signal_correlation = zone
            .try_column(&self.signal_column)
            .filter(|_| volume.len() >= MIN_CORRELATION_POINTS)
            .and_then(|signal| stats::pearson(volume, signal));

        Ok(VolumeMetrics {
            volume_zone_ratio,
            entry_volume_change_pct,
            volume_signal_correlation,
            avg_volume_zone: Some(avg_volume),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn frame(volume: Option<Vec<f64>>) -> BarFrame {
        let n = 6;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let close = vec![100.0; n];
        let mut builder = BarFrame::builder()
            .index((0..n).map(|i| start + Duration::hours(i as i64)).collect())
            .ohlc(close.clone(), close.clone(), close.clone(), close)
            .column("macd_hist", vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        if let Some(v) = volume {
            builder = builder.volume(v);
        }
        builder.build().unwrap()
    }

    fn strategy() -> BaselineVolume {
        BaselineVolume::new(BaselineVolumeConfig::default(), &ColumnConfig::default()).unwrap()
    }

    #[test]
    fn full_metrics_with_baseline() {
        let zone = frame(Some(vec![150.0, 150.0, 150.0, 200.0, 250.0, 300.0]));
        let m = strategy().compute(&zone, Some(100.0)).unwrap();

        assert!((m.avg_volume_zone.unwrap() - 200.0).abs() < 1e-9);
        assert!((m.volume_zone_ratio.unwrap() - 2.0).abs() < 1e-9);
        assert!((m.entry_volume_change_pct.unwrap() - 50.0).abs() < 1e-9);
        let corr = m.volume_signal_correlation.unwrap();
        assert!(corr > 0.8 && corr <= 1.0);
    }

    #[test]
    fn missing_baseline_keeps_average_and_correlation() {
        let zone = frame(Some(vec![150.0, 150.0, 150.0, 200.0, 250.0, 300.0]));
        let m = strategy().compute(&zone, None).unwrap();
        assert!(m.volume_zone_ratio.is_none());
        assert!(m.entry_volume_change_pct.is_none());
        assert!(m.avg_volume_zone.is_some());
        assert!(m.volume_signal_correlation.is_some());
    }

    #[test]
    fn missing_volume_column_is_all_null() {
        let m = strategy().compute(&frame(None), Some(100.0)).unwrap();
        assert!(m.is_unavailable());
    }

    #[test]
    fn non_positive_baseline_is_ignored() {
        let zone = frame(Some(vec![1.0; 6]));
        let m = strategy().compute(&zone, Some(0.0)).unwrap();
        assert!(m.volume_zone_ratio.is_none());
        // constant volume has no defined correlation
        assert!(m.volume_signal_correlation.is_none());
    }
}
