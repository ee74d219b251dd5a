//! Zone feature extraction.
//!
//! [`ZoneFeatureExtractor`] computes the strategy-independent base fields of a
//! zone directly and delegates the five metric blocks to injected strategies.
//! A failing strategy yields a null block plus a `Failed` provenance entry;
//! only a missing indicator column aborts a zone.

use std::collections::BTreeMap;

use rayon::prelude::*;
use zone_analysis_core::{
    stats, AnalysisConfig, AnalysisError, ColumnConfig, Result, ZoneRecord, ZoneType,
};

use crate::extrema::{find_peaks, find_troughs};
use crate::metrics::StrategyInfo;
use crate::record::{BlockProvenance, ZoneFeatureRecord};
use crate::registry::{StrategyRegistry, StrategySet};
use crate::strategy::{
    DivergenceStrategy, ShapeStrategy, StrategyFamily, SwingStrategy, VolatilityStrategy,
    VolumeStrategy,
};

/// Turns zone records into feature records.
///
/// Stateless after construction; `extract` on the same zone always returns
/// the same record.
#[derive(Debug)]
pub struct ZoneFeatureExtractor {
    columns: ColumnConfig,
    strategies: StrategySet,
    min_duration: usize,
    min_amplitude: f64,
}

impl ZoneFeatureExtractor {
    /// Creates an extractor from explicit strategies; every zone is admitted.
    #[must_use]
    pub fn new(columns: ColumnConfig, strategies: StrategySet) -> Self {
        Self {
            columns,
            strategies,
            min_duration: 1,
            min_amplitude: 0.0,
        }
    }

    /// Resolves the configured strategies and admission filters.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid config, an unknown
    /// strategy name or bad strategy parameters.
    pub fn from_config(registry: &StrategyRegistry, config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let strategies = registry.build(&config.strategies, &config.columns)?;
        Ok(Self {
            columns: config.columns.clone(),
            strategies,
            min_duration: config.min_duration,
            min_amplitude: config.min_amplitude,
        })
    }

    /// Built-in default strategies for the given columns.
    ///
    /// # Errors
    /// Returns a configuration error if a column name is empty.
    pub fn with_defaults(columns: ColumnConfig) -> Result<Self> {
        let config = AnalysisConfig {
            columns,
            ..AnalysisConfig::default()
        };
        Self::from_config(&StrategyRegistry::with_builtins(), &config)
    }

    #[must_use]
    pub fn with_swing(mut self, strategy: Box<dyn SwingStrategy>) -> Self {
        self.strategies.swing = strategy;
        self
    }

    #[must_use]
    pub fn with_shape(mut self, strategy: Box<dyn ShapeStrategy>) -> Self {
        self.strategies.shape = strategy;
        self
    }

    #[must_use]
    pub fn with_divergence(mut self, strategy: Box<dyn DivergenceStrategy>) -> Self {
        self.strategies.divergence = strategy;
        self
    }

    #[must_use]
    pub fn with_volatility(mut self, strategy: Box<dyn VolatilityStrategy>) -> Self {
        self.strategies.volatility = strategy;
        self
    }

    #[must_use]
    pub fn with_volume(mut self, strategy: Box<dyn VolumeStrategy>) -> Self {
        self.strategies.volume = strategy;
        self
    }

    /// Sets the zone admission filters used by [`Self::extract_all`].
    #[must_use]
    pub fn with_admission(mut self, min_duration: usize, min_amplitude: f64) -> Self {
        self.min_duration = min_duration.max(1);
        self.min_amplitude = min_amplitude.max(0.0);
        self
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnConfig {
        &self.columns
    }

    #[must_use]
    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    /// Extracts the features of one zone.
    ///
    /// # Errors
    /// Returns [`AnalysisError::MissingColumn`] if the indicator column is
    /// absent. Strategy failures never surface here.
    pub fn extract(&self, zone: &ZoneRecord) -> Result<ZoneFeatureRecord> {
        let data = zone.data();
        let n = data.len();
        let indicator = data.column(&self.columns.indicator)?;
        let (Some(start_time), Some(end_time)) = (data.first_timestamp(), data.last_timestamp())
        else {
            return Err(AnalysisError::insufficient(
                format!("zone {}", zone.id()),
                1,
                n,
            ));
        };

        let closes = data.close();
        let start_price = closes[0];
        let end_price = closes[n - 1];
        let high = data.high().iter().copied().fold(f64::MIN, f64::max);
        let low = data.low().iter().copied().fold(f64::MAX, f64::min);
        let span = (n - 1).max(1) as f64;

        let mut metadata = BTreeMap::new();
        let swing = self.run_block(
            zone,
            StrategyFamily::Swing,
            self.strategies.swing.info(),
            &mut metadata,
            || self.strategies.swing.compute(data),
        );
        let shape = self.run_block(
            zone,
            StrategyFamily::Shape,
            self.strategies.shape.info(),
            &mut metadata,
            || {
                data.column(&self.columns.signal)
                    .and_then(|signal| self.strategies.shape.compute(signal))
            },
        );
        let divergence = self.run_block(
            zone,
            StrategyFamily::Divergence,
            self.strategies.divergence.info(),
            &mut metadata,
            || self.strategies.divergence.compute(data),
        );
        let volatility = self.run_block(
            zone,
            StrategyFamily::Volatility,
            self.strategies.volatility.info(),
            &mut metadata,
            || self.strategies.volatility.compute(data),
        );
        let volume = self.run_block(
            zone,
            StrategyFamily::Volume,
            self.strategies.volume.info(),
            &mut metadata,
            || self.strategies.volume.compute(data, zone.baseline_volume()),
        );

        let record = ZoneFeatureRecord {
            id: zone.id(),
            zone_type: zone.zone_type(),
            duration: n,
            start_time,
            end_time,
            start_price,
            end_price,
            return_pct: pct_change(start_price, end_price),
            high,
            low,
            range_pct: if start_price > 0.0 {
                (high - low) / start_price * 100.0
            } else {
                0.0
            },
            amplitude: amplitude(indicator),
            indicator_area: indicator.iter().filter(|v| v.is_finite()).sum(),
            peak_count: find_peaks(closes, 1, 0.0).len(),
            trough_count: find_troughs(closes, 1, 0.0).len(),
            drawdown_pct: (zone.zone_type() == ZoneType::Positive).then(|| max_drawdown_pct(closes)),
            rally_pct: (zone.zone_type() == ZoneType::Negative).then(|| max_rally_pct(closes)),
            time_to_peak_ratio: argmax(data.high()) as f64 / span,
            time_to_trough_ratio: argmin(data.low()) as f64 / span,
            price_indicator_correlation: stats::pearson(closes, indicator),
            swing,
            shape,
            divergence,
            volatility,
            volume,
            metadata,
        };

        tracing::debug!(
            zone_id = record.id,
            zone_type = %record.zone_type,
            duration = record.duration,
            failed = record.failed_families().len(),
            "zone features extracted"
        );
        Ok(record)
    }

    /// Whether a zone passes the duration and amplitude filters.
    ///
    /// # Errors
    /// Returns [`AnalysisError::MissingColumn`] if the indicator column is absent.
    pub fn admits(&self, zone: &ZoneRecord) -> Result<bool> {
        if zone.duration() < self.min_duration {
            return Ok(false);
        }
        let indicator = zone.data().column(&self.columns.indicator)?;
        Ok(amplitude(indicator) >= self.min_amplitude)
    }

    /// Extracts every admitted zone in order.
    ///
    /// # Errors
    /// Returns the first missing-indicator error.
    pub fn extract_all(&self, zones: &[ZoneRecord]) -> Result<Vec<ZoneFeatureRecord>> {
        let records = zones
            .iter()
            .map(|zone| self.extract_admitted(zone))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.finish_batch(zones.len(), records))
    }

    /// Same as [`Self::extract_all`], one rayon task per zone.
    ///
    /// # Errors
    /// Returns a missing-indicator error if any zone lacks the column.
    pub fn extract_all_parallel(&self, zones: &[ZoneRecord]) -> Result<Vec<ZoneFeatureRecord>> {
        let records = zones
            .par_iter()
            .map(|zone| self.extract_admitted(zone))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.finish_batch(zones.len(), records))
    }

    fn extract_admitted(&self, zone: &ZoneRecord) -> Result<Option<ZoneFeatureRecord>> {
        if !self.admits(zone)? {
            tracing::debug!(
                zone_id = zone.id(),
                duration = zone.duration(),
                min_duration = self.min_duration,
                min_amplitude = self.min_amplitude,
                "zone not admitted"
            );
            return Ok(None);
        }
        self.extract(zone).map(Some)
    }

    fn finish_batch(
        &self,
        total: usize,
        records: Vec<Option<ZoneFeatureRecord>>,
    ) -> Vec<ZoneFeatureRecord> {
        let records: Vec<ZoneFeatureRecord> = records.into_iter().flatten().collect();
        tracing::info!(
            zones = total,
            extracted = records.len(),
            skipped = total - records.len(),
            "feature extraction complete"
        );
        records
    }

    fn run_block<T>(
        &self,
        zone: &ZoneRecord,
        family: StrategyFamily,
        info: StrategyInfo,
        metadata: &mut BTreeMap<String, BlockProvenance>,
        compute: impl FnOnce() -> Result<T>,
    ) -> Option<T> {
        match compute() {
            Ok(block) => {
                metadata.insert(family.to_string(), BlockProvenance::computed(info));
                Some(block)
            }
            Err(e) => {
                tracing::warn!(
                    zone_id = zone.id(),
                    family = %family,
                    strategy = %info.name,
                    error = %e,
                    "strategy failed, recording null block"
                );
                metadata.insert(family.to_string(), BlockProvenance::failed(info, e.to_string()));
                None
            }
        }
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from.abs() > f64::EPSILON {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}

fn amplitude(indicator: &[f64]) -> f64 {
    indicator
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0, |acc: f64, v| acc.max(v.abs()))
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
        .0
}

fn argmin(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::MAX), |best, (i, v)| if *v < best.1 { (i, *v) } else { best })
        .0
}

fn max_drawdown_pct(closes: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for c in closes {
        peak = peak.max(*c);
        if peak > 0.0 {
            worst = worst.max((peak - c) / peak * 100.0);
        }
    }
    worst
}

fn max_rally_pct(closes: &[f64]) -> f64 {
    let mut trough = f64::MAX;
    let mut best = 0.0_f64;
    for c in closes {
        trough = trough.min(*c);
        if trough > 0.0 {
            best = best.max((c - trough) / trough * 100.0);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::VolatilityMetrics;
    use crate::record::BlockStatus;
    use crate::strategy::Strategy;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;
    use zone_analysis_core::{BarFrame, DictRecord};

    fn zone(id: usize, closes: &[f64], indicator: &[f64], with_volume: bool) -> ZoneRecord {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(id as i64 * 100);
        let n = closes.len();
        let mut builder = BarFrame::builder()
            .index((0..n).map(|i| start + Duration::hours(i as i64)).collect())
            .ohlc(
                closes.to_vec(),
                closes.iter().map(|c| c + 0.5).collect(),
                closes.iter().map(|c| c - 0.5).collect(),
                closes.to_vec(),
            )
            .column("macd", indicator.to_vec())
            .column("macd_hist", indicator.iter().map(|v| v * 0.4).collect());
        if with_volume {
            builder = builder.volume((0..n).map(|i| 1000.0 + i as f64 * 10.0).collect());
        }
        let zone_type = ZoneType::from_value(indicator.iter().sum());
        ZoneRecord::new(id, zone_type, builder.build().unwrap())
            .unwrap()
            .with_baseline_volume(Some(900.0))
    }

    fn rising_zone() -> ZoneRecord {
        let closes = [100.0, 102.0, 104.0, 103.0, 101.0, 104.0, 107.0, 106.0, 108.0, 110.0];
        let indicator = [0.1, 0.4, 0.8, 0.9, 0.7, 0.9, 1.3, 1.2, 1.0, 0.6];
        zone(0, &closes, &indicator, true)
    }

    fn extractor() -> ZoneFeatureExtractor {
        ZoneFeatureExtractor::with_defaults(ColumnConfig::default()).unwrap()
    }

    struct FailingVolatility;

    impl Strategy for FailingVolatility {
        fn name(&self) -> &str {
            "failing"
        }

        fn params(&self) -> Value {
            Value::Null
        }
    }

    impl VolatilityStrategy for FailingVolatility {
        fn compute(&self, _zone: &BarFrame) -> Result<VolatilityMetrics> {
            Err(AnalysisError::strategy("volatility", "failing", "singular"))
        }
    }

    // ============================================
    // Base fields
    // ============================================

    #[test]
    fn base_fields_of_rising_zone() {
        let r = extractor().extract(&rising_zone()).unwrap();

        assert_eq!(r.duration, 10);
        assert_eq!(r.zone_type, ZoneType::Positive);
        assert!((r.return_pct - 10.0).abs() < 1e-9);
        assert!((r.high - 110.5).abs() < 1e-9);
        assert!((r.low - 99.5).abs() < 1e-9);
        assert!((r.range_pct - 11.0).abs() < 1e-9);
        assert!((r.amplitude - 1.3).abs() < 1e-12);
        assert!((r.indicator_area - 7.9).abs() < 1e-9);
        assert_eq!(r.peak_count, 2);
        assert_eq!(r.trough_count, 2);
        // 104 -> 101
        assert!((r.drawdown_pct.unwrap() - 3.0 / 104.0 * 100.0).abs() < 1e-9);
        assert!(r.rally_pct.is_none());
        assert_eq!(r.adverse_move_pct(), r.drawdown_pct);
        assert!((r.time_to_peak_ratio - 1.0).abs() < 1e-12);
        assert_eq!(r.time_to_trough_ratio, 0.0);
        assert!(r.price_indicator_correlation.unwrap() > 0.0);
    }

    #[test]
    fn negative_zone_reports_rally_from_trough() {
        let closes = [100.0, 97.0, 95.0, 98.0, 96.0, 94.0];
        let indicator = [-0.1, -0.5, -0.9, -0.6, -0.8, -0.3];
        let r = extractor().extract(&zone(3, &closes, &indicator, false)).unwrap();
        assert_eq!(r.zone_type, ZoneType::Negative);
        assert!(r.drawdown_pct.is_none());
        assert!((r.rally_pct.unwrap() - 3.0 / 95.0 * 100.0).abs() < 1e-9);
        assert!((r.amplitude - 0.9).abs() < 1e-12);
    }

    #[test]
    fn single_bar_zone_is_extracted() {
        let r = extractor().extract(&zone(1, &[100.0], &[0.2], false)).unwrap();
        assert_eq!(r.duration, 1);
        assert_eq!(r.return_pct, 0.0);
        assert_eq!(r.time_to_peak_ratio, 0.0);
        assert!(r.price_indicator_correlation.is_none());
        // too short for bands: null block, batch continues
        assert!(r.volatility.is_none());
        assert_eq!(r.failed_families(), vec!["volatility".to_string()]);
        let shape = r.shape.unwrap();
        assert_eq!(shape.kurtosis, 3.0);
    }

    // ============================================
    // Strategy blocks
    // ============================================

    #[test]
    fn all_blocks_present_with_provenance() {
        let r = extractor().extract(&rising_zone()).unwrap();
        assert!(r.swing.is_some());
        assert!(r.shape.is_some());
        assert!(r.divergence.is_some());
        assert!(r.volatility.is_some());
        let volume = r.volume.as_ref().unwrap();
        assert!(volume.volume_zone_ratio.is_some());
        assert!(volume.avg_volume_zone.is_some());

        assert_eq!(r.metadata.len(), 5);
        let swing = r.provenance(StrategyFamily::Swing).unwrap();
        assert_eq!(swing.strategy, "zigzag");
        assert_eq!(swing.status, BlockStatus::Computed);
        assert!(swing.params.get("deviation_pct").is_some());
    }

    #[test]
    fn failing_strategy_becomes_null_block() {
        let extractor = extractor().with_volatility(Box::new(FailingVolatility));
        let r = extractor.extract(&rising_zone()).unwrap();

        assert!(r.volatility.is_none());
        assert!(r.swing.is_some());
        let prov = r.provenance(StrategyFamily::Volatility).unwrap();
        assert_eq!(prov.status, BlockStatus::Failed);
        assert_eq!(prov.strategy, "failing");
        assert!(prov.error.as_deref().unwrap().contains("singular"));
    }

    #[test]
    fn missing_volume_column_is_not_a_failure() {
        let closes = [100.0, 101.0, 102.0, 101.5, 103.0];
        let r = extractor()
            .extract(&zone(2, &closes, &[0.1, 0.2, 0.3, 0.2, 0.1], false))
            .unwrap();
        assert!(r.volume.as_ref().unwrap().is_unavailable());
        assert!(r.failed_families().is_empty());
    }

    #[test]
    fn missing_indicator_column_is_an_error() {
        let extractor =
            ZoneFeatureExtractor::with_defaults(ColumnConfig::new("rsi", "rsi_signal")).unwrap();
        let err = extractor.extract(&rising_zone()).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingColumn { .. }));
    }

    #[test]
    fn unknown_strategy_fails_construction() {
        let mut config = AnalysisConfig::default();
        config.strategies.swing.name = "fractal".to_string();
        let err = ZoneFeatureExtractor::from_config(&StrategyRegistry::with_builtins(), &config)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::StrategyNotFound { .. }));
    }

    // ============================================
    // Determinism and serialization
    // ============================================

    #[test]
    fn extraction_is_idempotent() {
        let extractor = extractor();
        let zone = rising_zone();
        assert_eq!(extractor.extract(&zone).unwrap(), extractor.extract(&zone).unwrap());
    }

    #[test]
    fn record_round_trips_through_dict() {
        let r = extractor().extract(&rising_zone()).unwrap();
        let back = ZoneFeatureRecord::from_dict(r.to_dict()).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn numeric_feature_lookup() {
        let r = extractor().extract(&rising_zone()).unwrap();
        assert_eq!(r.numeric_feature("duration"), Some(10.0));
        assert_eq!(r.numeric_feature("rally_pct"), None);
        assert_eq!(
            r.numeric_feature("swing.rally_count"),
            Some(r.swing.as_ref().unwrap().rally_count as f64)
        );
        assert_eq!(
            r.numeric_feature("volatility.score"),
            Some(r.volatility.as_ref().unwrap().score)
        );
        assert_eq!(r.numeric_feature("swing.strategy"), None);
        assert_eq!(r.numeric_feature("nonsense"), None);
    }

    // ============================================
    // Batches
    // ============================================

    #[test]
    fn admission_filters_short_and_flat_zones() {
        let zones = vec![
            rising_zone(),
            zone(1, &[100.0, 101.0], &[0.5, 0.6], false),
            zone(2, &[100.0, 100.5, 101.0, 100.0], &[0.01, 0.02, 0.01, 0.01], false),
        ];
        let extractor = extractor().with_admission(3, 0.1);
        let records = extractor.extract_all(&zones).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let zones: Vec<ZoneRecord> = (0..8)
            .map(|id| {
                let closes: Vec<f64> = (0..12)
                    .map(|i| 100.0 + ((i + id) as f64 * 0.9).sin() * 3.0 + i as f64 * 0.2)
                    .collect();
                let sign = if id % 2 == 0 { 1.0 } else { -1.0 };
                let indicator: Vec<f64> = (0..12).map(|i| sign * (0.1 + i as f64 * 0.05)).collect();
                zone(id, &closes, &indicator, id % 3 != 0)
            })
            .collect();
        let extractor = extractor();
        let sequential = extractor.extract_all(&zones).unwrap();
        let parallel = extractor.extract_all_parallel(&zones).unwrap();
        assert_eq!(sequential.len(), 8);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn helpers_handle_edge_cases() {
        assert_eq!(pct_change(0.0, 5.0), 0.0);
        assert_eq!(max_drawdown_pct(&[1.0, 2.0, 3.0]), 0.0);
        assert!((max_rally_pct(&[2.0, 1.0, 1.5]) - 50.0).abs() < 1e-12);
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), 1);
        assert_eq!(amplitude(&[f64::NAN, -2.0, 1.0]), 2.0);
    }
}
