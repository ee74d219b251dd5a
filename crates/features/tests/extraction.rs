//! Feature extraction over a synthetic multi-zone series.

use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use zone_analysis_core::{
    AnalysisConfig, BarFrame, ColumnConfig, Result, StrategyParams, StrategySelection,
    ZoneDetector, ZoneRecord, ZoneType,
};
use zone_analysis_features::{
    ShapeMetrics, ShapeStrategy, Strategy, StrategyFamily, StrategyRegistry, SwingStrategy,
    VolatilityRegime, ZoneFeatureExtractor,
};

/// Splits a frame into maximal runs of constant indicator sign.
struct SignRunDetector {
    indicator: String,
}

impl ZoneDetector for SignRunDetector {
    fn detect(&self, frame: &BarFrame) -> Result<Vec<ZoneRecord>> {
        let indicator = frame.column(&self.indicator)?;
        let mut zones = Vec::new();
        let mut start = 0;
        for i in 1..=indicator.len() {
            let boundary = i == indicator.len()
                || ZoneType::from_value(indicator[i]) != ZoneType::from_value(indicator[start]);
            if boundary {
                let data = frame.slice(start..i)?;
                let baseline = frame.volume().and_then(|v| {
                    let lo = start.saturating_sub(5);
                    (lo < start).then(|| v[lo..start].iter().sum::<f64>() / (start - lo) as f64)
                });
                zones.push(
                    ZoneRecord::new(zones.len(), ZoneType::from_value(indicator[start]), data)?
                        .with_baseline_volume(baseline),
                );
                start = i;
            }
        }
        Ok(zones)
    }
}

fn synthetic_frame(n: usize, with_volume: bool) -> BarFrame {
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    let mut close = Vec::with_capacity(n);
    let mut price = 100.0;
    for i in 0..n {
        let t = i as f64;
        price *= 1.0 + 0.004 * (t / 9.0).sin() + 0.0015 * (t * 1.7).cos();
        close.push(price);
    }
    let open: Vec<f64> = std::iter::once(close[0]).chain(close[..n - 1].iter().copied()).collect();
    let high: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.max(*o) * 1.002).collect();
    let low: Vec<f64> = close.iter().zip(&open).map(|(c, o)| c.min(*o) * 0.998).collect();
    let macd: Vec<f64> = (0..n).map(|i| (i as f64 / 9.0).sin() + 0.05).collect();
    let hist: Vec<f64> = macd.iter().enumerate().map(|(i, m)| m - (i as f64 / 9.0 - 0.4).sin()).collect();

    let mut builder = BarFrame::builder()
        .index((0..n).map(|i| start + Duration::hours(i as i64)).collect())
        .ohlc(open, high, low, close)
        .column("macd", macd)
        .column("macd_hist", hist);
    if with_volume {
        builder = builder.volume((0..n).map(|i| 1_000.0 + 300.0 * (i as f64 / 5.0).sin().abs()).collect());
    }
    builder.build().unwrap()
}

fn zones(with_volume: bool) -> Vec<ZoneRecord> {
    SignRunDetector {
        indicator: "macd".to_string(),
    }
    .detect(&synthetic_frame(300, with_volume))
    .unwrap()
}

#[test]
fn detector_alternates_zone_types() {
    let zones = zones(true);
    assert!(zones.len() >= 8);
    for pair in zones.windows(2) {
        assert_ne!(pair[0].zone_type(), pair[1].zone_type());
        assert!(pair[0].end_time() < pair[1].start_time());
    }
}

#[test]
fn extracted_records_respect_metric_invariants() {
    let extractor = ZoneFeatureExtractor::with_defaults(ColumnConfig::default()).unwrap();
    let records = extractor.extract_all(&zones(true)).unwrap();
    assert!(!records.is_empty());

    for r in &records {
        if let Some(shape) = &r.shape {
            assert!(shape.kurtosis >= 0.0);
        }
        if let Some(vol) = &r.volatility {
            assert!((0.0..=10.0).contains(&vol.score));
            assert_eq!(vol.regime, VolatilityRegime::from_score(vol.score));
        }
        if let Some(volume) = &r.volume {
            if volume.volume_zone_ratio.is_some() {
                assert!(volume.avg_volume_zone.is_some());
            }
            if let Some(c) = volume.volume_signal_correlation {
                assert!((-1.0..=1.0).contains(&c));
            }
        }
        if let Some(div) = &r.divergence {
            if div.count == 0 {
                assert_eq!(div.kind, zone_analysis_features::DivergenceKind::None);
                assert_eq!(div.direction, zone_analysis_features::DivergenceDirection::None);
            }
        }
        let swing = r.swing.as_ref().unwrap();
        assert!(swing.rally_to_drop_ratio >= 0.0);
        assert!(swing.duration_symmetry >= 0.0);
        if swing.rally_count == 0 {
            assert_eq!(swing.avg_rally_pct, 0.0);
            assert_eq!(swing.max_rally_pct, 0.0);
        }
    }
}

#[test]
fn missing_volume_degrades_gracefully() {
    let extractor = ZoneFeatureExtractor::with_defaults(ColumnConfig::default()).unwrap();
    let records = extractor.extract_all(&zones(false)).unwrap();
    for r in &records {
        assert!(r.volume.as_ref().unwrap().is_unavailable());
    }
}

#[test]
fn every_swing_strategy_is_nan_free() {
    let registry = StrategyRegistry::with_builtins();
    let columns = ColumnConfig::default();
    for name in registry.list(StrategyFamily::Swing) {
        let swing = registry.swing().create(&name, &StrategyParams::new(), &columns).unwrap();
        for zone in zones(true) {
            let m = swing.compute(zone.data()).unwrap();
            assert!(m.total_swings() < zone.duration().max(1) * 2);
            for v in [m.avg_rally_pct, m.avg_drop_pct, m.avg_rally_speed, m.duration_symmetry] {
                assert!(v.is_finite(), "{name} produced {v}");
            }
            if m.rally_count == 0 {
                assert_eq!(m.avg_rally_pct, 0.0);
                assert_eq!(m.max_rally_pct, 0.0);
            }
        }
    }
}

#[test]
fn configured_strategies_are_used() {
    let mut config = AnalysisConfig::default();
    config.strategies.swing = StrategySelection::new("n_bar").with_param("bars", 3);
    config.min_duration = 5;

    let extractor =
        ZoneFeatureExtractor::from_config(&StrategyRegistry::with_builtins(), &config).unwrap();
    let all = zones(true);
    let records = extractor.extract_all(&all).unwrap();

    assert!(records.len() <= all.len());
    assert!(records.iter().all(|r| r.duration >= 5));
    let prov = records[0].provenance(StrategyFamily::Swing).unwrap();
    assert_eq!(prov.strategy, "n_bar");
    assert_eq!(prov.params["bars"], Value::from(3));
}

struct ConstantShape;

impl Strategy for ConstantShape {
    fn name(&self) -> &str {
        "constant"
    }

    fn params(&self) -> Value {
        Value::Null
    }
}

impl ShapeStrategy for ConstantShape {
    fn compute(&self, signal: &[f64]) -> Result<ShapeMetrics> {
        Ok(ShapeMetrics::degenerate(signal.len()))
    }
}

#[test]
fn custom_strategy_plugs_in_by_name() {
    let mut registry = StrategyRegistry::with_builtins();
    registry
        .shape_mut()
        .register("constant", |_, _| Ok(Box::new(ConstantShape) as Box<dyn ShapeStrategy>))
        .unwrap();

    let mut config = AnalysisConfig::default();
    config.strategies.shape = StrategySelection::new("constant");
    let extractor = ZoneFeatureExtractor::from_config(&registry, &config).unwrap();

    let records = extractor.extract_all(&zones(true)).unwrap();
    for r in &records {
        assert_eq!(r.shape.as_ref().unwrap().kurtosis, 3.0);
        assert_eq!(r.provenance(StrategyFamily::Shape).unwrap().strategy, "constant");
    }
}

#[test]
fn custom_indicator_columns_are_honoured() {
    let frame = synthetic_frame(120, true);
    let renamed = frame
        .with_column("osc", frame.column("macd").unwrap().to_vec())
        .unwrap()
        .with_column("osc_signal", frame.column("macd_hist").unwrap().to_vec())
        .unwrap();
    let zones = SignRunDetector {
        indicator: "osc".to_string(),
    }
    .detect(&renamed)
    .unwrap();

    let extractor =
        ZoneFeatureExtractor::with_defaults(ColumnConfig::new("osc", "osc_signal")).unwrap();
    let records = extractor.extract_all(&zones).unwrap();
    assert_eq!(records.len(), zones.len());
    assert!(records.iter().all(|r| r.amplitude > 0.0));
}
