//! Per-zone feature record produced by the extractor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::ZoneType;

use crate::metrics::{
    DivergenceMetrics, ShapeMetrics, StrategyInfo, SwingMetrics, VolatilityMetrics, VolumeMetrics,
};
use crate::strategy::StrategyFamily;

/// Names accepted by [`ZoneFeatureRecord::numeric_feature`] for base fields.
pub const BASE_FEATURES: &[&str] = &[
    "id",
    "duration",
    "start_price",
    "end_price",
    "return_pct",
    "high",
    "low",
    "range_pct",
    "amplitude",
    "indicator_area",
    "peak_count",
    "trough_count",
    "drawdown_pct",
    "rally_pct",
    "adverse_move_pct",
    "time_to_peak_ratio",
    "time_to_trough_ratio",
    "price_indicator_correlation",
];

/// Outcome of one metric family for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Computed,
    Failed,
}

/// Which strategy produced a metric block, with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockProvenance {
    pub strategy: String,
    pub params: Value,
    pub status: BlockStatus,
    /// Error message when `status` is `Failed`.
    pub error: Option<String>,
}

impl BlockProvenance {
    #[must_use]
    pub fn computed(info: StrategyInfo) -> Self {
        Self {
            strategy: info.name,
            params: info.params,
            status: BlockStatus::Computed,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(info: StrategyInfo, error: impl Into<String>) -> Self {
        Self {
            strategy: info.name,
            params: info.params,
            status: BlockStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Features of one zone.
///
/// Base fields are always present. Each metric block is `None` when its
/// strategy failed on this zone; `metadata` says which strategy ran and why
/// a block is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneFeatureRecord {
    pub id: usize,
    pub zone_type: ZoneType,
    /// Number of bars.
    pub duration: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// First close.
    pub start_price: f64,
    /// Last close.
    pub end_price: f64,
    /// Close-to-close return over the zone, in percent.
    pub return_pct: f64,
    pub high: f64,
    pub low: f64,
    /// High-low range as percent of the start price.
    pub range_pct: f64,
    /// Largest absolute indicator value.
    pub amplitude: f64,
    /// Sum of indicator values.
    pub indicator_area: f64,
    /// Local maxima of the close.
    pub peak_count: usize,
    /// Local minima of the close.
    pub trough_count: usize,
    /// Largest close drawdown from a running peak, in percent (positive zones only).
    pub drawdown_pct: Option<f64>,
    /// Largest close rally from a running trough, in percent (negative zones only).
    pub rally_pct: Option<f64>,
    /// Bar of the highest high over `duration - 1` (0 for single-bar zones).
    pub time_to_peak_ratio: f64,
    /// Bar of the lowest low over `duration - 1`.
    pub time_to_trough_ratio: f64,
    /// Pearson correlation of close and indicator; null when undefined.
    pub price_indicator_correlation: Option<f64>,

    pub swing: Option<SwingMetrics>,
    pub shape: Option<ShapeMetrics>,
    pub divergence: Option<DivergenceMetrics>,
    pub volatility: Option<VolatilityMetrics>,
    pub volume: Option<VolumeMetrics>,

    /// Provenance per family, keyed by family name.
    pub metadata: BTreeMap<String, BlockProvenance>,
}

impl ZoneFeatureRecord {
    /// Counter-trend excursion: drawdown for positive zones, rally for negative zones.
    #[must_use]
    pub fn adverse_move_pct(&self) -> Option<f64> {
        match self.zone_type {
            ZoneType::Positive => self.drawdown_pct,
            ZoneType::Negative => self.rally_pct,
        }
    }

    #[must_use]
    pub fn provenance(&self, family: StrategyFamily) -> Option<&BlockProvenance> {
        self.metadata.get(family.as_str())
    }

    /// Families whose strategy failed on this zone.
    #[must_use]
    pub fn failed_families(&self) -> Vec<String> {
        self.metadata
            .iter()
            .filter(|(_, p)| p.status == BlockStatus::Failed)
            .map(|(family, _)| family.clone())
            .collect()
    }

    /// Looks up a numeric feature by name.
    ///
    /// Base fields use their plain name (see [`BASE_FEATURES`]); block fields
    /// use `family.field`, e.g. `swing.rally_count` or `volatility.score`.
    /// Returns `None` for unknown names, null values and missing blocks.
    #[must_use]
    pub fn numeric_feature(&self, name: &str) -> Option<f64> {
        if let Some((family, field)) = name.split_once('.') {
            let block = match family {
                "swing" => serde_json::to_value(self.swing.as_ref()?),
                "shape" => serde_json::to_value(self.shape.as_ref()?),
                "divergence" => serde_json::to_value(self.divergence.as_ref()?),
                "volatility" => serde_json::to_value(self.volatility.as_ref()?),
                "volume" => serde_json::to_value(self.volume.as_ref()?),
                _ => return None,
            }
            .ok()?;
            return block.get(field)?.as_f64().filter(|v| v.is_finite());
        }

        let value = match name {
            "id" => self.id as f64,
            "duration" => self.duration as f64,
            "start_price" => self.start_price,
            "end_price" => self.end_price,
            "return_pct" => self.return_pct,
            "high" => self.high,
            "low" => self.low,
            "range_pct" => self.range_pct,
            "amplitude" => self.amplitude,
            "indicator_area" => self.indicator_area,
            "peak_count" => self.peak_count as f64,
            "trough_count" => self.trough_count as f64,
            "drawdown_pct" => self.drawdown_pct?,
            "rally_pct" => self.rally_pct?,
            "adverse_move_pct" => self.adverse_move_pct()?,
            "time_to_peak_ratio" => self.time_to_peak_ratio,
            "time_to_trough_ratio" => self.time_to_trough_ratio,
            "price_indicator_correlation" => self.price_indicator_correlation?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}
