//! Price/signal divergence detection over paired extrema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zone_analysis_core::{AnalysisError, BarFrame, ColumnConfig, Result, StrategyParams};

use crate::extrema::{find_peaks, find_troughs};
use crate::metrics::{DivergenceDirection, DivergenceKind, DivergenceMetrics};
use crate::strategy::{params_value, parse_params, DivergenceStrategy, Strategy, StrategyFamily};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtremaPairsConfig {
    /// Minimum separation between extrema of the same kind, in bars.
    pub order: usize,
    /// Maximum distance between a price extremum and its paired signal extremum.
    pub search_window: usize,
    /// Events weaker than this are discarded as noise.
    pub min_strength: f64,
    /// Compare price against the histogram column instead of the indicator.
    pub use_histogram: bool,
    pub detect_hidden: bool,
}

impl Default for ExtremaPairsConfig {
    fn default() -> Self {
        Self {
            order: 3,
            search_window: 5,
            min_strength: 0.0,
            use_histogram: false,
            detect_hidden: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Extreme {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Event {
    hidden: bool,
    direction: DivergenceDirection,
    strength: f64,
}

/// Compares consecutive same-kind price extrema with their nearest signal extrema.
///
/// | extrema | price        | signal       | event           |
/// |---------|--------------|--------------|-----------------|
/// | highs   | higher high  | lower high   | regular bearish |
/// | highs   | lower high   | higher high  | hidden bearish  |
/// | lows    | lower low    | higher low   | regular bullish |
/// | lows    | higher low   | lower low    | hidden bullish  |
#[derive(Debug, Clone)]
pub struct ExtremaPairsDivergence {
    config: ExtremaPairsConfig,
    signal_column: String,
}

impl ExtremaPairsDivergence {
    pub const NAME: &'static str = "extrema_pairs";

    /// # Errors
    /// Returns a configuration error if `order` is zero or `min_strength` is negative.
    pub fn new(config: ExtremaPairsConfig, columns: &ColumnConfig) -> Result<Self> {
        if config.order == 0 {
            return Err(AnalysisError::configuration(
                "divergence.extrema_pairs.params.order",
                "must be >= 1",
            ));
        }
        if config.min_strength.is_nan() || config.min_strength < 0.0 {
            return Err(AnalysisError::configuration(
                "divergence.extrema_pairs.params.min_strength",
                format!("must be >= 0, got {}", config.min_strength),
            ));
        }
        let signal_column = if config.use_histogram {
            columns.signal.clone()
        } else {
            columns.indicator.clone()
        };
        Ok(Self {
            config,
            signal_column,
        })
    }

    /// # Errors
    /// Returns a configuration error on unknown keys or invalid values.
    pub fn from_params(params: &StrategyParams, columns: &ColumnConfig) -> Result<Self> {
        Self::new(
            parse_params(StrategyFamily::Divergence, Self::NAME, params)?,
            columns,
        )
    }

    /// Column compared against price.
    #[must_use]
    pub fn signal_column(&self) -> &str {
        &self.signal_column
    }

    fn nearest(candidates: &[usize], target: usize, window: usize) -> Option<usize> {
        candidates
            .iter()
            .copied()
            .filter(|c| c.abs_diff(target) <= window)
            .min_by_key(|c| c.abs_diff(target))
    }

    fn scan(
        &self,
        extreme: Extreme,
        price: &[f64],
        signal: &[f64],
        price_idx: &[usize],
        signal_idx: &[usize],
    ) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for pair in price_idx.windows(2) {
            let (p1, p2) = (pair[0], pair[1]);
            let window = self.config.search_window;
            let (Some(s1), Some(s2)) = (
                Self::nearest(signal_idx, p1, window),
                Self::nearest(signal_idx, p2, window),
            ) else {
                continue;
            };
            if s2 <= s1 {
                continue;
            }
            if price[p1] <= 0.0 {
                return Err(AnalysisError::strategy(
                    StrategyFamily::Divergence.as_str(),
                    Self::NAME,
                    format!("non-positive price {} at bar {p1}", price[p1]),
                ));
            }

            let price_move = price[p2] - price[p1];
            let signal_move = signal[s2] - signal[s1];
            let price_slope = price_move / price[p1] * 100.0 / (p2 - p1) as f64;
            let signal_slope = signal_move / (s2 - s1) as f64;

            let (regular, hidden, direction) = match extreme {
                Extreme::High => (
                    price_move > 0.0 && signal_move < 0.0,
                    price_move < 0.0 && signal_move > 0.0,
                    DivergenceDirection::Bearish,
                ),
                Extreme::Low => (
                    price_move < 0.0 && signal_move > 0.0,
                    price_move > 0.0 && signal_move < 0.0,
                    DivergenceDirection::Bullish,
                ),
            };
            if !regular && !(hidden && self.config.detect_hidden) {
                continue;
            }

            let strength = price_slope.abs() * signal_slope.abs();
            if strength < self.config.min_strength {
                continue;
            }
            events.push(Event {
                hidden,
                direction,
                strength,
            });
        }
        Ok(events)
    }
}

fn summarize(events: &[Event]) -> DivergenceMetrics {
    if events.is_empty() {
        return DivergenceMetrics::none();
    }

    let count = events.len();
    let hidden_count = events.iter().filter(|e| e.hidden).count();
    let regular_count = count - hidden_count;
    let (bullish, bearish): (Vec<&Event>, Vec<&Event>) = events
        .iter()
        .partition(|e| e.direction == DivergenceDirection::Bullish);

    let kind = match (regular_count > 0, hidden_count > 0) {
        (true, true) => DivergenceKind::Mixed,
        (false, true) => DivergenceKind::Hidden,
        _ => DivergenceKind::Regular,
    };

    let direction = match bullish.len().cmp(&bearish.len()) {
        std::cmp::Ordering::Greater => DivergenceDirection::Bullish,
        std::cmp::Ordering::Less => DivergenceDirection::Bearish,
        std::cmp::Ordering::Equal => {
            let bull: f64 = bullish.iter().map(|e| e.strength).sum();
            let bear: f64 = bearish.iter().map(|e| e.strength).sum();
            if bull > bear {
                DivergenceDirection::Bullish
            } else if bear > bull {
                DivergenceDirection::Bearish
            } else {
                DivergenceDirection::None
            }
        }
    };

    DivergenceMetrics {
        kind,
        count,
        regular_count,
        hidden_count,
        bullish_count: bullish.len(),
        bearish_count: bearish.len(),
        strength: events.iter().map(|e| e.strength).sum::<f64>() / count as f64,
        direction,
    }
}

impl Strategy for ExtremaPairsDivergence {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> Value {
        let mut params = params_value(&self.config);
        if let Value::Object(map) = &mut params {
            map.insert(
                "signal_column".to_string(),
                Value::String(self.signal_column.clone()),
            );
        }
        params
    }
}

impl DivergenceStrategy for ExtremaPairsDivergence {
    fn compute(&self, zone: &BarFrame) -> Result<DivergenceMetrics> {
        let signal = zone.column(&self.signal_column)?;
        let price = zone.close();
        let order = self.config.order;

        let mut events = self.scan(
            Extreme::High,
            price,
            signal,
            &find_peaks(price, order, 0.0),
            &find_peaks(signal, order, 0.0),
        )?;
        events.extend(self.scan(
            Extreme::Low,
            price,
            signal,
            &find_troughs(price, order, 0.0),
            &find_troughs(signal, order, 0.0),
        )?);

        let metrics = summarize(&events);
        if metrics.count > 0 {
            tracing::debug!(
                strategy = Self::NAME,
                count = metrics.count,
                kind = ?metrics.kind,
                "divergence detected"
            );
        }
        Ok(metrics)
    }
}
