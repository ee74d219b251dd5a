//! Price levels from clustered zone boundary prices.

use serde::{Deserialize, Serialize};

/// A price touched by several zone boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Mean of the clustered prices.
    pub price: f64,
    /// Number of prices in the cluster.
    pub touches: usize,
}

/// Clusters `prices` greedily in ascending order.
///
/// A price joins the open cluster while it stays within `tolerance_pct` of the
/// cluster mean; clusters with at least `min_touches` members become levels.
/// Non-finite and non-positive prices are ignored.
#[must_use]
pub fn identify_levels(prices: &[f64], tolerance_pct: f64, min_touches: usize) -> Vec<PriceLevel> {
    let mut sorted: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    sorted.sort_by(f64::total_cmp);

    let mut levels = Vec::new();
    let mut cluster: Vec<f64> = Vec::new();
    let mut flush = |cluster: &mut Vec<f64>| {
        if cluster.len() >= min_touches && !cluster.is_empty() {
            levels.push(PriceLevel {
                price: cluster.iter().sum::<f64>() / cluster.len() as f64,
                touches: cluster.len(),
            });
        }
        cluster.clear();
    };

    for price in sorted {
        if let Some(center) = mean_of(&cluster) {
            if (price - center) / center * 100.0 > tolerance_pct {
                flush(&mut cluster);
            }
        }
        cluster.push(price);
    }
    flush(&mut cluster);
    levels
}

/// Smallest percentage distance from `price` to any level.
#[must_use]
pub fn distance_to_nearest_pct(price: f64, levels: &[f64]) -> Option<f64> {
    levels
        .iter()
        .filter(|l| **l > 0.0)
        .map(|l| (price - l).abs() / l * 100.0)
        .min_by(f64::total_cmp)
}

fn mean_of(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
