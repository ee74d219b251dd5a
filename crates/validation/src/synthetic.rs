//! Synthetic bar series for Monte Carlo validation.
//!
//! Every generator keeps the index of the source frame. `ShufflePrices`
//! moves whole bars, extra columns included, so stored indicators stay
//! aligned with the prices they were computed from. The return-based
//! generators invent new prices, so they drop every extra column: an
//! analyze callable used with them must derive its indicator columns from
//! the prices it is given.

use std::fmt;

use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use zone_analysis_core::stats::{mean, sample_std};
use zone_analysis_core::{AnalysisError, BarFrame, Result};

/// How a synthetic series is derived from the real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMethod {
    /// Permute close-to-close returns and compound them from the first close.
    #[default]
    ShuffleReturns,
    /// Permute whole bars: prices, volume and extra columns move together.
    ShufflePrices,
    /// Gaussian log-return walk with the observed drift and volatility.
    RandomWalk,
}

impl ShuffleMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ShuffleReturns => "shuffle_returns",
            Self::ShufflePrices => "shuffle_prices",
            Self::RandomWalk => "random_walk",
        }
    }
}

impl fmt::Display for ShuffleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds one synthetic copy of `frame`.
///
/// Return-based methods keep volume attached to the return it arrived with
/// (`RandomWalk` keeps it in place) and strip the extra columns.
///
/// # Errors
/// Returns [`AnalysisError::InsufficientData`] for fewer than two bars and
/// [`AnalysisError::Numerical`] when a return-based method meets a
/// non-positive or non-finite close.
pub fn synthesize(frame: &BarFrame, method: ShuffleMethod, seed: u64) -> Result<BarFrame> {
    if frame.len() < 2 {
        return Err(AnalysisError::insufficient("synthetic series", 2, frame.len()));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    match method {
        ShuffleMethod::ShufflePrices => {
            let mut order: Vec<usize> = (0..frame.len()).collect();
            order.shuffle(&mut rng);
            frame.reorder_rows(&order)
        }
        ShuffleMethod::ShuffleReturns => {
            let returns = log_returns(frame.close())?;
            // bar 0 anchors the walk; bar k+1 carries return k
            let mut order: Vec<usize> = (1..frame.len()).collect();
            order.shuffle(&mut rng);
            let shuffled: Vec<f64> = order.iter().map(|&bar| returns[bar - 1]).collect();
            order.insert(0, 0);
            let moved = frame.reorder_rows(&order)?.without_extra_columns();
            rescale(&moved, &compound(frame.close()[0], &shuffled))
        }
        ShuffleMethod::RandomWalk => {
            let observed = log_returns(frame.close())?;
            let drift = mean(&observed).unwrap_or(0.0);
            let sigma = sample_std(&observed).unwrap_or(0.0);
            let returns: Vec<f64> = if sigma > 0.0 {
                let normal = Normal::new(drift, sigma)
                    .map_err(|e| AnalysisError::Numerical(e.to_string()))?;
                (0..observed.len()).map(|_| normal.sample(&mut rng)).collect()
            } else {
                vec![drift; observed.len()]
            };
            rescale(&frame.without_extra_columns(), &compound(frame.close()[0], &returns))
        }
    }
}

fn log_returns(close: &[f64]) -> Result<Vec<f64>> {
    if close.iter().any(|c| !c.is_finite() || *c <= 0.0) {
        return Err(AnalysisError::Numerical(
            "return-based synthesis needs strictly positive closes".to_string(),
        ));
    }
    Ok(close.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
}

fn compound(start: f64, returns: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(returns.len() + 1);
    out.push(start);
    let mut price = start;
    for r in returns {
        price *= r.exp();
        out.push(price);
    }
    out
}

/// Moves each bar's open, high and low with the ratio of new to old close.
fn rescale(frame: &BarFrame, close: &[f64]) -> Result<BarFrame> {
    let ratio: Vec<f64> = close.iter().zip(frame.close()).map(|(n, o)| n / o).collect();
    let scale = |col: &[f64]| col.iter().zip(&ratio).map(|(v, r)| v * r).collect::<Vec<f64>>();
    frame.with_ohlc(
        scale(frame.open()),
        scale(frame.high()),
        scale(frame.low()),
        close.to_vec(),
    )
}
