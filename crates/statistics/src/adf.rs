//! Augmented Dickey-Fuller unit-root test (constant, no trend).
//!
//! The lag order is chosen by AIC over a common sample, then the test
//! regression is refitted on every observation the chosen lag allows.
//! P-values use MacKinnon's (1994) response-surface approximation and the
//! critical values his (2010) finite-sample polynomials.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zone_analysis_core::linalg::{ols, OlsFit};
use zone_analysis_core::stats::{diff, negligible_spread, normal_cdf, polyval, sample_variance};
use zone_analysis_core::{AnalysisError, Result};

/// Shortest series the test accepts.
pub const ADF_MIN_OBSERVATIONS: usize = 10;

const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038_269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.932_02, -0.127_45, -0.010_368];

const CRITICAL: [(&str, [f64; 4]); 3] = [
    ("1%", [-3.430_35, -6.5393, -16.786, -79.433]),
    ("5%", [-2.861_54, -2.8903, -4.234, -40.04]),
    ("10%", [-2.566_77, -1.5384, -2.809, 0.0]),
];

/// Outcome of an ADF test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    /// t statistic of the lagged level.
    pub statistic: f64,
    pub p_value: f64,
    /// Number of lagged differences in the final regression.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    /// Critical values keyed `1%`, `5%`, `10%`.
    pub critical_values: BTreeMap<String, f64>,
    /// AIC of the selected lag during the search.
    pub aic: f64,
}

impl AdfResult {
    /// Unit root rejected at `alpha`.
    #[must_use]
    pub fn is_stationary(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Runs the test on `series`.
///
/// # Errors
/// Returns [`AnalysisError::InsufficientData`] below [`ADF_MIN_OBSERVATIONS`],
/// [`AnalysisError::Numerical`] for a constant series and
/// [`AnalysisError::ModelFit`] when no lag order yields a solvable regression.
pub fn adf_test(series: &[f64]) -> Result<AdfResult> {
    let n = series.len();
    if n < ADF_MIN_OBSERVATIONS {
        return Err(AnalysisError::insufficient(
            "augmented Dickey-Fuller test",
            ADF_MIN_OBSERVATIONS,
            n,
        ));
    }
    if series.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::Numerical(
            "ADF input contains non-finite values".to_string(),
        ));
    }
    if negligible_spread(sample_variance(series).unwrap_or(0.0), series) {
        return Err(AnalysisError::Numerical("ADF input is constant".to_string()));
    }

    let dy = diff(series);
    let max_lag = max_lag(n);

    let search_nobs = dy.len() - max_lag;
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (x, y) = design(series, &dy, lag, search_nobs);
        match ols(&x, &y) {
            Ok(fit) => {
                let aic = fit.aic();
                debug!(lag, aic, "ADF lag candidate");
                if best.map_or(true, |(b, _)| aic < b) {
                    best = Some((aic, lag));
                }
            }
            Err(e) => debug!(lag, error = %e, "ADF lag candidate skipped"),
        }
    }
    let (aic, used_lag) = best.ok_or_else(|| {
        AnalysisError::ModelFit("no ADF lag order produced a solvable regression".to_string())
    })?;

    let nobs = dy.len() - used_lag;
    let (x, y) = design(series, &dy, used_lag, nobs);
    let fit: OlsFit = ols(&x, &y)?;
    let statistic = fit.t_values()[0];

    let critical_values = CRITICAL
        .iter()
        .map(|(label, coef)| ((*label).to_string(), polyval(coef, 1.0 / nobs as f64)))
        .collect();

    Ok(AdfResult {
        statistic,
        p_value: mackinnon_p_value(statistic),
        used_lag,
        nobs,
        critical_values,
        aic,
    })
}

/// Schwert's rule `ceil(12 (n/100)^(1/4))`, capped so the largest model keeps residual df.
fn max_lag(n: usize) -> usize {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    schwert.min((n / 2).saturating_sub(2))
}

/// Design `[y_{t-1}, dy_{t-1} .. dy_{t-lag}, 1]` and target `dy_t` over the last `nobs` differences.
fn design(series: &[f64], dy: &[f64], lag: usize, nobs: usize) -> (DMatrix<f64>, DVector<f64>) {
    let first = dy.len() - nobs;
    let ncols = lag + 2;
    let x = DMatrix::from_fn(nobs, ncols, |r, c| {
        let t = first + r;
        match c {
            0 => series[t],
            c if c == ncols - 1 => 1.0,
            c => dy[t - c],
        }
    });
    let y = DVector::from_iterator(nobs, dy[first..].iter().copied());
    (x, y)
}

/// MacKinnon approximate p-value for the constant-only, single-series case.
#[must_use]
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic.is_nan() {
        return 1.0;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coef: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    normal_cdf(polyval(coef, statistic))
}
