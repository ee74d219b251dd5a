//! Ordinary least squares on `nalgebra` matrices.
//!
//! Shared by the regression analyzer and the ADF stationarity test.

use nalgebra::{DMatrix, DVector};

use crate::error::{AnalysisError, Result};

/// Relative singular-value cutoff below which the design is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

/// Result of an OLS fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Estimated coefficients, in design-column order.
    pub coefficients: DVector<f64>,
    /// Standard errors of the coefficients.
    pub standard_errors: DVector<f64>,
    pub fitted: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Sum of squared residuals.
    pub ssr: f64,
    /// Total sum of squares around the mean of `y`.
    pub tss: f64,
    pub nobs: usize,
    /// Number of estimated parameters (design columns).
    pub nparams: usize,
    /// Condition number of the design matrix.
    pub condition_number: f64,
}

impl OlsFit {
    /// Residual degrees of freedom.
    #[must_use]
    pub fn df_resid(&self) -> usize {
        self.nobs - self.nparams
    }

    /// Coefficient of determination (assumes the design includes an intercept).
    #[must_use]
    pub fn r_squared(&self) -> f64 {
        if self.tss <= f64::EPSILON {
            return 0.0;
        }
        1.0 - self.ssr / self.tss
    }

    /// t statistics of each coefficient.
    #[must_use]
    pub fn t_values(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(self.standard_errors.iter())
            .map(|(b, se)| if *se > 0.0 { b / se } else { 0.0 })
            .collect()
    }

    /// Gaussian log-likelihood of the fit.
    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        let sigma2 = (self.ssr / n).max(f64::MIN_POSITIVE);
        -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + sigma2.ln() + 1.0)
    }

    /// Akaike information criterion.
    #[must_use]
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.nparams as f64
    }

    /// Bayesian information criterion.
    #[must_use]
    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood() + (self.nobs as f64).ln() * self.nparams as f64
    }
}

/// Fits `y = X b + e` by least squares.
///
/// # Errors
/// Returns [`AnalysisError::ModelFit`] if the system is underdetermined
/// (`nobs <= nparams`), lengths disagree, or `X` is rank deficient.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit> {
    let (nobs, nparams) = x.shape();
    if y.len() != nobs {
        return Err(AnalysisError::ModelFit(format!(
            "design has {nobs} rows but target has {} values",
            y.len()
        )));
    }
    if nparams == 0 || nobs <= nparams {
        return Err(AnalysisError::ModelFit(format!(
            "underdetermined system: {nobs} observations for {nparams} parameters"
        )));
    }

    let condition_number = condition_number(x);
    if !condition_number.is_finite() {
        return Err(AnalysisError::ModelFit(
            "design matrix is rank deficient (perfect multicollinearity)".to_string(),
        ));
    }

    let xt = x.transpose();
    let xtx = &xt * x;
    let xtx_inv = xtx
        .try_inverse()
        .ok_or_else(|| AnalysisError::ModelFit("X'X is singular".to_string()))?;
    let coefficients = &xtx_inv * (&xt * y);
    let fitted = x * &coefficients;
    let residuals = y - &fitted;

    let ssr = residuals.dot(&residuals);
    let y_mean = y.mean();
    let tss = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();

    let sigma2 = ssr / (nobs - nparams) as f64;
    let standard_errors = DVector::from_iterator(
        nparams,
        (0..nparams).map(|j| (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt()),
    );

    Ok(OlsFit {
        coefficients,
        standard_errors,
        fitted,
        residuals,
        ssr,
        tss,
        nobs,
        nparams,
        condition_number,
    })
}

/// Ratio of the largest to the smallest singular value of `x`.
///
/// Returns infinity when the smallest singular value is numerically zero.
#[must_use]
pub fn condition_number(x: &DMatrix<f64>) -> f64 {
    let singular = x.clone().svd(false, false).singular_values;
    let max = singular.iter().copied().fold(0.0_f64, f64::max);
    let min = singular.iter().copied().fold(f64::INFINITY, f64::min);
    if max <= 0.0 || min <= max * RANK_TOLERANCE {
        f64::INFINITY
    } else {
        max / min
    }
}

/// Builds a design matrix with a leading intercept column from row vectors.
#[must_use]
pub fn design_with_intercept(rows: &[Vec<f64>]) -> DMatrix<f64> {
    let ncols = rows.first().map_or(0, Vec::len) + 1;
    DMatrix::from_fn(rows.len(), ncols, |i, j| if j == 0 { 1.0 } else { rows[i][j - 1] })
}
