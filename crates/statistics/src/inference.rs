//! Two-sample tests and the Shapiro-Wilk normality test.
//!
//! All p-values are two-sided. Minimum group sizes are enforced with
//! [`AnalysisError::InsufficientData`] instead of returning a statistic
//! computed from too few samples.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};
use zone_analysis_core::stats::{
    finite_or_max, mean, normal_cdf, normal_ppf, polyval, ranks, sample_variance,
    student_t_two_sided, tie_counts,
};
use zone_analysis_core::{AnalysisError, Result};

/// Smallest group accepted by the two-sample tests.
pub const MIN_GROUP_SIZE: usize = 2;

/// Sample-size range of the Shapiro-Wilk approximation.
pub const SHAPIRO_MIN: usize = 3;
pub const SHAPIRO_MAX: usize = 5000;

const EPS: f64 = 1e-12;

/// Statistic, p-value and effect size of a two-sample comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoSampleTest {
    pub statistic: f64,
    pub p_value: f64,
    /// Cohen's d for the t-test, rank-biserial correlation for Mann-Whitney U.
    pub effect_size: f64,
}

fn check_groups(test: &str, a: &[f64], b: &[f64]) -> Result<()> {
    for (label, group) in [("first", a), ("second", b)] {
        if group.len() < MIN_GROUP_SIZE {
            return Err(AnalysisError::insufficient(
                format!("{test} ({label} group)"),
                MIN_GROUP_SIZE,
                group.len(),
            ));
        }
    }
    Ok(())
}

// ============================================
// Student's t-test
// ============================================

/// Independent two-sample t-test with pooled variance.
///
/// The effect size is Cohen's d on the pooled standard deviation. Two
/// constant groups with different means give `p = 0`; with equal means `p = 1`.
///
/// # Errors
/// Returns [`AnalysisError::InsufficientData`] if either group has fewer
/// than [`MIN_GROUP_SIZE`] values.
pub fn student_t_test(a: &[f64], b: &[f64]) -> Result<TwoSampleTest> {
    check_groups("t-test", a, b)?;

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (m1, m2) = (mean(a).unwrap_or(0.0), mean(b).unwrap_or(0.0));
    let (v1, v2) = (
        sample_variance(a).unwrap_or(0.0),
        sample_variance(b).unwrap_or(0.0),
    );

    let df = n1 + n2 - 2.0;
    let pooled_sd = (((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / df).max(0.0).sqrt();
    let se = pooled_sd * (1.0 / n1 + 1.0 / n2).sqrt();
    let delta = m1 - m2;

    if se <= EPS {
        let (t, p) = if delta.abs() <= EPS {
            (0.0, 1.0)
        } else {
            (f64::INFINITY.copysign(delta), 0.0)
        };
        return Ok(TwoSampleTest {
            statistic: finite_or_max(t),
            p_value: p,
            effect_size: 0.0,
        });
    }

    let t = delta / se;
    Ok(TwoSampleTest {
        statistic: t,
        p_value: student_t_two_sided(t, df),
        effect_size: delta / pooled_sd,
    })
}

// ============================================
// Mann-Whitney U
// ============================================

/// Mann-Whitney U test, normal approximation with tie and continuity corrections.
///
/// `statistic` is U of the first group; `effect_size` is the rank-biserial
/// correlation `2 U1 / (n1 n2) - 1`, positive when the first group tends larger.
///
/// # Errors
/// Returns [`AnalysisError::InsufficientData`] if either group has fewer
/// than [`MIN_GROUP_SIZE`] values.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Result<TwoSampleTest> {
    check_groups("Mann-Whitney U", a, b)?;

    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let all_ranks = ranks(&combined);
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let n = n1 + n2;

    let r1: f64 = all_ranks[..a.len()].iter().sum();
    let u1 = r1 - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;

    let tie_term: f64 = tie_counts(&combined)
        .into_iter()
        .map(|t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let sigma = (n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0))))
        .max(0.0)
        .sqrt();

    let p_value = if sigma > EPS {
        let z = (u1.max(u2) - n1 * n2 / 2.0 - 0.5) / sigma;
        (2.0 * (1.0 - normal_cdf(z))).clamp(0.0, 1.0)
    } else {
        1.0
    };

    Ok(TwoSampleTest {
        statistic: u1,
        p_value,
        effect_size: 2.0 * u1 / (n1 * n2) - 1.0,
    })
}

// ============================================
// Shapiro-Wilk
// ============================================

const C1: [f64; 6] = [0.0, 0.221_157, -0.147_981, -2.071_19, 4.434_685, -2.706_056];
const C2: [f64; 6] = [0.0, 0.042_981, -0.293_762, -1.752_461, 5.682_633, -3.582_633];
const G: [f64; 2] = [-2.273, 0.459];
const C3: [f64; 4] = [0.544, -0.399_78, 0.025_054, -6.714e-4];
const C4: [f64; 4] = [1.3822, -0.778_57, 0.062_767, -0.002_032_2];
const C5: [f64; 4] = [-1.5861, -0.310_82, -0.083_751, 0.003_891_5];
const C6: [f64; 3] = [-0.4803, -0.082_676, 0.003_030_2];

/// W statistic and p-value of a Shapiro-Wilk test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapiroWilk {
    pub w: f64,
    pub p_value: f64,
}

impl ShapiroWilk {
    /// Normality is not rejected at `alpha`.
    #[must_use]
    pub fn is_normal(&self, alpha: f64) -> bool {
        self.p_value > alpha
    }
}

/// Shapiro-Wilk test using Royston's approximation of the coefficients and
/// of the W distribution (valid for 3 to 5000 observations).
///
/// # Errors
/// Returns [`AnalysisError::InsufficientData`] below three values,
/// [`AnalysisError::Configuration`] above five thousand, and
/// [`AnalysisError::Numerical`] when every value is identical.
pub fn shapiro_wilk(values: &[f64]) -> Result<ShapiroWilk> {
    let n = values.len();
    if n < SHAPIRO_MIN {
        return Err(AnalysisError::insufficient("Shapiro-Wilk", SHAPIRO_MIN, n));
    }
    if n > SHAPIRO_MAX {
        return Err(AnalysisError::configuration(
            "values",
            format!("Shapiro-Wilk supports at most {SHAPIRO_MAX} observations, got {n}"),
        ));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    if sorted[n - 1] - sorted[0] <= EPS {
        return Err(AnalysisError::Numerical(
            "Shapiro-Wilk is undefined for a constant sample".to_string(),
        ));
    }

    let a = shapiro_coefficients(n);
    let mu = mean(&sorted).unwrap_or(0.0);
    let ss: f64 = sorted.iter().map(|x| (x - mu).powi(2)).sum();
    let num: f64 = a.iter().zip(&sorted).map(|(ai, xi)| ai * xi).sum();
    let w = (num * num / ss).min(1.0);

    Ok(ShapiroWilk {
        w,
        p_value: shapiro_p_value(w, n),
    })
}

/// Antisymmetric coefficients for the ascending order statistics.
fn shapiro_coefficients(n: usize) -> Vec<f64> {
    if n == 3 {
        return vec![-FRAC_1_SQRT_2, 0.0, FRAC_1_SQRT_2];
    }

    let nf = n as f64;
    let m: Vec<f64> = (1..=n)
        .map(|i| normal_ppf((i as f64 - 0.375) / (nf + 0.25)))
        .collect();
    let summ2: f64 = m.iter().map(|v| v * v).sum();
    let ssumm2 = summ2.sqrt();
    let u = 1.0 / nf.sqrt();

    let mut a = vec![0.0; n];
    let an = polyval(&C1, u) + m[n - 1] / ssumm2;
    a[n - 1] = an;
    a[0] = -an;

    let (edge, phi) = if n > 5 {
        let an1 = polyval(&C2, u) + m[n - 2] / ssumm2;
        a[n - 2] = an1;
        a[1] = -an1;
        let phi = (summ2 - 2.0 * m[n - 1].powi(2) - 2.0 * m[n - 2].powi(2))
            / (1.0 - 2.0 * an.powi(2) - 2.0 * an1.powi(2));
        (2, phi)
    } else {
        let phi = (summ2 - 2.0 * m[n - 1].powi(2)) / (1.0 - 2.0 * an.powi(2));
        (1, phi)
    };

    let scale = phi.sqrt();
    for i in edge..n - edge {
        a[i] = m[i] / scale;
    }
    a
}

fn shapiro_p_value(w: f64, n: usize) -> f64 {
    if n == 3 {
        let p = 6.0 / PI * (w.sqrt().asin() - 0.75_f64.sqrt().asin());
        return p.clamp(0.0, 1.0);
    }
    if w >= 1.0 - EPS {
        return 1.0;
    }

    let nf = n as f64;
    let mut y = (1.0 - w).ln();
    let (m, s) = if n <= 11 {
        let gamma = polyval(&G, nf);
        if y >= gamma {
            return 0.0;
        }
        y = -(gamma - y).ln();
        (polyval(&C3, nf), polyval(&C4, nf).exp())
    } else {
        let ln_n = nf.ln();
        (polyval(&C5, ln_n), polyval(&C6, ln_n).exp())
    };

    (1.0 - normal_cdf((y - m) / s)).clamp(0.0, 1.0)
}
