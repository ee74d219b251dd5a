//! Descriptive statistics and distribution helpers.
//!
//! All helpers return `None` instead of `NaN` when a quantity is undefined
//! (empty input, zero variance, mismatched lengths), so callers can map
//! "not computable" onto optional fields without sentinel values.

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use statrs::statistics::Statistics;

/// Arithmetic mean.
#[must_use]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().mean())
}

/// Sample standard deviation (n - 1 denominator).
#[must_use]
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

/// Population standard deviation (n denominator).
#[must_use]
pub fn population_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().population_std_dev())
}

/// Sample variance (n - 1 denominator).
#[must_use]
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().variance())
}

/// Median with midpoint interpolation for even lengths.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile `q` in [0, 100] with linear interpolation between order statistics.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(percentile_sorted(&sorted, q))
}

/// Percentile of an already ascending-sorted, non-empty slice.
#[must_use]
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = (q / 100.0) * (n - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Fraction of `values` strictly below `x`, in percent.
#[must_use]
pub fn percentile_rank(values: &[f64], x: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let below = values.iter().filter(|v| **v < x).count();
    below as f64 / values.len() as f64 * 100.0
}

/// Pearson correlation coefficient.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;

    for (xi, yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if negligible_spread(var_x / n, x) || negligible_spread(var_y / n, y) {
        return None;
    }
    let denominator = (var_x * var_y).sqrt();
    if !denominator.is_finite() {
        return None;
    }

    Some((covariance / denominator).clamp(-1.0, 1.0))
}

/// Pearson correlation with its two-sided p-value (t-distribution, n - 2 df).
#[must_use]
pub fn pearson_test(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    if x.len() < 3 {
        return None;
    }
    let r = pearson(x, y)?;
    let df = x.len() as f64 - 2.0;
    let denom = 1.0 - r * r;
    if denom <= f64::EPSILON {
        return Some((r, 0.0));
    }
    let t = r * (df / denom).sqrt();
    Some((r, student_t_two_sided(t, df)))
}

/// Fisher-Pearson skewness (biased, third standardized moment).
#[must_use]
pub fn skewness(values: &[f64]) -> Option<f64> {
    let (m2, m3, _) = central_moments(values)?;
    if negligible_spread(m2, values) {
        return None;
    }
    Some(m3 / m2.powf(1.5))
}

/// Pearson kurtosis (fourth standardized moment, Gaussian = 3).
#[must_use]
pub fn kurtosis(values: &[f64]) -> Option<f64> {
    let (m2, _, m4) = central_moments(values)?;
    if negligible_spread(m2, values) {
        return None;
    }
    Some(m4 / (m2 * m2))
}

/// Whether a population variance is rounding noise relative to the values'
/// own magnitude. Independent of units, so rescaled data gets the same answer.
#[must_use]
pub fn negligible_spread(variance: f64, values: &[f64]) -> bool {
    if values.is_empty() || variance.is_nan() {
        return true;
    }
    let mean_square = values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64;
    variance <= f64::EPSILON * mean_square
}

fn central_moments(values: &[f64]) -> Option<(f64, f64, f64)> {
    let mu = mean(values)?;
    let n = values.len() as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mu;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    Some((m2 / n, m3 / n, m4 / n))
}

/// Least-squares slope of `values` against their index.
#[must_use]
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    Some(num / den)
}

/// First differences.
#[must_use]
pub fn diff(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Calculates ranks for a slice of values, handling ties with average rank.
///
/// Ranks are 1-based.
#[must_use]
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && (indexed[j].1 - indexed[i].1).abs() < f64::EPSILON {
            j += 1;
        }
        // positions i..j share ranks (i+1)..=j
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for item in &indexed[i..j] {
            ranks[item.0] = avg_rank;
        }
        i = j;
    }
    ranks
}

/// Sizes of tie groups in `values`.
#[must_use]
pub fn tie_counts(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mut counts = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && (sorted[j] - sorted[i]).abs() < f64::EPSILON {
            j += 1;
        }
        counts.push(j - i);
        i = j;
    }
    counts
}

/// Standard normal CDF.
#[must_use]
pub fn normal_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

/// Standard normal quantile function.
#[must_use]
pub fn normal_ppf(p: f64) -> f64 {
    Normal::standard().inverse_cdf(p)
}

/// Two-sided p-value of a standard normal statistic.
#[must_use]
pub fn normal_two_sided(z: f64) -> f64 {
    (2.0 * (1.0 - normal_cdf(z.abs()))).clamp(0.0, 1.0)
}

/// Two-sided p-value of a Student-t statistic with `df` degrees of freedom.
#[must_use]
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => normal_two_sided(t),
    }
}

/// Upper-tail p-value of an F statistic.
#[must_use]
pub fn f_upper_tail(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() {
        return 0.0;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => (1.0 - dist.cdf(f.max(0.0))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

/// Evaluates `c[0] + c[1] x + c[2] x^2 + ...`.
#[must_use]
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Clamps infinities to the largest finite magnitude so results stay serializable.
#[must_use]
pub fn finite_or_max(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value.is_infinite() {
        f64::MAX.copysign(value)
    } else {
        value
    }
}
