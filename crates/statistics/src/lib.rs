//! Statistical analysis of extracted zone features.
//!
//! - [`HypothesisTestSuite`]: duration effect, bull/bear asymmetry,
//!   correlation vs drawdown, ADF stationarity and support/resistance proximity
//! - [`RegressionAnalyzer`]: OLS with standard diagnostics
//! - [`SequenceAnalyzer`]: transition table, runs test, n-gram patterns and
//!   k-means clustering
//!
//! The test primitives ([`inference`], [`adf`]) are public for reuse.

pub mod adf;
pub mod clustering;
pub mod hypothesis;
pub mod inference;
pub mod levels;
pub mod regression;
pub mod result;
pub mod sequence;

pub use adf::{adf_test, mackinnon_p_value, AdfResult, ADF_MIN_OBSERVATIONS};
pub use clustering::{silhouette_score, standardize, KMeans, KMeansFit};
pub use hypothesis::{HypothesisTestSuite, TestParams, TEST_NAMES};
pub use inference::{mann_whitney_u, shapiro_wilk, student_t_test, ShapiroWilk, TwoSampleTest};
pub use levels::{identify_levels, PriceLevel};
pub use regression::{
    RegressionAnalyzer, RegressionDiagnostics, RegressionResult, RegressionTarget,
    DEFAULT_PREDICTORS,
};
pub use result::{HypothesisSummary, HypothesisTestResult};
pub use sequence::{
    ClusterAnalysis, ClusterSummary, PatternAlphabet, SequenceAnalyzer, SequencePattern,
    TransitionTable,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone, Utc};
    use zone_analysis_core::ZoneType;
    use zone_analysis_features::ZoneFeatureRecord;

    /// A record with base fields only; every metric block is absent.
    pub(crate) fn record(
        id: usize,
        zone_type: ZoneType,
        duration: usize,
        return_pct: f64,
    ) -> ZoneFeatureRecord {
        let start_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(id as i64);
        let start_price = 100.0;
        let end_price = start_price * (1.0 + return_pct / 100.0);
        ZoneFeatureRecord {
            id,
            zone_type,
            duration,
            start_time,
            end_time: start_time + Duration::hours(duration as i64 - 1),
            start_price,
            end_price,
            return_pct,
            high: start_price.max(end_price),
            low: start_price.min(end_price),
            range_pct: (start_price - end_price).abs() / start_price * 100.0,
            amplitude: 1.0,
            indicator_area: duration as f64,
            peak_count: 0,
            trough_count: 0,
            drawdown_pct: None,
            rally_pct: None,
            time_to_peak_ratio: 1.0,
            time_to_trough_ratio: 0.0,
            price_indicator_correlation: None,
            swing: None,
            shape: None,
            divergence: None,
            volatility: None,
            volume: None,
            metadata: BTreeMap::new(),
        }
    }
}
