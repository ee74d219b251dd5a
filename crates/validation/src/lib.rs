//! Robustness validation for zone analyses.
//!
//! [`ValidationSuite`] treats an analysis as a black box: a callable from a
//! [`BarFrame`](zone_analysis_core::BarFrame) to any [`MetricSource`]. It
//! never looks inside the analysis, only at the metric being validated.

pub mod metric;
pub mod result;
pub mod suite;
pub mod synthetic;

pub use metric::MetricSource;
pub use result::{degradation_pct, stability_score, ValidationResult, ValidationType, WindowResult};
pub use suite::{
    parameter_combinations, walk_forward_windows, ParameterGrid, ParameterSet, ValidationSuite,
    WalkForwardConfig,
};
pub use synthetic::{synthesize, ShuffleMethod};
