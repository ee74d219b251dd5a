//! Error taxonomy shared by every zone-analysis crate.
//!
//! Configuration and statistical-validity problems propagate to the caller.
//! Failures local to one metric family on one zone are represented by
//! [`AnalysisError::StrategyComputation`] and are absorbed by the feature
//! extractor, which records a null block instead of aborting the batch.

use thiserror::Error;

/// Errors produced by zone analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Invalid parameter, parameter combination or unknown option.
    #[error("configuration error: {parameter}: {message}")]
    Configuration {
        /// Name of the offending parameter.
        parameter: String,
        /// Human-readable explanation including the expected value.
        message: String,
    },

    /// A required column is absent from a bar table.
    #[error("missing column '{column}' (available: {available})")]
    MissingColumn {
        /// Requested column name.
        column: String,
        /// Comma-separated list of columns that do exist.
        available: String,
    },

    /// A strategy name was not found in its family.
    #[error("unknown {family} strategy '{name}' (available: {available})")]
    StrategyNotFound {
        /// Metric family that was searched.
        family: String,
        /// Requested strategy name.
        name: String,
        /// Comma-separated list of registered names.
        available: String,
    },

    /// Sample size below the statistical minimum for an operation.
    #[error("insufficient data for {context}: need at least {required}, got {actual}")]
    InsufficientData {
        /// Operation or test that was attempted.
        context: String,
        /// Minimum number of observations required.
        required: usize,
        /// Number of observations available.
        actual: usize,
    },

    /// A metric-family strategy failed on a specific zone.
    #[error("{family} strategy '{strategy}' failed: {reason}")]
    StrategyComputation {
        /// Metric family of the failing strategy.
        family: String,
        /// Strategy name.
        strategy: String,
        /// What went wrong.
        reason: String,
    },

    /// Regression fit is underdetermined or numerically singular.
    #[error("model fit failed: {0}")]
    ModelFit(String),

    /// A numerical routine produced an unusable value.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Failure raised by an externally supplied analyze callable.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalysisError {
    /// Builds a [`AnalysisError::Configuration`] error.
    pub fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Builds an [`AnalysisError::InsufficientData`] error.
    pub fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            context: context.into(),
            required,
            actual,
        }
    }

    /// Builds an [`AnalysisError::StrategyComputation`] error.
    pub fn strategy(
        family: impl Into<String>,
        strategy: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StrategyComputation {
            family: family.into(),
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors that describe insufficient samples.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, AnalysisError>;
