//! Dictionary-style serialization contract for result types.
//!
//! Every record and result in the workspace derives serde, so the contract is
//! a blanket impl: `to_dict` produces a `serde_json::Value` object and
//! `from_dict` rehydrates it with identical field values.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AnalysisError, Result};

pub trait DictRecord: Serialize + DeserializeOwned {
    /// Converts the record into a JSON value.
    fn to_dict(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Rebuilds the record from a JSON value produced by [`DictRecord::to_dict`].
    ///
    /// # Errors
    /// Returns a configuration error if the value does not match the record shape.
    fn from_dict(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AnalysisError::configuration("dict", e.to_string()))
    }
}

impl<T: Serialize + DeserializeOwned> DictRecord for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;

    #[test]
    fn config_round_trips_through_dict() {
        let config = AnalysisConfig::default();
        let dict = config.to_dict();
        assert!(dict.is_object());
        let back = AnalysisConfig::from_dict(dict).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn mismatched_shape_is_reported() {
        let err = AnalysisConfig::from_dict(serde_json::json!({ "alpha": "high" })).unwrap_err();
        assert!(err.to_string().contains("dict"));
    }
}
