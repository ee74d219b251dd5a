pub mod config;
pub mod config_loader;
pub mod dict;
pub mod error;
pub mod frame;
pub mod linalg;
pub mod stats;
pub mod zone;

pub use config::{
    AnalysisConfig, ColumnConfig, FeatureConfig, HypothesisSettings, SequenceSettings,
    StrategyParams, StrategySelection, ValidationSettings,
};
pub use config_loader::ConfigLoader;
pub use dict::DictRecord;
pub use error::{AnalysisError, Result};
pub use frame::{BarFrame, BarFrameBuilder};
pub use linalg::OlsFit;
pub use zone::{ZoneDetector, ZoneRecord, ZoneType};
