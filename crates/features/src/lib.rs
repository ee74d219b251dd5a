//! Per-zone feature extraction with pluggable strategies.
//!
//! Five metric families (swing, shape, divergence, volatility, volume) each
//! have a trait with a fixed output record. Implementations are resolved by
//! name from a [`StrategyRegistry`] and run by the [`ZoneFeatureExtractor`].

pub mod divergence;
pub mod extractor;
pub mod extrema;
pub mod metrics;
pub mod record;
pub mod registry;
pub mod shape;
pub mod strategy;
pub mod swing;
pub mod volatility;
pub mod volume;

pub use divergence::{ExtremaPairsConfig, ExtremaPairsDivergence};
pub use extractor::ZoneFeatureExtractor;
pub use metrics::{
    DivergenceDirection, DivergenceKind, DivergenceMetrics, ShapeClass, ShapeMetrics,
    StrategyInfo, SwingMetrics, VolatilityMetrics, VolatilityRegime, VolatilityTrend,
    VolumeMetrics,
};
pub use record::{BlockProvenance, BlockStatus, ZoneFeatureRecord, BASE_FEATURES};
pub use registry::{FamilyRegistry, Factory, StrategyRegistry, StrategySet};
pub use shape::{MomentsConfig, MomentsShape};
pub use strategy::{
    parse_params, DivergenceStrategy, ShapeStrategy, Strategy, StrategyFamily, SwingStrategy,
    VolatilityStrategy, VolumeStrategy,
};
pub use swing::{
    LocalExtremaConfig, LocalExtremaSwing, NBarConfig, NBarSwing, ZigZagConfig, ZigZagSwing,
};
pub use volatility::{BandsRangeConfig, BandsRangeVolatility};
pub use volume::{BaselineVolume, BaselineVolumeConfig};
