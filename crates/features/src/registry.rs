//! Name-keyed strategy factories, one table per metric family.
//!
//! The registry is an explicit value: build it once at startup (usually with
//! [`StrategyRegistry::with_builtins`]), add custom strategies, then pass it
//! by reference to [`crate::ZoneFeatureExtractor::from_config`]. Lookups only
//! happen while an extractor is being constructed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use zone_analysis_core::{AnalysisError, ColumnConfig, FeatureConfig, Result, StrategyParams};

use crate::divergence::ExtremaPairsDivergence;
use crate::shape::MomentsShape;
use crate::strategy::{
    DivergenceStrategy, ShapeStrategy, StrategyFamily, SwingStrategy, VolatilityStrategy,
    VolumeStrategy,
};
use crate::swing::{LocalExtremaSwing, NBarSwing, ZigZagSwing};
use crate::volatility::BandsRangeVolatility;
use crate::volume::BaselineVolume;

/// Constructor stored under a strategy name.
pub type Factory<S> = Arc<dyn Fn(&StrategyParams, &ColumnConfig) -> Result<Box<S>> + Send + Sync>;

/// Factories of one metric family.
pub struct FamilyRegistry<S: ?Sized> {
    family: StrategyFamily,
    factories: BTreeMap<String, Factory<S>>,
}

impl<S: ?Sized> FamilyRegistry<S> {
    /// Creates an empty table for `family`.
    #[must_use]
    pub fn new(family: StrategyFamily) -> Self {
        Self {
            family,
            factories: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn family(&self) -> StrategyFamily {
        self.family
    }

    /// Registers a factory under `name`.
    ///
    /// # Errors
    /// Returns a configuration error if the name is empty or already taken;
    /// use [`FamilyRegistry::replace`] to overwrite on purpose.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&StrategyParams, &ColumnConfig) -> Result<Box<S>> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AnalysisError::configuration(
                format!("{}.name", self.family),
                "strategy name must not be empty",
            ));
        }
        if self.factories.contains_key(&name) {
            return Err(AnalysisError::configuration(
                format!("{}.{name}", self.family),
                "strategy already registered; use replace to overwrite",
            ));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Registers a factory, overwriting any existing one with the same name.
    ///
    /// Returns true if a previous registration was replaced.
    pub fn replace<F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn(&StrategyParams, &ColumnConfig) -> Result<Box<S>> + Send + Sync + 'static,
    {
        let name = name.into();
        let replaced = self.factories.insert(name.clone(), Arc::new(factory)).is_some();
        if replaced {
            tracing::info!(family = %self.family, strategy = %name, "strategy replaced");
        }
        replaced
    }

    /// Instantiates the strategy registered as `name`.
    ///
    /// # Errors
    /// Returns [`AnalysisError::StrategyNotFound`] listing the registered names,
    /// or the factory's own configuration error for bad parameters.
    pub fn create(
        &self,
        name: &str,
        params: &StrategyParams,
        columns: &ColumnConfig,
    ) -> Result<Box<S>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AnalysisError::StrategyNotFound {
                family: self.family.to_string(),
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        factory(params, columns)
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<S: ?Sized> Clone for FamilyRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            family: self.family,
            factories: self.factories.clone(),
        }
    }
}

impl<S: ?Sized> fmt::Debug for FamilyRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyRegistry")
            .field("family", &self.family)
            .field("strategies", &self.names())
            .finish()
    }
}

/// One strategy instance per family, resolved from a [`FeatureConfig`].
pub struct StrategySet {
    pub swing: Box<dyn SwingStrategy>,
    pub shape: Box<dyn ShapeStrategy>,
    pub divergence: Box<dyn DivergenceStrategy>,
    pub volatility: Box<dyn VolatilityStrategy>,
    pub volume: Box<dyn VolumeStrategy>,
}

impl fmt::Debug for StrategySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySet")
            .field("swing", &self.swing.name())
            .field("shape", &self.shape.name())
            .field("divergence", &self.divergence.name())
            .field("volatility", &self.volatility.name())
            .field("volume", &self.volume.name())
            .finish()
    }
}

/// Registry of all five strategy families.
#[derive(Clone)]
pub struct StrategyRegistry {
    swing: FamilyRegistry<dyn SwingStrategy>,
    shape: FamilyRegistry<dyn ShapeStrategy>,
    divergence: FamilyRegistry<dyn DivergenceStrategy>,
    volatility: FamilyRegistry<dyn VolatilityStrategy>,
    volume: FamilyRegistry<dyn VolumeStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StrategyRegistry {
    /// Creates a registry with no strategies.
    #[must_use]
    pub fn new() -> Self {
        Self {
            swing: FamilyRegistry::new(StrategyFamily::Swing),
            shape: FamilyRegistry::new(StrategyFamily::Shape),
            divergence: FamilyRegistry::new(StrategyFamily::Divergence),
            volatility: FamilyRegistry::new(StrategyFamily::Volatility),
            volume: FamilyRegistry::new(StrategyFamily::Volume),
        }
    }

    /// Creates a registry holding every built-in strategy.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.swing.replace(ZigZagSwing::NAME, |params, _| {
            Ok(Box::new(ZigZagSwing::from_params(params)?) as Box<dyn SwingStrategy>)
        });
        registry.swing.replace(LocalExtremaSwing::NAME, |params, _| {
            Ok(Box::new(LocalExtremaSwing::from_params(params)?) as Box<dyn SwingStrategy>)
        });
        registry.swing.replace(NBarSwing::NAME, |params, _| {
            Ok(Box::new(NBarSwing::from_params(params)?) as Box<dyn SwingStrategy>)
        });
        registry.shape.replace(MomentsShape::NAME, |params, _| {
            Ok(Box::new(MomentsShape::from_params(params)?) as Box<dyn ShapeStrategy>)
        });
        registry.divergence.replace(ExtremaPairsDivergence::NAME, |params, columns| {
            Ok(Box::new(ExtremaPairsDivergence::from_params(params, columns)?)
                as Box<dyn DivergenceStrategy>)
        });
        registry.volatility.replace(BandsRangeVolatility::NAME, |params, _| {
            Ok(Box::new(BandsRangeVolatility::from_params(params)?) as Box<dyn VolatilityStrategy>)
        });
        registry.volume.replace(BaselineVolume::NAME, |params, columns| {
            Ok(Box::new(BaselineVolume::from_params(params, columns)?) as Box<dyn VolumeStrategy>)
        });

        registry
    }

    pub fn swing(&self) -> &FamilyRegistry<dyn SwingStrategy> {
        &self.swing
    }

    pub fn swing_mut(&mut self) -> &mut FamilyRegistry<dyn SwingStrategy> {
        &mut self.swing
    }

    pub fn shape(&self) -> &FamilyRegistry<dyn ShapeStrategy> {
        &self.shape
    }

    pub fn shape_mut(&mut self) -> &mut FamilyRegistry<dyn ShapeStrategy> {
        &mut self.shape
    }

    pub fn divergence(&self) -> &FamilyRegistry<dyn DivergenceStrategy> {
        &self.divergence
    }

    pub fn divergence_mut(&mut self) -> &mut FamilyRegistry<dyn DivergenceStrategy> {
        &mut self.divergence
    }

    pub fn volatility(&self) -> &FamilyRegistry<dyn VolatilityStrategy> {
        &self.volatility
    }

    pub fn volatility_mut(&mut self) -> &mut FamilyRegistry<dyn VolatilityStrategy> {
        &mut self.volatility
    }

    pub fn volume(&self) -> &FamilyRegistry<dyn VolumeStrategy> {
        &self.volume
    }

    pub fn volume_mut(&mut self) -> &mut FamilyRegistry<dyn VolumeStrategy> {
        &mut self.volume
    }

    /// Registered strategy names of one family.
    #[must_use]
    pub fn list(&self, family: StrategyFamily) -> Vec<String> {
        match family {
            StrategyFamily::Swing => self.swing.names(),
            StrategyFamily::Shape => self.shape.names(),
            StrategyFamily::Divergence => self.divergence.names(),
            StrategyFamily::Volatility => self.volatility.names(),
            StrategyFamily::Volume => self.volume.names(),
        }
    }

    /// Resolves one strategy per family.
    ///
    /// # Errors
    /// Returns the first unknown-name or parameter error encountered.
    pub fn build(&self, features: &FeatureConfig, columns: &ColumnConfig) -> Result<StrategySet> {
        let set = StrategySet {
            swing: self
                .swing
                .create(&features.swing.name, &features.swing.params, columns)?,
            shape: self
                .shape
                .create(&features.shape.name, &features.shape.params, columns)?,
            divergence: self.divergence.create(
                &features.divergence.name,
                &features.divergence.params,
                columns,
            )?,
            volatility: self.volatility.create(
                &features.volatility.name,
                &features.volatility.params,
                columns,
            )?,
            volume: self
                .volume
                .create(&features.volume.name, &features.volume.params, columns)?,
        };
        tracing::debug!(strategies = ?set, "resolved feature strategies");
        Ok(set)
    }
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("swing", &self.swing.names())
            .field("shape", &self.shape.names())
            .field("divergence", &self.divergence.names())
            .field("volatility", &self.volatility.names())
            .field("volume", &self.volume.names())
            .finish()
    }
}
