use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};

/// Environment variable prefix; nested keys use `__`, e.g. `ZONES_VALIDATION__TRAIN_RATIO`.
pub const ENV_PREFIX: &str = "ZONES_";

pub struct ConfigLoader {
    dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new("config")
    }
}

impl ConfigLoader {
    /// Creates a loader reading `zones.toml` / `zones.json` from `dir`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Loads analysis configuration by merging defaults, TOML, environment variables, and JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load(&self) -> Result<AnalysisConfig> {
        self.extract(self.layered(None))
    }

    /// Loads analysis configuration with a profile overlay (`zones.{profile}.toml`).
    ///
    /// The overlay sits between `zones.toml` and the environment, so
    /// `ZONES_*` variables still win.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load_with_profile(&self, profile: &str) -> Result<AnalysisConfig> {
        self.extract(self.layered(Some(profile)))
    }

    /// Defaults, `zones.toml`, the optional profile, then the environment once.
    /// `zones.json` only fills keys nothing else set.
    fn layered(&self, profile: Option<&str>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AnalysisConfig::default()))
            .merge(Toml::file(self.dir.join("zones.toml")));
        if let Some(profile) = profile {
            figment = figment.merge(Toml::file(self.dir.join(format!("zones.{profile}.toml"))));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file(self.dir.join("zones.json")))
    }

    fn extract(&self, figment: Figment) -> Result<AnalysisConfig> {
        let config: AnalysisConfig = figment
            .extract()
            .map_err(|e| AnalysisError::configuration("config", e.to_string()))?;
        config.validate()?;
        tracing::debug!(dir = %self.dir.display(), "Loaded analysis configuration");
        Ok(config)
    }
}
