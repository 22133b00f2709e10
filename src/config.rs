//! Study configuration read from TOML.
//!
//! Every field has a default, so an empty file (or no file) describes the
//! standard set of analyses:
//!
//! ```toml
//! seed = 2024
//! confidence = 0.95
//!
//! [paired]
//! n = 15
//! effect = 1.5
//!
//! [variogram]
//! family = "exponential"
//! width = 5.0
//! cutoff = 40.0
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::random::{SpatialFieldSpec, TwoLinesSpec};
use crate::regression::GroupEffect;
use crate::ttest::Alternative;
use crate::variogram::ColumnRoles;
use crate::vgm_fit::{FitOptions, InitialGuess, ModelFamily};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Population drawn once, from which a small sample is summarized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub size: usize,
    pub sample_size: usize,
    pub mean: f64,
    pub sd: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: 10_000,
            sample_size: 30,
            mean: 170.0,
            sd: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairedConfig {
    pub n: usize,
    pub mean: f64,
    pub between_sd: f64,
    pub effect: f64,
    pub within_sd: f64,
}

impl Default for PairedConfig {
    fn default() -> Self {
        Self {
            n: 12,
            mean: 50.0,
            between_sd: 8.0,
            effect: 2.0,
            within_sd: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub data: TwoLinesSpec,
    pub group_effect: GroupEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariogramConfig {
    pub field: SpatialFieldSpec,
    pub columns: ColumnRoles,
    /// Bin width; with `cutoff`, overrides the automatic bins.
    pub width: Option<f64>,
    pub cutoff: Option<f64>,
    pub family: ModelFamily,
    /// Derived from the empirical variogram when absent.
    pub initial_guess: Option<InitialGuess>,
    pub fit: FitOptions,
}

impl Default for VariogramConfig {
    fn default() -> Self {
        Self {
            field: SpatialFieldSpec::default(),
            columns: ColumnRoles::default(),
            width: None,
            cutoff: None,
            family: ModelFamily::Spherical,
            initial_guess: None,
            fit: FitOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub seed: u64,
    pub confidence: f64,
    pub alternative: Alternative,
    pub population: PopulationConfig,
    pub paired: PairedConfig,
    pub regression: RegressionConfig,
    pub variogram: VariogramConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            seed: 2024,
            confidence: 0.95,
            alternative: Alternative::TwoSided,
            population: PopulationConfig::default(),
            paired: PairedConfig::default(),
            regression: RegressionConfig::default(),
            variogram: VariogramConfig::default(),
        }
    }
}

impl StudyConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.population.sample_size > self.population.size {
            return Err(ConfigError::Invalid(format!(
                "sample size {} exceeds population size {}",
                self.population.sample_size, self.population.size
            )));
        }
        if self.variogram.width.is_some() != self.variogram.cutoff.is_some() {
            return Err(ConfigError::Invalid(
                "variogram width and cutoff must be given together".into(),
            ));
        }
        Ok(())
    }
}
