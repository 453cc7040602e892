// ========================================================================================
//                                  Run configuration
// ========================================================================================

use crate::columns::ColumnSpec;
use crate::engine::ClumpMode;
use crate::links::MAX_COVERAGE_BINS;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The clumping rule, as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    #[default]
    Exact,
    Proxy,
}

/// The `[clump]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClumpSettings {
    pub mode: ModeSetting,
    /// Minimum r2 for a proxy link to hand its bins to the representative.
    pub proxy_threshold: f64,
    /// Fixed coverage mask width. Derived from the coverage file when absent.
    pub bins: Option<usize>,
    /// Run chromosomes in parallel.
    pub partition_by_chromosome: bool,
}

impl Default for ClumpSettings {
    fn default() -> Self {
        Self {
            mode: ModeSetting::Exact,
            proxy_threshold: 0.8,
            bins: None,
            partition_by_chromosome: true,
        }
    }
}

/// The `[secondary]` table.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecondarySettings {
    /// Layout of the secondary summary statistics. Falls back to `[columns]`.
    pub columns: Option<ColumnSpec>,
}

/// Settings for one run. Every field has a default, so an empty file is valid.
///
/// ```toml
/// [columns]
/// separator = "tab"
///
/// [columns.names]
/// statistic = "BETA"
///
/// [clump]
/// mode = "proxy"
/// proxy_threshold = 0.9
///
/// [secondary.columns.names]
/// statistic = "OR"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClumpConfig {
    pub columns: ColumnSpec,
    pub clump: ClumpSettings,
    pub secondary: SecondarySettings,
}

impl ClumpConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks the values serde cannot constrain. Call again after applying overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.clump.proxy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "proxy_threshold must lie in [0, 1], got {threshold}"
            )));
        }
        match self.clump.bins {
            Some(0) => Err(ConfigError::Invalid(
                "bins must be positive when given".to_string(),
            )),
            Some(bins) if bins > MAX_COVERAGE_BINS => Err(ConfigError::Invalid(format!(
                "bins must not exceed {MAX_COVERAGE_BINS}, got {bins}"
            ))),
            _ => Ok(()),
        }
    }

    /// The layout used to read the secondary summary statistics.
    pub fn secondary_columns(&self) -> &ColumnSpec {
        self.secondary.columns.as_ref().unwrap_or(&self.columns)
    }

    pub fn mode(&self) -> ClumpMode {
        match self.clump.mode {
            ModeSetting::Exact => ClumpMode::Exact,
            ModeSetting::Proxy => ClumpMode::Proxy {
                threshold: self.clump.proxy_threshold,
            },
        }
    }
}
