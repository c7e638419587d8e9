//! Top-level run configuration.
//!
//! Every module owns its own section ([`DetectionConfig`], [`RegistrationConfig`],
//! [`AlignConfig`], [`BatchConfig`], [`StackConfig`]); [`Config`] nests them and is the
//! unit that gets validated, serialized and handed to the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::AlignConfig;
use crate::batch::BatchConfig;
use crate::pipeline::ReferencePolicy;
use crate::registration::RegistrationConfig;
use crate::stacking::StackConfig;
use crate::star_detection::DetectionConfig;

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{min_field} ({min}) must not exceed {max_field} ({max})")]
    InvertedRange {
        min_field: &'static str,
        min: f64,
        max_field: &'static str,
        max: f64,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),
}

/// Fail unless `value > 0` and finite.
pub(crate) fn ensure_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "> 0",
        })
    }
}

/// Fail unless `value >= 0` and finite.
pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: ">= 0",
        })
    }
}

/// Fail unless `min <= value <= max`.
pub(crate) fn ensure_in_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

/// Fail when `min > max`.
pub(crate) fn ensure_ordered(
    min_field: &'static str,
    min: f64,
    max_field: &'static str,
    max: f64,
) -> Result<(), ConfigError> {
    if min <= max {
        Ok(())
    } else {
        Err(ConfigError::InvertedRange {
            min_field,
            min,
            max_field,
            max,
        })
    }
}

/// Complete configuration for a registration-and-stacking run.
///
/// Missing sections and fields fall back to their defaults when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub registration: RegistrationConfig,
    pub align: AlignConfig,
    pub batch: BatchConfig,
    pub stack: StackConfig,
    /// How the reference frame is chosen when the caller does not pass one.
    pub reference: ReferencePolicy,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Check every section. The first invalid value wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.registration.validate()?;
        self.align.validate()?;
        self.batch.validate()?;
        self.stack.validate()?;
        Ok(())
    }
}
