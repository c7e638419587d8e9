use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ensure_in_range, ensure_non_negative, ensure_ordered, ensure_positive};

/// Star detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detection threshold above background, in units of background sigma.
    pub threshold_sigma: f32,
    /// Smallest accepted component footprint, in pixels.
    pub min_star_size: usize,
    /// Largest accepted component footprint, in pixels.
    pub max_star_size: usize,
    /// Components whose bounding box comes closer than this to the image border are dropped.
    pub edge_margin: usize,
    /// Fraction of `full_scale` above which a peak counts as saturated.
    pub saturation_limit: f32,
    /// Sensor full-scale value. 1.0 for normalized data.
    pub full_scale: f32,
    /// Background tile size in pixels.
    pub tile_size: usize,
    /// Gaussian pre-blur sigma applied before thresholding. 0 disables it.
    pub blur_sigma: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold_sigma: 5.0,
            min_star_size: 5,
            max_star_size: 2500,
            edge_margin: 10,
            saturation_limit: 0.95,
            full_scale: 1.0,
            tile_size: 64,
            blur_sigma: 1.0,
        }
    }
}

impl DetectionConfig {
    /// Preset for faint fields: lower threshold, smaller minimum footprint.
    pub fn faint() -> Self {
        Self {
            threshold_sigma: 3.0,
            min_star_size: 3,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("detection.threshold_sigma", self.threshold_sigma as f64)?;
        ensure_positive("detection.min_star_size", self.min_star_size as f64)?;
        ensure_ordered(
            "detection.min_star_size",
            self.min_star_size as f64,
            "detection.max_star_size",
            self.max_star_size as f64,
        )?;
        ensure_in_range(
            "detection.saturation_limit",
            self.saturation_limit as f64,
            f64::MIN_POSITIVE,
            1.0,
            "in (0, 1]",
        )?;
        ensure_positive("detection.full_scale", self.full_scale as f64)?;
        ensure_in_range(
            "detection.tile_size",
            self.tile_size as f64,
            8.0,
            1024.0,
            "in [8, 1024]",
        )?;
        ensure_non_negative("detection.blur_sigma", self.blur_sigma as f64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_valid() {
        DetectionConfig::default().validate().unwrap();
        DetectionConfig::faint().validate().unwrap();
    }

    #[test]
    fn test_saturation_out_of_range() {
        let config = DetectionConfig {
            saturation_limit: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("detection.saturation_limit"));

        let config = DetectionConfig {
            saturation_limit: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = DetectionConfig {
            threshold_sigma: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
