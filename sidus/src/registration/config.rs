use serde::{Deserialize, Serialize};

use super::transform::TransformType;
use crate::config::{ConfigError, ensure_in_range, ensure_positive};

/// Star registration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Brightest stars used from each frame.
    pub max_control_points: usize,
    /// Minimum inliers for a registration to be accepted.
    pub min_matches: usize,
    /// Inlier radius in pixels.
    pub tolerance: f64,
    /// Largest accepted residual RMS in pixels.
    pub max_residual: f64,
    /// Largest accepted translation in pixels.
    pub max_shift: f64,
    /// Triangle invariant matching tolerance.
    pub ratio_tolerance: f64,
    /// Minimum triangle votes for a point correspondence.
    pub min_votes: usize,
    /// Reject triangle pairs with opposite orientation (mirror images).
    pub check_orientation: bool,
    /// Model fitted during refinement.
    pub transform_type: TransformType,
    /// Upper bound on refine / re-classify rounds.
    pub refine_iterations: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_control_points: 50,
            min_matches: 6,
            tolerance: 2.0,
            max_residual: 1.0,
            max_shift: 200.0,
            ratio_tolerance: 0.01,
            min_votes: 3,
            check_orientation: true,
            transform_type: TransformType::Similarity,
            refine_iterations: 10,
        }
    }
}

impl RegistrationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_in_range(
            "registration.max_control_points",
            self.max_control_points as f64,
            3.0,
            f64::MAX,
            ">= 3",
        )?;
        ensure_in_range(
            "registration.min_matches",
            self.min_matches as f64,
            self.transform_type.min_points() as f64,
            f64::MAX,
            "at least the transform's minimum point count",
        )?;
        ensure_positive("registration.tolerance", self.tolerance)?;
        ensure_positive("registration.max_residual", self.max_residual)?;
        ensure_positive("registration.max_shift", self.max_shift)?;
        ensure_in_range(
            "registration.ratio_tolerance",
            self.ratio_tolerance,
            f64::MIN_POSITIVE,
            0.5,
            "in (0, 0.5]",
        )?;
        ensure_positive("registration.min_votes", self.min_votes as f64)?;
        ensure_positive("registration.refine_iterations", self.refine_iterations as f64)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        RegistrationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_min_matches_below_model_minimum() {
        let config = RegistrationConfig {
            transform_type: TransformType::Affine,
            min_matches: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registration.min_matches"));
    }

    #[test]
    fn test_zero_tolerance_rejected() {
        let config = RegistrationConfig {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
