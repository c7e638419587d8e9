//! Registration result and error types.

use thiserror::Error;

use crate::registration::transform::Transform;

/// Why a target could not be registered against the reference.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("Not enough stars: reference {reference}, target {target}, need {required}")]
    NotEnoughStars {
        reference: usize,
        target: usize,
        required: usize,
    },

    #[error("No matching star patterns found between images")]
    NoTriangleMatches,

    #[error("Matched stars are degenerate; no transform could be fitted")]
    Degenerate,

    #[error("Insufficient matches: {inliers} inliers, need {required}")]
    InsufficientMatches { inliers: usize, required: usize },

    #[error("Registration residual too high: {rms:.3} px (max {max_allowed:.3})")]
    ExcessiveResidual {
        rms: f64,
        max_allowed: f64,
        inliers: usize,
    },

    #[error("Registration shift too large: {shift:.1} px (max {max_allowed:.1})")]
    ExcessiveShift {
        shift: f64,
        max_allowed: f64,
        inliers: usize,
        rms: f64,
    },
}

impl RegistrationError {
    /// Inliers of the rejected fit, when a fit was produced.
    pub fn inlier_count(&self) -> Option<usize> {
        match self {
            RegistrationError::InsufficientMatches { inliers, .. }
            | RegistrationError::ExcessiveResidual { inliers, .. }
            | RegistrationError::ExcessiveShift { inliers, .. } => Some(*inliers),
            _ => None,
        }
    }

    /// Residual RMS of the rejected fit, when one was measured.
    pub fn residual_rms(&self) -> Option<f64> {
        match self {
            RegistrationError::ExcessiveResidual { rms, .. }
            | RegistrationError::ExcessiveShift { rms, .. } => Some(*rms),
            _ => None,
        }
    }
}

/// Result of registering a target point set against the reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    /// Reference → target transform.
    pub transform: Transform,

    /// Inlier correspondences as (reference_idx, target_idx).
    pub matched_stars: Vec<(usize, usize)>,

    /// Per-inlier residuals in pixels.
    pub residuals: Vec<f64>,

    pub rms_error: f64,
    pub max_error: f64,
    pub num_inliers: usize,

    /// Inliers over the smaller of the two control point sets.
    pub inlier_fraction: f64,

    /// Refinement rounds performed.
    pub iterations: usize,
}

impl RegistrationResult {
    pub fn new(
        transform: Transform,
        matched_stars: Vec<(usize, usize)>,
        residuals: Vec<f64>,
        candidate_count: usize,
    ) -> Self {
        debug_assert_eq!(matched_stars.len(), residuals.len());

        let rms_error = if residuals.is_empty() {
            0.0
        } else {
            let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
            (sum_sq / residuals.len() as f64).sqrt()
        };
        let max_error = residuals.iter().copied().fold(0.0, f64::max);
        let num_inliers = matched_stars.len();
        let inlier_fraction = if candidate_count == 0 {
            0.0
        } else {
            num_inliers as f64 / candidate_count as f64
        };

        Self {
            transform,
            matched_stars,
            residuals,
            rms_error,
            max_error,
            num_inliers,
            inlier_fraction,
            iterations: 0,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[test]
    fn test_statistics() {
        let result = RegistrationResult::new(
            Transform::translation(DVec2::new(1.0, 0.0)),
            vec![(0, 0), (1, 1), (2, 2), (3, 3)],
            vec![0.0, 1.0, 1.0, 2.0],
            8,
        );
        // sqrt((0 + 1 + 1 + 4) / 4)
        assert!((result.rms_error - 1.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(result.max_error, 2.0);
        assert_eq!(result.num_inliers, 4);
        assert!((result.inlier_fraction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty() {
        let result = RegistrationResult::new(Transform::identity(), vec![], vec![], 0);
        assert_eq!(result.rms_error, 0.0);
        assert_eq!(result.inlier_fraction, 0.0);
    }

    #[test]
    fn test_error_details() {
        let err = RegistrationError::ExcessiveShift {
            shift: 250.0,
            max_allowed: 200.0,
            inliers: 12,
            rms: 0.3,
        };
        assert_eq!(err.inlier_count(), Some(12));
        assert_eq!(err.residual_rms(), Some(0.3));
        assert!(err.to_string().contains("250.0"));
        assert_eq!(RegistrationError::NoTriangleMatches.inlier_count(), None);
    }
}
