//! Star-based image registration.
//!
//! Finds the transform mapping reference coordinates onto a target frame from
//! two lists of star positions:
//!
//! 1. Keep the brightest `max_control_points` of each list
//! 2. Match similar triangles and vote on point correspondences
//! 3. Pick the triangle-pair hypothesis agreeing with most correspondences
//! 4. Alternate least-squares refinement with nearest-neighbour re-classification
//! 5. Accept or reject on inlier count, residual RMS and shift
//!
//! | Type | DOF | Description |
//! |------|-----|-------------|
//! | Translation | 2 | X/Y offset only |
//! | Euclidean | 3 | Translation + rotation |
//! | Similarity | 4 | Translation + rotation + uniform scale |
//! | Affine | 6 | Handles shear and differential scaling |

mod config;
mod consensus;
mod estimate;
mod result;
mod spatial;
mod transform;
mod triangle;


use std::time::Instant;

use glam::DVec2;

pub use config::RegistrationConfig;
pub use estimate::{compute_residuals, estimate_transform};
pub use result::{RegistrationError, RegistrationResult};
pub use spatial::{KdTree, Neighbor};
pub use transform::{Transform, TransformType};
pub use triangle::{PointMatch, TriangleMatches, TrianglePair, match_triangles};

use consensus::{best_hypothesis, classify_inliers};

/// Fewest stars that can form a triangle.
pub const MIN_STARS: usize = 3;

/// Registers target star lists against a reference star list.
#[derive(Debug, Clone, Default)]
pub struct Registrator {
    config: RegistrationConfig,
}

impl Registrator {
    pub fn new(config: RegistrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Register `target` against `reference`.
    ///
    /// Both lists are expected brightest first, as the detector returns them.
    pub fn register(
        &self,
        reference: &[DVec2],
        target: &[DVec2],
    ) -> Result<RegistrationResult, RegistrationError> {
        let start = Instant::now();
        let config = &self.config;

        if reference.len() < MIN_STARS || target.len() < MIN_STARS {
            return Err(RegistrationError::NotEnoughStars {
                reference: reference.len(),
                target: target.len(),
                required: MIN_STARS,
            });
        }

        let reference = &reference[..reference.len().min(config.max_control_points)];
        let target = &target[..target.len().min(config.max_control_points)];

        let matches = match_triangles(reference, target, config);
        if matches.is_empty() {
            return Err(RegistrationError::NoTriangleMatches);
        }

        // Triangle vertices pin down at most a similarity.
        let hypothesis_model = config.transform_type.min(TransformType::Similarity);
        let hypothesis = best_hypothesis(
            reference,
            target,
            &matches,
            hypothesis_model,
            config.tolerance,
        )
        .ok_or(RegistrationError::Degenerate)?;

        let target_tree = KdTree::build(target).ok_or(RegistrationError::Degenerate)?;
        let (transform, inliers, iterations) =
            self.refine(hypothesis.transform, reference, target, &target_tree);

        let (ref_inliers, target_inliers): (Vec<DVec2>, Vec<DVec2>) = inliers
            .iter()
            .map(|&(r, t)| (reference[r], target[t]))
            .unzip();
        let residuals = compute_residuals(&transform, &ref_inliers, &target_inliers);
        let result = RegistrationResult::new(
            transform,
            inliers,
            residuals,
            reference.len().min(target.len()),
        )
        .with_iterations(iterations);

        tracing::debug!(
            inliers = result.num_inliers,
            rms = result.rms_error,
            iterations,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            transform = %result.transform,
            "Registration fit"
        );

        self.accept(result, centroid(reference))
    }

    /// Least-squares refit on the inliers, re-classified against each new fit,
    /// until the inlier set stops changing.
    fn refine(
        &self,
        initial: Transform,
        reference: &[DVec2],
        target: &[DVec2],
        target_tree: &KdTree,
    ) -> (Transform, Vec<(usize, usize)>, usize) {
        let config = &self.config;
        let mut transform = initial;
        let mut inliers = classify_inliers(&transform, reference, target_tree, config.tolerance);
        let mut iterations = 0;

        while iterations < config.refine_iterations {
            if inliers.len() < config.transform_type.min_points() {
                break;
            }
            let (r, t): (Vec<DVec2>, Vec<DVec2>) = inliers
                .iter()
                .map(|&(ri, ti)| (reference[ri], target[ti]))
                .unzip();
            let Some(refined) = estimate_transform(&r, &t, config.transform_type) else {
                break;
            };
            iterations += 1;
            transform = refined;

            let next = classify_inliers(&transform, reference, target_tree, config.tolerance);
            if next == inliers {
                break;
            }
            inliers = next;
        }

        (transform, inliers, iterations)
    }

    /// Shift is the displacement at `center`, so a rotation about the field
    /// centre does not count as a translation.
    fn accept(
        &self,
        result: RegistrationResult,
        center: DVec2,
    ) -> Result<RegistrationResult, RegistrationError> {
        let config = &self.config;

        if result.num_inliers < config.min_matches {
            return Err(RegistrationError::InsufficientMatches {
                inliers: result.num_inliers,
                required: config.min_matches,
            });
        }
        if result.rms_error > config.max_residual {
            return Err(RegistrationError::ExcessiveResidual {
                rms: result.rms_error,
                max_allowed: config.max_residual,
                inliers: result.num_inliers,
            });
        }
        let shift = result.transform.apply(center).distance(center);
        if shift > config.max_shift {
            return Err(RegistrationError::ExcessiveShift {
                shift,
                max_allowed: config.max_shift,
                inliers: result.num_inliers,
                rms: result.rms_error,
            });
        }

        Ok(result)
    }
}

fn centroid(points: &[DVec2]) -> DVec2 {
    points.iter().copied().sum::<DVec2>() / points.len().max(1) as f64
}
