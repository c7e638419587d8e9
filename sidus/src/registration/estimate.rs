//! Least-squares transform estimation from point correspondences.

use glam::DVec2;
use nalgebra::{DMatrix, DVector};

use super::transform::{Transform, TransformType};

/// Singular values below this fraction of the largest are treated as zero.
const SVD_EPSILON: f64 = 1e-12;

/// Least-squares transform mapping `ref_points[i]` onto `target_points[i]`.
///
/// Returns `None` when there are too few points for `transform_type` or the
/// configuration is degenerate (coincident or collinear points).
pub fn estimate_transform(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    transform_type: TransformType,
) -> Option<Transform> {
    debug_assert_eq!(ref_points.len(), target_points.len());
    if ref_points.len() < transform_type.min_points() || ref_points.len() != target_points.len() {
        return None;
    }

    let transform = match transform_type {
        TransformType::Translation => estimate_translation(ref_points, target_points),
        TransformType::Euclidean => estimate_procrustes(ref_points, target_points, false)?,
        TransformType::Similarity => estimate_procrustes(ref_points, target_points, true)?,
        TransformType::Affine => estimate_affine(ref_points, target_points)?,
    };

    transform.is_valid().then_some(transform)
}

fn centroid(points: &[DVec2]) -> DVec2 {
    points.iter().copied().sum::<DVec2>() / points.len() as f64
}

fn estimate_translation(ref_points: &[DVec2], target_points: &[DVec2]) -> Transform {
    Transform::translation(centroid(target_points) - centroid(ref_points))
}

/// Closed-form rotation (and optionally scale) about the centroids.
fn estimate_procrustes(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    with_scale: bool,
) -> Option<Transform> {
    let ref_centroid = centroid(ref_points);
    let target_centroid = centroid(target_points);

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syx = 0.0;
    let mut syy = 0.0;
    let mut ref_var = 0.0;
    for (&r, &t) in ref_points.iter().zip(target_points) {
        let r = r - ref_centroid;
        let t = t - target_centroid;
        sxx += r.x * t.x;
        sxy += r.x * t.y;
        syx += r.y * t.x;
        syy += r.y * t.y;
        ref_var += r.length_squared();
    }

    if ref_var < f64::EPSILON {
        return None;
    }

    let angle = (sxy - syx).atan2(sxx + syy);
    let (sin_a, cos_a) = angle.sin_cos();

    let (scale, transform_type) = if with_scale {
        let scale = ((sxx + syy) * cos_a + (sxy - syx) * sin_a) / ref_var;
        if scale <= 0.0 {
            return None;
        }
        (scale, TransformType::Similarity)
    } else {
        (1.0, TransformType::Euclidean)
    };

    let rotated = DVec2::new(
        scale * (cos_a * ref_centroid.x - sin_a * ref_centroid.y),
        scale * (sin_a * ref_centroid.x + cos_a * ref_centroid.y),
    );
    let translation = target_centroid - rotated;

    let mut transform = Transform::similarity(translation, angle, scale);
    transform.transform_type = transform_type;
    Some(transform)
}

/// General affine fit solved by SVD on centered coordinates.
fn estimate_affine(ref_points: &[DVec2], target_points: &[DVec2]) -> Option<Transform> {
    let n = ref_points.len();
    let ref_centroid = centroid(ref_points);
    let target_centroid = centroid(target_points);

    let design = DMatrix::from_fn(n, 2, |row, col| {
        let r = ref_points[row] - ref_centroid;
        if col == 0 { r.x } else { r.y }
    });
    let rhs_x = DVector::from_fn(n, |row, _| target_points[row].x - target_centroid.x);
    let rhs_y = DVector::from_fn(n, |row, _| target_points[row].y - target_centroid.y);

    let svd = design.svd(true, true);
    let max_singular = svd.singular_values.max();
    if svd.singular_values.min() <= max_singular * SVD_EPSILON {
        return None;
    }
    let row_x = svd.solve(&rhs_x, SVD_EPSILON).ok()?;
    let row_y = svd.solve(&rhs_y, SVD_EPSILON).ok()?;

    let (a, b) = (row_x[0], row_x[1]);
    let (c, d) = (row_y[0], row_y[1]);
    let tx = target_centroid.x - (a * ref_centroid.x + b * ref_centroid.y);
    let ty = target_centroid.y - (c * ref_centroid.x + d * ref_centroid.y);

    Some(Transform::affine([a, b, tx, c, d, ty]))
}

/// Distance between `transform.apply(ref)` and `target` for every pair.
pub fn compute_residuals(
    transform: &Transform,
    ref_points: &[DVec2],
    target_points: &[DVec2],
) -> Vec<f64> {
    ref_points
        .iter()
        .zip(target_points)
        .map(|(&r, &t)| transform.apply(r).distance(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> Vec<DVec2> {
        vec![
            DVec2::new(10.0, 12.0),
            DVec2::new(200.0, 40.0),
            DVec2::new(120.0, 180.0),
            DVec2::new(35.0, 150.0),
            DVec2::new(170.0, 110.0),
            DVec2::new(90.0, 60.0),
        ]
    }

    fn map(points: &[DVec2], t: &Transform) -> Vec<DVec2> {
        points.iter().map(|&p| t.apply(p)).collect()
    }

    #[test]
    fn test_recovers_translation() {
        let reference = sample_points();
        let truth = Transform::translation(DVec2::new(4.5, -7.25));
        let est =
            estimate_transform(&reference, &map(&reference, &truth), TransformType::Translation)
                .unwrap();
        assert!(est.translation_components().abs_diff_eq(DVec2::new(4.5, -7.25), 1e-9));
    }

    #[test]
    fn test_recovers_euclidean() {
        let reference = sample_points();
        let truth = Transform::euclidean(DVec2::new(12.0, -3.0), 0.05);
        let est = estimate_transform(&reference, &map(&reference, &truth), TransformType::Euclidean)
            .unwrap();
        assert_eq!(est.transform_type, TransformType::Euclidean);
        assert!((est.rotation_angle() - 0.05).abs() < 1e-9);
        assert!((est.scale_factor() - 1.0).abs() < 1e-9);
        assert!(est.translation_components().abs_diff_eq(DVec2::new(12.0, -3.0), 1e-7));
    }

    #[test]
    fn test_recovers_similarity() {
        let reference = sample_points();
        let truth = Transform::similarity(DVec2::new(-20.0, 8.0), -0.3, 1.02);
        let target = map(&reference, &truth);
        let est = estimate_transform(&reference, &target, TransformType::Similarity).unwrap();
        assert!((est.rotation_angle() + 0.3).abs() < 1e-9);
        assert!((est.scale_factor() - 1.02).abs() < 1e-9);
        let residuals = compute_residuals(&est, &reference, &target);
        assert!(residuals.iter().all(|&r| r < 1e-7));
    }

    #[test]
    fn test_recovers_affine() {
        let reference = sample_points();
        let truth = Transform::affine([1.01, 0.02, 5.0, -0.015, 0.98, -4.0]);
        let target = map(&reference, &truth);
        let est = estimate_transform(&reference, &target, TransformType::Affine).unwrap();
        for (&r, &t) in reference.iter().zip(&target) {
            assert!(est.apply(r).abs_diff_eq(t, 1e-7));
        }
    }

    #[test]
    fn test_too_few_points() {
        let reference = vec![DVec2::new(1.0, 1.0), DVec2::new(5.0, 2.0)];
        assert!(estimate_transform(&reference, &reference, TransformType::Affine).is_none());
        assert!(estimate_transform(&[], &[], TransformType::Translation).is_none());
    }

    #[test]
    fn test_coincident_points_degenerate() {
        let reference = vec![DVec2::new(3.0, 3.0); 4];
        assert!(estimate_transform(&reference, &reference, TransformType::Similarity).is_none());
    }

    #[test]
    fn test_collinear_points_degenerate_for_affine() {
        let reference: Vec<DVec2> = (0..5).map(|i| DVec2::new(i as f64, 2.0 * i as f64)).collect();
        assert!(estimate_transform(&reference, &reference, TransformType::Affine).is_none());
    }

    #[test]
    fn test_least_squares_averages_noise() {
        let reference = sample_points();
        let truth = Transform::translation(DVec2::new(3.0, 3.0));
        let mut target = map(&reference, &truth);
        // Symmetric perturbations cancel in the fit.
        target[0].x += 0.5;
        target[1].x -= 0.5;
        let est = estimate_transform(&reference, &target, TransformType::Translation).unwrap();
        assert!(est.translation_components().abs_diff_eq(DVec2::new(3.0, 3.0), 1e-9));
    }
}
