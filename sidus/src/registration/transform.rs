//! Affine transforms between reference and target coordinates.

use glam::{DAffine2, DMat2, DVec2};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Supported transformation models with increasing degrees of freedom.
///
/// Variants are ordered by complexity; `compose()` keeps the more complex type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransformType {
    /// Translation only (2 DOF: dx, dy)
    Translation,
    /// Translation + Rotation (3 DOF)
    Euclidean,
    /// Translation + Rotation + Uniform Scale (4 DOF)
    #[default]
    Similarity,
    /// Full affine (6 DOF: differential scaling and shear)
    Affine,
}

impl TransformType {
    /// Minimum number of point correspondences required to estimate this transform.
    pub fn min_points(&self) -> usize {
        match self {
            TransformType::Translation => 1,
            TransformType::Euclidean => 2,
            TransformType::Similarity => 2,
            TransformType::Affine => 3,
        }
    }

    pub fn degrees_of_freedom(&self) -> usize {
        match self {
            TransformType::Translation => 2,
            TransformType::Euclidean => 3,
            TransformType::Similarity => 4,
            TransformType::Affine => 6,
        }
    }
}

/// Affine mapping from REFERENCE coordinates to TARGET coordinates.
///
/// Given `T` registered from `(reference, target)`:
/// - `T.apply(ref_point)` is where that point lands in the target frame
/// - `T.apply_inverse(target_point)` maps back into the reference frame
///
/// Aligning a target frame therefore samples the target at `T.apply(p)` for every
/// reference pixel `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub affine: DAffine2,
    pub transform_type: TransformType,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.translation_components();
        let rotation_deg = self.rotation_angle().to_degrees();
        let scale = self.scale_factor();

        match self.transform_type {
            TransformType::Translation => {
                write!(f, "Translation(dx={:.2}, dy={:.2})", t.x, t.y)
            }
            TransformType::Euclidean => write!(
                f,
                "Euclidean(dx={:.2}, dy={:.2}, rot={:.3}°)",
                t.x, t.y, rotation_deg
            ),
            TransformType::Similarity | TransformType::Affine => write!(
                f,
                "{}(dx={:.2}, dy={:.2}, rot={:.3}°, scale={:.4})",
                if self.transform_type == TransformType::Affine {
                    "Affine"
                } else {
                    "Similarity"
                },
                t.x,
                t.y,
                rotation_deg,
                scale
            ),
        }
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            affine: DAffine2::IDENTITY,
            transform_type: TransformType::Translation,
        }
    }

    pub fn translation(t: DVec2) -> Self {
        Self {
            affine: DAffine2::from_translation(t),
            transform_type: TransformType::Translation,
        }
    }

    /// Rotation by `angle` radians about the origin, then translation.
    pub fn euclidean(t: DVec2, angle: f64) -> Self {
        Self {
            affine: DAffine2::from_angle_translation(angle, t),
            transform_type: TransformType::Euclidean,
        }
    }

    pub fn similarity(t: DVec2, angle: f64, scale: f64) -> Self {
        Self {
            affine: DAffine2::from_scale_angle_translation(DVec2::splat(scale), angle, t),
            transform_type: TransformType::Similarity,
        }
    }

    /// Affine transform from `[a, b, tx, c, d, ty]`:
    /// `x' = a*x + b*y + tx`, `y' = c*x + d*y + ty`.
    pub fn affine(params: [f64; 6]) -> Self {
        let [a, b, tx, c, d, ty] = params;
        Self {
            affine: DAffine2::from_mat2_translation(
                DMat2::from_cols(DVec2::new(a, c), DVec2::new(b, d)),
                DVec2::new(tx, ty),
            ),
            transform_type: TransformType::Affine,
        }
    }

    /// Rotation by `angle` about `center`.
    pub fn rotation_around(center: DVec2, angle: f64) -> Self {
        let affine = DAffine2::from_translation(center)
            * DAffine2::from_angle(angle)
            * DAffine2::from_translation(-center);
        Self {
            affine,
            transform_type: TransformType::Euclidean,
        }
    }

    /// Map a point from reference to target coordinates.
    #[inline]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        self.affine.transform_point2(p)
    }

    /// Map a point from target to reference coordinates.
    ///
    /// Returns the input unchanged for a degenerate transform.
    pub fn apply_inverse(&self, p: DVec2) -> DVec2 {
        self.inverse().map_or(p, |inv| inv.apply(p))
    }

    /// Matrix inverse, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        if !self.is_valid() {
            return None;
        }
        Some(Self {
            affine: self.affine.inverse(),
            transform_type: self.transform_type,
        })
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            affine: self.affine * other.affine,
            transform_type: self.transform_type.max(other.transform_type),
        }
    }

    pub fn translation_components(&self) -> DVec2 {
        self.affine.translation
    }

    /// Rotation angle in radians (exact for Euclidean/Similarity).
    pub fn rotation_angle(&self) -> f64 {
        let col = self.affine.matrix2.x_axis;
        col.y.atan2(col.x)
    }

    /// Scale factor (exact for Similarity).
    pub fn scale_factor(&self) -> f64 {
        self.affine.matrix2.x_axis.length()
    }

    /// Determinant of the linear part.
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.affine.matrix2.determinant()
    }

    /// Non-degenerate and finite.
    pub fn is_valid(&self) -> bool {
        let det = self.determinant();
        det.abs() > 1e-10 && det.is_finite() && self.affine.translation.is_finite()
    }

    /// Whether every coefficient is within `eps` of the identity.
    pub fn is_identity(&self, eps: f64) -> bool {
        self.affine.abs_diff_eq(DAffine2::IDENTITY, eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const EPS: f64 = 1e-10;

    fn assert_close(a: DVec2, b: DVec2) {
        assert!(a.abs_diff_eq(b, 1e-9), "{a:?} != {b:?}");
    }

    #[test]
    fn test_identity() {
        let t = Transform::identity();
        assert_close(t.apply(DVec2::new(3.5, -2.0)), DVec2::new(3.5, -2.0));
        assert!(t.is_identity(EPS));
        assert!(t.is_valid());
    }

    #[test]
    fn test_translation() {
        let t = Transform::translation(DVec2::new(5.0, -3.0));
        assert_close(t.apply(DVec2::new(1.0, 1.0)), DVec2::new(6.0, -2.0));
        assert_close(t.translation_components(), DVec2::new(5.0, -3.0));
    }

    #[test]
    fn test_similarity_components() {
        let t = Transform::similarity(DVec2::new(10.0, 20.0), PI / 6.0, 1.5);
        assert!((t.rotation_angle() - PI / 6.0).abs() < EPS);
        assert!((t.scale_factor() - 1.5).abs() < EPS);
        // (1, 0) -> scale*rot + t
        let expected = DVec2::new(10.0 + 1.5 * (PI / 6.0).cos(), 20.0 + 1.5 * (PI / 6.0).sin());
        assert_close(t.apply(DVec2::X), expected);
    }

    #[test]
    fn test_affine_params() {
        let t = Transform::affine([2.0, 0.5, 1.0, -0.5, 1.0, 2.0]);
        // x' = 2*3 + 0.5*4 + 1 = 9, y' = -0.5*3 + 4 + 2 = 4.5
        assert_close(t.apply(DVec2::new(3.0, 4.0)), DVec2::new(9.0, 4.5));
        assert!((t.determinant() - 2.25).abs() < EPS);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = Transform::similarity(DVec2::new(-7.0, 3.0), 0.3, 0.9);
        let p = DVec2::new(123.0, 45.6);
        assert_close(t.apply_inverse(t.apply(p)), p);
        assert!(t.compose(&t.inverse().unwrap()).is_identity(1e-9));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        let t = Transform::affine([1.0, 2.0, 0.0, 2.0, 4.0, 0.0]);
        assert!(!t.is_valid());
        assert!(t.inverse().is_none());
    }

    #[test]
    fn test_compose_order_and_type() {
        let shift = Transform::translation(DVec2::new(10.0, 0.0));
        let rot = Transform::euclidean(DVec2::ZERO, PI / 2.0);
        // rotate first, then shift
        let composed = shift.compose(&rot);
        assert_close(composed.apply(DVec2::X), DVec2::new(10.0, 1.0));
        assert_eq!(composed.transform_type, TransformType::Euclidean);
    }

    #[test]
    fn test_rotation_around_keeps_center() {
        let center = DVec2::new(50.0, 40.0);
        let t = Transform::rotation_around(center, 0.7);
        assert_close(t.apply(center), center);
    }

    #[test]
    fn test_display() {
        let t = Transform::translation(DVec2::new(1.234, -5.0));
        assert_eq!(t.to_string(), "Translation(dx=1.23, dy=-5.00)");
        assert_eq!(TransformType::Similarity.to_string(), "similarity");
    }

    #[test]
    fn test_min_points() {
        assert_eq!(TransformType::Translation.min_points(), 1);
        assert_eq!(TransformType::Similarity.min_points(), 2);
        assert_eq!(TransformType::Affine.min_points(), 3);
        assert!(TransformType::Affine > TransformType::Similarity);
    }
}
