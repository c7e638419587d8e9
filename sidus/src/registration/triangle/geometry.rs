use glam::DVec2;

/// Minimum side length for valid triangles.
pub(crate) const MIN_TRIANGLE_SIDE: f64 = 1e-10;

/// Minimum area squared for valid triangles (Heron's formula).
/// Prevents very flat/degenerate triangles.
pub(crate) const MIN_TRIANGLE_AREA_SQ: f64 = 1e-6;

/// Longest-to-shortest side limit (Groth 1986, R = 10).
/// Small perturbations of a very short side cause large ratio changes.
pub(crate) const MAX_SIDE_RATIO: f64 = 10.0;

/// Orientation of a triangle (clockwise or counter-clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Orientation {
    Clockwise,
    CounterClockwise,
}

/// A triangle formed from three points.
///
/// `indices` are ordered by the length of the opposite side, shortest first,
/// so vertex `i` of two similar triangles correspond to each other.
#[derive(Debug, Clone)]
pub(crate) struct Triangle {
    pub indices: [usize; 3],
    /// Invariant ratios: (shortest / longest, middle / longest).
    pub ratios: (f64, f64),
    pub orientation: Orientation,
}

impl Triangle {
    /// Create a triangle from three positions.
    ///
    /// Returns `None` for degenerate, too flat, or too elongated triangles.
    pub fn from_positions(indices: [usize; 3], positions: [DVec2; 3]) -> Option<Self> {
        let [p0, p1, p2] = positions;

        // Side opposite each vertex.
        let opposite = [(p2 - p1).length(), (p0 - p2).length(), (p1 - p0).length()];
        if opposite.iter().any(|&d| d < MIN_TRIANGLE_SIDE) {
            return None;
        }

        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| opposite[a].total_cmp(&opposite[b]));
        let sides = order.map(|v| opposite[v]);
        let longest = sides[2];

        if longest / sides[0] > MAX_SIDE_RATIO {
            return None;
        }

        // Heron: area² = s(s-a)(s-b)(s-c)
        let s = (sides[0] + sides[1] + sides[2]) / 2.0;
        let area_sq = s * (s - sides[0]) * (s - sides[1]) * (s - sides[2]);
        if area_sq < MIN_TRIANGLE_AREA_SQ {
            return None;
        }

        let ordered = order.map(|v| positions[v]);
        let v01 = ordered[1] - ordered[0];
        let v02 = ordered[2] - ordered[0];
        let cross = v01.perp_dot(v02);
        if cross.abs() < 1e-10 * longest * longest {
            return None;
        }
        let orientation = if cross > 0.0 {
            Orientation::CounterClockwise
        } else {
            Orientation::Clockwise
        };

        Some(Self {
            indices: order.map(|v| indices[v]),
            ratios: (sides[0] / longest, sides[1] / longest),
            orientation,
        })
    }

    /// Check if two triangles are similar within tolerance.
    pub fn is_similar(&self, other: &Triangle, tolerance: f64) -> bool {
        (self.ratios.0 - other.ratios.0).abs() < tolerance
            && (self.ratios.1 - other.ratios.1).abs() < tolerance
    }

    #[inline]
    pub fn invariant(&self) -> DVec2 {
        DVec2::new(self.ratios.0, self.ratios.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertices_ordered_by_opposite_side() {
        // Right triangle with legs 3 (x) and 4 (y).
        let positions = [DVec2::new(0.0, 0.0), DVec2::new(3.0, 0.0), DVec2::new(0.0, 4.0)];
        let tri = Triangle::from_positions([10, 11, 12], positions).unwrap();
        // Opposite sides: v10 -> 5, v11 -> 4, v12 -> 3
        assert_eq!(tri.indices, [12, 11, 10]);
        assert!((tri.ratios.0 - 0.6).abs() < 1e-12);
        assert!((tri.ratios.1 - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_correspondence_survives_similarity() {
        let a = [DVec2::new(0.0, 0.0), DVec2::new(7.0, 1.0), DVec2::new(2.0, 5.0)];
        let angle = 0.8f64;
        let (s, c) = angle.sin_cos();
        let moved = a.map(|p| DVec2::new(2.0 * (c * p.x - s * p.y) + 40.0, 2.0 * (s * p.x + c * p.y) - 3.0));
        // Shuffle the input order of the second triangle.
        let t1 = Triangle::from_positions([0, 1, 2], a).unwrap();
        let t2 = Triangle::from_positions([2, 0, 1], [moved[2], moved[0], moved[1]]).unwrap();
        assert!(t1.is_similar(&t2, 1e-9));
        assert_eq!(t1.indices, t2.indices);
        assert_eq!(t1.orientation, t2.orientation);
    }

    #[test]
    fn test_mirror_flips_orientation() {
        let a = [DVec2::new(0.0, 0.0), DVec2::new(7.0, 1.0), DVec2::new(2.0, 5.0)];
        let mirrored = a.map(|p| DVec2::new(-p.x, p.y));
        let t1 = Triangle::from_positions([0, 1, 2], a).unwrap();
        let t2 = Triangle::from_positions([0, 1, 2], mirrored).unwrap();
        assert_ne!(t1.orientation, t2.orientation);
    }

    #[test]
    fn test_degenerate_rejected() {
        let collinear = [DVec2::new(0.0, 0.0), DVec2::new(1.0, 1.0), DVec2::new(2.0, 2.0)];
        assert!(Triangle::from_positions([0, 1, 2], collinear).is_none());

        let duplicate = [DVec2::new(0.0, 0.0), DVec2::new(0.0, 0.0), DVec2::new(2.0, 2.0)];
        assert!(Triangle::from_positions([0, 1, 2], duplicate).is_none());
    }

    #[test]
    fn test_elongated_rejected() {
        let needle = [DVec2::new(0.0, 0.0), DVec2::new(100.0, 0.0), DVec2::new(50.0, 5.0)];
        assert!(Triangle::from_positions([0, 1, 2], needle).is_some());
        let sliver = [DVec2::new(0.0, 0.0), DVec2::new(100.0, 0.0), DVec2::new(1.0, 3.0)];
        assert!(Triangle::from_positions([0, 1, 2], sliver).is_none());
    }
}
