//! Hypothesis selection and inlier classification.

use glam::DVec2;
use rayon::prelude::*;

use super::estimate::estimate_transform;
use super::spatial::KdTree;
use super::transform::{Transform, TransformType};
use super::triangle::TriangleMatches;

/// Strongest triangle pairs tried as transform hypotheses.
pub(crate) const MAX_HYPOTHESES: usize = 1000;

/// A candidate transform scored against the resolved correspondences.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Hypothesis {
    pub transform: Transform,
    pub inliers: usize,
    pub rms: f64,
    /// Position in the support-ranked pair list.
    pub rank: usize,
}

impl Hypothesis {
    /// More inliers, then lower RMS, then earlier rank.
    fn beats(&self, other: &Hypothesis) -> bool {
        self.inliers
            .cmp(&other.inliers)
            .then(other.rms.total_cmp(&self.rms))
            .then(other.rank.cmp(&self.rank))
            .is_gt()
    }
}

/// Best transform implied by a single matched triangle pair.
///
/// Every pair yields an exact `model` fit through its three vertices; the one
/// agreeing with the most resolved correspondences within `tolerance` wins.
pub(crate) fn best_hypothesis(
    ref_points: &[DVec2],
    target_points: &[DVec2],
    matches: &TriangleMatches,
    model: TransformType,
    tolerance: f64,
) -> Option<Hypothesis> {
    let tolerance_sq = tolerance * tolerance;

    matches
        .pairs
        .par_iter()
        .take(MAX_HYPOTHESES)
        .enumerate()
        .filter_map(|(rank, (pair, _))| {
            let r = pair.ref_vertices.map(|i| ref_points[i]);
            let t = pair.target_vertices.map(|i| target_points[i]);
            let transform = estimate_transform(&r, &t, model)?;

            let mut inliers = 0usize;
            let mut sum_sq = 0.0;
            for m in &matches.matches {
                let d2 = transform
                    .apply(ref_points[m.ref_idx])
                    .distance_squared(target_points[m.target_idx]);
                if d2 <= tolerance_sq {
                    inliers += 1;
                    sum_sq += d2;
                }
            }
            if inliers == 0 {
                return None;
            }

            Some(Hypothesis {
                transform,
                inliers,
                rms: (sum_sq / inliers as f64).sqrt(),
                rank,
            })
        })
        .reduce_with(|a, b| if b.beats(&a) { b } else { a })
}

/// One-to-one nearest-neighbour correspondences under `transform`.
///
/// Each projected reference point claims the closest target within
/// `tolerance`; conflicts go to the shorter distance. Sorted by reference index.
pub(crate) fn classify_inliers(
    transform: &Transform,
    ref_points: &[DVec2],
    target_tree: &KdTree,
    tolerance: f64,
) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
    let mut neighbors = Vec::new();

    for (ref_idx, &p) in ref_points.iter().enumerate() {
        target_tree.radius_search_into(transform.apply(p), tolerance, &mut neighbors);
        candidates.extend(neighbors.iter().map(|n| (ref_idx, n.index, n.dist_sq)));
    }

    candidates.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));

    let mut used_ref = vec![false; ref_points.len()];
    let mut used_target = vec![false; target_tree.len()];
    let mut pairs = Vec::new();
    for (r, t, _) in candidates {
        if !used_ref[r] && !used_target[t] {
            used_ref[r] = true;
            used_target[t] = true;
            pairs.push((r, t));
        }
    }

    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_one_to_one() {
        let reference = vec![DVec2::new(0.0, 0.0), DVec2::new(1.0, 0.0), DVec2::new(50.0, 50.0)];
        // Target 0 sits between reference 0 and 1 but closer to 1.
        let target = vec![DVec2::new(0.8, 0.0), DVec2::new(50.5, 50.0)];
        let tree = KdTree::build(&target).unwrap();

        let pairs = classify_inliers(&Transform::identity(), &reference, &tree, 2.0);
        assert_eq!(pairs, vec![(1, 0), (2, 1)]);
    }

    #[test]
    fn test_classify_respects_tolerance() {
        let reference = vec![DVec2::new(10.0, 10.0)];
        let target = vec![DVec2::new(13.0, 10.0)];
        let tree = KdTree::build(&target).unwrap();
        assert!(classify_inliers(&Transform::identity(), &reference, &tree, 2.0).is_empty());

        let shift = Transform::translation(DVec2::new(3.0, 0.0));
        assert_eq!(classify_inliers(&shift, &reference, &tree, 2.0), vec![(0, 0)]);
    }

    #[test]
    fn test_hypothesis_ordering() {
        let base = Hypothesis {
            transform: Transform::identity(),
            inliers: 10,
            rms: 0.5,
            rank: 3,
        };
        let more = Hypothesis { inliers: 11, rms: 0.9, ..base };
        let tighter = Hypothesis { rms: 0.4, ..base };
        let earlier = Hypothesis { rank: 1, ..base };

        assert!(more.beats(&base));
        assert!(tighter.beats(&base));
        assert!(earlier.beats(&base));
        assert!(!base.beats(&base));
    }
}
