use glam::DVec2;

use crate::registration::config::RegistrationConfig;
use crate::registration::spatial::KdTree;

use super::geometry::Triangle;
use super::voting::{
    PointMatch, TrianglePair, build_invariant_tree, resolve_matches, vote_for_correspondences,
};

/// Output of triangle matching: resolved correspondences and the voting
/// triangle pairs with their summed vertex votes.
#[derive(Debug, Clone, Default)]
pub struct TriangleMatches {
    pub matches: Vec<PointMatch>,
    /// Voting pairs, strongest first.
    pub pairs: Vec<(TrianglePair, usize)>,
}

impl TriangleMatches {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Triangles over each point and pairs of its `k` nearest neighbours.
///
/// O(n * k²) instead of the O(n³) of all triples.
pub(crate) fn form_triangles(positions: &[DVec2], k_neighbors: usize) -> Vec<Triangle> {
    let Some(tree) = KdTree::build(positions) else {
        return Vec::new();
    };

    form_triangles_from_neighbors(&tree, k_neighbors)
        .into_iter()
        .filter_map(|[i, j, k]| {
            Triangle::from_positions([i, j, k], [positions[i], positions[j], positions[k]])
        })
        .collect()
}

/// Match two point sets by similar triangles and vote on correspondences.
pub fn match_triangles(
    ref_positions: &[DVec2],
    target_positions: &[DVec2],
    config: &RegistrationConfig,
) -> TriangleMatches {
    let n_ref = ref_positions.len();
    let n_target = target_positions.len();

    if n_ref < 3 || n_target < 3 {
        return TriangleMatches::default();
    }

    // k scales with point count but is capped for efficiency
    let k_neighbors = (n_ref.min(n_target) / 3).clamp(5, 20);

    let ref_triangles = form_triangles(ref_positions, k_neighbors);
    let target_triangles = form_triangles(target_positions, k_neighbors);

    let Some(invariant_tree) = build_invariant_tree(&ref_triangles) else {
        return TriangleMatches::default();
    };
    if target_triangles.is_empty() {
        return TriangleMatches::default();
    }

    let (tally, pairs) =
        vote_for_correspondences(&target_triangles, &ref_triangles, &invariant_tree, config);
    tracing::trace!(
        pairs = pairs.len(),
        voted_correspondences = tally.len(),
        "Triangle votes"
    );
    let matches = resolve_matches(&tally, n_ref, n_target, config.min_votes);

    let mut pairs: Vec<(TrianglePair, usize)> = pairs
        .into_iter()
        .map(|pair| (pair, tally.support(&pair)))
        .collect();
    // Stable: equal support keeps voting order.
    pairs.sort_by(|a, b| b.1.cmp(&a.1));

    TriangleMatches { matches, pairs }
}

/// Vertex index triples `[i, j, k]` with `i < j < k`, sorted and deduplicated.
pub(crate) fn form_triangles_from_neighbors(tree: &KdTree, k: usize) -> Vec<[usize; 3]> {
    let n = tree.len();
    if n < 3 {
        return Vec::new();
    }

    let k = k.min(n - 1);
    let mut triangles = Vec::new();

    for i in 0..n {
        // +1 because the point itself is included
        let neighbors = tree.k_nearest(tree.point(i), k + 1);

        for (ni, n1) in neighbors.iter().enumerate() {
            if n1.index == i {
                continue;
            }
            for n2 in neighbors.iter().skip(ni + 1) {
                if n2.index == i {
                    continue;
                }
                let mut tri = [i, n1.index, n2.index];
                tri.sort_unstable();
                triangles.push(tri);
            }
        }
    }

    triangles.sort_unstable();
    triangles.dedup();
    triangles
}
