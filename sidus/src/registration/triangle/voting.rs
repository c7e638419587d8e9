use std::collections::BTreeMap;

use glam::DVec2;

use crate::registration::config::RegistrationConfig;
use crate::registration::spatial::{KdTree, Neighbor};

use super::geometry::Triangle;

/// A resolved star correspondence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMatch {
    pub ref_idx: usize,
    pub target_idx: usize,
    pub votes: usize,
    /// Votes relative to the strongest resolved match, in `(0, 1]`.
    pub confidence: f64,
}

/// A similar reference/target triangle pair; vertex `i` corresponds to vertex `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrianglePair {
    pub ref_vertices: [usize; 3],
    pub target_vertices: [usize; 3],
}

/// Votes per `(reference, target)` star pair.
///
/// Only pairs that received a vote are stored, iterated in `(reference, target)` order.
#[derive(Debug, Clone, Default)]
pub(crate) struct VoteTally {
    votes: BTreeMap<(usize, usize), usize>,
}

impl VoteTally {
    pub fn add(&mut self, pair: &TrianglePair) {
        for (&r, &t) in pair.ref_vertices.iter().zip(&pair.target_vertices) {
            *self.votes.entry((r, t)).or_default() += 1;
        }
    }

    pub fn count(&self, ref_idx: usize, target_idx: usize) -> usize {
        self.votes.get(&(ref_idx, target_idx)).copied().unwrap_or(0)
    }

    /// Summed vertex votes of a triangle pair.
    pub fn support(&self, pair: &TrianglePair) -> usize {
        pair.ref_vertices
            .iter()
            .zip(&pair.target_vertices)
            .map(|(&r, &t)| self.count(r, t))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.votes.iter().map(|(&(r, t), &v)| (r, t, v))
    }
}

/// K-d tree over the side-ratio invariants of the reference triangles.
pub(crate) fn build_invariant_tree(triangles: &[Triangle]) -> Option<KdTree> {
    let invariants: Vec<DVec2> = triangles.iter().map(Triangle::invariant).collect();
    KdTree::build(&invariants)
}

/// Find every similar reference triangle for each target triangle and let the pair
/// vote for its three vertex correspondences.
pub(crate) fn vote_for_correspondences(
    target_triangles: &[Triangle],
    ref_triangles: &[Triangle],
    invariant_tree: &KdTree,
    config: &RegistrationConfig,
) -> (VoteTally, Vec<TrianglePair>) {
    let mut tally = VoteTally::default();
    let mut pairs = Vec::new();
    let mut nearby: Vec<Neighbor> = Vec::new();

    for target in target_triangles {
        invariant_tree.radius_search_into(target.invariant(), config.ratio_tolerance, &mut nearby);
        // Tree layout decides the search order.
        nearby.sort_by_key(|n| n.index);

        let similar = nearby
            .iter()
            .map(|n| &ref_triangles[n.index])
            .filter(|r| r.is_similar(target, config.ratio_tolerance))
            .filter(|r| !config.check_orientation || r.orientation == target.orientation);

        for reference in similar {
            let pair = TrianglePair {
                ref_vertices: reference.indices,
                target_vertices: target.indices,
            };
            tally.add(&pair);
            pairs.push(pair);
        }
    }

    (tally, pairs)
}

/// Greedy one-to-one assignment over the tally.
///
/// Pairs with fewer than `min_votes` are ignored. The rest are taken strongest
/// first, ties by reference then target index, while both stars are still free.
pub(crate) fn resolve_matches(
    tally: &VoteTally,
    n_ref: usize,
    n_target: usize,
    min_votes: usize,
) -> Vec<PointMatch> {
    let mut ranked: Vec<(usize, usize, usize)> = tally
        .iter()
        .filter(|&(r, t, v)| v >= min_votes && r < n_ref && t < n_target)
        .collect();
    // Stable sort keeps the tally's (reference, target) order among equal votes.
    ranked.sort_by(|a, b| b.2.cmp(&a.2));

    let mut ref_taken = vec![false; n_ref];
    let mut target_taken = vec![false; n_target];
    let mut resolved: Vec<PointMatch> = Vec::new();

    for (r, t, votes) in ranked {
        if ref_taken[r] || target_taken[t] {
            continue;
        }
        ref_taken[r] = true;
        target_taken[t] = true;
        resolved.push(PointMatch {
            ref_idx: r,
            target_idx: t,
            votes,
            confidence: 0.0,
        });
    }

    if let Some(strongest) = resolved.first().map(|m| m.votes as f64) {
        for m in &mut resolved {
            m.confidence = m.votes as f64 / strongest;
        }
    }
    resolved
}
