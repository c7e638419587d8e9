//! 2-D k-d tree for nearest-neighbour queries on star positions and
//! triangle invariants.

use glam::DVec2;

/// A point returned by a query: its index in the build slice and squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub dist_sq: f64,
}

/// A 2D k-d tree, built once and queried many times.
#[derive(Debug)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    points: Vec<DVec2>,
}

#[derive(Debug, Clone)]
struct KdNode {
    point_idx: usize,
    left: Option<usize>,
    right: Option<usize>,
    /// Split dimension (0 = x, 1 = y)
    split_dim: usize,
}

#[inline]
fn axis(p: DVec2, dim: usize) -> f64 {
    if dim == 0 { p.x } else { p.y }
}

impl KdTree {
    /// Build a balanced tree by median splits. `None` for an empty slice.
    pub fn build(points: &[DVec2]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut indices: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        Self::build_recursive(points, &mut indices, 0, &mut nodes);

        Some(Self {
            nodes,
            points: points.to_vec(),
        })
    }

    fn build_recursive(
        points: &[DVec2],
        indices: &mut [usize],
        depth: usize,
        nodes: &mut Vec<KdNode>,
    ) -> Option<usize> {
        if indices.is_empty() {
            return None;
        }

        let split_dim = depth % 2;
        indices.sort_by(|&a, &b| axis(points[a], split_dim).total_cmp(&axis(points[b], split_dim)));

        let median = indices.len() / 2;
        let node_idx = nodes.len();
        nodes.push(KdNode {
            point_idx: indices[median],
            left: None,
            right: None,
            split_dim,
        });

        let (left_indices, right_part) = indices.split_at_mut(median);
        let right_indices = &mut right_part[1..];

        let left = Self::build_recursive(points, left_indices, depth + 1, nodes);
        let right = Self::build_recursive(points, right_indices, depth + 1, nodes);
        nodes[node_idx].left = left;
        nodes[node_idx].right = right;

        Some(node_idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn point(&self, idx: usize) -> DVec2 {
        self.points[idx]
    }

    /// The `k` nearest points to `query`, closest first.
    pub fn k_nearest(&self, query: DVec2, k: usize) -> Vec<Neighbor> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut heap = BoundedMaxHeap::new(k);
        self.k_nearest_recursive(0, query, &mut heap);

        let mut result = heap.into_vec();
        result.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.index.cmp(&b.index)));
        result
    }

    /// The closest point to `query`.
    pub fn nearest(&self, query: DVec2) -> Option<Neighbor> {
        self.k_nearest(query, 1).into_iter().next()
    }

    fn k_nearest_recursive(&self, node_idx: usize, query: DVec2, heap: &mut BoundedMaxHeap) {
        let node = &self.nodes[node_idx];
        let point = self.points[node.point_idx];
        heap.push(node.point_idx, query.distance_squared(point));

        let diff = axis(query, node.split_dim) - axis(point, node.split_dim);
        let (first, second) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(first_idx) = first {
            self.k_nearest_recursive(first_idx, query, heap);
        }

        // The far side can only help if the splitting plane is closer than the worst kept point.
        if let Some(second_idx) = second
            && (!heap.is_full() || diff * diff < heap.max_distance())
        {
            self.k_nearest_recursive(second_idx, query, heap);
        }
    }

    /// All points within `radius` of `query`, closest first.
    pub fn radius_search(&self, query: DVec2, radius: f64) -> Vec<Neighbor> {
        let mut results = Vec::new();
        self.radius_search_into(query, radius, &mut results);
        results.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq).then(a.index.cmp(&b.index)));
        results
    }

    /// Unsorted radius search into a reusable buffer.
    pub fn radius_search_into(&self, query: DVec2, radius: f64, results: &mut Vec<Neighbor>) {
        results.clear();
        if self.nodes.is_empty() {
            return;
        }
        self.radius_search_recursive(0, query, radius * radius, results);
    }

    fn radius_search_recursive(
        &self,
        node_idx: usize,
        query: DVec2,
        radius_sq: f64,
        results: &mut Vec<Neighbor>,
    ) {
        let node = &self.nodes[node_idx];
        let point = self.points[node.point_idx];

        let dist_sq = query.distance_squared(point);
        if dist_sq <= radius_sq {
            results.push(Neighbor {
                index: node.point_idx,
                dist_sq,
            });
        }

        let diff = axis(query, node.split_dim) - axis(point, node.split_dim);
        let diff_sq = diff * diff;

        if let Some(left_idx) = node.left
            && (diff <= 0.0 || diff_sq <= radius_sq)
        {
            self.radius_search_recursive(left_idx, query, radius_sq, results);
        }
        if let Some(right_idx) = node.right
            && (diff >= 0.0 || diff_sq <= radius_sq)
        {
            self.radius_search_recursive(right_idx, query, radius_sq, results);
        }
    }
}

/// A bounded max-heap keeping the k smallest distances seen so far.
#[derive(Debug)]
struct BoundedMaxHeap {
    capacity: usize,
    items: Vec<Neighbor>,
}

impl BoundedMaxHeap {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity + 1),
        }
    }

    fn push(&mut self, index: usize, dist_sq: f64) {
        if self.items.len() < self.capacity {
            self.items.push(Neighbor { index, dist_sq });
            self.sift_up(self.items.len() - 1);
        } else if dist_sq < self.items[0].dist_sq {
            self.items[0] = Neighbor { index, dist_sq };
            self.sift_down(0);
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn max_distance(&self) -> f64 {
        self.items.first().map_or(f64::INFINITY, |n| n.dist_sq)
    }

    fn into_vec(self) -> Vec<Neighbor> {
        self.items
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[idx].dist_sq > self.items[parent].dist_sq {
                self.items.swap(idx, parent);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut largest = idx;

            if left < self.items.len() && self.items[left].dist_sq > self.items[largest].dist_sq {
                largest = left;
            }
            if right < self.items.len() && self.items[right].dist_sq > self.items[largest].dist_sq
            {
                largest = right;
            }

            if largest == idx {
                break;
            }
            self.items.swap(idx, largest);
            idx = largest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<DVec2> {
        let mut points = Vec::new();
        for y in 0..10 {
            for x in 0..10 {
                points.push(DVec2::new(x as f64 * 10.0, y as f64 * 10.0));
            }
        }
        points
    }

    fn brute_force_k_nearest(points: &[DVec2], query: DVec2, k: usize) -> Vec<usize> {
        let mut all: Vec<(usize, f64)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, query.distance_squared(*p)))
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        all.into_iter().take(k).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_build_empty() {
        assert!(KdTree::build(&[]).is_none());
    }

    #[test]
    fn test_k_nearest_finds_exact_point() {
        let points = grid_points();
        let tree = KdTree::build(&points).unwrap();
        let nearest = tree.nearest(DVec2::new(30.0, 40.0)).unwrap();
        assert_eq!(nearest.index, 43);
        assert_eq!(nearest.dist_sq, 0.0);
    }

    #[test]
    fn test_k_nearest_matches_brute_force() {
        // Irregular but deterministic layout.
        let points: Vec<DVec2> = (0..200)
            .map(|i| {
                let t = i as f64;
                DVec2::new((t * 37.7) % 500.0, (t * 91.3) % 400.0)
            })
            .collect();
        let tree = KdTree::build(&points).unwrap();

        for query in [
            DVec2::new(10.0, 10.0),
            DVec2::new(250.0, 200.0),
            DVec2::new(499.0, 1.0),
        ] {
            let got: Vec<usize> = tree.k_nearest(query, 7).iter().map(|n| n.index).collect();
            assert_eq!(got, brute_force_k_nearest(&points, query, 7));
        }
    }

    #[test]
    fn test_k_nearest_more_than_available() {
        let points = vec![DVec2::ZERO, DVec2::X, DVec2::Y];
        let tree = KdTree::build(&points).unwrap();
        assert_eq!(tree.k_nearest(DVec2::ZERO, 10).len(), 3);
        assert!(tree.k_nearest(DVec2::ZERO, 0).is_empty());
    }

    #[test]
    fn test_radius_search() {
        let points = grid_points();
        let tree = KdTree::build(&points).unwrap();
        let found = tree.radius_search(DVec2::new(50.0, 50.0), 10.0);
        let mut indices: Vec<usize> = found.iter().map(|n| n.index).collect();
        indices.sort();
        // Center plus the four axis neighbours at exactly the radius.
        assert_eq!(indices, vec![45, 54, 55, 56, 65]);
        assert_eq!(found[0].index, 55);
    }

    #[test]
    fn test_radius_search_empty_result() {
        let tree = KdTree::build(&grid_points()).unwrap();
        assert!(tree.radius_search(DVec2::new(5.0, 5.0), 1.0).is_empty());
    }

    #[test]
    fn test_duplicate_points() {
        let points = vec![DVec2::new(1.0, 1.0); 5];
        let tree = KdTree::build(&points).unwrap();
        assert_eq!(tree.k_nearest(DVec2::new(1.0, 1.0), 3).len(), 3);
        assert_eq!(tree.radius_search(DVec2::new(1.0, 1.0), 0.0).len(), 5);
    }

    #[test]
    fn test_bounded_heap_keeps_smallest() {
        let mut heap = BoundedMaxHeap::new(3);
        for (i, d) in [5.0, 1.0, 4.0, 2.0, 3.0].into_iter().enumerate() {
            heap.push(i, d);
        }
        let mut kept: Vec<f64> = heap.into_vec().iter().map(|n| n.dist_sq).collect();
        kept.sort_by(f64::total_cmp);
        assert_eq!(kept, vec![1.0, 2.0, 3.0]);
    }
}
