//! 8-connected component labeling using run-length encoding and union-find.

use common::Buffer2;

/// A horizontal run of foreground pixels.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32, // inclusive
    end: u32,   // exclusive
    label: u32,
}

/// Runs in adjacent rows touch, diagonals included.
#[inline]
fn runs_connected(prev: &Run, curr: &Run) -> bool {
    prev.start < curr.end + 1 && prev.end + 1 > curr.start
}

/// A 2D label map: 0 is background, components are labeled `1..=num_labels`.
#[derive(Debug)]
pub struct LabelMap {
    labels: Buffer2<u32>,
    num_labels: usize,
}

impl LabelMap {
    #[inline]
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    #[inline]
    pub fn labels(&self) -> &Buffer2<u32> {
        &self.labels
    }

    /// Bounding box and area of every component, indexed by `label - 1`.
    pub fn components(&self) -> Vec<Component> {
        let mut components: Vec<Component> = (1..=self.num_labels as u32)
            .map(|label| Component {
                label,
                min_x: usize::MAX,
                min_y: usize::MAX,
                max_x: 0,
                max_y: 0,
                area: 0,
            })
            .collect();

        for y in 0..self.labels.height() {
            for (x, &label) in self.labels.row(y).iter().enumerate() {
                if label == 0 {
                    continue;
                }
                let c = &mut components[(label - 1) as usize];
                c.min_x = c.min_x.min(x);
                c.min_y = c.min_y.min(y);
                c.max_x = c.max_x.max(x);
                c.max_y = c.max_y.max(y);
                c.area += 1;
            }
        }
        components
    }
}

/// One labeled component: inclusive bounding box and pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
    pub area: usize,
}

impl Component {
    /// Whether the bounding box stays at least `margin` pixels from every border.
    pub fn clear_of_edges(&self, width: usize, height: usize, margin: usize) -> bool {
        self.min_x >= margin
            && self.min_y >= margin
            && self.max_x + margin < width
            && self.max_y + margin < height
    }
}

/// Label 8-connected foreground regions of `mask`.
pub fn connected_components(mask: &Buffer2<bool>) -> LabelMap {
    let width = mask.width();
    let height = mask.height();
    let mut labels: Buffer2<u32> = Buffer2::new_default(width, height);

    let mut uf = UnionFind::new();
    let mut prev_runs: Vec<Run> = Vec::new();
    let mut curr_runs: Vec<Run> = Vec::new();

    for y in 0..height {
        curr_runs.clear();
        extract_runs(mask.row(y), &mut curr_runs);
        if curr_runs.is_empty() {
            prev_runs.clear();
            continue;
        }

        merge_runs_with_prev(&mut curr_runs, &prev_runs, &mut uf);

        let row = labels.row_mut(y);
        for run in &curr_runs {
            row[run.start as usize..run.end as usize].fill(run.label);
        }
        std::mem::swap(&mut prev_runs, &mut curr_runs);
    }

    let num_labels = uf.flatten_labels(labels.pixels_mut());
    LabelMap { labels, num_labels }
}

fn extract_runs(row: &[bool], runs: &mut Vec<Run>) {
    let mut x = 0;
    while x < row.len() {
        if !row[x] {
            x += 1;
            continue;
        }
        let start = x;
        while x < row.len() && row[x] {
            x += 1;
        }
        runs.push(Run {
            start: start as u32,
            end: x as u32,
            label: 0,
        });
    }
}

/// Give every run in `curr_runs` the label of an overlapping run in the row
/// above, merging labels when it overlaps several; fresh label otherwise.
fn merge_runs_with_prev(curr_runs: &mut [Run], prev_runs: &[Run], uf: &mut UnionFind) {
    let mut prev_idx = 0;
    for run in curr_runs.iter_mut() {
        let search_start = run.start.saturating_sub(1);
        let search_end = run.end + 1;

        while prev_idx < prev_runs.len() && prev_runs[prev_idx].end <= search_start {
            prev_idx += 1;
        }

        let mut assigned_label = None;
        let mut check_idx = prev_idx;
        while check_idx < prev_runs.len() && prev_runs[check_idx].start < search_end {
            let prev_run = &prev_runs[check_idx];
            if runs_connected(prev_run, run) {
                match assigned_label {
                    Some(label) if label != prev_run.label => uf.union(label, prev_run.label),
                    None => assigned_label = Some(prev_run.label),
                    _ => {}
                }
            }
            check_idx += 1;
        }

        run.label = assigned_label.unwrap_or_else(|| uf.make_set());
    }
}

/// Union-find over provisional labels (labels start at 1).
#[derive(Debug)]
struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        Self {
            parent: Vec::with_capacity(256),
        }
    }

    #[inline]
    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32 + 1;
        self.parent.push(label);
        label
    }

    /// Find root with path compression.
    fn find(&mut self, label: u32) -> u32 {
        let mut root = label;
        while self.parent[(root - 1) as usize] != root {
            root = self.parent[(root - 1) as usize];
        }

        let mut current = label;
        while current != root {
            let next = self.parent[(current - 1) as usize];
            self.parent[(current - 1) as usize] = root;
            current = next;
        }
        root
    }

    #[inline]
    fn union(&mut self, a: u32, b: u32) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            // Smaller root wins so final labels follow raster order.
            let (keep, drop) = if root_a < root_b {
                (root_a, root_b)
            } else {
                (root_b, root_a)
            };
            self.parent[(drop - 1) as usize] = keep;
        }
    }

    /// Rewrite provisional labels as consecutive final labels. Returns the count.
    fn flatten_labels(&mut self, labels: &mut [u32]) -> usize {
        let n = self.parent.len();
        let mut final_label = vec![0u32; n];
        let mut next = 0u32;
        for provisional in 1..=n as u32 {
            let root = self.find(provisional);
            if root == provisional {
                next += 1;
                final_label[(provisional - 1) as usize] = next;
            }
        }
        for provisional in 1..=n as u32 {
            let root = self.find(provisional);
            final_label[(provisional - 1) as usize] = final_label[(root - 1) as usize];
        }

        for label in labels.iter_mut().filter(|l| **l != 0) {
            *label = final_label[(*label - 1) as usize];
        }
        next as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Buffer2<bool> {
        let width = rows[0].len();
        let pixels = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '#'))
            .collect();
        Buffer2::new(width, rows.len(), pixels)
    }

    #[test]
    fn test_empty_mask() {
        let map = connected_components(&Buffer2::new_filled(8, 8, false));
        assert_eq!(map.num_labels(), 0);
        assert!(map.components().is_empty());
    }

    #[test]
    fn test_separate_blobs() {
        let mask = mask_from(&[
            "##....#", //
            "##....#",
            ".......",
            "...##..",
        ]);
        let map = connected_components(&mask);
        assert_eq!(map.num_labels(), 3);

        let components = map.components();
        let areas: Vec<usize> = components.iter().map(|c| c.area).collect();
        assert_eq!(areas, vec![4, 2, 2]);
        assert_eq!(
            (components[0].min_x, components[0].max_x, components[0].max_y),
            (0, 1, 1)
        );
    }

    #[test]
    fn test_diagonal_is_connected() {
        let mask = mask_from(&[
            "#...", //
            ".#..",
            "..#.",
        ]);
        let map = connected_components(&mask);
        assert_eq!(map.num_labels(), 1);
        assert_eq!(map.components()[0].area, 3);
    }

    #[test]
    fn test_u_shape_merges() {
        // Two arms labeled separately until the bottom row joins them.
        let mask = mask_from(&[
            "#...#", //
            "#...#",
            "#####",
        ]);
        let map = connected_components(&mask);
        assert_eq!(map.num_labels(), 1);
        assert!(map.labels().iter().all(|&l| l == 0 || l == 1));
        assert_eq!(map.components()[0].area, 9);
    }

    #[test]
    fn test_clear_of_edges() {
        let c = Component {
            label: 1,
            min_x: 5,
            min_y: 5,
            max_x: 9,
            max_y: 9,
            area: 25,
        };
        assert!(c.clear_of_edges(20, 20, 5));
        assert!(!c.clear_of_edges(20, 20, 6));
        assert!(!c.clear_of_edges(14, 20, 5));
    }
}
