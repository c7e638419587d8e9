//! Triangle matching for star pattern recognition.
//!
//! Triangles formed from neighbouring stars are described by their sorted side
//! ratios, which are invariant to translation, rotation and scale.
//!
//! 1. Form triangles from k-nearest neighbours (k-d tree)
//! 2. Index reference triangles by invariant in a second k-d tree
//! 3. Radius-search each target triangle's invariant for similar reference triangles
//! 4. Every similar pair votes for its three vertex correspondences
//! 5. Greedy one-to-one resolution of the vote matrix

mod geometry;
mod matching;
mod voting;

pub use matching::{TriangleMatches, match_triangles};
pub use voting::{PointMatch, TrianglePair};
