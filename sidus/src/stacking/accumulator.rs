//! Per-pixel accumulation of aligned frames.
//!
//! Streaming policies fold each frame into weighted sums as it arrives.
//! Batch-buffered policies keep the frames of the current batch and reduce
//! them pixel by pixel in [`Accumulator::end_batch`], so memory stays bounded by
//! the batch plan regardless of how many frames the run has.

use common::Buffer2;
use rayon::prelude::*;

use super::clip_stats::ClipStats;
use super::config::{AccumulationMode, CombineMethod, StackConfig};
use super::{NO_DATA, StackedImage};
use crate::align::AlignedFrame;
use crate::error::RunError;
use crate::frame::ImageDimensions;
use crate::math::{Welford, median_f32_mut, robust_sigma};

/// Fewest samples the iterative clip works on.
const MIN_CLIP_SAMPLES: usize = 3;

/// Running state of one output sample.
#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    sum: f64,
    weight: f64,
    /// Unclipped mean/M2 over every valid sample (sigma-clip only).
    spread: Welford,
    /// Mean/M2 over the samples that survived clipping (sigma-clip only).
    kept: Welford,
}

impl Cell {
    #[inline]
    fn add(&mut self, value: f32, weight: f64) {
        self.sum += value as f64 * weight;
        self.weight += weight;
    }

    #[inline]
    fn value(&self) -> f32 {
        if self.weight > 0.0 {
            (self.sum / self.weight) as f32
        } else {
            NO_DATA
        }
    }
}

/// Per-thread buffers for the pixel reductions.
#[derive(Default)]
struct Scratch {
    members: Vec<usize>,
    values: Vec<f32>,
    weights: Vec<f64>,
    keep: Vec<bool>,
    active: Vec<f32>,
    deviations: Vec<f32>,
}

/// Accumulates aligned frames into a stacked image.
///
/// Frames are folded from a single thread; the per-pixel work inside
/// [`fold`](Self::fold) and [`end_batch`](Self::end_batch) is parallel over rows.
#[derive(Debug)]
pub struct Accumulator {
    dimensions: ImageDimensions,
    method: CombineMethod,
    kappa: f32,
    iterations: usize,
    cells: Vec<Cell>,
    coverage: Vec<u32>,
    pending: Vec<AlignedFrame>,
    folded: usize,
    clip_stats: ClipStats,
}

impl Accumulator {
    pub fn new(dimensions: ImageDimensions, config: &StackConfig) -> Self {
        Self {
            dimensions,
            method: config.method,
            kappa: config.kappa,
            iterations: config.iterations,
            cells: vec![Cell::default(); dimensions.sample_count()],
            coverage: vec![0; dimensions.pixel_count()],
            pending: Vec::new(),
            folded: 0,
            clip_stats: ClipStats::default(),
        }
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn mode(&self) -> AccumulationMode {
        self.method.mode()
    }

    /// Frames folded so far, including those still pending in the current batch.
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Frames retained until the next [`end_batch`](Self::end_batch).
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn clip_stats(&self) -> &ClipStats {
        &self.clip_stats
    }

    /// Add one aligned frame. Only its valid pixels contribute.
    ///
    /// # Panics
    /// Panics if the frame's dimensions differ from the accumulator's.
    pub fn fold(&mut self, frame: AlignedFrame) {
        assert_eq!(
            frame.dimensions, self.dimensions,
            "aligned frame {} does not match the accumulator",
            frame.index
        );
        self.folded += 1;

        match self.mode() {
            AccumulationMode::Streaming => self.fold_weighted(&frame),
            AccumulationMode::BatchBuffered => self.pending.push(frame),
        }
    }

    /// Reduce the retained samples of the current batch into the running sums.
    ///
    /// Frames are reduced in ascending index order whatever order they were
    /// folded in. A no-op for streaming policies.
    pub fn end_batch(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.pending.sort_by_key(|f| f.index);

        let width = self.dimensions.width;
        let channels = self.dimensions.channels;
        let method = self.method;
        let kappa = self.kappa;
        let iterations = self.iterations;
        let frames = &self.pending;
        let stats = &self.clip_stats;

        self.cells
            .par_chunks_mut(width * channels)
            .zip(self.coverage.par_chunks_mut(width))
            .enumerate()
            .for_each_init(Scratch::default, |scratch, (y, (cell_row, coverage_row))| {
                for (x, coverage) in coverage_row.iter_mut().enumerate() {
                    scratch.members.clear();
                    scratch
                        .members
                        .extend((0..frames.len()).filter(|&i| frames[i].is_valid(x, y)));
                    if scratch.members.is_empty() {
                        continue;
                    }
                    *coverage += scratch.members.len() as u32;

                    for c in 0..channels {
                        scratch.values.clear();
                        scratch.weights.clear();
                        for &i in &scratch.members {
                            scratch.values.push(frames[i].sample(x, y, c));
                            scratch.weights.push(frames[i].weight as f64);
                        }

                        let cell = &mut cell_row[x * channels + c];
                        match method {
                            CombineMethod::SigmaClip => {
                                clip_and_fold(cell, scratch, kappa, iterations, stats)
                            }
                            CombineMethod::Median => median_and_fold(cell, scratch),
                            CombineMethod::Mean => {
                                for (&v, &w) in scratch.values.iter().zip(&scratch.weights) {
                                    cell.add(v, w);
                                }
                            }
                        }
                    }
                }
            });

        tracing::debug!(frames = self.pending.len(), %method, "Batch reduced");
        self.pending.clear();
    }

    /// Finish the stack.
    ///
    /// Pending samples are reduced first. Pixels no frame covered hold
    /// [`NO_DATA`]. Fails with [`RunError::EmptyRun`] when nothing was folded.
    pub fn finalize(mut self) -> Result<StackedImage, RunError> {
        if self.folded == 0 {
            return Err(RunError::EmptyRun { report: Vec::new() });
        }
        self.end_batch();

        let pixels = self.cells.par_iter().map(Cell::value).collect();
        let variance = (self.method == CombineMethod::SigmaClip).then(|| {
            self.cells
                .par_iter()
                .map(|c| c.spread.variance().map_or(NO_DATA, |v| v as f32))
                .collect()
        });

        if self.method == CombineMethod::SigmaClip {
            self.clip_stats.log_summary(self.folded);
        }

        let ImageDimensions { width, height, .. } = self.dimensions;
        Ok(StackedImage {
            dimensions: self.dimensions,
            pixels,
            coverage: Buffer2::new(width, height, self.coverage),
            variance,
            crop: None,
        })
    }

    fn fold_weighted(&mut self, frame: &AlignedFrame) {
        let width = self.dimensions.width;
        let channels = self.dimensions.channels;
        let weight = frame.weight as f64;

        self.cells
            .par_chunks_mut(width * channels)
            .zip(self.coverage.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (cell_row, coverage_row))| {
                for (x, coverage) in coverage_row.iter_mut().enumerate() {
                    if !frame.is_valid(x, y) {
                        continue;
                    }
                    *coverage += 1;
                    for c in 0..channels {
                        cell_row[x * channels + c].add(frame.sample(x, y, c), weight);
                    }
                }
            });
    }
}

/// Sigma-clip the samples in `scratch.values` and fold the survivors.
///
/// A batch too small to clip on its own is checked against the survivors of
/// earlier batches instead.
fn clip_and_fold(
    cell: &mut Cell,
    scratch: &mut Scratch,
    kappa: f32,
    iterations: usize,
    stats: &ClipStats,
) {
    for &v in &scratch.values {
        cell.spread.push(v as f64);
    }

    let short = scratch.values.len() < MIN_CLIP_SAMPLES
        && cell.kept.count >= MIN_CLIP_SAMPLES as u64;
    let survivors = if short {
        clip_against(&scratch.values, &cell.kept, kappa, &mut scratch.keep)
    } else {
        clip_mask(
            &scratch.values,
            kappa,
            iterations,
            &mut scratch.keep,
            &mut scratch.active,
            &mut scratch.deviations,
        )
    };
    stats.record(scratch.values.len(), survivors);

    // Everything rejected in a self-contained clip: fall back to the unclipped
    // batch mean. Rejections against history just leave the earlier stack.
    let keep_all = survivors == 0 && !short;
    for ((&v, &w), &keep) in scratch
        .values
        .iter()
        .zip(&scratch.weights)
        .zip(&scratch.keep)
    {
        if keep || keep_all {
            cell.add(v, w);
            cell.kept.push(v as f64);
        }
    }
}

/// Reject samples farther than `kappa` standard deviations from the mean of
/// `history`. Keeps everything when the history has no spread.
fn clip_against(values: &[f32], history: &Welford, kappa: f32, keep: &mut Vec<bool>) -> usize {
    keep.clear();
    keep.resize(values.len(), true);

    let sigma = history.variance().map_or(0.0, f64::sqrt);
    if !(sigma > 0.0) {
        return values.len();
    }
    let threshold = kappa as f64 * sigma;
    for (&v, k) in values.iter().zip(keep.iter_mut()) {
        *k = (v as f64 - history.mean).abs() <= threshold;
    }
    keep.iter().filter(|&&k| k).count()
}

/// Fold the batch median, weighted by the number of samples it summarizes.
fn median_and_fold(cell: &mut Cell, scratch: &mut Scratch) {
    let n = scratch.values.len();
    scratch.active.clear();
    scratch.active.extend_from_slice(&scratch.values);
    let median = median_f32_mut(&mut scratch.active);
    cell.add(median, n as f64);
}

/// Iterative kappa-sigma rejection around the median.
///
/// Marks survivors in `keep` and returns their count. Stops early when an
/// iteration rejects nothing, fewer than [`MIN_CLIP_SAMPLES`] remain or the
/// spread collapses to zero.
pub(crate) fn clip_mask(
    values: &[f32],
    kappa: f32,
    iterations: usize,
    keep: &mut Vec<bool>,
    active: &mut Vec<f32>,
    deviations: &mut Vec<f32>,
) -> usize {
    keep.clear();
    keep.resize(values.len(), true);
    let mut remaining = values.len();

    for _ in 0..iterations {
        if remaining < MIN_CLIP_SAMPLES {
            break;
        }
        active.clear();
        active.extend(
            values
                .iter()
                .zip(keep.iter())
                .filter(|&(_, &k)| k)
                .map(|(&v, _)| v),
        );
        let center = median_f32_mut(active);
        let sigma = robust_sigma(active, center, deviations);
        if !(sigma > 0.0) {
            break;
        }

        let threshold = kappa * sigma;
        let mut rejected = 0;
        for (&v, k) in values.iter().zip(keep.iter_mut()) {
            if *k && (v - center).abs() > threshold {
                *k = false;
                rejected += 1;
            }
        }
        if rejected == 0 {
            break;
        }
        remaining -= rejected;
    }

    remaining
}
