//! Memory-bounded batch planning.
//!
//! Frames are processed in batches small enough that every frame of a batch,
//! its working copies and (for batch-buffered policies) its retained samples
//! fit the memory budget at once.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ensure_in_range, ensure_ordered, ensure_positive};
use crate::error::RunError;
use crate::frame::ImageDimensions;
use crate::stacking::AccumulationMode;

/// Percentage of available memory used when no budget is configured.
pub const MEMORY_PERCENT: u64 = 75;

/// Smallest batch a batch-buffered policy is planned with; sigma rejection
/// needs at least three samples per pixel.
pub const MIN_BUFFERED_BATCH: usize = 3;

const BYTES_PER_SAMPLE: u64 = std::mem::size_of::<f32>() as u64;

/// Batch sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Memory budget in bytes. `None` queries the system.
    pub memory_budget: Option<u64>,
    /// Working copies per loaded frame (decoded, luminance, aligned, ...).
    pub overhead_factor: f64,
    pub min_batch: usize,
    pub max_batch: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            memory_budget: None,
            overhead_factor: 3.0,
            min_batch: 2,
            max_batch: 16,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_in_range(
            "batch.overhead_factor",
            self.overhead_factor,
            1.0,
            f64::MAX,
            ">= 1",
        )?;
        ensure_in_range("batch.min_batch", self.min_batch as f64, 2.0, f64::MAX, ">= 2")?;
        ensure_ordered(
            "batch.min_batch",
            self.min_batch as f64,
            "batch.max_batch",
            self.max_batch as f64,
        )?;
        if let Some(budget) = self.memory_budget {
            ensure_positive("batch.memory_budget", budget as f64)?;
        }
        Ok(())
    }
}

/// Batch layout for one run. Immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub frames_per_batch: usize,
    /// Estimated bytes held per in-flight frame, retained samples included.
    pub bytes_per_frame: u64,
    /// Bytes of samples a batch-buffered policy keeps per frame until `end_batch`.
    pub retained_bytes_per_frame: u64,
    pub budget: u64,
    pub mode: AccumulationMode,
}

impl BatchPlan {
    pub fn batch_count(&self, total_frames: usize) -> usize {
        total_frames.div_ceil(self.frames_per_batch)
    }

    /// Index ranges of consecutive batches covering `0..total_frames`.
    ///
    /// The frames are spread evenly: batch sizes differ by at most one and
    /// never exceed `frames_per_batch`.
    pub fn batches(&self, total_frames: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        let count = self.batch_count(total_frames);
        let base = total_frames.checked_div(count).unwrap_or(0);
        let extra = total_frames.checked_rem(count).unwrap_or(0);
        let start = move |b: usize| b * base + b.min(extra);
        (0..count).map(move |b| start(b)..start(b + 1))
    }

    /// Peak bytes for a full batch.
    pub fn peak_bytes(&self) -> u64 {
        self.bytes_per_frame.saturating_mul(self.frames_per_batch as u64)
    }
}

/// Sizes batches from a [`BatchConfig`].
#[derive(Debug, Clone, Default)]
pub struct BatchPlanner {
    config: BatchConfig,
}

impl BatchPlanner {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Budget from the config, or [`default_memory_budget`].
    pub fn budget(&self) -> u64 {
        self.config.memory_budget.unwrap_or_else(default_memory_budget)
    }

    /// Plan batches for frames of `dimensions` under `budget` bytes.
    ///
    /// Fails with [`RunError::BudgetViolation`] when not even `min_batch`
    /// frames fit.
    pub fn plan(
        &self,
        dimensions: ImageDimensions,
        mode: AccumulationMode,
        budget: u64,
    ) -> Result<BatchPlan, RunError> {
        let config = &self.config;
        let frame_bytes = (dimensions.sample_count() as u64).saturating_mul(BYTES_PER_SAMPLE);

        let working = (frame_bytes as f64 * config.overhead_factor).ceil() as u64;
        let retained = match mode {
            AccumulationMode::Streaming => 0,
            AccumulationMode::BatchBuffered => frame_bytes,
        };
        let bytes_per_frame = working.saturating_add(retained).max(1);

        let min_batch = match mode {
            AccumulationMode::Streaming => config.min_batch,
            AccumulationMode::BatchBuffered => config.min_batch.max(MIN_BUFFERED_BATCH),
        };
        let max_batch = config.max_batch.max(min_batch);

        let min_bytes = bytes_per_frame.saturating_mul(min_batch as u64);
        if budget < min_bytes {
            return Err(RunError::BudgetViolation {
                budget,
                frame_cost: bytes_per_frame,
                min_batch,
            });
        }

        let fitting = (budget / bytes_per_frame).min(usize::MAX as u64) as usize;
        let frames_per_batch = fitting.clamp(min_batch, max_batch);

        let plan = BatchPlan {
            frames_per_batch,
            bytes_per_frame,
            retained_bytes_per_frame: retained,
            budget,
            mode,
        };

        tracing::info!(
            dimensions = %dimensions,
            ?mode,
            budget_mb = budget / (1024 * 1024),
            bytes_per_frame,
            frames_per_batch,
            "Batch plan computed"
        );

        Ok(plan)
    }
}

/// [`MEMORY_PERCENT`] of the currently available system memory.
pub fn default_memory_budget() -> u64 {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory() / 100 * MEMORY_PERCENT
}
