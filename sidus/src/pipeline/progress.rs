//! Progress reporting and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::SharedFn;
use strum_macros::Display;

/// Progress of a stacking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Frames that reached a final state (folded, rejected or skipped).
    pub frames_processed: usize,
    pub frames_total: usize,
    pub stage: Stage,
}

/// Stage of a stacking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Stage {
    /// Sizing batches against the memory budget.
    Planning,
    /// Selecting the reference frame and detecting its stars.
    Reference,
    /// Detecting, registering and aligning the frames of a batch.
    Registering,
    /// Reducing a finished batch into the stack.
    Stacking,
    /// Producing the output image.
    Finalizing,
}

/// Callback type for progress reporting.
pub type ProgressCallback = SharedFn<dyn Fn(Progress) + Send + Sync>;

pub fn report_progress(
    callback: &ProgressCallback,
    frames_processed: usize,
    frames_total: usize,
    stage: Stage,
) {
    callback.call(Progress {
        frames_processed,
        frames_total,
        stage,
    });
}

/// Cooperative cancellation flag, checked by the pipeline at frame boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
