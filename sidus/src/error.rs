//! Run-level errors.
//!
//! Per-frame failures never show up here: they are recorded as
//! [`RejectionCause`](crate::pipeline::RejectionCause) values in the frame report.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::{FrameReport, RunOutput};

/// Fatal errors that abort or end a stacking run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No frames provided for stacking")]
    NoFrames,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "Memory budget of {budget} bytes cannot hold the minimum batch of {min_batch} frames at {frame_cost} bytes each"
    )]
    BudgetViolation {
        budget: u64,
        frame_cost: u64,
        min_batch: usize,
    },

    #[error("Reference frame unusable: {reason}")]
    InvalidReference { reason: String },

    #[error("No frames were folded into the stack")]
    EmptyRun {
        /// Fate of every input frame. Empty when raised by the accumulator alone.
        report: Vec<FrameReport>,
    },

    #[error("Run cancelled after folding {folded} frames")]
    Cancelled {
        folded: usize,
        /// Finalized output of everything folded before cancellation, if anything was.
        partial: Option<Box<RunOutput>>,
    },
}
