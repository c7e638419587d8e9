//! Sidus - star-based registration and stacking of astronomical frames.
//!
//! The engine takes a set of exposures of the same field, finds the stars in
//! each, registers every frame onto a reference through matched star patterns,
//! resamples it into reference coordinates and combines the aligned frames with
//! a mean, median or sigma-clipped mean, in memory-bounded batches.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sidus::{Config, Pipeline, ReferenceSelection, VecSource};
//!
//! let config = Config::from_yaml("stack:\n  method: sigmaclip\n  kappa: 3.0\n")?;
//! let pipeline = Pipeline::new(config)?;
//!
//! let mut source = VecSource::new(frames);
//! let output = pipeline.run(&mut source, ReferenceSelection::First)?;
//!
//! for frame in output.rejected() {
//!     println!("{}: {:?}", frame.source, frame.cause);
//! }
//! ```

pub mod align;
pub mod batch;
pub mod config;
pub mod error;
pub mod frame;
pub(crate) mod math;
pub mod pipeline;
pub mod registration;
pub mod stacking;
pub mod star_detection;

#[cfg(any(test, feature = "synthetic"))]
pub mod testing;

// ============================================================================
// Frames and configuration
// ============================================================================

pub use config::{Config, ConfigError};
pub use error::RunError;
pub use frame::{Frame, FrameMetadata, ImageDimensions, StackMetadata};

// ============================================================================
// Star detection
// ============================================================================

pub use star_detection::{DetectionConfig, DetectionResult, Star, StarDetector};

// ============================================================================
// Registration and alignment
// ============================================================================

pub use align::{AlignConfig, AlignedFrame, CropMode, InterpolationMethod, align, warp};
pub use registration::{
    RegistrationConfig, RegistrationError, RegistrationResult, Registrator, Transform,
    TransformType,
};

// ============================================================================
// Stacking
// ============================================================================

pub use batch::{BatchConfig, BatchPlan, BatchPlanner};
pub use stacking::{
    AccumulationMode, Accumulator, CombineMethod, FrameQuality, NO_DATA, StackConfig,
    StackedImage, Weighting,
};

// ============================================================================
// Pipeline
// ============================================================================

pub use pipeline::{
    CancelToken, FrameReport, FrameSource, FrameState, Pipeline, Progress, ProgressCallback,
    ReferencePolicy, ReferenceSelection, RejectionCause, RunOutput, Stage, VecSource,
};

pub use common::{Buffer2, Rect, SharedFn};
