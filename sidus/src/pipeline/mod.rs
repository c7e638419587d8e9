//! Run orchestration.
//!
//! A run plans its batches against the memory budget, settles on a reference
//! frame and detects its stars once, then walks the source batch by batch:
//! frames of a batch are loaded, detected, registered and aligned in parallel,
//! and the aligned frames are folded into the accumulator from this thread in
//! ascending index order.

mod progress;
mod reference;
mod report;
mod source;


use std::time::Instant;

use common::{Buffer2, Rect};
use glam::DVec2;
use rayon::prelude::*;

use crate::align::{AlignedFrame, CropMode, align, crop_to_valid};
use crate::batch::{BatchPlan, BatchPlanner};
use crate::config::{Config, ConfigError};
use crate::error::RunError;
use crate::frame::{Frame, FrameMetadata, ImageDimensions, StackMetadata};
use crate::registration::{MIN_STARS, Registrator, Transform};
use crate::stacking::{Accumulator, FrameQuality, StackedImage, Weighting, normalize_frame};
use crate::star_detection::{DetectionResult, StarDetector};

pub use progress::{CancelToken, Progress, ProgressCallback, Stage, report_progress};
pub use reference::{ReferencePolicy, ReferenceSelection};
pub use report::{FrameReport, FrameState, RejectionCause};
pub use source::{FrameSource, VecSource};

/// Everything a finished run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub image: StackedImage,
    /// One entry per input frame, in input order.
    pub report: Vec<FrameReport>,
    pub plan: BatchPlan,
    /// Merged metadata of the folded frames.
    pub metadata: StackMetadata,
    /// Source index of the reference, `None` for a caller-supplied frame.
    pub reference_index: Option<usize>,
}

impl RunOutput {
    pub fn folded_count(&self) -> usize {
        self.report.iter().filter(|r| r.accepted).count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &FrameReport> {
        self.report
            .iter()
            .filter(|r| r.state == FrameState::Rejected)
    }
}

/// The reference every frame is registered against.
struct Reference {
    index: Option<usize>,
    /// As loaded.
    frame: Frame,
    detection: DetectionResult,
    positions: Vec<DVec2>,
}

impl Reference {
    fn dimensions(&self) -> ImageDimensions {
        self.frame.dimensions()
    }
}

/// Result of the parallel per-frame stage.
enum Outcome {
    Aligned {
        frame: AlignedFrame,
        inliers: usize,
        rms: f64,
    },
    Rejected {
        index: usize,
        /// Whether detection ran before the rejection.
        detected: bool,
        cause: RejectionCause,
        detail: String,
        inliers: Option<usize>,
        rms: Option<f64>,
    },
    /// Cancellation was seen before any work on the frame.
    Skipped { index: usize },
}

/// Registration-and-stacking engine.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    detector: StarDetector,
    registrator: Registrator,
    planner: BatchPlanner,
    progress: ProgressCallback,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            detector: StarDetector::new(config.detection.clone()),
            registrator: Registrator::new(config.registration.clone()),
            planner: BatchPlanner::new(config.batch.clone()),
            config,
            progress: ProgressCallback::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = callback;
        self
    }

    /// Share an existing token instead of the pipeline's own.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels runs of this pipeline.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run with the reference chosen by `config.reference`.
    pub fn stack(&self, source: &mut dyn FrameSource) -> Result<RunOutput, RunError> {
        self.run(source, self.config.reference.into())
    }

    /// Register and stack every frame of `source` against `reference`.
    ///
    /// Per-frame failures are recorded in the report and never abort the run.
    /// On cancellation the frames not yet folded are reported as skipped and the
    /// stack of what was folded comes back inside [`RunError::Cancelled`].
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        reference: ReferenceSelection,
    ) -> Result<RunOutput, RunError> {
        let start = Instant::now();
        let total = source.len();
        if total == 0 {
            return Err(RunError::NoFrames);
        }

        report_progress(&self.progress, 0, total, Stage::Planning);
        let dimensions = match &reference {
            ReferenceSelection::Frame(frame) => frame.dimensions(),
            _ => source.dimensions(),
        };
        // Before the source is touched, so an impossible budget costs no I/O.
        let plan = self.planner.plan(
            dimensions,
            self.config.stack.method.mode(),
            self.planner.budget(),
        )?;

        tracing::info!(
            frames = total,
            %dimensions,
            method = %self.config.stack.method,
            batches = plan.batch_count(total),
            "Starting stacking run"
        );

        report_progress(&self.progress, 0, total, Stage::Reference);
        let reference = self.prepare_reference(source, reference, dimensions)?;

        let mut reports: Vec<FrameReport> = (0..total).map(FrameReport::pending).collect();
        let mut accumulator = Accumulator::new(dimensions, &self.config.stack);
        let mut region = Buffer2::new_filled(dimensions.width, dimensions.height, true);
        let mut folded_metadata = Vec::new();
        let mut processed = 0;
        let mut cancelled = false;

        for batch in plan.batches(total) {
            let mut loaded = Vec::with_capacity(batch.len());
            for index in batch {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let frame = if reference.index == Some(index) {
                    Ok(reference.frame.clone())
                } else {
                    source.load(index)
                };
                let report = &mut reports[index];
                match frame {
                    Ok(frame) => {
                        report.source = frame.metadata().source.clone();
                        report.advance(FrameState::Loaded);
                        loaded.push((index, frame));
                    }
                    Err(message) => {
                        tracing::warn!(index, %message, "Frame failed to load");
                        report.reject(RejectionCause::LoadFailure, message);
                        processed += 1;
                        report_progress(&self.progress, processed, total, Stage::Registering);
                    }
                }
            }
            if cancelled {
                break;
            }

            let outcomes: Vec<Outcome> = loaded
                .into_par_iter()
                .map(|(index, frame)| self.process_frame(index, frame, &reference))
                .collect();

            for outcome in outcomes {
                cancelled |= self.cancel.is_cancelled();
                match outcome {
                    Outcome::Aligned {
                        frame,
                        inliers,
                        rms,
                    } => {
                        let report = &mut reports[frame.index];
                        report.advance(FrameState::Detected);
                        report.advance(FrameState::Aligned);
                        report.inlier_count = Some(inliers);
                        report.residual_rms = Some(rms);
                        if cancelled {
                            report.advance(FrameState::Skipped);
                            continue;
                        }
                        report.weight = Some(frame.weight);
                        report.advance(FrameState::Folded);

                        for (r, &v) in region.iter_mut().zip(frame.valid.iter()) {
                            *r &= v;
                        }
                        folded_metadata.push(frame.metadata.clone());
                        accumulator.fold(frame);
                    }
                    Outcome::Rejected {
                        index,
                        detected,
                        cause,
                        detail,
                        inliers,
                        rms,
                    } => {
                        let report = &mut reports[index];
                        if detected {
                            report.advance(FrameState::Detected);
                        }
                        report.inlier_count = inliers;
                        report.residual_rms = rms;
                        tracing::info!(index, %cause, %detail, "Frame rejected");
                        report.reject(cause, detail);
                    }
                    Outcome::Skipped { index } => {
                        cancelled = true;
                        reports[index].advance(FrameState::Skipped);
                    }
                }
                processed += 1;
                report_progress(&self.progress, processed, total, Stage::Registering);
            }

            accumulator.end_batch();
            report_progress(&self.progress, processed, total, Stage::Stacking);
            if cancelled {
                break;
            }
        }

        for report in reports.iter_mut().filter(|r| !r.state.is_final()) {
            report.advance(FrameState::Skipped);
        }

        if cancelled {
            let folded = accumulator.folded();
            tracing::warn!(folded, total, "Run cancelled");
            let partial = if folded > 0 {
                let output = self.finish(
                    accumulator,
                    &region,
                    reports,
                    plan,
                    &folded_metadata,
                    reference.index,
                )?;
                Some(Box::new(output))
            } else {
                None
            };
            return Err(RunError::Cancelled { folded, partial });
        }

        report_progress(&self.progress, total, total, Stage::Finalizing);
        let output = self.finish(
            accumulator,
            &region,
            reports,
            plan,
            &folded_metadata,
            reference.index,
        )?;

        tracing::info!(
            folded = output.folded_count(),
            rejected = output.rejected().count(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Stacking run complete"
        );
        Ok(output)
    }

    /// Load, measure and detect the reference.
    fn prepare_reference(
        &self,
        source: &mut dyn FrameSource,
        selection: ReferenceSelection,
        dimensions: ImageDimensions,
    ) -> Result<Reference, RunError> {
        let (index, frame) = match selection {
            ReferenceSelection::First => (Some(0), load_reference(source, 0)?),
            ReferenceSelection::Index(index) => {
                if index >= source.len() {
                    return Err(RunError::InvalidReference {
                        reason: format!("index {index} out of range ({} frames)", source.len()),
                    });
                }
                (Some(index), load_reference(source, index)?)
            }
            ReferenceSelection::HighestQuality => {
                let (index, frame) = self.select_by_quality(source, dimensions)?;
                (Some(index), frame)
            }
            ReferenceSelection::Frame(frame) => (None, *frame),
        };

        if frame.dimensions() != dimensions {
            return Err(RunError::InvalidReference {
                reason: format!(
                    "reference is {}, frames are {}",
                    frame.dimensions(),
                    dimensions
                ),
            });
        }

        let detection = self.detector.detect(&frame.luminance());
        if detection.stars.len() < MIN_STARS {
            return Err(RunError::InvalidReference {
                reason: format!(
                    "{} stars detected, need at least {}",
                    detection.stars.len(),
                    MIN_STARS
                ),
            });
        }

        tracing::info!(
            index = ?index,
            stars = detection.stars.len(),
            noise = detection.noise_level,
            "Reference frame selected"
        );

        Ok(Reference {
            index,
            positions: detection.positions(),
            frame,
            detection,
        })
    }

    /// Pre-pass over the source keeping the frame with the best reference score.
    ///
    /// Ties go to the lower index. Frames that fail to load or have the wrong
    /// dimensions are passed over.
    fn select_by_quality(
        &self,
        source: &mut dyn FrameSource,
        dimensions: ImageDimensions,
    ) -> Result<(usize, Frame), RunError> {
        let total = source.len();
        let mut best: Option<(usize, Frame, f32)> = None;

        for index in 0..total {
            let frame = match source.load(index) {
                Ok(frame) if frame.dimensions() == dimensions => frame,
                Ok(_) => continue,
                Err(message) => {
                    tracing::debug!(index, %message, "Skipping unloadable reference candidate");
                    continue;
                }
            };
            let detection = self.detector.detect(&frame.luminance());
            let score = FrameQuality::measure(&frame, &detection).reference_score();
            tracing::debug!(index, score, stars = detection.stars.len(), "Reference candidate");

            if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
                best = Some((index, frame, score));
            }
            report_progress(&self.progress, index + 1, total, Stage::Reference);
        }

        best.map(|(index, frame, _)| (index, frame))
            .ok_or_else(|| RunError::InvalidReference {
                reason: "no frame could be measured".to_string(),
            })
    }

    /// Detect, register and align one frame. Runs on worker threads.
    fn process_frame(&self, index: usize, frame: Frame, reference: &Reference) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Skipped { index };
        }

        let rejected = |detected: bool, cause: RejectionCause, detail: String| Outcome::Rejected {
            index,
            detected,
            cause,
            detail,
            inliers: None,
            rms: None,
        };

        if frame.dimensions() != reference.dimensions() {
            return rejected(
                false,
                RejectionCause::DimensionMismatch,
                format!(
                    "frame is {}, reference is {}",
                    frame.dimensions(),
                    reference.dimensions()
                ),
            );
        }

        let is_reference = reference.index == Some(index);
        let detection = if is_reference {
            reference.detection.clone()
        } else {
            self.detector.detect(&frame.luminance())
        };
        if detection.is_empty() {
            return rejected(
                true,
                RejectionCause::DetectionFailure,
                "no stars detected".to_string(),
            );
        }

        let (transform, inliers, rms) = if is_reference {
            let control_points = detection
                .stars
                .len()
                .min(self.config.registration.max_control_points);
            (Transform::identity(), control_points, 0.0)
        } else {
            match self
                .registrator
                .register(&reference.positions, &detection.positions())
            {
                Ok(result) => (result.transform, result.num_inliers, result.rms_error),
                Err(err) => {
                    return Outcome::Rejected {
                        index,
                        detected: true,
                        cause: RejectionCause::from(&err),
                        detail: err.to_string(),
                        inliers: err.inlier_count(),
                        rms: err.residual_rms(),
                    };
                }
            }
        };

        let weight = match self.config.stack.weights {
            Weighting::Uniform => 1.0,
            Weighting::Snr => FrameQuality::measure(&frame, &detection).weight(),
        };

        tracing::debug!(index, inliers, rms, weight, %transform, "Frame registered");

        let frame = self.prepare(frame);
        let aligned = align(&frame, &transform, self.config.align.interpolation)
            .with_index(index)
            .with_weight(weight);
        Outcome::Aligned {
            frame: aligned,
            inliers,
            rms,
        }
    }

    /// Pixel preprocessing applied after registration, before alignment.
    /// Detection always sees the frame as loaded.
    fn prepare(&self, frame: Frame) -> Frame {
        if self.config.stack.normalize {
            normalize_frame(&frame)
        } else {
            frame
        }
    }

    fn finish(
        &self,
        accumulator: Accumulator,
        region: &Buffer2<bool>,
        report: Vec<FrameReport>,
        plan: BatchPlan,
        folded_metadata: &[FrameMetadata],
        reference_index: Option<usize>,
    ) -> Result<RunOutput, RunError> {
        if accumulator.folded() == 0 {
            return Err(RunError::EmptyRun { report });
        }
        let mut image = accumulator.finalize()?;

        if self.config.align.edge_crop {
            let full = Rect::full(image.dimensions.width, image.dimensions.height);
            let rect = match self.config.align.crop_mode {
                CropMode::Intersection => crop_to_valid(region),
                CropMode::Reference => Some(full),
            };
            match rect {
                Some(rect) if rect != full => {
                    tracing::info!(?rect, "Cropping stack to the common region");
                    image = image.cropped(rect);
                }
                Some(_) => {}
                None => tracing::warn!("Folded frames share no common region; output left uncropped"),
            }
        }

        Ok(RunOutput {
            image,
            report,
            plan,
            metadata: FrameMetadata::merge(folded_metadata),
            reference_index,
        })
    }
}

fn load_reference(source: &mut dyn FrameSource, index: usize) -> Result<Frame, RunError> {
    source
        .load(index)
        .map_err(|message| RunError::InvalidReference {
            reason: format!("frame {index} failed to load: {message}"),
        })
}
