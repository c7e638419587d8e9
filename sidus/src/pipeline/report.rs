//! Per-frame outcome records.

use serde::Serialize;
use strum_macros::Display;

use crate::registration::RegistrationError;

/// Why a frame was left out of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum RejectionCause {
    /// The detector found no stars.
    DetectionFailure,
    /// Too few consistent star correspondences.
    InsufficientMatches,
    /// The fitted transform's residual RMS exceeds the limit.
    ExcessiveResidual,
    /// The fitted translation exceeds the limit.
    ExcessiveShift,
    /// Frame size or channel count differs from the reference.
    DimensionMismatch,
    /// The frame source could not provide the frame.
    LoadFailure,
}

impl From<&RegistrationError> for RejectionCause {
    fn from(err: &RegistrationError) -> Self {
        match err {
            RegistrationError::NotEnoughStars { .. }
            | RegistrationError::NoTriangleMatches
            | RegistrationError::Degenerate
            | RegistrationError::InsufficientMatches { .. } => RejectionCause::InsufficientMatches,
            RegistrationError::ExcessiveResidual { .. } => RejectionCause::ExcessiveResidual,
            RegistrationError::ExcessiveShift { .. } => RejectionCause::ExcessiveShift,
        }
    }
}

/// Lifecycle of one frame in a run.
///
/// `Pending → Loaded → Detected → {Aligned, Rejected}`, then
/// `Aligned → {Folded, Skipped}`. Any non-final state may end in `Skipped` on
/// cancellation, and a frame that fails to load or mismatches the reference
/// goes straight to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum FrameState {
    Pending,
    Loaded,
    Detected,
    Aligned,
    Rejected,
    Folded,
    Skipped,
}

impl FrameState {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            FrameState::Rejected | FrameState::Folded | FrameState::Skipped
        )
    }

    pub fn can_advance_to(&self, next: FrameState) -> bool {
        use FrameState::*;
        match (self, next) {
            (Pending, Loaded) | (Loaded, Detected) | (Detected, Aligned) => true,
            (Aligned, Folded) => true,
            (Pending | Loaded | Detected, Rejected) => true,
            (s, Skipped) => !s.is_final(),
            _ => false,
        }
    }
}

/// What happened to one input frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    /// Position in the input order.
    pub index: usize,
    pub source: String,
    pub state: FrameState,
    pub accepted: bool,
    pub cause: Option<RejectionCause>,
    pub inlier_count: Option<usize>,
    pub residual_rms: Option<f64>,
    /// Stacking weight of a folded frame.
    pub weight: Option<f32>,
    /// Human-readable reason for a rejection.
    pub detail: Option<String>,
}

impl FrameReport {
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            source: String::new(),
            state: FrameState::Pending,
            accepted: false,
            cause: None,
            inlier_count: None,
            residual_rms: None,
            weight: None,
            detail: None,
        }
    }

    /// Move to `next`. Illegal transitions are a pipeline bug.
    pub fn advance(&mut self, next: FrameState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "frame {}: {} -> {}",
            self.index,
            self.state,
            next
        );
        self.state = next;
        self.accepted = next == FrameState::Folded;
    }

    pub fn reject(&mut self, cause: RejectionCause, detail: impl Into<String>) {
        self.advance(FrameState::Rejected);
        self.cause = Some(cause);
        self.detail = Some(detail.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_error_mapping() {
        let cases = [
            (
                RegistrationError::NotEnoughStars {
                    reference: 10,
                    target: 2,
                    required: 3,
                },
                RejectionCause::InsufficientMatches,
            ),
            (RegistrationError::NoTriangleMatches, RejectionCause::InsufficientMatches),
            (
                RegistrationError::ExcessiveResidual {
                    rms: 2.0,
                    max_allowed: 1.0,
                    inliers: 12,
                },
                RejectionCause::ExcessiveResidual,
            ),
            (
                RegistrationError::ExcessiveShift {
                    shift: 300.0,
                    max_allowed: 200.0,
                    inliers: 12,
                    rms: 0.1,
                },
                RejectionCause::ExcessiveShift,
            ),
        ];
        for (err, cause) in cases {
            assert_eq!(RejectionCause::from(&err), cause);
        }
    }

    #[test]
    fn test_state_transitions() {
        use FrameState::*;
        assert!(Pending.can_advance_to(Loaded));
        assert!(Detected.can_advance_to(Rejected));
        assert!(Aligned.can_advance_to(Folded));
        assert!(Aligned.can_advance_to(Skipped));
        assert!(!Rejected.can_advance_to(Skipped));
        assert!(!Folded.can_advance_to(Aligned));
        assert!(!Pending.can_advance_to(Folded));
    }

    #[test]
    fn test_report_lifecycle() {
        let mut report = FrameReport::pending(3);
        report.advance(FrameState::Loaded);
        report.advance(FrameState::Detected);
        report.reject(RejectionCause::DetectionFailure, "no stars");

        assert_eq!(report.state, FrameState::Rejected);
        assert!(!report.accepted);
        assert_eq!(report.cause, Some(RejectionCause::DetectionFailure));

        let mut folded = FrameReport::pending(0);
        for state in [FrameState::Loaded, FrameState::Detected, FrameState::Aligned, FrameState::Folded] {
            folded.advance(state);
        }
        assert!(folded.accepted);
    }
}
