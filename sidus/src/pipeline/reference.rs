//! Choosing the frame every other frame is registered against.

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Configurable reference choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// The first frame of the source.
    #[default]
    First,
    /// The frame with the best `snr * star_count`, measured in a pre-pass.
    Quality,
    /// A fixed source index.
    Index(usize),
}

/// Reference for one run: a policy over the source, or a frame supplied by the caller.
#[derive(Debug, Clone)]
pub enum ReferenceSelection {
    First,
    HighestQuality,
    Index(usize),
    /// A frame outside the source; every source frame is registered against it.
    Frame(Box<Frame>),
}

impl From<ReferencePolicy> for ReferenceSelection {
    fn from(policy: ReferencePolicy) -> Self {
        match policy {
            ReferencePolicy::First => ReferenceSelection::First,
            ReferencePolicy::Quality => ReferenceSelection::HighestQuality,
            ReferencePolicy::Index(i) => ReferenceSelection::Index(i),
        }
    }
}

impl From<Frame> for ReferenceSelection {
    fn from(frame: Frame) -> Self {
        ReferenceSelection::Frame(Box::new(frame))
    }
}
