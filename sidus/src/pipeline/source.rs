//! Where frames come from.

use crate::frame::{Frame, ImageDimensions};

/// Indexed, lazily loaded frames of one run.
///
/// Decoding files is the caller's business; the pipeline only asks for frames
/// by index, one batch at a time.
pub trait FrameSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensions every frame is expected to have, known without loading pixels.
    fn dimensions(&self) -> ImageDimensions;

    /// Load frame `index`. The error is reported verbatim in the frame report.
    fn load(&mut self, index: usize) -> Result<Frame, String>;
}

/// Frames already in memory.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: Vec<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl From<Vec<Frame>> for VecSource {
    fn from(frames: Vec<Frame>) -> Self {
        Self::new(frames)
    }
}

impl FrameSource for VecSource {
    fn len(&self) -> usize {
        self.frames.len()
    }

    /// Dimensions of the first frame; zero-sized when there are none.
    fn dimensions(&self) -> ImageDimensions {
        self.frames
            .first()
            .map_or(ImageDimensions::new(0, 0, 1), Frame::dimensions)
    }

    fn load(&mut self, index: usize) -> Result<Frame, String> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| format!("frame index {index} out of range ({} frames)", self.frames.len()))
    }
}

#[cfg(test)]
mod tests {
    use common::Buffer2;

    use super::*;
    use crate::frame::FrameMetadata;

    #[test]
    fn test_vec_source() {
        let frames = vec![
            Frame::from_plane(Buffer2::new_filled(4, 3, 1.0), FrameMetadata::with_source("a")),
            Frame::from_plane(Buffer2::new_filled(4, 3, 2.0), FrameMetadata::with_source("b")),
        ];
        let mut source = VecSource::from(frames);

        assert_eq!(source.len(), 2);
        assert!(!source.is_empty());
        assert_eq!(source.dimensions(), ImageDimensions::new(4, 3, 1));
        assert_eq!(source.load(1).unwrap().metadata().source, "b");
        assert!(source.load(2).unwrap_err().contains("out of range"));
    }

    #[test]
    fn test_empty_source() {
        let source = VecSource::default();
        assert!(source.is_empty());
        assert_eq!(source.dimensions().pixel_count(), 0);
    }
}
