//! Combining aligned frames into one image.

mod accumulator;
mod clip_stats;
mod config;
mod normalize;
mod quality;


use common::{Buffer2, Rect};

use crate::frame::ImageDimensions;

pub use accumulator::Accumulator;
pub use clip_stats::ClipStats;
pub use config::{AccumulationMode, CombineMethod, StackConfig, Weighting};
pub use normalize::normalize_frame;
pub use quality::FrameQuality;

/// Value of output samples that no frame covered.
pub const NO_DATA: f32 = f32::NAN;

/// Result of stacking.
#[derive(Debug, Clone)]
pub struct StackedImage {
    pub dimensions: ImageDimensions,
    /// Interleaved samples; [`NO_DATA`] where coverage is zero.
    pub pixels: Vec<f32>,
    /// Number of frames that contributed to each pixel.
    pub coverage: Buffer2<u32>,
    /// Per-sample variance of the unclipped inputs (sigma-clip only).
    pub variance: Option<Vec<f32>>,
    /// Region of the full reference frame this image was cropped to.
    pub crop: Option<Rect>,
}

impl StackedImage {
    #[inline]
    pub fn sample(&self, x: usize, y: usize, c: usize) -> f32 {
        self.pixels[(y * self.dimensions.width + x) * self.dimensions.channels + c]
    }

    /// Copy of channel `c` as a plane.
    pub fn channel(&self, c: usize) -> Buffer2<f32> {
        let channels = self.dimensions.channels;
        let data = self.pixels.iter().skip(c).step_by(channels).copied().collect();
        Buffer2::new(self.dimensions.width, self.dimensions.height, data)
    }

    /// Pixels with zero coverage.
    pub fn no_data_count(&self) -> usize {
        self.coverage.iter().filter(|&&n| n == 0).count()
    }

    /// Restrict the image to `rect`, given in this image's coordinates.
    ///
    /// # Panics
    /// Panics if `rect` does not fit inside the image.
    pub fn cropped(&self, rect: Rect) -> StackedImage {
        let ImageDimensions {
            width, channels, ..
        } = self.dimensions;
        assert!(
            rect.right() <= width && rect.bottom() <= self.dimensions.height,
            "crop {rect:?} outside {}",
            self.dimensions
        );

        let crop_samples = |data: &[f32]| -> Vec<f32> {
            let mut out = Vec::with_capacity(rect.area() * channels);
            for y in rect.y..rect.bottom() {
                let start = (y * width + rect.x) * channels;
                out.extend_from_slice(&data[start..start + rect.width * channels]);
            }
            out
        };

        // Offsets compose with an earlier crop.
        let origin = self.crop.map_or((0, 0), |c| (c.x, c.y));
        StackedImage {
            dimensions: ImageDimensions::new(rect.width, rect.height, channels),
            pixels: crop_samples(&self.pixels),
            coverage: self.coverage.crop(rect),
            variance: self.variance.as_deref().map(crop_samples),
            crop: Some(Rect::new(
                origin.0 + rect.x,
                origin.1 + rect.y,
                rect.width,
                rect.height,
            )),
        }
    }
}
