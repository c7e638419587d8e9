//! Resampling frames into reference coordinates.
//!
//! For every output pixel `p` the target frame is sampled at `T.apply(p)`, where
//! `T` is the reference → target transform found by registration. Pixels whose
//! kernel support falls outside the target are marked invalid in a mask that
//! travels with the aligned pixels.

mod crop;
mod interpolation;


use common::Buffer2;
use common::parallel::par_rows_mut2;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::ConfigError;
use crate::frame::{Frame, FrameMetadata, ImageDimensions};
use crate::registration::Transform;

pub use crop::{crop_to_valid, valid_bounds};
pub use interpolation::sample;

/// Identity transforms within this tolerance are copied instead of resampled.
const IDENTITY_EPSILON: f64 = 1e-12;

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor - fastest, blocky
    Nearest,
    /// Bilinear interpolation - 2x2 support
    Bilinear,
    /// Catmull-Rom bicubic - 4x4 support
    #[default]
    Bicubic,
}

impl InterpolationMethod {
    /// Taps on each side of the sample position.
    pub fn kernel_radius(&self) -> usize {
        match self {
            InterpolationMethod::Nearest => 0,
            InterpolationMethod::Bilinear => 1,
            InterpolationMethod::Bicubic => 2,
        }
    }
}

/// Which region the final stack is cropped to when `edge_crop` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CropMode {
    /// Region valid in every folded frame.
    #[default]
    Intersection,
    /// The reference frame's bounds; partially covered edges are kept.
    Reference,
}

/// Alignment parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub interpolation: InterpolationMethod,
    /// Crop the stack to the fully covered rectangle.
    pub edge_crop: bool,
    pub crop_mode: CropMode,
}

impl AlignConfig {
    /// Every combination of values is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// A frame resampled into reference coordinates.
#[derive(Debug, Clone)]
pub struct AlignedFrame {
    /// Position of the frame in the run's input order.
    pub index: usize,
    pub dimensions: ImageDimensions,
    /// Interleaved samples, same layout as [`Frame::pixels`]. Invalid pixels hold 0.
    pub pixels: Vec<f32>,
    /// `true` where every channel was sampled from inside the source frame.
    pub valid: Buffer2<bool>,
    pub transform: Transform,
    /// Stacking weight.
    pub weight: f32,
    pub metadata: FrameMetadata,
}

impl AlignedFrame {
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    #[inline]
    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.valid[(x, y)]
    }

    #[inline]
    pub fn sample(&self, x: usize, y: usize, c: usize) -> f32 {
        self.pixels[(y * self.dimensions.width + x) * self.dimensions.channels + c]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

/// Resample `input` into `output` through `transform`, filling `valid`.
///
/// Output pixel `(x, y)` takes the input value at `transform.apply((x, y))`.
///
/// # Panics
/// Panics if `output` and `valid` differ in size.
pub fn warp(
    input: &Buffer2<f32>,
    output: &mut Buffer2<f32>,
    valid: &mut Buffer2<bool>,
    transform: &Transform,
    method: InterpolationMethod,
) {
    par_rows_mut2(output, valid, |y, out_row, valid_row| {
        let row_start = transform.apply(DVec2::new(0.0, y as f64));
        let step = transform.apply(DVec2::new(1.0, y as f64)) - row_start;

        for (x, (out, ok)) in out_row.iter_mut().zip(valid_row.iter_mut()).enumerate() {
            let src = row_start + step * x as f64;
            match sample(input, src.x, src.y, method) {
                Some(v) => {
                    *out = v;
                    *ok = true;
                }
                None => {
                    *out = 0.0;
                    *ok = false;
                }
            }
        }
    });
}

/// Resample every channel of `frame` into reference coordinates.
///
/// The result has index 0 and weight 1; the caller sets both.
pub fn align(frame: &Frame, transform: &Transform, method: InterpolationMethod) -> AlignedFrame {
    let dimensions = frame.dimensions();
    let (width, height) = (dimensions.width, dimensions.height);

    if transform.is_identity(IDENTITY_EPSILON) {
        return AlignedFrame {
            index: 0,
            dimensions,
            pixels: frame.pixels().to_vec(),
            valid: Buffer2::new_filled(width, height, true),
            transform: *transform,
            weight: 1.0,
            metadata: frame.metadata().clone(),
        };
    }

    let channels = dimensions.channels;
    let mut valid = Buffer2::new_filled(width, height, false);
    let mut pixels = vec![0.0f32; dimensions.sample_count()];
    let mut warped = Buffer2::new_default(width, height);

    for c in 0..channels {
        let plane = frame.channel(c);
        // Geometry is identical per channel, so every pass writes the same mask.
        warp(&plane, &mut warped, &mut valid, transform, method);
        for (i, &v) in warped.iter().enumerate() {
            pixels[i * channels + c] = v;
        }
    }

    AlignedFrame {
        index: 0,
        dimensions,
        pixels,
        valid,
        transform: *transform,
        weight: 1.0,
        metadata: frame.metadata().clone(),
    }
}
