//! Per-channel rescaling to a common `[0, 1]` range.

use crate::frame::Frame;
use crate::math::sigma_clipped_median_mad;

const NORMALIZE_KAPPA: f32 = 3.0;
const NORMALIZE_ITERATIONS: usize = 5;

/// Rescale each channel of `frame` so its floor sits at 0 and the brightest
/// non-outlier sample at 1.
///
/// The channel minimum is subtracted first; the scale is the largest value that
/// survives 3-sigma clipping, so a few hot pixels do not compress the rest of
/// the range. Channels whose scale is not positive are only shifted.
pub fn normalize_frame(frame: &Frame) -> Frame {
    let channels = frame.channels();
    let mut pixels = frame.pixels().to_vec();

    let mut values = Vec::with_capacity(frame.dimensions().pixel_count());
    let mut scratch = Vec::new();

    for c in 0..channels {
        values.clear();
        values.extend(pixels.iter().skip(c).step_by(channels).copied());

        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        if !min.is_finite() {
            continue;
        }
        for v in values.iter_mut() {
            *v -= min;
        }

        let scale = clipped_max(&mut values, &mut scratch);
        let inv = if scale > 0.0 { 1.0 / scale } else { 1.0 };
        for v in pixels.iter_mut().skip(c).step_by(channels) {
            *v = (*v - min) * inv;
        }
    }

    frame.with_pixels(pixels)
}

/// Largest value within `NORMALIZE_KAPPA` sigma of the clipped median.
fn clipped_max(values: &mut Vec<f32>, scratch: &mut Vec<f32>) -> f32 {
    let mut work = values.clone();
    let (median, sigma) =
        sigma_clipped_median_mad(&mut work, scratch, NORMALIZE_KAPPA, NORMALIZE_ITERATIONS);
    let limit = median + NORMALIZE_KAPPA * sigma;
    values
        .iter()
        .copied()
        .filter(|&v| v <= limit)
        .fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use common::Buffer2;

    use super::*;
    use crate::frame::FrameMetadata;

    #[test]
    fn test_hot_pixel_ignored_for_scale() {
        let mut plane = Buffer2::from_fn(10, 10, |x, y| 100.0 + ((x + y) % 5) as f32);
        plane[(3, 3)] = 60000.0;
        let frame = Frame::from_plane(plane, FrameMetadata::default());

        let normalized = normalize_frame(&frame);
        let px = normalized.pixels();

        let min = px.iter().copied().fold(f32::INFINITY, f32::min);
        assert_eq!(min, 0.0);
        // Floor 100, clipped max 104: 104 maps to 1.
        assert!((normalized.channel(0)[(4, 0)] - 1.0).abs() < 1e-6);
        assert!(normalized.channel(0)[(3, 3)] > 1000.0);
    }

    #[test]
    fn test_channels_scaled_independently() {
        let r = Buffer2::from_fn(6, 6, |x, _| x as f32);
        let g = Buffer2::from_fn(6, 6, |x, _| 10.0 + 2.0 * x as f32);
        let frame = Frame::from_planes(&[r, g], FrameMetadata::with_source("pair"));

        let normalized = normalize_frame(&frame);
        assert_eq!(normalized.metadata().source, "pair");
        for c in 0..2 {
            let plane = normalized.channel(c);
            assert!(plane[(0, 0)].abs() < 1e-6);
            assert!((plane[(5, 0)] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_flat_channel_only_shifted() {
        let frame = Frame::from_plane(Buffer2::new_filled(4, 4, 7.0), FrameMetadata::default());
        let normalized = normalize_frame(&frame);
        assert!(normalized.pixels().iter().all(|&v| v == 0.0));
    }
}
