//! Frames: decoded exposures handed to the engine by an external loader.

use common::Buffer2;
use serde::{Deserialize, Serialize};

/// Rec. 709 luma weights used to reduce color frames to a detection plane.
const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Temperatures closer than this are reported as one value in the stack metadata.
const TEMPERATURE_TOLERANCE: f64 = 1e-6;

/// Image dimensions: width, height and number of interleaved channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Spatial pixel count (`width * height`).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Total number of samples over all channels.
    #[inline]
    pub fn sample_count(&self) -> usize {
        self.pixel_count() * self.channels
    }

    #[inline]
    pub fn is_grayscale(&self) -> bool {
        self.channels == 1
    }

    /// Same width and height, regardless of channel count.
    #[inline]
    pub fn same_extent(&self, other: &ImageDimensions) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// Acquisition metadata carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Where the frame came from (file path, URI, or any caller-chosen label).
    pub source: String,
    /// Exposure time in seconds.
    pub exposure_time: Option<f64>,
    /// Sensor temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Acquisition time in seconds since the Unix epoch.
    pub timestamp: Option<f64>,
}

impl FrameMetadata {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Summarize the metadata of every folded frame.
    ///
    /// Exposure times add up; the temperature is kept only when every frame
    /// reports the same value; timestamps give the observation span.
    pub fn merge(frames: &[FrameMetadata]) -> StackMetadata {
        let total_exposure = frames.iter().filter_map(|m| m.exposure_time).sum();

        let temperatures: Vec<f64> = frames.iter().filter_map(|m| m.temperature).collect();
        let temperature = match temperatures.first() {
            Some(&first)
                if temperatures.len() == frames.len()
                    && temperatures
                        .iter()
                        .all(|t| (t - first).abs() <= TEMPERATURE_TOLERANCE) =>
            {
                Some(first)
            }
            _ => None,
        };

        let timestamps = frames.iter().filter_map(|m| m.timestamp);
        let first_timestamp = timestamps.clone().min_by(f64::total_cmp);
        let last_timestamp = timestamps.max_by(f64::total_cmp);

        StackMetadata {
            frame_count: frames.len(),
            total_exposure,
            temperature,
            first_timestamp,
            last_timestamp,
            sources: frames.iter().map(|m| m.source.clone()).collect(),
        }
    }
}

/// Metadata of a finished stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackMetadata {
    pub frame_count: usize,
    /// Sum of the exposure times that were known, in seconds.
    pub total_exposure: f64,
    /// Common sensor temperature, `None` when frames disagree or did not report one.
    pub temperature: Option<f64>,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
    pub sources: Vec<String>,
}

/// One decoded exposure. Never mutated by the engine.
///
/// Pixels are interleaved `f32` samples in row-major order
/// (`(y * width + x) * channels + c`).
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    dimensions: ImageDimensions,
    pixels: Vec<f32>,
    metadata: FrameMetadata,
}

impl Frame {
    /// # Panics
    /// Panics if `pixels.len()` does not match `dimensions` or there are no channels.
    pub fn new(dimensions: ImageDimensions, pixels: Vec<f32>, metadata: FrameMetadata) -> Self {
        assert!(dimensions.channels > 0, "frame must have at least one channel");
        assert_eq!(
            pixels.len(),
            dimensions.sample_count(),
            "pixel count does not match dimensions {}",
            dimensions
        );
        Self {
            dimensions,
            pixels,
            metadata,
        }
    }

    /// Single-channel frame from a plane.
    pub fn from_plane(plane: Buffer2<f32>, metadata: FrameMetadata) -> Self {
        let dimensions = ImageDimensions::new(plane.width(), plane.height(), 1);
        Self {
            dimensions,
            pixels: plane.into_vec(),
            metadata,
        }
    }

    /// Interleave same-sized planes into one frame.
    ///
    /// # Panics
    /// Panics if `planes` is empty or the planes differ in size.
    pub fn from_planes(planes: &[Buffer2<f32>], metadata: FrameMetadata) -> Self {
        assert!(!planes.is_empty(), "at least one plane is required");
        let (width, height) = (planes[0].width(), planes[0].height());
        assert!(
            planes
                .iter()
                .all(|p| p.width() == width && p.height() == height),
            "all planes must have the same size"
        );

        let channels = planes.len();
        let mut pixels = Vec::with_capacity(width * height * channels);
        for i in 0..width * height {
            pixels.extend(planes.iter().map(|p| p[i]));
        }
        Self::new(ImageDimensions::new(width, height, channels), pixels, metadata)
    }

    #[inline]
    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.dimensions.channels
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    /// Same metadata, new pixels of identical layout.
    pub(crate) fn with_pixels(&self, pixels: Vec<f32>) -> Frame {
        Frame::new(self.dimensions, pixels, self.metadata.clone())
    }

    /// Copy of channel `c` as a plane.
    ///
    /// # Panics
    /// Panics if `c` is out of range.
    pub fn channel(&self, c: usize) -> Buffer2<f32> {
        let channels = self.dimensions.channels;
        assert!(c < channels, "channel {} out of range ({} channels)", c, channels);
        let data = self.pixels.iter().skip(c).step_by(channels).copied().collect();
        Buffer2::new(self.dimensions.width, self.dimensions.height, data)
    }

    /// Detection plane: the frame itself for mono data, Rec. 709 luma for RGB,
    /// and the plain channel average for any other channel count.
    pub fn luminance(&self) -> Buffer2<f32> {
        let (width, height) = (self.dimensions.width, self.dimensions.height);
        let data = match self.dimensions.channels {
            1 => self.pixels.clone(),
            3 => self
                .pixels
                .chunks_exact(3)
                .map(|rgb| {
                    LUMA_WEIGHTS[0] * rgb[0] + LUMA_WEIGHTS[1] * rgb[1] + LUMA_WEIGHTS[2] * rgb[2]
                })
                .collect(),
            n => self
                .pixels
                .chunks_exact(n)
                .map(|px| px.iter().sum::<f32>() / n as f32)
                .collect(),
        };
        Buffer2::new(width, height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb_frame() -> Frame {
        // 2x1 RGB
        Frame::new(
            ImageDimensions::new(2, 1, 3),
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.5],
            FrameMetadata::with_source("rgb"),
        )
    }

    #[test]
    fn test_dimensions_counts() {
        let dims = ImageDimensions::new(4, 3, 3);
        assert_eq!(dims.pixel_count(), 12);
        assert_eq!(dims.sample_count(), 36);
        assert!(!dims.is_grayscale());
        assert_eq!(dims.to_string(), "4x3x3");
        assert!(dims.same_extent(&ImageDimensions::new(4, 3, 1)));
    }

    #[test]
    #[should_panic(expected = "pixel count does not match")]
    fn test_new_rejects_wrong_length() {
        Frame::new(
            ImageDimensions::new(2, 2, 1),
            vec![0.0; 3],
            FrameMetadata::default(),
        );
    }

    #[test]
    fn test_channel_extraction() {
        let frame = rgb_frame();
        assert_eq!(frame.channel(0).pixels(), &[1.0, 0.0]);
        assert_eq!(frame.channel(1).pixels(), &[0.0, 1.0]);
        assert_eq!(frame.channel(2).pixels(), &[0.0, 0.5]);
    }

    #[test]
    fn test_luminance_rec709() {
        let luma = rgb_frame().luminance();
        assert!((luma[0] - 0.2126).abs() < 1e-6);
        assert!((luma[1] - (0.7152 + 0.5 * 0.0722)).abs() < 1e-6);
    }

    #[test]
    fn test_luminance_mono_is_identity() {
        let plane = Buffer2::from_fn(3, 2, |x, y| (x + y) as f32);
        let frame = Frame::from_plane(plane.clone(), FrameMetadata::default());
        assert_eq!(frame.luminance(), plane);
    }

    #[test]
    fn test_from_planes_interleaves() {
        let r = Buffer2::new_filled(2, 2, 1.0);
        let g = Buffer2::new_filled(2, 2, 2.0);
        let frame = Frame::from_planes(&[r, g], FrameMetadata::default());
        assert_eq!(frame.channels(), 2);
        assert_eq!(&frame.pixels()[..4], &[1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_merge_metadata() {
        let frames = vec![
            FrameMetadata {
                source: "a".into(),
                exposure_time: Some(30.0),
                temperature: Some(-10.0),
                timestamp: Some(200.0),
            },
            FrameMetadata {
                source: "b".into(),
                exposure_time: Some(60.0),
                temperature: Some(-10.0),
                timestamp: Some(100.0),
            },
        ];
        let merged = FrameMetadata::merge(&frames);
        assert_eq!(merged.frame_count, 2);
        assert_eq!(merged.total_exposure, 90.0);
        assert_eq!(merged.temperature, Some(-10.0));
        assert_eq!(merged.first_timestamp, Some(100.0));
        assert_eq!(merged.last_timestamp, Some(200.0));
        assert_eq!(merged.sources, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_merge_drops_inconsistent_temperature() {
        let frames = vec![
            FrameMetadata {
                temperature: Some(-10.0),
                ..Default::default()
            },
            FrameMetadata {
                temperature: Some(-5.0),
                ..Default::default()
            },
        ];
        assert_eq!(FrameMetadata::merge(&frames).temperature, None);

        let partial = vec![
            FrameMetadata {
                temperature: Some(-10.0),
                ..Default::default()
            },
            FrameMetadata::default(),
        ];
        assert_eq!(FrameMetadata::merge(&partial).temperature, None);
    }

    #[test]
    fn test_merge_empty() {
        let merged = FrameMetadata::merge(&[]);
        assert_eq!(merged.frame_count, 0);
        assert_eq!(merged.total_exposure, 0.0);
        assert_eq!(merged.first_timestamp, None);
    }
}
