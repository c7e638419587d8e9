//! Per-frame quality metrics and the weights derived from them.

use serde::Serialize;

use crate::frame::Frame;
use crate::math::mean_and_std;
use crate::star_detection::DetectionResult;

const MIN_SNR: f32 = 0.1;
const MIN_NOISE: f32 = 0.001;

/// Quality metrics of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameQuality {
    /// Mean of the analysis channel.
    pub mean: f32,
    /// Standard deviation of the analysis channel.
    pub std: f32,
    /// `mean / std`, 0 for a flat frame.
    pub snr: f32,
    pub star_count: usize,
    /// Average background-subtracted star flux.
    pub mean_star_flux: f32,
    /// Background noise reported by the detector.
    pub noise: f32,
}

impl FrameQuality {
    /// Measure `frame` given its detection result.
    ///
    /// Color frames are measured on the green channel, grayscale frames on their
    /// only channel.
    pub fn measure(frame: &Frame, detection: &DetectionResult) -> Self {
        let channel = if frame.channels() >= 3 { 1 } else { 0 };
        let plane = frame.channel(channel);
        let (mean, std) = mean_and_std(plane.pixels());

        let snr = if std > 0.0 { (mean / std) as f32 } else { 0.0 };
        let star_count = detection.stars.len();
        let mean_star_flux = if star_count > 0 {
            (detection.stars.iter().map(|s| s.flux as f64).sum::<f64>() / star_count as f64) as f32
        } else {
            0.0
        };

        Self {
            mean: mean as f32,
            std: std as f32,
            snr,
            star_count,
            mean_star_flux,
            noise: detection.noise_level,
        }
    }

    /// Stacking weight: higher SNR and lower noise weigh more.
    pub fn weight(&self) -> f32 {
        let snr_factor = self.snr.max(MIN_SNR);
        let noise_factor = 1.0 / self.noise.max(MIN_NOISE);
        snr_factor * noise_factor
    }

    /// Score used to pick the best reference frame.
    pub fn reference_score(&self) -> f32 {
        self.snr * self.star_count as f32
    }
}
