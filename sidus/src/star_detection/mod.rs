//! Star detection: background estimation, thresholding, connected components
//! and sub-pixel centroiding on a single image plane.
//!
//! # Algorithm
//!
//! 1. Optional Gaussian pre-blur of the detection plane
//! 2. Tiled sigma-clipped background and noise maps
//! 3. Threshold at `background + threshold_sigma * noise`
//! 4. 8-connected component labeling
//! 5. Size, edge and saturation filtering
//! 6. Weighted centroid, flux and shape per surviving component
//! 7. Sort by flux, brightest first

mod background;
mod blur;
mod centroid;
mod config;
mod labeling;


use common::Buffer2;
use glam::DVec2;
use rayon::prelude::*;

pub use background::{BackgroundMap, estimate_background};
pub use blur::gaussian_blur;
pub use centroid::measure_component;
pub use config::DetectionConfig;
pub use labeling::{Component, LabelMap, connected_components};

/// Lower bound on the noise used for thresholding, as a fraction of full scale.
/// Keeps noiseless (synthetic) data from thresholding every faint wing pixel.
const NOISE_FLOOR_FRACTION: f32 = 1e-3;

/// FWHM of a Gaussian in units of its sigma.
const FWHM_PER_SIGMA: f32 = 2.354_82;

/// A detected star with sub-pixel position and shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    /// X coordinate (sub-pixel accurate).
    pub x: f32,
    /// Y coordinate (sub-pixel accurate).
    pub y: f32,
    /// Total flux (sum of background-subtracted pixel values).
    pub flux: f32,
    /// Peak pixel value (for saturation detection).
    pub peak: f32,
    /// Number of pixels above threshold.
    pub area: usize,
    /// Principal-axis sigmas from second moments.
    pub sigma_major: f32,
    pub sigma_minor: f32,
    /// Eccentricity (0 = circular, 1 = elongated).
    pub eccentricity: f32,
    /// Signal-to-noise ratio.
    pub snr: f32,
}

impl Star {
    #[inline]
    pub fn position(&self) -> DVec2 {
        DVec2::new(self.x as f64, self.y as f64)
    }

    /// Geometric-mean FWHM of the principal axes.
    pub fn fwhm(&self) -> f32 {
        FWHM_PER_SIGMA * (self.sigma_major * self.sigma_minor).sqrt()
    }

    /// Peak at or above `limit` (absolute pixel value).
    #[inline]
    pub fn is_saturated(&self, limit: f32) -> bool {
        self.peak >= limit
    }
}

/// Counts of candidates dropped at each filtering stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub components: usize,
    pub rejected_size: usize,
    pub rejected_edge: usize,
    pub rejected_saturated: usize,
    pub rejected_measurement: usize,
}

/// Result of star detection.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Stars sorted by flux, brightest first.
    pub stars: Vec<Star>,
    /// Median background level of the plane.
    pub background_level: f32,
    /// Median background noise (sigma) of the plane.
    pub noise_level: f32,
    pub stats: DetectionStats,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn positions(&self) -> Vec<DVec2> {
        self.stars.iter().map(Star::position).collect()
    }
}

/// Star detector.
#[derive(Debug, Clone, Default)]
pub struct StarDetector {
    config: DetectionConfig,
}

impl StarDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect stars in a single plane. An empty result is not an error.
    pub fn detect(&self, image: &Buffer2<f32>) -> DetectionResult {
        let config = &self.config;
        let width = image.width();
        let height = image.height();

        let background = estimate_background(image, config.tile_size);

        // Threshold on the smoothed plane against its own background/noise maps.
        let smoothed;
        let smoothed_background;
        let (detect_plane, detect_background) = if config.blur_sigma > 0.0 {
            smoothed = gaussian_blur(image, config.blur_sigma);
            smoothed_background = estimate_background(&smoothed, config.tile_size);
            (&smoothed, &smoothed_background)
        } else {
            (image, &background)
        };

        let noise_floor = NOISE_FLOOR_FRACTION * config.full_scale;
        let mask = Buffer2::from_fn(width, height, |x, y| {
            let noise = detect_background.noise_at(x, y).max(noise_floor);
            detect_plane[(x, y)] > detect_background.background_at(x, y) + config.threshold_sigma * noise
        });

        let labels = connected_components(&mask);
        let components = labels.components();

        let mut stats = DetectionStats {
            components: components.len(),
            ..Default::default()
        };

        let candidates: Vec<&Component> = components
            .iter()
            .filter(|c| {
                if c.area < config.min_star_size || c.area > config.max_star_size {
                    stats.rejected_size += 1;
                    return false;
                }
                if !c.clear_of_edges(width, height, config.edge_margin) {
                    stats.rejected_edge += 1;
                    return false;
                }
                true
            })
            .collect();

        let measured: Vec<Option<Star>> = candidates
            .par_iter()
            .map(|c| measure_component(image, &background, &labels, c))
            .collect();

        let saturation = config.saturation_limit * config.full_scale;
        let mut stars = Vec::with_capacity(measured.len());
        for star in measured {
            match star {
                None => stats.rejected_measurement += 1,
                Some(s) if s.is_saturated(saturation) => stats.rejected_saturated += 1,
                Some(s) => stars.push(s),
            }
        }

        stars.sort_by(|a, b| {
            b.flux
                .total_cmp(&a.flux)
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });

        tracing::debug!(
            stars = stars.len(),
            components = stats.components,
            rejected_size = stats.rejected_size,
            rejected_edge = stats.rejected_edge,
            rejected_saturated = stats.rejected_saturated,
            "Star detection complete"
        );

        DetectionResult {
            stars,
            background_level: background.global_background,
            noise_level: background.global_noise,
            stats,
        }
    }
}
