//! Deterministic synthetic star fields.
//!
//! A [`StarField`] is a fixed set of stars in reference coordinates. Rendering it
//! through a [`Transform`] produces the frame a camera would record if the
//! reference → target mapping were that transform, so registration should
//! recover exactly the transform the frame was rendered with.
//!
//! ```rust,ignore
//! let field = StarField::generate(&StarFieldConfig::default());
//! let reference = field.frame(&Transform::identity(), 1, "ref");
//! let shifted = field.frame(&Transform::translation(DVec2::new(3.0, -2.0)), 2, "shifted");
//! ```

use common::Buffer2;
use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::frame::{Frame, FrameMetadata};
use crate::registration::Transform;

/// Star field generation parameters.
#[derive(Debug, Clone)]
pub struct StarFieldConfig {
    pub width: usize,
    pub height: usize,
    pub star_count: usize,
    /// Peak amplitude range above background. Keep the top below the
    /// detector's saturation limit.
    pub amplitude_range: (f32, f32),
    /// Gaussian PSF sigma in pixels.
    pub psf_sigma: f32,
    pub background: f32,
    pub noise_sigma: f32,
    /// Stars are not placed closer than this to the frame edge.
    pub margin: f64,
    /// Minimum separation between star centres.
    pub min_separation: f64,
    pub seed: u64,
}

impl Default for StarFieldConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            star_count: 40,
            amplitude_range: (0.15, 0.8),
            psf_sigma: 1.5,
            background: 0.1,
            noise_sigma: 0.005,
            margin: 24.0,
            min_separation: 12.0,
            seed: 42,
        }
    }
}

/// One synthetic star in reference coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticStar {
    pub position: DVec2,
    pub amplitude: f32,
}

/// A fixed star field that can be rendered through any transform.
#[derive(Debug, Clone)]
pub struct StarField {
    pub config: StarFieldConfig,
    /// Brightest first.
    pub stars: Vec<SyntheticStar>,
}

impl StarField {
    pub fn generate(config: &StarFieldConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let (lo, hi) = config.amplitude_range;
        let min_sep_sq = config.min_separation * config.min_separation;

        let mut stars: Vec<SyntheticStar> = Vec::with_capacity(config.star_count);
        let mut attempts = 0;
        while stars.len() < config.star_count && attempts < config.star_count * 200 {
            attempts += 1;
            let position = DVec2::new(
                rng.random_range(config.margin..config.width as f64 - config.margin),
                rng.random_range(config.margin..config.height as f64 - config.margin),
            );
            if stars
                .iter()
                .any(|s| s.position.distance_squared(position) < min_sep_sq)
            {
                continue;
            }
            stars.push(SyntheticStar {
                position,
                amplitude: rng.random_range(lo..hi),
            });
        }

        stars.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
        Self {
            config: config.clone(),
            stars,
        }
    }

    /// Star positions as seen through `transform`, brightest first.
    pub fn positions(&self, transform: &Transform) -> Vec<DVec2> {
        self.stars
            .iter()
            .map(|s| transform.apply(s.position))
            .collect()
    }

    /// Render the field seen through `transform` with noise drawn from `noise_seed`.
    pub fn render(&self, transform: &Transform, noise_seed: u64) -> Buffer2<f32> {
        let config = &self.config;
        let mut plane = Buffer2::new_filled(config.width, config.height, config.background);

        let sigma = config.psf_sigma as f64;
        let radius = (sigma * 4.0).ceil() as i64;
        let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);

        for star in &self.stars {
            let center = transform.apply(star.position);
            let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
            for y in (cy - radius)..=(cy + radius) {
                if y < 0 || y >= config.height as i64 {
                    continue;
                }
                for x in (cx - radius)..=(cx + radius) {
                    if x < 0 || x >= config.width as i64 {
                        continue;
                    }
                    let d = DVec2::new(x as f64, y as f64) - center;
                    let value = (-d.length_squared() * inv_two_sigma_sq).exp() as f32;
                    plane[(x as usize, y as usize)] += star.amplitude * value;
                }
            }
        }

        if config.noise_sigma > 0.0 {
            add_gaussian_noise(plane.pixels_mut(), config.noise_sigma, noise_seed);
        }
        plane
    }

    /// Single-channel frame of [`render`](Self::render) labelled `source`.
    pub fn frame(&self, transform: &Transform, noise_seed: u64, source: &str) -> Frame {
        Frame::from_plane(
            self.render(transform, noise_seed),
            FrameMetadata::with_source(source),
        )
    }

    /// RGB frame whose channels are the rendered plane scaled by `gains`.
    pub fn color_frame(
        &self,
        transform: &Transform,
        noise_seed: u64,
        gains: [f32; 3],
        source: &str,
    ) -> Frame {
        let plane = self.render(transform, noise_seed);
        let planes: Vec<Buffer2<f32>> = gains.iter().map(|&g| plane.map(|v| v * g)).collect();
        Frame::from_planes(&planes, FrameMetadata::with_source(source))
    }
}

/// Add zero-mean Gaussian noise (Box-Muller) to every sample.
pub fn add_gaussian_noise(pixels: &mut [f32], sigma: f32, seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for pair in pixels.chunks_mut(2) {
        let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.random();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        pair[0] += (r * theta.cos()) as f32 * sigma;
        if let Some(second) = pair.get_mut(1) {
            *second += (r * theta.sin()) as f32 * sigma;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::mean_and_std;

    #[test]
    fn test_generation_is_deterministic() {
        let config = StarFieldConfig::default();
        let a = StarField::generate(&config);
        let b = StarField::generate(&config);
        assert_eq!(a.stars, b.stars);
        assert_eq!(a.stars.len(), 40);
        assert!(a.stars.windows(2).all(|w| w[0].amplitude >= w[1].amplitude));
    }

    #[test]
    fn test_stars_respect_margin_and_separation() {
        let config = StarFieldConfig::default();
        let field = StarField::generate(&config);
        for (i, a) in field.stars.iter().enumerate() {
            assert!(a.position.x >= config.margin && a.position.y >= config.margin);
            for b in &field.stars[i + 1..] {
                assert!(a.position.distance(b.position) >= config.min_separation);
            }
        }
    }

    #[test]
    fn test_render_peaks_at_transformed_positions() {
        let config = StarFieldConfig {
            noise_sigma: 0.0,
            ..Default::default()
        };
        let field = StarField::generate(&config);
        let shift = Transform::translation(DVec2::new(5.0, -3.0));
        let plane = field.render(&shift, 0);

        let star = field.stars[0];
        let p = shift.apply(star.position);
        let peak = plane[(p.x.round() as usize, p.y.round() as usize)];
        assert!(peak > config.background + star.amplitude * 0.6);
    }

    #[test]
    fn test_noise_statistics() {
        let mut pixels = vec![0.0f32; 20_000];
        add_gaussian_noise(&mut pixels, 0.5, 7);
        let (mean, std) = mean_and_std(&pixels);
        assert!(mean.abs() < 0.02, "{mean}");
        assert!((std - 0.5).abs() < 0.02, "{std}");
    }
}
