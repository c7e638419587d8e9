//! Background estimation for star detection.
//!
//! Estimates the sky background using a tiled approach with sigma-clipped
//! statistics, smooths the tile grid with a 3x3 median filter, then bilinearly
//! interpolates between tile centers to full-resolution maps.

use common::Buffer2;
use common::parallel::par_rows_mut2;
use rayon::prelude::*;

use crate::math::{median_f32_mut, sigma_clipped_median_mad};

/// Maximum samples per tile for statistics computation.
const MAX_TILE_SAMPLES: usize = 1024;

/// Sigma-clipping parameters for tile statistics.
const TILE_CLIP_KAPPA: f32 = 3.0;
const TILE_CLIP_ITERATIONS: usize = 3;

/// Per-pixel background and noise (sigma) estimates.
#[derive(Debug, Clone)]
pub struct BackgroundMap {
    pub background: Buffer2<f32>,
    pub noise: Buffer2<f32>,
    /// Median of the tile noise estimates; a single figure for the whole frame.
    pub global_noise: f32,
    /// Median of the tile background levels.
    pub global_background: f32,
}

impl BackgroundMap {
    #[inline]
    pub fn background_at(&self, x: usize, y: usize) -> f32 {
        self.background[(x, y)]
    }

    #[inline]
    pub fn noise_at(&self, x: usize, y: usize) -> f32 {
        self.noise[(x, y)]
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct TileStats {
    median: f32,
    sigma: f32,
}

/// Tile grid with precomputed centers for interpolation.
struct TileGrid {
    stats: Buffer2<TileStats>,
    centers_x: Vec<f32>,
    centers_y: Vec<f32>,
}

impl TileGrid {
    fn new(image: &Buffer2<f32>, tile_size: usize) -> Self {
        let width = image.width();
        let height = image.height();
        let tiles_x = width.div_ceil(tile_size).max(1);
        let tiles_y = height.div_ceil(tile_size).max(1);
        let max_tile_pixels = (tile_size * tile_size).min(MAX_TILE_SAMPLES * 4);

        let mut stats: Buffer2<TileStats> = Buffer2::new_default(tiles_x, tiles_y);
        stats.pixels_mut().par_iter_mut().enumerate().for_each_init(
            || {
                (
                    Vec::with_capacity(max_tile_pixels),
                    Vec::with_capacity(max_tile_pixels),
                )
            },
            |(values, deviations), (idx, out)| {
                let tx = idx % tiles_x;
                let ty = idx / tiles_x;
                let x_start = tx * tile_size;
                let y_start = ty * tile_size;
                let x_end = (x_start + tile_size).min(width);
                let y_end = (y_start + tile_size).min(height);

                *out = compute_tile_stats(image, x_start, x_end, y_start, y_end, values, deviations);
            },
        );

        let center = |i: usize, len: usize| {
            let start = i * tile_size;
            let end = (start + tile_size).min(len);
            (start + end) as f32 * 0.5
        };

        let mut grid = Self {
            stats,
            centers_x: (0..tiles_x).map(|tx| center(tx, width)).collect(),
            centers_y: (0..tiles_y).map(|ty| center(ty, height)).collect(),
        };
        grid.apply_median_filter();
        grid
    }

    #[inline]
    fn get(&self, tx: usize, ty: usize) -> TileStats {
        self.stats[(tx, ty)]
    }

    #[inline]
    fn tiles_x(&self) -> usize {
        self.stats.width()
    }

    #[inline]
    fn tiles_y(&self) -> usize {
        self.stats.height()
    }

    /// Replace every tile by the median of its 3x3 neighbourhood, suppressing tiles
    /// dominated by a bright star or nebulosity.
    fn apply_median_filter(&mut self) {
        let tiles_x = self.tiles_x();
        let tiles_y = self.tiles_y();
        if tiles_x < 3 || tiles_y < 3 {
            return;
        }

        let src = &self.stats;
        let filtered = Buffer2::from_fn(tiles_x, tiles_y, |tx, ty| {
            let mut medians = [0.0f32; 9];
            let mut sigmas = [0.0f32; 9];
            let mut count = 0;
            for ny in ty.saturating_sub(1)..(ty + 2).min(tiles_y) {
                for nx in tx.saturating_sub(1)..(tx + 2).min(tiles_x) {
                    let neighbor = src[(nx, ny)];
                    medians[count] = neighbor.median;
                    sigmas[count] = neighbor.sigma;
                    count += 1;
                }
            }
            TileStats {
                median: median_f32_mut(&mut medians[..count]),
                sigma: median_f32_mut(&mut sigmas[..count]),
            }
        });
        self.stats = filtered;
    }
}

/// Sigma-clipped median and MAD sigma of one tile, subsampled above `MAX_TILE_SAMPLES`.
fn compute_tile_stats(
    image: &Buffer2<f32>,
    x_start: usize,
    x_end: usize,
    y_start: usize,
    y_end: usize,
    values: &mut Vec<f32>,
    deviations: &mut Vec<f32>,
) -> TileStats {
    values.clear();

    let tile_pixels = (x_end - x_start) * (y_end - y_start);
    let stride = if tile_pixels <= MAX_TILE_SAMPLES {
        1
    } else {
        ((tile_pixels / MAX_TILE_SAMPLES) as f32).sqrt().ceil() as usize
    };

    for y in (y_start..y_end).step_by(stride) {
        let row = image.row(y);
        values.extend(row[x_start..x_end].iter().step_by(stride).copied());
    }

    if values.is_empty() {
        return TileStats::default();
    }

    let (median, sigma) =
        sigma_clipped_median_mad(values, deviations, TILE_CLIP_KAPPA, TILE_CLIP_ITERATIONS);
    TileStats { median, sigma }
}

/// Estimate background and noise maps using tiled sigma-clipped statistics.
///
/// Images smaller than one tile are treated as a single tile.
///
/// # Panics
/// Panics if `tile_size` is zero.
pub fn estimate_background(image: &Buffer2<f32>, tile_size: usize) -> BackgroundMap {
    assert!(tile_size > 0, "tile size must be positive");

    let grid = TileGrid::new(image, tile_size);

    let mut tile_medians: Vec<f32> = grid.stats.iter().map(|t| t.median).collect();
    let mut tile_sigmas: Vec<f32> = grid.stats.iter().map(|t| t.sigma).collect();
    let global_background = median_f32_mut(&mut tile_medians);
    let global_noise = median_f32_mut(&mut tile_sigmas);

    let mut background = Buffer2::new_default(image.width(), image.height());
    let mut noise = Buffer2::new_default(image.width(), image.height());
    par_rows_mut2(&mut background, &mut noise, |y, bg_row, noise_row| {
        interpolate_row(bg_row, noise_row, y, &grid);
    });

    BackgroundMap {
        background,
        noise,
        global_noise,
        global_background,
    }
}

/// Interpolate an entire row, one segment per pair of tile columns.
///
/// Within a segment the four corner tiles and the Y weight are constant, so
/// tile lookups are amortized across the segment's pixels.
fn interpolate_row(bg_row: &mut [f32], noise_row: &mut [f32], y: usize, grid: &TileGrid) {
    let fy = y as f32;
    let width = bg_row.len();
    let tiles_x = grid.tiles_x();

    let ty0 = find_lower_tile(fy, &grid.centers_y);
    let ty1 = (ty0 + 1).min(grid.tiles_y() - 1);
    let wy = if ty1 != ty0 {
        ((fy - grid.centers_y[ty0]) / (grid.centers_y[ty1] - grid.centers_y[ty0])).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let wy_inv = 1.0 - wy;

    let mut x = 0usize;
    for tx0 in 0..tiles_x {
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let segment_end = if tx0 + 1 < tiles_x {
            (grid.centers_x[tx0 + 1].floor() as usize).min(width)
        } else {
            width
        };
        if segment_end <= x {
            continue;
        }

        let t00 = grid.get(tx0, ty0);
        let t10 = grid.get(tx1, ty0);
        let t01 = grid.get(tx0, ty1);
        let t11 = grid.get(tx1, ty1);

        let left_bg = wy_inv * t00.median + wy * t01.median;
        let right_bg = wy_inv * t10.median + wy * t11.median;
        let left_noise = wy_inv * t00.sigma + wy * t01.sigma;
        let right_noise = wy_inv * t10.sigma + wy * t11.sigma;

        for px in x..segment_end {
            let wx = if tx1 != tx0 {
                ((px as f32 - grid.centers_x[tx0]) / (grid.centers_x[tx1] - grid.centers_x[tx0]))
                    .clamp(0.0, 1.0)
            } else {
                0.0
            };
            let wx_inv = 1.0 - wx;
            bg_row[px] = wx_inv * left_bg + wx * right_bg;
            noise_row[px] = wx_inv * left_noise + wx * right_noise;
        }

        x = segment_end;
        if x >= width {
            break;
        }
    }
}

/// Index of the last tile whose center is at or before `pos` (0 if none).
#[inline]
fn find_lower_tile(pos: f32, centers: &[f32]) -> usize {
    centers.iter().rposition(|&c| c <= pos).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image() {
        let image = Buffer2::new_filled(128, 96, 0.3f32);
        let map = estimate_background(&image, 32);
        assert!(map.background.iter().all(|&b| (b - 0.3).abs() < 1e-6));
        assert!(map.noise.iter().all(|&n| n.abs() < 1e-6));
        assert!((map.global_background - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_gradient_is_followed() {
        let image = Buffer2::from_fn(256, 64, |x, _| 0.1 + x as f32 * 0.001);
        let map = estimate_background(&image, 32);
        // Tile centers sit on the gradient, so interpolation reproduces it closely.
        for x in (32..224).step_by(16) {
            let expected = 0.1 + x as f32 * 0.001;
            let got = map.background_at(x, 32);
            assert!(
                (got - expected).abs() < 0.002,
                "x={x}: got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_bright_star_does_not_lift_background() {
        let mut image = Buffer2::new_filled(128, 128, 0.1f32);
        for y in 60..68 {
            for x in 60..68 {
                image[(x, y)] = 0.9;
            }
        }
        let map = estimate_background(&image, 32);
        assert!((map.background_at(64, 64) - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_image_smaller_than_tile() {
        let image = Buffer2::new_filled(10, 7, 0.25f32);
        let map = estimate_background(&image, 64);
        assert_eq!(map.background.width(), 10);
        assert_eq!(map.background.height(), 7);
        assert!((map.background_at(9, 6) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_find_lower_tile() {
        let centers = [16.0, 48.0, 80.0];
        assert_eq!(find_lower_tile(0.0, &centers), 0);
        assert_eq!(find_lower_tile(50.0, &centers), 1);
        assert_eq!(find_lower_tile(500.0, &centers), 2);
    }
}
