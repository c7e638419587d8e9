//! Sub-pixel centroids and shape measurements for labeled components.

use common::Buffer2;

use super::Star;
use super::background::BackgroundMap;
use super::labeling::{Component, LabelMap};

/// Minimum stamp radius for centroid refinement.
const MIN_STAMP_RADIUS: usize = 3;

/// Maximum stamp radius for centroid refinement.
const MAX_STAMP_RADIUS: usize = 15;

/// Maximum iterations for centroid refinement.
const MAX_ITERATIONS: usize = 10;

/// Convergence threshold in pixels squared.
const CONVERGENCE_THRESHOLD_SQ: f32 = 0.001 * 0.001;

/// Gaussian weight sigma used while refining.
const WEIGHT_SIGMA: f32 = 2.0;

/// Stamp radius from the component footprint: about twice the equivalent-disc radius.
#[inline]
fn stamp_radius(area: usize) -> usize {
    let equivalent_radius = (area as f32 / std::f32::consts::PI).sqrt();
    ((equivalent_radius * 2.0).ceil() as usize).clamp(MIN_STAMP_RADIUS, MAX_STAMP_RADIUS)
}

#[inline]
fn stamp_fits(cx: f32, cy: f32, width: usize, height: usize, radius: usize) -> bool {
    let icx = cx.round() as isize;
    let icy = cy.round() as isize;
    let r = radius as isize;
    icx >= r && icy >= r && icx + r < width as isize && icy + r < height as isize
}

/// Measure one component on the unsmoothed image.
///
/// The initial centroid is the intensity-weighted first moment over the component's
/// pixels. It is then refined with a Gaussian-weighted centroid over a square stamp
/// until it converges; flux and second moments come from the same stamp. Components
/// with no positive signal return `None`.
pub fn measure_component(
    image: &Buffer2<f32>,
    background: &BackgroundMap,
    labels: &LabelMap,
    component: &Component,
) -> Option<Star> {
    let label_buf = labels.labels();

    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    let mut sum_w = 0.0f64;
    let mut peak = f32::MIN;

    for y in component.min_y..=component.max_y {
        for x in component.min_x..=component.max_x {
            if label_buf[(x, y)] != component.label {
                continue;
            }
            let raw = image[(x, y)];
            peak = peak.max(raw);
            let value = (raw - background.background_at(x, y)).max(0.0) as f64;
            sum_x += x as f64 * value;
            sum_y += y as f64 * value;
            sum_w += value;
        }
    }

    if sum_w <= f64::EPSILON {
        return None;
    }

    let mut cx = (sum_x / sum_w) as f32;
    let mut cy = (sum_y / sum_w) as f32;
    let radius = stamp_radius(component.area);

    if !stamp_fits(cx, cy, image.width(), image.height(), radius) {
        // Too close to the border for a stamp; keep the first-moment estimate.
        return Some(Star {
            x: cx,
            y: cy,
            flux: sum_w as f32,
            peak,
            area: component.area,
            sigma_major: 0.0,
            sigma_minor: 0.0,
            eccentricity: 0.0,
            snr: snr(sum_w as f32, background.noise_at(cx as usize, cy as usize), component.area),
        });
    }

    for _ in 0..MAX_ITERATIONS {
        let Some((new_cx, new_cy)) = refine_centroid(image, background, cx, cy, radius) else {
            break;
        };
        let dx = new_cx - cx;
        let dy = new_cy - cy;
        cx = new_cx;
        cy = new_cy;
        if dx * dx + dy * dy < CONVERGENCE_THRESHOLD_SQ {
            break;
        }
    }

    let moments = stamp_moments(image, background, cx, cy, radius)?;
    let noise = background.noise_at(cx.round() as usize, cy.round() as usize);

    Some(Star {
        x: cx,
        y: cy,
        flux: moments.flux,
        peak,
        area: component.area,
        sigma_major: moments.sigma_major,
        sigma_minor: moments.sigma_minor,
        eccentricity: moments.eccentricity,
        snr: snr(moments.flux, noise, moments.pixels),
    })
}

/// Aperture SNR with background noise only.
#[inline]
fn snr(flux: f32, noise: f32, pixels: usize) -> f32 {
    let noise_total = noise * (pixels.max(1) as f32).sqrt();
    if noise_total > f32::EPSILON {
        flux / noise_total
    } else {
        f32::INFINITY
    }
}

/// One Gaussian-weighted centroid step. `None` when the stamp leaves the image,
/// carries no signal, or the centroid jumps by more than a quarter stamp.
fn refine_centroid(
    image: &Buffer2<f32>,
    background: &BackgroundMap,
    cx: f32,
    cy: f32,
    radius: usize,
) -> Option<(f32, f32)> {
    if !stamp_fits(cx, cy, image.width(), image.height(), radius) {
        return None;
    }

    let icx = cx.round() as usize;
    let icy = cy.round() as usize;
    let two_sigma_sq = 2.0 * WEIGHT_SIGMA * WEIGHT_SIGMA;

    let mut sum_x = 0.0f32;
    let mut sum_y = 0.0f32;
    let mut sum_w = 0.0f32;
    for y in icy - radius..=icy + radius {
        for x in icx - radius..=icx + radius {
            let value = (image[(x, y)] - background.background_at(x, y)).max(0.0);
            let fx = x as f32 - cx;
            let fy = y as f32 - cy;
            let weight = value * (-(fx * fx + fy * fy) / two_sigma_sq).exp();
            sum_x += x as f32 * weight;
            sum_y += y as f32 * weight;
            sum_w += weight;
        }
    }

    if sum_w < f32::EPSILON {
        return None;
    }

    let new_cx = sum_x / sum_w;
    let new_cy = sum_y / sum_w;
    let max_move = (2 * radius + 1) as f32 / 4.0;
    if (new_cx - cx).abs() > max_move || (new_cy - cy).abs() > max_move {
        return None;
    }
    Some((new_cx, new_cy))
}

struct StampMoments {
    flux: f32,
    pixels: usize,
    sigma_major: f32,
    sigma_minor: f32,
    eccentricity: f32,
}

/// Flux and principal-axis sigmas from unweighted second moments in a circular aperture.
fn stamp_moments(
    image: &Buffer2<f32>,
    background: &BackgroundMap,
    cx: f32,
    cy: f32,
    radius: usize,
) -> Option<StampMoments> {
    let icx = cx.round() as usize;
    let icy = cy.round() as usize;
    let radius_sq = (radius * radius) as f32;

    let mut flux = 0.0f64;
    let mut pixels = 0usize;
    let (mut mxx, mut myy, mut mxy) = (0.0f64, 0.0f64, 0.0f64);
    for y in icy - radius..=icy + radius {
        for x in icx - radius..=icx + radius {
            let fx = x as f32 - cx;
            let fy = y as f32 - cy;
            if fx * fx + fy * fy > radius_sq {
                continue;
            }
            pixels += 1;
            let value = (image[(x, y)] - background.background_at(x, y)).max(0.0) as f64;
            flux += value;
            mxx += value * (fx * fx) as f64;
            myy += value * (fy * fy) as f64;
            mxy += value * (fx * fy) as f64;
        }
    }

    if flux <= f64::EPSILON {
        return None;
    }
    mxx /= flux;
    myy /= flux;
    mxy /= flux;

    // Eigenvalues of the 2x2 covariance matrix.
    let half_trace = (mxx + myy) * 0.5;
    let det_term = (((mxx - myy) * 0.5).powi(2) + mxy * mxy).sqrt();
    let lambda_major = (half_trace + det_term).max(0.0);
    let lambda_minor = (half_trace - det_term).max(0.0);

    let eccentricity = if lambda_major > f64::EPSILON {
        (1.0 - lambda_minor / lambda_major).max(0.0).sqrt()
    } else {
        0.0
    };

    Some(StampMoments {
        flux: flux as f32,
        pixels,
        sigma_major: lambda_major.sqrt() as f32,
        sigma_minor: lambda_minor.sqrt() as f32,
        eccentricity: eccentricity as f32,
    })
}
