//! Sub-pixel sampling kernels.
//!
//! A sample is only produced when every tap with a non-zero weight lies inside
//! the source plane; anything else is reported as missing rather than
//! extrapolated from a border value.

use common::Buffer2;

use super::InterpolationMethod;

/// Bicubic kernel value (Catmull-Rom spline).
///
/// W(x) = (a+2)|x|^3 - (a+3)|x|^2 + 1       for |x| <= 1
/// W(x) = a|x|^3 - 5a|x|^2 + 8a|x| - 4a     for 1 < |x| < 2
/// W(x) = 0                                  otherwise
///
/// where a = -0.5 for Catmull-Rom spline
#[inline]
pub(crate) fn bicubic_kernel(x: f32) -> f32 {
    const A: f32 = -0.5;

    let abs_x = x.abs();

    if abs_x <= 1.0 {
        ((A + 2.0) * abs_x - (A + 3.0)) * abs_x * abs_x + 1.0
    } else if abs_x < 2.0 {
        ((A * abs_x - 5.0 * A) * abs_x + 8.0 * A) * abs_x - 4.0 * A
    } else {
        0.0
    }
}

/// Sample `plane` at `(x, y)`, `None` when the kernel support leaves the plane.
#[inline]
pub fn sample(plane: &Buffer2<f32>, x: f64, y: f64, method: InterpolationMethod) -> Option<f32> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    match method {
        InterpolationMethod::Nearest => sample_nearest(plane, x, y),
        InterpolationMethod::Bilinear => sample_bilinear(plane, x, y),
        InterpolationMethod::Bicubic => sample_bicubic(plane, x, y),
    }
}

#[inline]
fn in_bounds(plane: &Buffer2<f32>, x: i64, y: i64) -> bool {
    x >= 0 && y >= 0 && (x as usize) < plane.width() && (y as usize) < plane.height()
}

#[inline]
fn sample_nearest(plane: &Buffer2<f32>, x: f64, y: f64) -> Option<f32> {
    let ix = x.round() as i64;
    let iy = y.round() as i64;
    in_bounds(plane, ix, iy).then(|| plane[(ix as usize, iy as usize)])
}

#[inline]
fn sample_bilinear(plane: &Buffer2<f32>, x: f64, y: f64) -> Option<f32> {
    let x0f = x.floor();
    let y0f = y.floor();
    let fx = (x - x0f) as f32;
    let fy = (y - y0f) as f32;
    let x0 = x0f as i64;
    let y0 = y0f as i64;

    let wx = [1.0 - fx, fx];
    let wy = [1.0 - fy, fy];

    let mut sum = 0.0f32;
    for (j, &wyj) in wy.iter().enumerate() {
        if wyj == 0.0 {
            continue;
        }
        let py = y0 + j as i64;
        for (i, &wxi) in wx.iter().enumerate() {
            if wxi == 0.0 {
                continue;
            }
            let px = x0 + i as i64;
            if !in_bounds(plane, px, py) {
                return None;
            }
            sum += plane[(px as usize, py as usize)] * wxi * wyj;
        }
    }
    Some(sum)
}

fn sample_bicubic(plane: &Buffer2<f32>, x: f64, y: f64) -> Option<f32> {
    let x0f = x.floor();
    let y0f = y.floor();
    let fx = (x - x0f) as f32;
    let fy = (y - y0f) as f32;
    let x0 = x0f as i64;
    let y0 = y0f as i64;

    let wx = [
        bicubic_kernel(fx + 1.0),
        bicubic_kernel(fx),
        bicubic_kernel(fx - 1.0),
        bicubic_kernel(fx - 2.0),
    ];
    let wy = [
        bicubic_kernel(fy + 1.0),
        bicubic_kernel(fy),
        bicubic_kernel(fy - 1.0),
        bicubic_kernel(fy - 2.0),
    ];

    let mut sum = 0.0f32;
    for (j, &wyj) in wy.iter().enumerate() {
        if wyj == 0.0 {
            continue;
        }
        let py = y0 - 1 + j as i64;
        for (i, &wxi) in wx.iter().enumerate() {
            if wxi == 0.0 {
                continue;
            }
            let px = x0 - 1 + i as i64;
            if !in_bounds(plane, px, py) {
                return None;
            }
            sum += plane[(px as usize, py as usize)] * wxi * wyj;
        }
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize) -> Buffer2<f32> {
        Buffer2::from_fn(width, height, |x, y| x as f32 * 2.0 + y as f32 * 10.0)
    }

    #[test]
    fn test_bicubic_kernel_partition_of_unity() {
        for &f in &[0.0f32, 0.1, 0.25, 0.5, 0.9] {
            let sum = bicubic_kernel(f + 1.0)
                + bicubic_kernel(f)
                + bicubic_kernel(f - 1.0)
                + bicubic_kernel(f - 2.0);
            assert!((sum - 1.0).abs() < 1e-6, "f={f} sum={sum}");
        }
        assert_eq!(bicubic_kernel(0.0), 1.0);
        assert_eq!(bicubic_kernel(1.0), 0.0);
        assert_eq!(bicubic_kernel(2.5), 0.0);
    }

    #[test]
    fn test_integer_positions_exact() {
        let plane = ramp(8, 6);
        for method in [
            InterpolationMethod::Nearest,
            InterpolationMethod::Bilinear,
            InterpolationMethod::Bicubic,
        ] {
            assert_eq!(sample(&plane, 3.0, 2.0, method), Some(plane[(3, 2)]));
            // Corners need no neighbours at integer positions.
            assert_eq!(sample(&plane, 0.0, 0.0, method), Some(plane[(0, 0)]));
            assert_eq!(sample(&plane, 7.0, 5.0, method), Some(plane[(7, 5)]));
        }
    }

    #[test]
    fn test_linear_ramp_reproduced() {
        let plane = ramp(10, 10);
        let expected = 4.25 * 2.0 + 3.5 * 10.0;
        let bilinear = sample(&plane, 4.25, 3.5, InterpolationMethod::Bilinear).unwrap();
        let bicubic = sample(&plane, 4.25, 3.5, InterpolationMethod::Bicubic).unwrap();
        assert!((bilinear - expected).abs() < 1e-4);
        assert!((bicubic - expected).abs() < 1e-4);
    }

    #[test]
    fn test_support_outside_is_none() {
        let plane = ramp(10, 10);
        assert_eq!(sample(&plane, -0.6, 3.0, InterpolationMethod::Nearest), None);
        assert!(sample(&plane, -0.4, 3.0, InterpolationMethod::Nearest).is_some());

        assert!(sample(&plane, 8.5, 3.0, InterpolationMethod::Bilinear).is_some());
        assert_eq!(sample(&plane, 9.5, 3.0, InterpolationMethod::Bilinear), None);

        // Bicubic needs one extra tap on each side.
        assert_eq!(sample(&plane, 0.5, 3.0, InterpolationMethod::Bicubic), None);
        assert!(sample(&plane, 1.5, 3.0, InterpolationMethod::Bicubic).is_some());
        assert_eq!(sample(&plane, 8.5, 3.0, InterpolationMethod::Bicubic), None);
    }

    #[test]
    fn test_non_finite_coordinates() {
        let plane = ramp(4, 4);
        assert_eq!(sample(&plane, f64::NAN, 1.0, InterpolationMethod::Bilinear), None);
        assert_eq!(sample(&plane, 1.0, f64::INFINITY, InterpolationMethod::Bicubic), None);
    }
}
