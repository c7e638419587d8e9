//! Separable Gaussian smoothing applied before thresholding.

use common::Buffer2;
use common::parallel::par_rows_mut;

/// Normalized 1-D Gaussian kernel with radius `ceil(3 * sigma)`.
pub(crate) fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-d * d / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Gaussian blur with edge clamping. `sigma <= 0` returns a copy.
pub fn gaussian_blur(image: &Buffer2<f32>, sigma: f32) -> Buffer2<f32> {
    if sigma <= 0.0 || image.is_empty() {
        return image.clone();
    }

    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let width = image.width();
    let height = image.height();

    // Horizontal pass
    let mut horizontal: Buffer2<f32> = Buffer2::new_default(width, height);
    par_rows_mut(&mut horizontal, |y, out| {
        let src = image.row(y);
        for (x, o) in out.iter_mut().enumerate() {
            *o = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let sx = (x + k).saturating_sub(radius).min(width - 1);
                    w * src[sx]
                })
                .sum();
        }
    });

    // Vertical pass
    let mut output: Buffer2<f32> = Buffer2::new_default(width, height);
    par_rows_mut(&mut output, |y, out| {
        out.fill(0.0);
        for (k, w) in kernel.iter().enumerate() {
            let sy = (y + k).saturating_sub(radius).min(height - 1);
            for (o, &v) in out.iter_mut().zip(horizontal.row(sy)) {
                *o += w * v;
            }
        }
    });

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_normalized_and_symmetric() {
        let kernel = gaussian_kernel(1.0);
        assert_eq!(kernel.len(), 7);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for i in 0..3 {
            assert!((kernel[i] - kernel[6 - i]).abs() < 1e-7);
        }
        assert!(kernel[3] > kernel[2]);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let image = Buffer2::new_filled(20, 15, 0.4f32);
        let blurred = gaussian_blur(&image, 1.5);
        assert!(blurred.iter().all(|&v| (v - 0.4).abs() < 1e-5));
    }

    #[test]
    fn test_blur_spreads_point_and_keeps_flux() {
        let mut image = Buffer2::new_filled(21, 21, 0.0f32);
        image[(10, 10)] = 1.0;
        let blurred = gaussian_blur(&image, 1.0);

        let total: f32 = blurred.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(blurred[(10, 10)] < 1.0);
        assert!(blurred[(11, 10)] > 0.0);
        assert!((blurred[(11, 10)] - blurred[(10, 11)]).abs() < 1e-7);
    }

    #[test]
    fn test_zero_sigma_is_copy() {
        let image = Buffer2::from_fn(5, 5, |x, y| (x * y) as f32);
        assert_eq!(gaussian_blur(&image, 0.0), image);
    }
}
