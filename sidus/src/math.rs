//! Robust statistics: median, MAD, sigma-clipped estimates.

/// MAD (Median Absolute Deviation) to standard deviation conversion factor.
///
/// For a normal distribution, σ ≈ 1.4826 × MAD.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

/// Mean absolute deviation to standard deviation conversion factor (√(π/2)).
pub const MEAN_ABS_DEV_TO_SIGMA: f32 = 1.2533141;

#[inline]
pub fn mad_to_sigma(mad: f32) -> f32 {
    mad * MAD_TO_SIGMA
}

/// Median of `data`, reordering it (quickselect). NaN for an empty slice.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    let len = data.len();
    if len == 0 {
        return f32::NAN;
    }
    let mid = len / 2;

    let (left_part, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let right = *median;
    if len & 1 == 1 {
        right
    } else {
        let left = left_part
            .iter()
            .copied()
            .reduce(f32::max)
            .unwrap_or(right);
        (left + right) * 0.5
    }
}

/// MAD = median(|x_i - median|), computed in `scratch`.
pub fn mad_f32_with_scratch(values: &[f32], median: f32, scratch: &mut Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    scratch.clear();
    scratch.extend(values.iter().map(|&v| (v - median).abs()));
    median_f32_mut(scratch)
}

/// Robust standard deviation around `center`.
///
/// MAD-based; when more than half of the values coincide with `center` the MAD
/// collapses to zero, in which case the mean absolute deviation is used instead.
pub fn robust_sigma(values: &[f32], center: f32, scratch: &mut Vec<f32>) -> f32 {
    let sigma = mad_to_sigma(mad_f32_with_scratch(values, center, scratch));
    if sigma > f32::EPSILON * center.abs().max(1.0) {
        return sigma;
    }
    let mean_abs_dev =
        values.iter().map(|&v| (v - center).abs() as f64).sum::<f64>() / values.len().max(1) as f64;
    mean_abs_dev as f32 * MEAN_ABS_DEV_TO_SIGMA
}

/// Mean and population standard deviation, accumulated in f64.
pub fn mean_and_std(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}

/// Sigma-clipped median and MAD-based sigma.
///
/// Iteratively drops values further than `kappa × sigma` from the median. `values`
/// is reordered; `deviations` is scratch reused between calls.
/// Returns `(median, sigma)` of the surviving values.
pub fn sigma_clipped_median_mad(
    values: &mut [f32],
    deviations: &mut Vec<f32>,
    kappa: f32,
    iterations: usize,
) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let mut len = values.len();
    for _ in 0..iterations {
        if len < 3 {
            break;
        }
        let active = &mut values[..len];
        let median = median_f32_mut(active);
        let sigma = mad_to_sigma(mad_f32_with_scratch(active, median, deviations));
        if sigma < f32::EPSILON {
            return (median, 0.0);
        }

        let threshold = kappa * sigma;
        let mut write_idx = 0;
        for i in 0..len {
            if (values[i] - median).abs() <= threshold {
                values[write_idx] = values[i];
                write_idx += 1;
            }
        }
        if write_idx == len {
            return (median, sigma);
        }
        len = write_idx;
    }

    let active = &mut values[..len];
    let median = median_f32_mut(active);
    let sigma = mad_to_sigma(mad_f32_with_scratch(active, median, deviations));
    (median, sigma)
}

/// Welford's online mean/variance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Welford {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
}

impl Welford {
    #[inline]
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance, `None` with fewer than two samples.
    #[inline]
    pub fn variance(&self) -> Option<f64> {
        (self.count > 1).then(|| self.m2 / (self.count - 1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median_f32_mut(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_f32_mut(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_f32_mut(&mut [7.0]), 7.0);
        assert!(median_f32_mut(&mut []).is_nan());
    }

    #[test]
    fn test_mad() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        let mut scratch = Vec::new();
        // deviations from 3: [2, 1, 0, 1, 97] -> median 1
        assert_eq!(mad_f32_with_scratch(&values, 3.0, &mut scratch), 1.0);
    }

    #[test]
    fn test_robust_sigma_falls_back_when_mad_collapses() {
        // Three of five values equal the center: MAD = 0.
        let values = [10.0, 10.0, 10.0, 11.0, 9.0];
        let mut scratch = Vec::new();
        let sigma = robust_sigma(&values, 10.0, &mut scratch);
        let expected = (2.0 / 5.0) * MEAN_ABS_DEV_TO_SIGMA;
        assert!((sigma - expected).abs() < 1e-6, "sigma = {sigma}");
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
        assert_eq!(mean_and_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_sigma_clipped_median_rejects_outliers() {
        let mut values: Vec<f32> = (0..100).map(|i| 10.0 + (i % 5) as f32 * 0.1).collect();
        values.extend([1000.0, -500.0, 2000.0]);
        let mut scratch = Vec::new();
        let (median, sigma) = sigma_clipped_median_mad(&mut values, &mut scratch, 3.0, 5);
        assert!((median - 10.2).abs() < 0.05, "median = {median}");
        assert!(sigma < 0.5, "sigma = {sigma}");
    }

    #[test]
    fn test_sigma_clipped_constant_data() {
        let mut values = vec![5.0f32; 20];
        let mut scratch = Vec::new();
        assert_eq!(
            sigma_clipped_median_mad(&mut values, &mut scratch, 3.0, 5),
            (5.0, 0.0)
        );
    }

    #[test]
    fn test_welford_matches_two_pass() {
        let data = [1.0, 2.0, 4.0, 7.0, 11.0];
        let mut w = Welford::default();
        for &x in &data {
            w.push(x);
        }
        let mean = data.iter().sum::<f64>() / 5.0;
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 4.0;
        assert!((w.mean - mean).abs() < 1e-12);
        assert!((w.variance().unwrap() - var).abs() < 1e-12);

        let mut single = Welford::default();
        single.push(3.0);
        assert_eq!(single.variance(), None);
    }
}
