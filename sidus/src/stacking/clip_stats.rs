use std::sync::atomic::{AtomicU64, Ordering};

/// Rejection counters shared by the worker threads of one run.
#[derive(Debug, Default)]
pub struct ClipStats {
    /// Valid samples seen by the clipper.
    total_values: AtomicU64,
    /// Samples rejected as outliers.
    clipped_values: AtomicU64,
    /// Pixel channels where anything was rejected.
    pixels_with_clipping: AtomicU64,
    /// Pixel channels that lost more than half of their samples.
    pixels_excessive_clipping: AtomicU64,
}

impl ClipStats {
    pub fn record(&self, original_len: usize, final_len: usize) {
        let clipped = original_len - final_len;
        self.total_values
            .fetch_add(original_len as u64, Ordering::Relaxed);
        self.clipped_values
            .fetch_add(clipped as u64, Ordering::Relaxed);
        if clipped > 0 {
            self.pixels_with_clipping.fetch_add(1, Ordering::Relaxed);
        }
        if clipped > original_len / 2 {
            self.pixels_excessive_clipping
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn total_values(&self) -> u64 {
        self.total_values.load(Ordering::Relaxed)
    }

    pub fn clipped_values(&self) -> u64 {
        self.clipped_values.load(Ordering::Relaxed)
    }

    /// Percentage of samples rejected so far.
    pub fn clip_percent(&self) -> f64 {
        let total = self.total_values();
        if total == 0 {
            return 0.0;
        }
        100.0 * self.clipped_values() as f64 / total as f64
    }

    pub fn log_summary(&self, frame_count: usize) {
        let total = self.total_values();
        if total == 0 || frame_count == 0 {
            return;
        }
        let clipped = self.clipped_values();
        let pixels_clipped = self.pixels_with_clipping.load(Ordering::Relaxed);
        let excessive = self.pixels_excessive_clipping.load(Ordering::Relaxed);

        let pixel_count = (total / frame_count as u64).max(1);
        let clip_percent = self.clip_percent();
        let pixels_clipped_percent = 100.0 * pixels_clipped as f64 / pixel_count as f64;

        tracing::info!(
            "Sigma clipping stats: {:.2}% of values clipped ({} of {})",
            clip_percent,
            clipped,
            total
        );
        tracing::info!(
            "  Pixels with any clipping: {:.2}% ({} of ~{})",
            pixels_clipped_percent,
            pixels_clipped,
            pixel_count
        );

        if clip_percent > 20.0 {
            tracing::warn!(
                "  High rejection rate ({:.1}%) - kappa may be too low for this data",
                clip_percent
            );
        }
        if excessive > 0 {
            tracing::warn!(
                "  Pixels with excessive clipping (>50%): {} - consider raising kappa",
                excessive
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts() {
        let stats = ClipStats::default();
        stats.record(10, 10);
        stats.record(10, 9);
        stats.record(4, 1);

        assert_eq!(stats.total_values(), 24);
        assert_eq!(stats.clipped_values(), 4);
        assert_eq!(stats.pixels_with_clipping.load(Ordering::Relaxed), 2);
        assert_eq!(stats.pixels_excessive_clipping.load(Ordering::Relaxed), 1);
        assert!((stats.clip_percent() - 100.0 * 4.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_is_silent() {
        let stats = ClipStats::default();
        assert_eq!(stats.clip_percent(), 0.0);
        stats.log_summary(0);
        stats.log_summary(5);
    }
}
