//! Stacking configuration.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::config::{ConfigError, ensure_in_range, ensure_positive};

/// How samples of one pixel are combined across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CombineMethod {
    /// Weighted mean of every valid sample.
    Mean,
    /// Median per batch, batches averaged by sample count.
    Median,
    /// Weighted mean after iterative kappa-sigma rejection.
    #[default]
    SigmaClip,
}

impl CombineMethod {
    /// Whether the method can fold frames one by one or needs a batch of samples.
    pub fn mode(&self) -> AccumulationMode {
        match self {
            CombineMethod::Mean => AccumulationMode::Streaming,
            CombineMethod::Median | CombineMethod::SigmaClip => AccumulationMode::BatchBuffered,
        }
    }
}

/// Per-frame stacking weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Weighting {
    /// Every frame counts the same.
    #[default]
    Uniform,
    /// Frames are weighted by [`FrameQuality::weight`](super::FrameQuality::weight).
    Snr,
}

/// Memory behaviour of an accumulation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// Constant memory: each frame is folded into running sums and dropped.
    Streaming,
    /// The samples of the current batch are retained until `end_batch`.
    BatchBuffered,
}

/// Stacking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub method: CombineMethod,
    /// Rejection threshold in robust standard deviations.
    pub kappa: f32,
    /// Maximum clipping iterations per pixel.
    pub iterations: usize,
    pub weights: Weighting,
    /// Rescale every aligned frame to roughly `[0, 1]` before it is stacked.
    pub normalize: bool,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            method: CombineMethod::default(),
            kappa: 2.5,
            iterations: 5,
            weights: Weighting::default(),
            normalize: false,
        }
    }
}

impl StackConfig {
    pub fn mean() -> Self {
        Self {
            method: CombineMethod::Mean,
            ..Default::default()
        }
    }

    pub fn median() -> Self {
        Self {
            method: CombineMethod::Median,
            ..Default::default()
        }
    }

    pub fn sigma_clip(kappa: f32) -> Self {
        Self {
            method: CombineMethod::SigmaClip,
            kappa,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("stack.kappa", self.kappa as f64)?;
        ensure_in_range(
            "stack.iterations",
            self.iterations as f64,
            1.0,
            100.0,
            "in 1..=100",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes() {
        assert_eq!(CombineMethod::Mean.mode(), AccumulationMode::Streaming);
        assert_eq!(CombineMethod::Median.mode(), AccumulationMode::BatchBuffered);
        assert_eq!(CombineMethod::SigmaClip.mode(), AccumulationMode::BatchBuffered);
    }

    #[test]
    fn test_validation() {
        assert!(StackConfig::default().validate().is_ok());

        let err = StackConfig::sigma_clip(0.0).validate().unwrap_err();
        assert!(err.to_string().contains("stack.kappa"));

        let config = StackConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_method_names() {
        assert_eq!(CombineMethod::SigmaClip.to_string(), "sigmaclip");
        let method: CombineMethod = serde_yml::from_str("median").unwrap();
        assert_eq!(method, CombineMethod::Median);
        assert!(serde_yml::from_str::<CombineMethod>("winsorized").is_err());
    }
}
