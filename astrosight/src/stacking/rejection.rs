//! Sigma-clipping outlier rejection.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::math::{mad_f32_with_scratch, mad_to_sigma, mean_f32, median_f32_mut, std_dev_f32};

/// Center and spread estimate used by sigma clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClipCenter {
    /// Median with σ = 1.4826 × MAD. Not dragged by the outliers it is meant to reject.
    #[default]
    Median,
    /// Arithmetic mean with population standard deviation.
    Mean,
}

/// Configuration for sigma clipping.
///
/// A value v is rejected when |v − center| > `threshold` × σ. Clipping stops
/// after `max_iterations` passes or when a pass rejects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClip {
    pub threshold: f32,
    pub max_iterations: u32,
    pub center: ClipCenter,
}

impl Default for SigmaClip {
    fn default() -> Self {
        Self {
            threshold: 2.5,
            max_iterations: 1,
            center: ClipCenter::Median,
        }
    }
}

impl SigmaClip {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn with_center(mut self, center: ClipCenter) -> Self {
        self.center = center;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.threshold >= 0.0
    }

    /// Partition `values` by sigma clipping, returning the number of survivors.
    ///
    /// After return, `values[..remaining]` holds the surviving values in no
    /// particular order. Zero means every value was rejected.
    pub(crate) fn reject(&self, values: &mut [f32], scratch: &mut Vec<f32>) -> usize {
        let mut len = values.len();

        for _ in 0..self.max_iterations {
            if len == 0 {
                break;
            }

            let active = &mut values[..len];
            let (center, sigma) = match self.center {
                ClipCenter::Median => {
                    let median = median_f32_mut(active);
                    let mad = mad_f32_with_scratch(active, median, scratch);
                    (median, mad_to_sigma(mad))
                }
                ClipCenter::Mean => {
                    let mean = mean_f32(active);
                    (mean, std_dev_f32(active, mean))
                }
            };

            if sigma < f32::EPSILON {
                break;
            }

            let limit = self.threshold * sigma;
            let mut write_idx = 0;
            for read_idx in 0..len {
                let v = values[read_idx];
                if (v - center).abs() <= limit {
                    values[write_idx] = v;
                    write_idx += 1;
                }
            }

            if write_idx == len {
                break;
            }
            len = write_idx;
        }

        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(clip: SigmaClip, values: &[f32]) -> Vec<f32> {
        let mut values = values.to_vec();
        let mut scratch = Vec::new();
        let kept = clip.reject(&mut values, &mut scratch);
        let mut kept = values[..kept].to_vec();
        kept.sort_by(f32::total_cmp);
        kept
    }

    #[test]
    fn test_median_center_rejects_outlier() {
        let kept = reject(SigmaClip::new(2.0), &[10.0, 20.0, 30.0, 1000.0]);
        assert_eq!(kept, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_mean_center_keeps_outlier_at_two_sigma() {
        // mean 265, σ ≈ 424.4; 1000 is only 1.73σ out
        let clip = SigmaClip::new(2.0).with_center(ClipCenter::Mean);
        assert_eq!(reject(clip, &[10.0, 20.0, 30.0, 1000.0]).len(), 4);
    }

    #[test]
    fn test_infinite_threshold_keeps_everything() {
        let values = [1.0, 2.0, 3.0, 500.0, -40.0];
        for center in [ClipCenter::Median, ClipCenter::Mean] {
            let clip = SigmaClip::new(f32::INFINITY).with_center(center);
            assert_eq!(reject(clip, &values).len(), values.len());
        }
    }

    #[test]
    fn test_zero_sigma_skips_clipping() {
        let kept = reject(SigmaClip::new(0.1), &[5.0, 5.0, 5.0, 5.0]);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn test_everything_rejected() {
        let clip = SigmaClip::new(0.5).with_center(ClipCenter::Mean);
        assert!(reject(clip, &[0.0, 10.0]).is_empty());
    }

    #[test]
    fn test_iterations_peel_successive_outliers() {
        let values = [10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 12.0, 40.0];
        let clip = SigmaClip::new(2.0).with_center(ClipCenter::Mean);

        let once = reject(clip, &values);
        assert!(!once.contains(&40.0));
        assert!(once.contains(&12.0));

        let repeated = reject(clip.with_max_iterations(5), &values);
        assert_eq!(repeated, vec![10.0; 8]);
    }

    #[test]
    fn test_zero_iterations_is_unclipped() {
        let clip = SigmaClip::new(1.0).with_max_iterations(0);
        assert_eq!(reject(clip, &[1.0, 2.0, 300.0]).len(), 3);
    }
}
