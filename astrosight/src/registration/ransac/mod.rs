//! RANSAC (Random Sample Consensus) homography estimation.
//!
//! 1. Sample four correspondences with a seeded RNG
//! 2. Fit a homography by normalized DLT
//! 3. Count inliers within the reprojection threshold
//! 4. Refine promising hypotheses on their inliers (LO-RANSAC)
//! 5. Refit the best model on all of its inliers
//! 6. Drop inliers far above the typical residual and refit until stable

mod homography;

#[cfg(test)]
mod tests;

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

pub(crate) use homography::estimate_homography;
use homography::is_degenerate_sample;

use crate::registration::config::RansacConfig;
use crate::registration::result::{MIN_CORRESPONDENCES, RansacFailureReason, RegistrationError};
use crate::registration::transform::Homography;

/// Residual bound never drops below this when tightening the final inlier set, in pixels.
const TIGHTEN_MIN_RESIDUAL: f64 = 0.5;
/// Bound on the final inlier residuals as a multiple of their median.
const TIGHTEN_MEDIAN_FACTOR: f64 = 3.0;
const TIGHTEN_MAX_ROUNDS: usize = 5;

/// Result of RANSAC estimation.
#[derive(Debug, Clone)]
pub(crate) struct RansacResult {
    /// Maps source points onto destination points.
    pub homography: Homography,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    /// RMS reprojection error of the inliers in pixels.
    pub rms_error: f64,
}

/// Inlier set of a hypothesis, ordered by count and then by lower residual.
#[derive(Debug, Clone, Default)]
struct Consensus {
    inliers: Vec<usize>,
    sum_sq_error: f64,
}

impl Consensus {
    fn better_than(&self, other: &Consensus) -> bool {
        self.inliers.len() > other.inliers.len()
            || (self.inliers.len() == other.inliers.len()
                && self.sum_sq_error < other.sum_sq_error)
    }
}

pub(crate) struct RansacEstimator<'a> {
    config: &'a RansacConfig,
}

impl<'a> RansacEstimator<'a> {
    pub(crate) fn new(config: &'a RansacConfig) -> Self {
        Self { config }
    }

    /// Estimate the homography taking `src` onto `dst`.
    pub(crate) fn estimate(
        &self,
        src: &[DVec2],
        dst: &[DVec2],
    ) -> Result<RansacResult, RegistrationError> {
        debug_assert_eq!(src.len(), dst.len());
        let n = src.len();
        if n < MIN_CORRESPONDENCES {
            return Err(RegistrationError::InsufficientCorrespondence {
                found: n,
                required: MIN_CORRESPONDENCES,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut best: Option<(Homography, Consensus)> = None;
        let mut degenerate = 0;

        let mut sample_indices: Vec<usize> = Vec::with_capacity(MIN_CORRESPONDENCES);
        let mut sample_src: Vec<DVec2> = Vec::with_capacity(MIN_CORRESPONDENCES);
        let mut sample_dst: Vec<DVec2> = Vec::with_capacity(MIN_CORRESPONDENCES);

        let mut iterations = 0;
        let mut max_iter = self.config.max_iterations;

        while iterations < max_iter {
            iterations += 1;

            random_sample_into(&mut rng, n, MIN_CORRESPONDENCES, &mut sample_indices);
            sample_src.clear();
            sample_dst.clear();
            for &i in &sample_indices {
                sample_src.push(src[i]);
                sample_dst.push(dst[i]);
            }

            if is_degenerate_sample(&sample_src) || is_degenerate_sample(&sample_dst) {
                degenerate += 1;
                continue;
            }
            let Some(h) = estimate_homography(&sample_src, &sample_dst) else {
                degenerate += 1;
                continue;
            };

            let mut consensus = self.count_inliers(src, dst, &h);
            let mut current = h;
            if consensus.inliers.len() > MIN_CORRESPONDENCES {
                (current, consensus) = self.local_optimization(src, dst, current, consensus);
            }

            let improved = best
                .as_ref()
                .is_none_or(|(_, best_consensus)| consensus.better_than(best_consensus));
            if improved {
                let inlier_ratio = consensus.inliers.len() as f64 / n as f64;
                best = Some((current, consensus));

                if inlier_ratio >= self.config.min_inlier_ratio {
                    let adaptive =
                        adaptive_iterations(inlier_ratio, MIN_CORRESPONDENCES, self.config.confidence);
                    max_iter = max_iter.min(adaptive.max(1));
                }
            }
        }

        let Some((h, consensus)) = best else {
            let reason = if degenerate == iterations {
                RansacFailureReason::DegeneratePointSet
            } else {
                RansacFailureReason::NoInliersFound
            };
            return Err(RegistrationError::RansacFailed {
                reason,
                iterations,
                best_inlier_count: 0,
            });
        };

        // Four points always fit exactly, so beyond the minimum one extra inlier is required.
        let required = if n == MIN_CORRESPONDENCES {
            MIN_CORRESPONDENCES
        } else {
            MIN_CORRESPONDENCES + 1
        };
        if consensus.inliers.len() < required {
            return Err(RegistrationError::RansacFailed {
                reason: if consensus.inliers.is_empty() {
                    RansacFailureReason::NoInliersFound
                } else {
                    RansacFailureReason::InsufficientInliers
                },
                iterations,
                best_inlier_count: consensus.inliers.len(),
            });
        }

        // Final least-squares refit on every inlier.
        let (refined, final_consensus) = match self.refit(src, dst, &consensus.inliers) {
            Some((r, c)) if !consensus.better_than(&c) => (r, c),
            _ => (h, consensus),
        };

        let (refined, final_consensus) = self.tighten(src, dst, refined, final_consensus, required);

        let rms_error = if final_consensus.inliers.is_empty() {
            0.0
        } else {
            (final_consensus.sum_sq_error / final_consensus.inliers.len() as f64).sqrt()
        };

        Ok(RansacResult {
            homography: refined,
            inliers: final_consensus.inliers,
            iterations,
            rms_error,
        })
    }

    /// Repeatedly refit on the current inliers until the consensus stops improving.
    fn local_optimization(
        &self,
        src: &[DVec2],
        dst: &[DVec2],
        mut current: Homography,
        mut consensus: Consensus,
    ) -> (Homography, Consensus) {
        for _ in 0..self.config.lo_max_iterations {
            let Some((refined, refined_consensus)) = self.refit(src, dst, &consensus.inliers)
            else {
                break;
            };
            if !refined_consensus.better_than(&consensus) {
                break;
            }
            current = refined;
            consensus = refined_consensus;
        }
        (current, consensus)
    }

    /// Drop inliers whose residual is well above the median one, then refit.
    ///
    /// Matches between neighbouring corners land about a pixel off and still
    /// pass the RANSAC threshold; left in, they bend the least-squares fit.
    fn tighten(
        &self,
        src: &[DVec2],
        dst: &[DVec2],
        mut current: Homography,
        mut consensus: Consensus,
        min_inliers: usize,
    ) -> (Homography, Consensus) {
        let mut residuals: Vec<f64> = Vec::with_capacity(consensus.inliers.len());
        for _ in 0..TIGHTEN_MAX_ROUNDS {
            if consensus.inliers.is_empty() {
                break;
            }
            residuals.clear();
            residuals.extend(
                consensus
                    .inliers
                    .iter()
                    .map(|&i| current.apply(src[i]).distance(dst[i])),
            );
            let mut sorted = residuals.clone();
            let mid = sorted.len() / 2;
            let (_, median, _) = sorted.select_nth_unstable_by(mid, f64::total_cmp);
            let bound = (TIGHTEN_MEDIAN_FACTOR * *median)
                .max(TIGHTEN_MIN_RESIDUAL)
                .min(self.config.inlier_threshold);

            let kept: Vec<usize> = consensus
                .inliers
                .iter()
                .zip(&residuals)
                .filter(|&(_, &r)| r <= bound)
                .map(|(&i, _)| i)
                .collect();
            if kept.len() == consensus.inliers.len() || kept.len() < min_inliers {
                break;
            }

            let kept_src: Vec<DVec2> = kept.iter().map(|&i| src[i]).collect();
            let kept_dst: Vec<DVec2> = kept.iter().map(|&i| dst[i]).collect();
            let Some(refined) = estimate_homography(&kept_src, &kept_dst) else {
                break;
            };
            let sum_sq_error = kept
                .iter()
                .map(|&i| refined.apply(src[i]).distance_squared(dst[i]))
                .sum();
            current = refined;
            consensus = Consensus {
                inliers: kept,
                sum_sq_error,
            };
        }
        (current, consensus)
    }

    fn refit(
        &self,
        src: &[DVec2],
        dst: &[DVec2],
        inliers: &[usize],
    ) -> Option<(Homography, Consensus)> {
        if inliers.len() < MIN_CORRESPONDENCES {
            return None;
        }
        let inlier_src: Vec<DVec2> = inliers.iter().map(|&i| src[i]).collect();
        let inlier_dst: Vec<DVec2> = inliers.iter().map(|&i| dst[i]).collect();
        let h = estimate_homography(&inlier_src, &inlier_dst)?;
        let consensus = self.count_inliers(src, dst, &h);
        Some((h, consensus))
    }

    fn count_inliers(&self, src: &[DVec2], dst: &[DVec2], h: &Homography) -> Consensus {
        let threshold_sq = self.config.inlier_threshold * self.config.inlier_threshold;
        let mut consensus = Consensus::default();
        for (i, (s, d)) in src.iter().zip(dst).enumerate() {
            let err = h.apply(*s).distance_squared(*d);
            if err.is_finite() && err < threshold_sq {
                consensus.inliers.push(i);
                consensus.sum_sq_error += err;
            }
        }
        consensus
    }
}

/// Randomly sample k unique indices from 0..n into `buffer` (Floyd's algorithm).
fn random_sample_into<R: Rng>(rng: &mut R, n: usize, k: usize, buffer: &mut Vec<usize>) {
    debug_assert!(k <= n, "Cannot sample {} indices from {}", k, n);
    buffer.clear();
    for j in (n - k)..n {
        let t = rng.random_range(0..=j);
        if buffer.contains(&t) {
            buffer.push(j);
        } else {
            buffer.push(t);
        }
    }
}

/// Iterations needed to draw one all-inlier sample with the given confidence.
pub(crate) fn adaptive_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    // N = log(1 - confidence) / log(1 - w^n)
    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_conf = (1.0 - confidence).ln();
    let log_outlier = (1.0 - w_n).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }

    (log_conf / log_outlier).ceil() as usize
}
