//! Per-pixel combination of registered frames into one image.

mod rejection;


use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{FrameRole, FrameStack};
use crate::image::{Image, ImageError};
use crate::math::{mean_f32, median_f32_mut};
use crate::validation::{ValidationError, validate_images};

pub use rejection::{ClipCenter, SigmaClip};

/// Method for combining pixel values across frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    /// Simple average.
    #[default]
    Mean,
    /// Middle value; even counts average the two central values.
    Median,
    /// Mean of the values surviving sigma clipping.
    SigmaClippedMean(SigmaClip),
    /// Median of the values surviving sigma clipping.
    SigmaClippedMedian(SigmaClip),
}

impl CombineMethod {
    fn sigma_clip(&self) -> Option<&SigmaClip> {
        match self {
            CombineMethod::SigmaClippedMean(clip) | CombineMethod::SigmaClippedMedian(clip) => {
                Some(clip)
            }
            CombineMethod::Mean | CombineMethod::Median => None,
        }
    }

    pub fn validate(&self) -> Result<(), StackingError> {
        match self.sigma_clip() {
            Some(clip) if !clip.is_valid() => Err(StackingError::InvalidThreshold {
                threshold: clip.threshold,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Sigma clip threshold must be non-negative, got {threshold}")]
    InvalidThreshold { threshold: f32 },
}

/// Rejection totals for one combination.
#[derive(Debug, Default)]
struct ClipStats {
    total_values: AtomicU64,
    rejected_values: AtomicU64,
    pixels_with_rejection: AtomicU64,
    fallbacks: AtomicU64,
}

impl ClipStats {
    fn record(&self, total: usize, kept: usize) {
        self.total_values.fetch_add(total as u64, Ordering::Relaxed);
        let rejected = total - kept;
        if rejected > 0 {
            self.rejected_values
                .fetch_add(rejected as u64, Ordering::Relaxed);
            self.pixels_with_rejection.fetch_add(1, Ordering::Relaxed);
        }
        if kept == 0 && total > 0 {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn log_summary(&self, samples: usize) {
        let total = self.total_values.load(Ordering::Relaxed);
        if total == 0 {
            return;
        }
        let rejected = self.rejected_values.load(Ordering::Relaxed);
        let pixels_rejected = self.pixels_with_rejection.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);

        info!(
            "Sigma clipping: {:.2}% of values rejected ({} of {})",
            100.0 * rejected as f64 / total as f64,
            rejected,
            total
        );
        debug!(
            "  Samples with any rejection: {:.2}% ({} of {}), unclipped fallbacks: {}",
            100.0 * pixels_rejected as f64 / samples.max(1) as f64,
            pixels_rejected,
            samples,
            fallbacks
        );
    }
}

/// Combine every frame of `stack`.
pub fn combine(stack: &FrameStack, method: CombineMethod) -> Result<Image, StackingError> {
    let images: Vec<&Image> = stack.images().collect();
    combine_images(stack.role(), &images, method)
}

/// Combine `images` sample by sample into a new image; inputs are not modified.
///
/// Non-finite samples (such as NaN calibration sentinels) are left out of a
/// sample's combination. A sample with no finite value becomes NaN.
pub fn combine_images(
    role: FrameRole,
    images: &[&Image],
    method: CombineMethod,
) -> Result<Image, StackingError> {
    let dims = validate_images(role, images.iter().copied())?;
    method.validate()?;

    let mut out = Image::try_new(dims)?;
    let row_len = dims.row_len();
    let frame_count = images.len();
    let stats = ClipStats::default();

    if row_len > 0 {
        out.pixels_mut()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each_init(
                || (Vec::with_capacity(frame_count), Vec::with_capacity(frame_count)),
                |(values, scratch), (y, row)| {
                    let offset = y * row_len;
                    for (i, out) in row.iter_mut().enumerate() {
                        values.clear();
                        values.extend(
                            images
                                .iter()
                                .map(|img| img.pixels()[offset + i])
                                .filter(|v| v.is_finite()),
                        );
                        *out = combine_values(values, scratch, method, &stats);
                    }
                },
            );
    }

    if method.sigma_clip().is_some() {
        stats.log_summary(out.pixels().len());
    }
    info!(
        role = %role,
        frames = frame_count,
        method = %method,
        dimensions = %dims,
        "Combined stack"
    );
    Ok(out)
}

#[inline]
fn combine_values(
    values: &mut [f32],
    scratch: &mut Vec<f32>,
    method: CombineMethod,
    stats: &ClipStats,
) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }

    match method {
        CombineMethod::Mean => mean_f32(values),
        CombineMethod::Median => median_f32_mut(values),
        CombineMethod::SigmaClippedMean(clip) | CombineMethod::SigmaClippedMedian(clip) => {
            // Computed first: rejection reorders and overwrites `values`.
            let unclipped = mean_f32(values);
            let kept = clip.reject(values, scratch);
            stats.record(values.len(), kept);

            if kept == 0 {
                return unclipped;
            }
            let survivors = &mut values[..kept];
            match method {
                CombineMethod::SigmaClippedMedian(_) => median_f32_mut(survivors),
                _ => mean_f32(survivors),
            }
        }
    }
}
