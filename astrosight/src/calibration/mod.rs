//! Master frame synthesis and per-pixel calibration of science frames.

mod master;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::CancelToken;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Cancelled;
use crate::frame::{Frame, FrameRole, FrameStack, SourceId};
use crate::image::{Image, ImageDimensions, ImageError};
use crate::validation::ValidationError;

pub use master::{MasterFrame, MasterSet, synthesize_master};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Flat clamp minimum must be positive and finite, got {min}")]
    InvalidFlatClamp { min: f32 },

    #[error("Cannot build a master from {role} frames")]
    NotCalibrationRole { role: FrameRole },

    #[error("Master {role} is {actual}, other masters are {expected}")]
    MasterMismatch {
        role: FrameRole,
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Frame '{id}' is {actual}, masters are {expected}")]
    FrameMismatch {
        id: SourceId,
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Image is {actual}, masters are {expected}")]
    ImageMismatch {
        expected: ImageDimensions,
        actual: ImageDimensions,
    },

    #[error("Calibration cancelled")]
    Cancelled(#[from] Cancelled),
}

/// What to do where the flat-correction term is zero, negative, or not finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FlatDivisorPolicy {
    /// Divide by `min` wherever the term is below `min`.
    Clamp { min: f32 },
    /// Write NaN so downstream consumers can mask the pixel.
    Sentinel,
    /// Leave the dark-subtracted value undivided.
    Passthrough,
}

impl Default for FlatDivisorPolicy {
    fn default() -> Self {
        Self::Clamp { min: 1e-6 }
    }
}

impl FlatDivisorPolicy {
    /// A clamp minimum of zero or below would divide by zero or flip signs.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        match *self {
            FlatDivisorPolicy::Clamp { min } if !(min > 0.0 && min.is_finite()) => {
                Err(CalibrationError::InvalidFlatClamp { min })
            }
            _ => Ok(()),
        }
    }

    /// Divide `value` by `divisor` under this policy. The flag is set when the policy kicked in.
    #[inline]
    pub fn divide(self, value: f32, divisor: f32) -> (f32, bool) {
        match self {
            FlatDivisorPolicy::Clamp { min } => {
                if divisor >= min && divisor.is_finite() {
                    (value / divisor, false)
                } else {
                    (value / min, true)
                }
            }
            FlatDivisorPolicy::Sentinel | FlatDivisorPolicy::Passthrough
                if divisor > 0.0 && divisor.is_finite() =>
            {
                (value / divisor, false)
            }
            FlatDivisorPolicy::Sentinel => (f32::NAN, true),
            FlatDivisorPolicy::Passthrough => (value, true),
        }
    }
}

/// Read-only calibration references shared by all calibration workers.
///
/// The flat-correction term is derived once at construction:
/// flat − dark-flat, else flat − bias, else flat.
#[derive(Debug, Clone)]
pub struct CalibrationMasters {
    dark: Option<Image>,
    flat_divisor: Option<Image>,
    policy: FlatDivisorPolicy,
    dimensions: Option<ImageDimensions>,
}

impl CalibrationMasters {
    pub fn new(
        dark: Option<&Image>,
        flat: Option<&Image>,
        dark_flat: Option<&Image>,
        bias: Option<&Image>,
        policy: FlatDivisorPolicy,
    ) -> Result<Self, CalibrationError> {
        policy.validate()?;

        let mut dimensions: Option<ImageDimensions> = None;
        for (role, image) in [
            (FrameRole::Dark, dark),
            (FrameRole::Flat, flat),
            (FrameRole::DarkFlat, dark_flat),
            (FrameRole::Bias, bias),
        ] {
            let Some(image) = image else { continue };
            match dimensions {
                None => dimensions = Some(image.dimensions()),
                Some(expected) if expected != image.dimensions() => {
                    return Err(CalibrationError::MasterMismatch {
                        role,
                        expected,
                        actual: image.dimensions(),
                    });
                }
                Some(_) => {}
            }
        }

        let flat_divisor = match flat {
            Some(flat) => {
                let offset = dark_flat.or(bias);
                let mut divisor = flat.clone();
                if let Some(offset) = offset {
                    for (d, &o) in divisor.pixels_mut().iter_mut().zip(offset.pixels()) {
                        *d -= o;
                    }
                }
                Some(divisor)
            }
            None => None,
        };

        Ok(Self {
            dark: dark.cloned(),
            flat_divisor,
            policy,
            dimensions,
        })
    }

    /// Use whichever masters `set` holds.
    pub fn from_set(set: &MasterSet, policy: FlatDivisorPolicy) -> Result<Self, CalibrationError> {
        Self::new(
            set.image(FrameRole::Dark),
            set.image(FrameRole::Flat),
            set.image(FrameRole::DarkFlat),
            set.image(FrameRole::Bias),
            policy,
        )
    }

    /// True when calibration would leave frames unchanged.
    pub fn is_empty(&self) -> bool {
        self.dark.is_none() && self.flat_divisor.is_none()
    }

    pub fn dimensions(&self) -> Option<ImageDimensions> {
        self.dimensions
    }

    pub fn policy(&self) -> FlatDivisorPolicy {
        self.policy
    }

    /// Calibrate a frame in place. Already-calibrated frames are left untouched.
    ///
    /// Returns the number of pixels where the divisor policy applied,
    /// or `None` when the frame was skipped.
    pub fn calibrate(&self, frame: &mut Frame) -> Result<Option<usize>, CalibrationError> {
        if frame.is_calibrated() {
            debug!(frame = %frame.source(), "Frame already calibrated, skipping");
            return Ok(None);
        }

        if let Some(expected) = self.dimensions {
            if expected != frame.dimensions() {
                return Err(CalibrationError::FrameMismatch {
                    id: frame.source().clone(),
                    expected,
                    actual: frame.dimensions(),
                });
            }
        }

        let clamped = self.apply(frame.image_mut());
        frame.mark_calibrated();
        Ok(Some(clamped))
    }

    /// Subtract the dark and divide by the flat term. No idempotency tracking.
    pub fn calibrate_image(&self, image: &mut Image) -> Result<usize, CalibrationError> {
        if let Some(expected) = self.dimensions {
            if expected != image.dimensions() {
                return Err(CalibrationError::ImageMismatch {
                    expected,
                    actual: image.dimensions(),
                });
            }
        }
        Ok(self.apply(image))
    }

    fn apply(&self, image: &mut Image) -> usize {
        if self.is_empty() || !image.is_allocated() {
            return 0;
        }

        let dark = self.dark.as_ref().map(Image::pixels);
        let divisor = self.flat_divisor.as_ref().map(Image::pixels);
        let policy = self.policy;
        let row_len = image.dimensions().row_len();
        let flagged = AtomicUsize::new(0);

        common::parallel::for_each_row_mut(image.pixels_mut(), row_len, |y, row| {
            let offset = y * row_len;
            let mut local_flagged = 0usize;
            for (i, v) in row.iter_mut().enumerate() {
                let mut value = *v;
                if let Some(dark) = dark {
                    value -= dark[offset + i];
                }
                if let Some(divisor) = divisor {
                    let (out, hit) = policy.divide(value, divisor[offset + i]);
                    value = out;
                    local_flagged += hit as usize;
                }
                *v = value;
            }
            flagged.fetch_add(local_flagged, Ordering::Relaxed);
        });

        flagged.into_inner()
    }
}

/// Totals from calibrating one stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationSummary {
    pub calibrated: usize,
    pub skipped: usize,
    /// Pixels where the flat divisor policy applied, summed over frames.
    pub flagged_pixels: usize,
}

/// Calibrate every frame of `stack` in parallel.
///
/// `cancel` is checked before each frame. Frames finished before cancellation
/// stay calibrated (and are skipped next time); no frame is left half-written.
pub fn calibrate_stack(
    masters: &CalibrationMasters,
    stack: &mut FrameStack,
    cancel: &CancelToken,
) -> Result<CalibrationSummary, CalibrationError> {
    let role = stack.role();
    let outcomes: Vec<Option<Option<usize>>> = stack
        .frames_mut()
        .par_iter_mut()
        .map(|frame| {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            masters.calibrate(frame).map(Some)
        })
        .collect::<Result<_, _>>()?;

    let mut summary = CalibrationSummary::default();
    let mut cancelled = false;
    for outcome in outcomes {
        match outcome {
            None => cancelled = true,
            Some(None) => summary.skipped += 1,
            Some(Some(flagged)) => {
                summary.calibrated += 1;
                summary.flagged_pixels += flagged;
            }
        }
    }

    if cancelled {
        warn!(
            role = %role,
            calibrated = summary.calibrated,
            "Calibration cancelled"
        );
        return Err(Cancelled.into());
    }

    if summary.flagged_pixels > 0 {
        warn!(
            role = %role,
            pixels = summary.flagged_pixels,
            policy = ?masters.policy(),
            "Non-positive flat correction values handled by policy"
        );
    }

    info!(
        role = %role,
        calibrated = summary.calibrated,
        skipped = summary.skipped,
        "Calibrated stack"
    );

    Ok(summary)
}
