//! Master calibration frame synthesis.

use tracing::{debug, info};

use crate::calibration::CalibrationError;
use crate::frame::{FrameRole, FrameStack, SourceId};
use crate::image::Image;
use crate::validation::validate_stack;

/// Identifies the exact stack contents a master was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StackFingerprint {
    revision: u64,
    sources: Vec<SourceId>,
}

impl StackFingerprint {
    fn of(stack: &FrameStack) -> Self {
        Self {
            revision: stack.revision(),
            sources: stack.iter().map(|f| f.source().clone()).collect(),
        }
    }
}

/// A calibration reference combined from a stack of raw calibration exposures.
#[derive(Debug, Clone)]
pub struct MasterFrame {
    role: FrameRole,
    image: Image,
    fingerprint: StackFingerprint,
}

impl MasterFrame {
    pub fn role(&self) -> FrameRole {
        self.role
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Number of frames averaged into this master.
    pub fn frame_count(&self) -> usize {
        self.fingerprint.sources.len()
    }
}

/// Build a master as the per-pixel arithmetic mean of `stack`.
///
/// Inputs are not modified. Accumulation is in f64 so the result does not
/// depend on frame order beyond rounding of the final division.
pub fn synthesize_master(stack: &FrameStack) -> Result<MasterFrame, CalibrationError> {
    let role = stack.role();
    if !role.is_calibration() {
        return Err(CalibrationError::NotCalibrationRole { role });
    }

    let dims = validate_stack(stack)?;
    let mut image = Image::try_new(dims)?;
    let frames = stack.frames();
    let inv_count = 1.0 / frames.len() as f64;
    let row_len = dims.row_len();

    common::parallel::for_each_row_mut(image.pixels_mut(), row_len, |y, row| {
        let offset = y * row_len;
        for (i, out) in row.iter_mut().enumerate() {
            let sum: f64 = frames
                .iter()
                .map(|f| f.image().pixels()[offset + i] as f64)
                .sum();
            *out = (sum * inv_count) as f32;
        }
    });

    info!(
        role = %role,
        frames = frames.len(),
        dimensions = %dims,
        "Synthesized master frame"
    );

    Ok(MasterFrame {
        role,
        image,
        fingerprint: StackFingerprint::of(stack),
    })
}

/// Master frames for one run, at most one per calibration role.
///
/// A master is rebuilt only when its source stack changed since it was made.
#[derive(Debug, Default)]
pub struct MasterSet {
    masters: Vec<MasterFrame>,
}

impl MasterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: FrameRole) -> Option<&MasterFrame> {
        self.masters.iter().find(|m| m.role == role)
    }

    pub fn image(&self, role: FrameRole) -> Option<&Image> {
        self.get(role).map(MasterFrame::image)
    }

    pub fn len(&self) -> usize {
        self.masters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    /// Return the cached master for `stack`, synthesizing it if missing or stale.
    pub fn synthesize(&mut self, stack: &FrameStack) -> Result<&MasterFrame, CalibrationError> {
        let role = stack.role();
        let fingerprint = StackFingerprint::of(stack);

        let position = self.masters.iter().position(|m| m.role == role);
        if let Some(idx) = position {
            if self.masters[idx].fingerprint == fingerprint {
                debug!(role = %role, "Reusing cached master frame");
                return Ok(&self.masters[idx]);
            }
        }

        let master = synthesize_master(stack)?;
        let idx = match position {
            Some(idx) => {
                self.masters[idx] = master;
                idx
            }
            None => {
                self.masters.push(master);
                self.masters.len() - 1
            }
        };
        Ok(&self.masters[idx])
    }

    pub fn remove(&mut self, role: FrameRole) -> Option<MasterFrame> {
        let idx = self.masters.iter().position(|m| m.role == role)?;
        Some(self.masters.remove(idx))
    }
}
