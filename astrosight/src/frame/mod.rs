//! Frames, their roles, and ordered per-role stacks.


use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use thiserror::Error;

use crate::image::{Image, ImageDimensions};
use crate::registration::Keypoint;

/// Color plane captured through a filter in split-channel (monochrome) mode.
///
/// Declaration order is the automatic reference preference order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ColorChannel {
    Blue,
    Green,
    Red,
}

/// Semantic role of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    /// Science exposure of the target (one-shot-color or unfiltered).
    Light,
    /// Thermal signal at the light exposure time.
    Dark,
    /// Optical non-uniformity reference.
    Flat,
    /// Dark taken at the flat exposure time.
    DarkFlat,
    /// Zero-length readout offset.
    Bias,
    /// Science exposure through one color filter.
    Channel(ColorChannel),
}

impl FrameRole {
    pub const CALIBRATION: [FrameRole; 4] = [
        FrameRole::Dark,
        FrameRole::Flat,
        FrameRole::DarkFlat,
        FrameRole::Bias,
    ];

    pub fn is_calibration(&self) -> bool {
        matches!(
            self,
            FrameRole::Dark | FrameRole::Flat | FrameRole::DarkFlat | FrameRole::Bias
        )
    }

    pub fn is_science(&self) -> bool {
        matches!(self, FrameRole::Light | FrameRole::Channel(_))
    }
}

impl std::fmt::Display for FrameRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameRole::Light => write!(f, "light"),
            FrameRole::Dark => write!(f, "dark"),
            FrameRole::Flat => write!(f, "flat"),
            FrameRole::DarkFlat => write!(f, "dark-flat"),
            FrameRole::Bias => write!(f, "bias"),
            FrameRole::Channel(channel) => write!(f, "channel-{channel}"),
        }
    }
}

/// Identity of the source a frame was loaded from (path, URI, or any caller key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Capture metadata reported by the loader. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provenance {
    /// Capture timestamp as reported by the device.
    pub capture_time: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub iso: Option<u32>,
    /// Exposure time in seconds.
    pub shutter_speed: Option<f64>,
    /// f-number.
    pub aperture: Option<f64>,
    /// Focal length in millimeters.
    pub focal_length: Option<f64>,
}

/// One exposure plus its processing state.
#[derive(Debug, Clone)]
pub struct Frame {
    source: SourceId,
    image: Image,
    provenance: Provenance,
    calibrated: bool,
    keypoints: Option<Vec<Keypoint>>,
    registered: bool,
}

impl Frame {
    pub fn new(source: impl Into<SourceId>, image: Image) -> Self {
        Self {
            source: source.into(),
            image,
            provenance: Provenance::default(),
            calibrated: false,
            keypoints: None,
            registered: false,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.image.dimensions()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn keypoints(&self) -> Option<&[Keypoint]> {
        self.keypoints.as_deref()
    }

    /// Replace the pixel data (e.g. the source was reloaded). All processing state is reset.
    pub fn replace_image(&mut self, image: Image) {
        self.image = image;
        self.calibrated = false;
        self.invalidate_registration();
    }

    /// Forget keypoints and the registered flag so the next registration pass redoes this frame.
    pub fn invalidate_registration(&mut self) {
        self.keypoints = None;
        self.registered = false;
    }

    pub(crate) fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }

    pub(crate) fn mark_calibrated(&mut self) {
        self.calibrated = true;
    }

    /// Swap in a derived image of the same scene (demosaiced). Calibration state is kept.
    pub(crate) fn set_derived_image(&mut self, image: Image) {
        self.image = image;
        self.invalidate_registration();
    }

    pub(crate) fn set_keypoints(&mut self, keypoints: Vec<Keypoint>) {
        self.keypoints = Some(keypoints);
    }

    /// Store the image resampled into reference space. Keypoints from the
    /// pre-warp image are kept so a repeated pass can skip this frame.
    pub(crate) fn set_registered(&mut self, warped: Option<Image>) {
        if let Some(image) = warped {
            self.image = image;
        }
        self.registered = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Duplicate {role} source '{id}'")]
    DuplicateSource { role: FrameRole, id: SourceId },

    #[error("No {role} frame from source '{id}'")]
    UnknownSource { role: FrameRole, id: SourceId },
}

/// Ordered frames of one role. Insertion order is kept; source ids are unique.
///
/// `revision` increases on every mutation so cached products (masters,
/// reference indices) can tell when to recompute.
#[derive(Debug, Clone)]
pub struct FrameStack {
    role: FrameRole,
    frames: Vec<Frame>,
    revision: u64,
}

impl FrameStack {
    pub fn new(role: FrameRole) -> Self {
        Self {
            role,
            frames: Vec::new(),
            revision: 0,
        }
    }

    pub fn role(&self) -> FrameRole {
        self.role
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Mutable access to frames. Counts as a mutation.
    pub fn frames_mut(&mut self) -> &mut [Frame] {
        self.revision += 1;
        &mut self.frames
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.frames.iter().map(Frame::image)
    }

    pub fn position(&self, id: &SourceId) -> Option<usize> {
        self.frames.iter().position(|f| &f.source == id)
    }

    /// Append a frame, returning its index.
    pub fn push(&mut self, frame: Frame) -> Result<usize, FrameError> {
        if self.position(&frame.source).is_some() {
            return Err(FrameError::DuplicateSource {
                role: self.role,
                id: frame.source,
            });
        }
        self.frames.push(frame);
        self.revision += 1;
        Ok(self.frames.len() - 1)
    }

    pub fn remove(&mut self, id: &SourceId) -> Result<Frame, FrameError> {
        let index = self.position(id).ok_or_else(|| FrameError::UnknownSource {
            role: self.role,
            id: id.clone(),
        })?;
        self.revision += 1;
        Ok(self.frames.remove(index))
    }

    /// Reload a frame's pixels in place, keeping its position in the stack.
    pub fn replace(&mut self, id: &SourceId, image: Image) -> Result<(), FrameError> {
        let index = self.position(id).ok_or_else(|| FrameError::UnknownSource {
            role: self.role,
            id: id.clone(),
        })?;
        self.frames[index].replace_image(image);
        self.revision += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.revision += 1;
    }
}

impl<'a> IntoIterator for &'a FrameStack {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}
