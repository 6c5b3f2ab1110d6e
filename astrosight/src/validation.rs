//! Structural checks run before synthesis and combination.

use strum_macros::Display;
use thiserror::Error;

use crate::frame::{FrameRole, FrameStack};
use crate::image::{Image, ImageDimensions};

/// Which dimension diverged from the first image of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DimensionAttribute {
    Width,
    Height,
    Channels,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No {role} frames to process")]
    Empty { role: FrameRole },

    #[error("{role} frame {index} has no pixel data")]
    Unallocated { role: FrameRole, index: usize },

    #[error("{attribute} mismatch for {role} frame {index}: expected {expected}, got {actual}")]
    Mismatch {
        role: FrameRole,
        index: usize,
        attribute: DimensionAttribute,
        expected: usize,
        actual: usize,
    },
}

impl ValidationError {
    /// Index of the offending image, if the error names one.
    pub fn index(&self) -> Option<usize> {
        match self {
            ValidationError::Empty { .. } => None,
            ValidationError::Unallocated { index, .. } | ValidationError::Mismatch { index, .. } => {
                Some(*index)
            }
        }
    }
}

/// Check that `images` is non-empty, allocated, and uniformly sized.
///
/// Returns the shared dimensions. The first divergence is reported, comparing
/// width, then height, then channel count against the first image.
pub fn validate_images<'a>(
    role: FrameRole,
    images: impl IntoIterator<Item = &'a Image>,
) -> Result<ImageDimensions, ValidationError> {
    let mut expected: Option<ImageDimensions> = None;

    for (index, image) in images.into_iter().enumerate() {
        if !image.is_allocated() {
            return Err(ValidationError::Unallocated { role, index });
        }

        let actual = image.dimensions();
        let Some(expected) = expected else {
            expected = Some(actual);
            continue;
        };

        let checks = [
            (DimensionAttribute::Width, expected.width, actual.width),
            (DimensionAttribute::Height, expected.height, actual.height),
            (DimensionAttribute::Channels, expected.channels, actual.channels),
        ];
        if let Some(&(attribute, expected, actual)) = checks.iter().find(|(_, e, a)| e != a) {
            return Err(ValidationError::Mismatch {
                role,
                index,
                attribute,
                expected,
                actual,
            });
        }
    }

    expected.ok_or(ValidationError::Empty { role })
}

pub fn validate_stack(stack: &FrameStack) -> Result<ImageDimensions, ValidationError> {
    validate_images(stack.role(), stack.images())
}
