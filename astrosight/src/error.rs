//! Crate-level error type.

use thiserror::Error;

use crate::calibration::CalibrationError;
use crate::demosaic::DemosaicError;
use crate::frame::FrameError;
use crate::image::ImageError;
use crate::registration::RegistrationError;
use crate::stacking::StackingError;
use crate::validation::ValidationError;

/// A batch operation observed its cancel token and stopped without publishing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Demosaic(#[from] DemosaicError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Stacking(#[from] StackingError),

    #[error("Config error: {0}")]
    Config(#[from] common::yaml::YamlError),

    #[error("No science frames loaded")]
    NoLights,

    #[error("Every science frame failed registration")]
    NothingRegistered,

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl Error {
    /// True when the error came from cancellation in any stage.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Cancelled(_)
                | Error::Calibration(CalibrationError::Cancelled(_))
                | Error::Demosaic(DemosaicError::Cancelled(_))
                | Error::Registration(RegistrationError::Cancelled(_))
        )
    }
}
