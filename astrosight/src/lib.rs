//! Astrosight - calibration and stacking pipeline for astronomical exposures.
//!
//! The pipeline runs these stages in order, each consuming the previous stage's stacks:
//! - Loading through a caller-supplied [`Loader`]
//! - Master calibration frame synthesis (dark, flat, bias, dark-flat)
//! - Per-pixel calibration of light frames
//! - Bilinear Bayer demosaicing for one-shot-color sensors
//! - Feature-based registration with a RANSAC homography
//! - Mean, median and sigma-clipped combination
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use astrosight::{FrameRole, Session, SessionConfig, SourceId};
//!
//! let mut session = Session::new(SessionConfig::default());
//! session.load(&loader, FrameRole::Dark, &dark_ids)?;
//! session.load(&loader, FrameRole::Light, &light_ids)?;
//! let output = session.run()?;
//! ```

pub(crate) mod calibration;
pub(crate) mod demosaic;
mod error;
pub(crate) mod frame;
pub(crate) mod image;
mod loader;
pub(crate) mod math;
pub(crate) mod registration;
mod session;
pub(crate) mod stacking;
mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude;

// ============================================================================
// Core types
// ============================================================================

pub use error::{Cancelled, Error};
pub use frame::{ColorChannel, Frame, FrameError, FrameRole, FrameStack, Provenance, SourceId};
pub use image::{Image, ImageDimensions, ImageError, Kernel, KernelError, KernelKind};
pub use validation::{DimensionAttribute, ValidationError, validate_images, validate_stack};

// ============================================================================
// Loading
// ============================================================================

pub use loader::{InMemoryLoader, LoadError, LoadReport, LoadedImage, Loader, load_stack};

// ============================================================================
// Calibration
// ============================================================================

pub use calibration::{
    CalibrationError, CalibrationMasters, CalibrationSummary, FlatDivisorPolicy, MasterFrame,
    MasterSet, calibrate_stack, synthesize_master,
};

// ============================================================================
// Demosaicing
// ============================================================================

pub use demosaic::{CfaColor, CfaPattern, DemosaicError, demosaic_bilinear, demosaic_stack};

// ============================================================================
// Registration
// ============================================================================

pub use registration::{
    Correspondence, Descriptor, FeatureDetector, Homography, Keypoint, RansacConfig,
    RansacFailureReason, ReferenceSelection, RegistrationConfig, RegistrationError,
    RegistrationReport, RegistrationResult, RegistrationState, RegistrationSummary,
    UnregisteredPolicy, extract_keypoints, match_keypoints, register_pair, register_stacks,
    warp_image,
};

// ============================================================================
// Stacking
// ============================================================================

pub use stacking::{ClipCenter, CombineMethod, SigmaClip, StackingError, combine, combine_images};

// ============================================================================
// Session
// ============================================================================

pub use session::{
    ColorMode, ProgressCallback, Session, SessionConfig, SessionOutput, SessionProgress,
    SessionStage,
};
