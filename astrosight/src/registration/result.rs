//! Registration result and error types.

use strum_macros::Display;
use thiserror::Error;

use crate::error::Cancelled;
use crate::frame::SourceId;
use crate::image::{Image, ImageError};
use crate::registration::transform::Homography;
use crate::validation::ValidationError;

/// Correspondences needed to fit a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Reason for RANSAC failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RansacFailureReason {
    /// No sample produced a model with any inliers.
    NoInliersFound,
    /// Every sample was degenerate (collinear or coincident points).
    DegeneratePointSet,
    /// The best model had fewer inliers than a homography needs.
    InsufficientInliers,
}

impl std::fmt::Display for RansacFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RansacFailureReason::NoInliersFound => write!(f, "no inliers found"),
            RansacFailureReason::DegeneratePointSet => write!(f, "degenerate point set"),
            RansacFailureReason::InsufficientInliers => write!(f, "insufficient inliers"),
        }
    }
}

/// Registration error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("No frames available for registration")]
    NoFrames,

    #[error("Reference index {index} is out of range for {len} frames")]
    ReferenceOutOfRange { index: usize, len: usize },

    #[error("Insufficient correspondences: found {found}, need {required}")]
    InsufficientCorrespondence { found: usize, required: usize },

    #[error(
        "RANSAC failed: {reason} (iterations: {iterations}, best inlier count: {best_inlier_count})"
    )]
    RansacFailed {
        reason: RansacFailureReason,
        iterations: usize,
        best_inlier_count: usize,
    },

    #[error("Estimated homography is not invertible")]
    DegenerateHomography,

    #[error("Invalid registration config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Registration cancelled")]
    Cancelled(#[from] Cancelled),
}

impl RegistrationError {
    /// True for failures that only affect one frame; the batch carries on.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            RegistrationError::InsufficientCorrespondence { .. }
                | RegistrationError::RansacFailed { .. }
                | RegistrationError::DegenerateHomography
        )
    }
}

/// Progress of a registration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationState {
    Unregistered,
    ReferenceSelected,
    KeypointsExtracted,
    Matched,
    Warped,
}

/// Result of aligning one image to a reference.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Maps frame coordinates onto reference coordinates.
    pub homography: Homography,
    /// Cross-checked, unambiguous descriptor matches.
    pub matches: usize,
    /// RANSAC inliers among `matches`.
    pub inliers: usize,
    /// RMS reprojection error of the inliers in pixels.
    pub rms_error: f64,
    /// The frame resampled into reference space.
    pub warped: Image,
}

/// Per-frame line of a registration run.
#[derive(Debug, Clone)]
pub struct RegistrationReport {
    pub source: SourceId,
    pub keypoints: usize,
    pub matches: usize,
    pub inliers: usize,
    pub rms_error: f64,
    pub homography: Homography,
}

/// Outcome of registering a set of stacks.
#[derive(Debug, Clone)]
pub struct RegistrationSummary {
    pub state: RegistrationState,
    /// Index of the reference within the active frames (stacks concatenated in order).
    pub reference_index: usize,
    pub reference: SourceId,
    /// Frames aligned during this call.
    pub registered: Vec<RegistrationReport>,
    /// Frames already registered by an earlier call.
    pub skipped: usize,
    /// Frames that could not be aligned; they stay unregistered.
    pub failed: Vec<(SourceId, RegistrationError)>,
}
