//! Feature-based image registration.
//!
//! Frames are aligned to a reference by detecting keypoints, matching their
//! descriptors, fitting a homography with RANSAC and resampling each frame
//! into reference space.

pub(crate) mod config;
mod features;
mod matching;
mod pipeline;
mod ransac;
mod result;
mod transform;
mod warp;

pub use config::{
    FeatureDetector, RansacConfig, ReferenceSelection, RegistrationConfig, UnregisteredPolicy,
};
pub use features::{Descriptor, Keypoint, extract_keypoints};
pub use matching::{Correspondence, match_keypoints};
pub use pipeline::{register_pair, register_stacks};
pub use result::{
    RansacFailureReason, RegistrationError, RegistrationReport, RegistrationResult,
    RegistrationState, RegistrationSummary,
};
pub use transform::Homography;
pub use warp::warp_image;
