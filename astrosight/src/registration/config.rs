//! Configuration types for the registration engine.
//!
//! `RegistrationConfig` is an immutable value handed to every registration
//! call; the engine keeps no detector or matcher state between calls.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::registration::RegistrationError;

/// Keypoint detector and descriptor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FeatureDetector {
    /// FAST corners with oriented BRIEF binary descriptors over an image pyramid.
    /// Suited to terrestrial or nebula-rich frames with corner texture.
    #[default]
    Orb,
    /// Point sources with descriptors built from distances to neighbouring stars.
    /// Suited to sparse star fields where corners are rare.
    Stars,
}

/// How the reference frame is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSelection {
    /// First frame of the active stacks, with a warning.
    #[default]
    Auto,
    /// Index into the active stacks taken in order (lights, or blue, green, red).
    Explicit(usize),
}

/// What the combiner does with frames registration could not align.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisteredPolicy {
    /// Leave them out of the combination.
    #[default]
    Exclude,
    /// Combine them without warping.
    CombineUnwarped,
}

/// RANSAC configuration for homography estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Maximum iterations.
    pub max_iterations: usize,
    /// Inlier reprojection distance threshold in pixels.
    pub inlier_threshold: f64,
    /// Target confidence for early termination.
    pub confidence: f64,
    /// Minimum inlier ratio before adaptive early termination is allowed.
    pub min_inlier_ratio: f64,
    /// Seed for the sampling RNG. Registration is deterministic for a given seed.
    pub seed: u64,
    /// Maximum refinement rounds applied to a promising hypothesis.
    pub lo_max_iterations: usize,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            inlier_threshold: 2.0,
            confidence: 0.995,
            min_inlier_ratio: 0.3,
            seed: 0x5EED,
            lo_max_iterations: 10,
        }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::InvalidConfig(
                "RANSAC max_iterations must be positive".into(),
            ));
        }
        if !(self.inlier_threshold > 0.0) {
            return Err(RegistrationError::InvalidConfig(format!(
                "RANSAC inlier_threshold must be positive, got {}",
                self.inlier_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.confidence) {
            return Err(RegistrationError::InvalidConfig(format!(
                "RANSAC confidence must be in [0, 1), got {}",
                self.confidence
            )));
        }
        if !(self.min_inlier_ratio > 0.0 && self.min_inlier_ratio <= 1.0) {
            return Err(RegistrationError::InvalidConfig(format!(
                "RANSAC min_inlier_ratio must be in (0, 1], got {}",
                self.min_inlier_ratio
            )));
        }
        Ok(())
    }
}

/// Registration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub detector: FeatureDetector,
    pub reference: ReferenceSelection,
    /// Keypoints kept per frame, strongest first.
    pub max_keypoints: usize,
    /// FAST intensity threshold on luminance normalized to [0, 1].
    pub fast_threshold: f32,
    /// Pyramid levels searched by the ORB detector.
    pub pyramid_levels: usize,
    /// Downscale factor between pyramid levels.
    pub pyramid_scale: f32,
    /// Detection threshold for stars, in robust sigmas above the median.
    pub star_sigma: f32,
    /// Neighbouring stars encoded in each star descriptor.
    pub star_neighbors: usize,
    /// Odd size of the Gaussian kernel used to smooth before sampling descriptors.
    pub smoothing_kernel: usize,
    /// A match is ambiguous when best distance ≥ `match_ratio` × second-best distance.
    pub match_ratio: f32,
    pub ransac: RansacConfig,
    pub unregistered: UnregisteredPolicy,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            detector: FeatureDetector::default(),
            reference: ReferenceSelection::default(),
            max_keypoints: 500,
            fast_threshold: 0.05,
            pyramid_levels: 4,
            pyramid_scale: 1.5,
            star_sigma: 5.0,
            star_neighbors: 5,
            smoothing_kernel: 5,
            match_ratio: 0.9,
            ransac: RansacConfig::default(),
            unregistered: UnregisteredPolicy::default(),
        }
    }
}

impl RegistrationConfig {
    /// Defaults tuned for sparse star fields.
    pub fn stars() -> Self {
        Self {
            detector: FeatureDetector::Stars,
            max_keypoints: 200,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.max_keypoints < 4 {
            return Err(RegistrationError::InvalidConfig(format!(
                "max_keypoints must be at least 4, got {}",
                self.max_keypoints
            )));
        }
        if self.pyramid_levels == 0 {
            return Err(RegistrationError::InvalidConfig(
                "pyramid_levels must be at least 1".into(),
            ));
        }
        if !(self.pyramid_scale > 1.0) {
            return Err(RegistrationError::InvalidConfig(format!(
                "pyramid_scale must be greater than 1, got {}",
                self.pyramid_scale
            )));
        }
        if self.star_neighbors < 2 {
            return Err(RegistrationError::InvalidConfig(format!(
                "star_neighbors must be at least 2, got {}",
                self.star_neighbors
            )));
        }
        if self.smoothing_kernel == 0 || self.smoothing_kernel % 2 == 0 {
            return Err(RegistrationError::InvalidConfig(format!(
                "smoothing_kernel must be odd, got {}",
                self.smoothing_kernel
            )));
        }
        if !(self.match_ratio > 0.0 && self.match_ratio <= 1.0) {
            return Err(RegistrationError::InvalidConfig(format!(
                "match_ratio must be in (0, 1], got {}",
                self.match_ratio
            )));
        }
        self.ransac.validate()
    }
}
