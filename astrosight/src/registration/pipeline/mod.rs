//! Registration of whole stacks against one reference frame.
//!
//! # Pipeline Stages
//!
//! 1. **Reference selection** - explicit index or the first active frame
//! 2. **Keypoint extraction** - frames without cached keypoints, in parallel
//! 3. **Matching** - cross-checked descriptor matches against the reference
//! 4. **RANSAC** - homography from frame space onto reference space
//! 5. **Warping** - resample each frame into reference space


use common::CancelToken;
use glam::DVec2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::Cancelled;
use crate::frame::{Frame, FrameRole, FrameStack, SourceId};
use crate::image::Image;
use crate::registration::config::{ReferenceSelection, RegistrationConfig};
use crate::registration::features::{Keypoint, extract_keypoints};
use crate::registration::matching::match_keypoints;
use crate::registration::ransac::RansacEstimator;
use crate::registration::result::{
    MIN_CORRESPONDENCES, RegistrationError, RegistrationReport, RegistrationResult,
    RegistrationState, RegistrationSummary,
};
use crate::registration::transform::Homography;
use crate::registration::warp::warp_image;
use crate::validation::validate_images;

/// Homography and quality figures for one frame.
#[derive(Debug, Clone)]
struct Alignment {
    homography: Homography,
    matches: usize,
    inliers: usize,
    rms_error: f64,
}

/// Aligns keypoint sets to a reference. Holds only the immutable configuration.
#[derive(Debug)]
struct Registrator<'a> {
    config: &'a RegistrationConfig,
}

impl<'a> Registrator<'a> {
    fn new(config: &'a RegistrationConfig) -> Result<Self, RegistrationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Homography taking `frame` keypoint positions onto `reference` positions.
    fn align(
        &self,
        frame: &[Keypoint],
        reference: &[Keypoint],
    ) -> Result<Alignment, RegistrationError> {
        let matches = match_keypoints(frame, reference, self.config.match_ratio);
        if matches.len() < MIN_CORRESPONDENCES {
            return Err(RegistrationError::InsufficientCorrespondence {
                found: matches.len(),
                required: MIN_CORRESPONDENCES,
            });
        }

        let src: Vec<DVec2> = matches.iter().map(|m| frame[m.frame_idx].pos).collect();
        let dst: Vec<DVec2> = matches
            .iter()
            .map(|m| reference[m.reference_idx].pos)
            .collect();

        let result = RansacEstimator::new(&self.config.ransac).estimate(&src, &dst)?;
        if !result.homography.is_valid() {
            return Err(RegistrationError::DegenerateHomography);
        }

        Ok(Alignment {
            homography: result.homography,
            matches: matches.len(),
            inliers: result.inliers.len(),
            rms_error: result.rms_error,
        })
    }

    fn align_and_warp(
        &self,
        frame: &Frame,
        reference: &[Keypoint],
    ) -> Result<(RegistrationReport, Image), RegistrationError> {
        let keypoints = frame.keypoints().unwrap_or_default();
        let alignment = self.align(keypoints, reference)?;
        let warped = warp_image(frame.image(), &alignment.homography)?;

        let report = RegistrationReport {
            source: frame.source().clone(),
            keypoints: keypoints.len(),
            matches: alignment.matches,
            inliers: alignment.inliers,
            rms_error: alignment.rms_error,
            homography: alignment.homography,
        };
        Ok((report, warped))
    }
}

/// Align `target` onto `reference` without touching any frame state.
pub fn register_pair(
    reference: &Image,
    target: &Image,
    config: &RegistrationConfig,
) -> Result<RegistrationResult, RegistrationError> {
    let registrator = Registrator::new(config)?;
    validate_images(FrameRole::Light, [reference, target])?;

    let (reference_keypoints, target_keypoints) = rayon::join(
        || extract_keypoints(reference, config),
        || extract_keypoints(target, config),
    );
    let alignment = registrator.align(&target_keypoints?, &reference_keypoints?)?;
    let warped = warp_image(target, &alignment.homography)?;

    Ok(RegistrationResult {
        homography: alignment.homography,
        matches: alignment.matches,
        inliers: alignment.inliers,
        rms_error: alignment.rms_error,
        warped,
    })
}

/// Register every frame of `stacks` against one reference frame.
///
/// The stacks are taken in order as one sequence of active frames; an
/// explicit reference index counts across that sequence. Frames already
/// registered are skipped, so repeating the call is a no-op. A frame that
/// cannot be aligned is reported in [`RegistrationSummary::failed`], stays
/// unregistered, and does not stop the others. Cancellation discards all
/// warps computed by this call.
pub fn register_stacks(
    stacks: &mut [FrameStack],
    config: &RegistrationConfig,
    cancel: &CancelToken,
) -> Result<RegistrationSummary, RegistrationError> {
    let registrator = Registrator::new(config)?;
    let mut state = RegistrationState::Unregistered;

    let total: usize = stacks.iter().map(FrameStack::len).sum();
    if total == 0 {
        return Err(RegistrationError::NoFrames);
    }

    let reference_index = match config.reference {
        ReferenceSelection::Explicit(index) if index >= total => {
            return Err(RegistrationError::ReferenceOutOfRange { index, len: total });
        }
        ReferenceSelection::Explicit(index) => index,
        ReferenceSelection::Auto => {
            warn!("No reference frame chosen, using the first active frame");
            0
        }
    };

    let role = stacks
        .iter()
        .find(|s| !s.is_empty())
        .map_or(FrameRole::Light, FrameStack::role);
    validate_images(role, stacks.iter().flat_map(FrameStack::images))?;

    let mut frames: Vec<&mut Frame> = stacks
        .iter_mut()
        .flat_map(|s| s.frames_mut().iter_mut())
        .collect();
    let reference_id = frames[reference_index].source().clone();
    state = transition(state, RegistrationState::ReferenceSelected);
    debug!(reference = %reference_id, index = reference_index, "Reference selected");

    extract_missing_keypoints(&mut frames, reference_index, config, cancel)?;
    state = transition(state, RegistrationState::KeypointsExtracted);

    let reference_keypoints: Vec<Keypoint> = frames[reference_index]
        .keypoints()
        .map(<[Keypoint]>::to_vec)
        .unwrap_or_default();

    let pending: Vec<usize> = (0..frames.len())
        .filter(|&i| i != reference_index && !frames[i].is_registered())
        .collect();
    let skipped = frames.len() - 1 - pending.len();

    let outcomes: Vec<Result<(RegistrationReport, Image), RegistrationError>> = pending
        .par_iter()
        .map(|&i| {
            if cancel.is_cancelled() {
                return Err(RegistrationError::Cancelled(Cancelled));
            }
            registrator.align_and_warp(frames[i], &reference_keypoints)
        })
        .collect();
    if cancel.is_cancelled() {
        return Err(Cancelled.into());
    }
    state = transition(state, RegistrationState::Matched);

    let mut registered = Vec::new();
    let mut failed: Vec<(SourceId, RegistrationError)> = Vec::new();
    let mut warped_images: Vec<(usize, Image)> = Vec::new();
    for (&i, outcome) in pending.iter().zip(outcomes) {
        match outcome {
            Ok((report, warped)) => {
                debug!(
                    frame = %report.source,
                    keypoints = report.keypoints,
                    matches = report.matches,
                    inliers = report.inliers,
                    rms_error = report.rms_error,
                    "Frame registered"
                );
                registered.push(report);
                warped_images.push((i, warped));
            }
            Err(err) if err.is_per_frame() => {
                warn!(frame = %frames[i].source(), error = %err, "Frame left unregistered");
                failed.push((frames[i].source().clone(), err));
            }
            Err(err) => return Err(err),
        }
    }

    frames[reference_index].set_registered(None);
    for (i, warped) in warped_images {
        frames[i].set_registered(Some(warped));
    }
    state = transition(state, RegistrationState::Warped);

    info!(
        reference = %reference_id,
        registered = registered.len(),
        skipped,
        failed = failed.len(),
        "Registration complete"
    );

    Ok(RegistrationSummary {
        state,
        reference_index,
        reference: reference_id,
        registered,
        skipped,
        failed,
    })
}

fn transition(from: RegistrationState, to: RegistrationState) -> RegistrationState {
    debug!(from = %from, to = %to, "Registration state");
    to
}

/// Detect keypoints for every frame that still needs them.
///
/// Registered frames keep the keypoints of their pre-warp image and are left
/// alone; the reference always needs a set.
fn extract_missing_keypoints(
    frames: &mut [&mut Frame],
    reference_index: usize,
    config: &RegistrationConfig,
    cancel: &CancelToken,
) -> Result<(), RegistrationError> {
    let needed: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(i, f)| {
            f.keypoints().is_none() && (*i == reference_index || !f.is_registered())
        })
        .map(|(i, _)| i)
        .collect();

    let extracted: Vec<Vec<Keypoint>> = needed
        .par_iter()
        .map(|&i| {
            if cancel.is_cancelled() {
                return Err(RegistrationError::Cancelled(Cancelled));
            }
            let keypoints = extract_keypoints(frames[i].image(), config)?;
            debug!(frame = %frames[i].source(), keypoints = keypoints.len(), "Keypoints extracted");
            Ok(keypoints)
        })
        .collect::<Result<_, _>>()?;

    for (i, keypoints) in needed.into_iter().zip(extracted) {
        frames[i].set_keypoints(keypoints);
    }
    Ok(())
}
