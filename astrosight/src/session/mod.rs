//! One pipeline run over a set of frame stacks.
//!
//! A [`Session`] owns a stack per role, the masters synthesized from the
//! calibration stacks, and a cancel token shared with every stage. Stages can
//! be driven one by one or all at once through [`Session::run`]. Each stage is
//! idempotent: calibrated frames are not calibrated twice, masters are rebuilt
//! only when their stack changed, and registered frames are skipped.

mod config;
mod progress;


use std::collections::BTreeMap;
use std::time::Instant;

use common::CancelToken;
use tracing::{debug, info, warn};

use crate::calibration::{CalibrationMasters, CalibrationSummary, MasterSet, calibrate_stack};
use crate::demosaic::demosaic_stack;
use crate::error::{Cancelled, Error};
use crate::frame::{ColorChannel, Frame, FrameRole, FrameStack, Provenance, SourceId};
use crate::image::{Image, ImageDimensions};
use crate::loader::{LoadReport, Loader, load_stack};
use crate::registration::{
    ReferenceSelection, RegistrationSummary, UnregisteredPolicy, register_stacks,
};
use crate::stacking::combine_images;
use crate::validation::validate_images;

pub use config::{ColorMode, SessionConfig};
pub use progress::{ProgressCallback, SessionProgress, SessionStage};

use progress::report_progress;

/// Result of a run.
#[derive(Debug, Clone)]
pub struct SessionOutput {
    /// Combined image: RGB for both color modes.
    pub image: Image,
    /// Capture metadata of the reference frame.
    pub provenance: Provenance,
    /// Registration reference, if registration ran.
    pub reference: Option<SourceId>,
    /// Science frames that went into the combination.
    pub frames_combined: usize,
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    stacks: BTreeMap<FrameRole, FrameStack>,
    masters: MasterSet,
    reference: Option<SourceId>,
    progress: ProgressCallback,
    cancel: CancelToken,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stacks: BTreeMap::new(),
            masters: MasterSet::new(),
            reference: None,
            progress: ProgressCallback::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = callback;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token observed by every stage. Cancelling it makes the running stage
    /// and every later call return [`Error::Cancelled`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn stack(&self, role: FrameRole) -> Option<&FrameStack> {
        self.stacks.get(&role)
    }

    /// Stack for `role`, created empty on first use.
    pub fn stack_mut(&mut self, role: FrameRole) -> &mut FrameStack {
        self.stacks
            .entry(role)
            .or_insert_with(|| FrameStack::new(role))
    }

    pub fn masters(&self) -> &MasterSet {
        &self.masters
    }

    /// Reference chosen by the last successful registration.
    pub fn reference(&self) -> Option<&SourceId> {
        self.reference.as_ref()
    }

    /// Load `sources` into the `role` stack. Sources that fail to load are skipped.
    pub fn load<L: Loader + ?Sized>(
        &mut self,
        loader: &L,
        role: FrameRole,
        sources: &[SourceId],
    ) -> Result<LoadReport, Error> {
        self.check_cancelled()?;
        report_progress(&self.progress, 0, sources.len(), SessionStage::Loading);

        let stack = self
            .stacks
            .entry(role)
            .or_insert_with(|| FrameStack::new(role));
        let report = load_stack(loader, stack, sources, &self.cancel)?;

        report_progress(
            &self.progress,
            sources.len(),
            sources.len(),
            SessionStage::Loading,
        );
        Ok(report)
    }

    pub fn add_frame(&mut self, role: FrameRole, frame: Frame) -> Result<usize, Error> {
        Ok(self.stack_mut(role).push(frame)?)
    }

    /// Build or refresh the master of every configured calibration role.
    ///
    /// Roles with no frames lose their master. Returns the number of masters held.
    pub fn synthesize_masters(&mut self) -> Result<usize, Error> {
        let roles = self.config.calibration_roles.clone();
        let total = roles.len();

        for (i, &role) in roles.iter().enumerate() {
            self.check_cancelled()?;
            report_progress(&self.progress, i, total, SessionStage::Synthesis);

            match self.stacks.get(&role).filter(|stack| !stack.is_empty()) {
                Some(stack) => {
                    self.masters.synthesize(stack)?;
                }
                None => {
                    if self.masters.remove(role).is_some() {
                        debug!(role = %role, "Dropped master of emptied stack");
                    }
                }
            }
        }

        for role in FrameRole::CALIBRATION {
            if !roles.contains(&role) {
                self.masters.remove(role);
            }
        }

        report_progress(&self.progress, total, total, SessionStage::Synthesis);
        Ok(self.masters.len())
    }

    /// Apply the current masters to every science stack.
    pub fn calibrate(&mut self) -> Result<CalibrationSummary, Error> {
        let mut total = CalibrationSummary::default();
        let masters = CalibrationMasters::from_set(&self.masters, self.config.flat_policy)?;
        if masters.is_empty() {
            info!("No dark or flat master, skipping calibration");
            return Ok(total);
        }

        let roles = self.active_roles();
        for (i, role) in roles.iter().enumerate() {
            self.check_cancelled()?;
            report_progress(&self.progress, i, roles.len(), SessionStage::Calibration);

            let Some(stack) = self.stacks.get_mut(role) else {
                continue;
            };
            let summary = calibrate_stack(&masters, stack, &self.cancel)?;
            total.calibrated += summary.calibrated;
            total.skipped += summary.skipped;
            total.flagged_pixels += summary.flagged_pixels;
        }

        report_progress(
            &self.progress,
            roles.len(),
            roles.len(),
            SessionStage::Calibration,
        );
        Ok(total)
    }

    /// Demosaic the light stack in one-shot-color mode.
    ///
    /// Returns the number of frames demosaiced. A stack that is already RGB is left alone.
    pub fn demosaic(&mut self) -> Result<usize, Error> {
        let ColorMode::Osc { pattern } = self.config.color_mode else {
            debug!("Split-channel mode, nothing to demosaic");
            return Ok(0);
        };
        self.check_cancelled()?;

        let Some(stack) = self
            .stacks
            .get_mut(&FrameRole::Light)
            .filter(|stack| !stack.is_empty())
        else {
            return Ok(0);
        };
        let mosaiced = stack
            .iter()
            .filter(|frame| frame.dimensions().channels == 1)
            .count();
        if mosaiced == 0 {
            debug!("Light frames already demosaiced");
            return Ok(0);
        }

        let total = stack.len();
        report_progress(&self.progress, 0, total, SessionStage::Demosaic);
        demosaic_stack(stack, pattern, &self.cancel)?;
        report_progress(&self.progress, total, total, SessionStage::Demosaic);
        Ok(mosaiced)
    }

    /// Align every science frame to the reference.
    ///
    /// When the reference differs from the previous call, every frame is aligned again.
    pub fn register(&mut self) -> Result<RegistrationSummary, Error> {
        let roles = self.active_roles();
        if roles.is_empty() {
            return Err(Error::NoLights);
        }

        // Moved out so the registration engine sees the active stacks as one slice.
        let mut stacks: Vec<FrameStack> = roles
            .iter()
            .filter_map(|role| self.stacks.remove(role))
            .collect();
        self.invalidate_if_reference_moved(&mut stacks);

        let total: usize = stacks.iter().map(FrameStack::len).sum();
        report_progress(&self.progress, 0, total, SessionStage::Registration);
        let result = register_stacks(&mut stacks, &self.config.registration, &self.cancel);
        for stack in stacks {
            self.stacks.insert(stack.role(), stack);
        }
        let summary = result?;

        report_progress(&self.progress, total, total, SessionStage::Registration);
        self.reference = Some(summary.reference.clone());
        Ok(summary)
    }

    /// Combine the science stacks into the final image.
    ///
    /// Split-channel stacks are combined per channel and merged as R, G, B;
    /// a missing channel is filled with zeros.
    pub fn combine(&self) -> Result<SessionOutput, Error> {
        self.check_cancelled()?;
        let roles = self.active_roles();
        if roles.is_empty() {
            return Err(Error::NoLights);
        }

        let total = roles.len();
        report_progress(&self.progress, 0, total, SessionStage::Combination);

        let (image, frames_combined) = match self.config.color_mode {
            ColorMode::Osc { .. } => self
                .combine_role(FrameRole::Light)?
                .ok_or(Error::NothingRegistered)?,
            ColorMode::SplitChannel => self.combine_channels()?,
        };

        report_progress(&self.progress, total, total, SessionStage::Combination);

        Ok(SessionOutput {
            image,
            provenance: self.reference_provenance(&roles),
            reference: self.reference.clone(),
            frames_combined,
        })
    }

    /// Run every stage in order.
    pub fn run(&mut self) -> Result<SessionOutput, Error> {
        self.config.validate()?;
        if self.active_roles().is_empty() {
            return Err(Error::NoLights);
        }

        let start = Instant::now();
        let masters = self.synthesize_masters()?;
        let calibration = self.calibrate()?;
        let demosaiced = self.demosaic()?;
        let registration = self.register()?;
        let output = self.combine()?;

        info!(
            masters,
            calibrated = calibration.calibrated,
            demosaiced,
            registered = registration.registered.len(),
            failed = registration.failed.len(),
            combined = output.frames_combined,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Session complete"
        );
        Ok(output)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }

    /// Non-empty science roles of the color mode, in registration order.
    fn active_roles(&self) -> Vec<FrameRole> {
        self.config
            .color_mode
            .science_roles()
            .into_iter()
            .filter(|role| self.stacks.get(role).is_some_and(|stack| !stack.is_empty()))
            .collect()
    }

    fn invalidate_if_reference_moved(&self, stacks: &mut [FrameStack]) {
        let Some(previous) = &self.reference else {
            return;
        };
        let index = match self.config.registration.reference {
            ReferenceSelection::Auto => 0,
            ReferenceSelection::Explicit(index) => index,
        };
        let current = stacks.iter().flat_map(FrameStack::iter).nth(index);
        if current.is_some_and(|frame| frame.source() == previous) {
            return;
        }

        info!(previous = %previous, "Reference changed, registering all frames again");
        for stack in stacks.iter_mut() {
            for frame in stack.frames_mut() {
                frame.invalidate_registration();
            }
        }
    }

    /// Combine one stack under the unregistered-frame policy.
    ///
    /// `None` when no frame qualifies.
    fn combine_role(&self, role: FrameRole) -> Result<Option<(Image, usize)>, Error> {
        let Some(stack) = self.stacks.get(&role) else {
            return Ok(None);
        };

        let include_unregistered =
            self.config.registration.unregistered == UnregisteredPolicy::CombineUnwarped;
        let images: Vec<&Image> = stack
            .iter()
            .filter(|frame| include_unregistered || frame.is_registered())
            .map(Frame::image)
            .collect();

        let excluded = stack.len() - images.len();
        if excluded > 0 {
            warn!(role = %role, excluded, "Leaving unregistered frames out of the combination");
        }
        if images.is_empty() {
            return Ok(None);
        }

        let image = combine_images(role, &images, self.config.combine)?;
        Ok(Some((image, images.len())))
    }

    fn combine_channels(&self) -> Result<(Image, usize), Error> {
        let mut planes: Vec<(ColorChannel, Option<Image>)> = Vec::with_capacity(3);
        let mut frames_combined = 0;

        for channel in [ColorChannel::Red, ColorChannel::Green, ColorChannel::Blue] {
            let plane = match self.combine_role(FrameRole::Channel(channel))? {
                Some((image, count)) => {
                    frames_combined += count;
                    // Channel stacks are monochrome; anything else is reduced to luminance.
                    let image = if image.channels() == 1 {
                        image
                    } else {
                        image.luminance()?
                    };
                    Some(image)
                }
                None => None,
            };
            planes.push((channel, plane));
        }

        let present: Vec<&Image> = planes.iter().filter_map(|(_, p)| p.as_ref()).collect();
        let Some(first) = present.first() else {
            return Err(Error::NothingRegistered);
        };
        let role = planes
            .iter()
            .find(|(_, p)| p.is_some())
            .map(|(channel, _)| FrameRole::Channel(*channel))
            .unwrap_or(FrameRole::Light);
        validate_images(role, present.iter().copied())?;

        let blank = Image::try_new(ImageDimensions::new(first.width(), first.height(), 1))?;
        for (channel, plane) in &planes {
            if plane.is_none() {
                warn!(channel = %channel, "No frames for channel, filling with zeros");
            }
        }
        let ordered: Vec<&Image> = planes
            .iter()
            .map(|(_, plane)| plane.as_ref().unwrap_or(&blank))
            .collect();

        Ok((Image::from_planes(&ordered)?, frames_combined))
    }

    fn reference_provenance(&self, roles: &[FrameRole]) -> Provenance {
        let mut frames = roles
            .iter()
            .filter_map(|role| self.stacks.get(role))
            .flat_map(FrameStack::iter);
        let reference = match &self.reference {
            Some(id) => frames.find(|frame| frame.source() == id),
            None => frames.next(),
        };
        reference
            .map(|frame| frame.provenance().clone())
            .unwrap_or_default()
    }
}
