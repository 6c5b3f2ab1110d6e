//! Run configuration for a [`Session`](super::Session).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationError, FlatDivisorPolicy};
use crate::demosaic::CfaPattern;
use crate::error::Error;
use crate::frame::{ColorChannel, FrameRole};
use crate::registration::RegistrationConfig;
use crate::stacking::CombineMethod;

/// How the science exposures encode color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ColorMode {
    /// One-shot-color sensor: single-plane light frames behind a Bayer mosaic.
    Osc { pattern: CfaPattern },
    /// Monochrome sensor with one stack per color filter.
    SplitChannel,
}

impl Default for ColorMode {
    fn default() -> Self {
        ColorMode::Osc {
            pattern: CfaPattern::default(),
        }
    }
}

impl ColorMode {
    /// Science roles in registration order.
    pub fn science_roles(&self) -> Vec<FrameRole> {
        match self {
            ColorMode::Osc { .. } => vec![FrameRole::Light],
            ColorMode::SplitChannel => [ColorChannel::Blue, ColorChannel::Green, ColorChannel::Red]
                .into_iter()
                .map(FrameRole::Channel)
                .collect(),
        }
    }
}

/// Everything a run needs besides the frames themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Calibration roles whose masters are built and applied. Roles without frames are skipped.
    pub calibration_roles: Vec<FrameRole>,
    pub color_mode: ColorMode,
    pub registration: RegistrationConfig,
    pub combine: CombineMethod,
    pub flat_policy: FlatDivisorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            calibration_roles: FrameRole::CALIBRATION.to_vec(),
            color_mode: ColorMode::default(),
            registration: RegistrationConfig::default(),
            combine: CombineMethod::default(),
            flat_policy: FlatDivisorPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, Error> {
        Ok(common::yaml::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, Error> {
        Ok(common::yaml::to_string(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(common::yaml::read_file(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        Ok(common::yaml::write_file(self, path)?)
    }

    /// Reject settings no stage could run with.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(&role) = self.calibration_roles.iter().find(|r| !r.is_calibration()) {
            return Err(CalibrationError::NotCalibrationRole { role }.into());
        }
        self.flat_policy.validate()?;
        self.registration.validate()?;
        self.combine.validate()?;
        Ok(())
    }
}
