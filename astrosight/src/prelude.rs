//! Convenience re-exports for typical pipeline use.
//!
//! ```rust,ignore
//! use astrosight::prelude::*;
//! ```

pub use crate::{
    CfaPattern, ColorMode, CombineMethod, FeatureDetector, Frame, FrameRole, FrameStack, Image,
    ImageDimensions, Loader, ReferenceSelection, RegistrationConfig, Session, SessionConfig,
    SigmaClip, SourceId,
};
