//! Bilinear demosaicing of 2×2 Bayer color-filter mosaics.
//!
//! Output is interleaved RGB with the input's width and height. Rows are
//! processed in parallel.

pub(crate) mod scalar;


use common::CancelToken;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::Cancelled;
use crate::frame::{FrameStack, SourceId};
use crate::image::{Image, ImageDimensions, ImageError};
use scalar::{
    Mosaic, interpolate_cross, interpolate_diagonal, interpolate_horizontal, interpolate_vertical,
};

/// Color recorded by one photosite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CfaColor {
    Red = 0,
    Green = 1,
    Blue = 2,
}

/// Bayer CFA (Color Filter Array) pattern, named by its top-left 2×2 tile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CfaPattern {
    /// RGGB: Red at (0,0), Green at (0,1) and (1,0), Blue at (1,1)
    #[default]
    Rggb,
    /// BGGR: Blue at (0,0), Green at (0,1) and (1,0), Red at (1,1)
    Bggr,
    /// GRBG: Green at (0,0), Red at (0,1), Blue at (1,0), Green at (1,1)
    Grbg,
    /// GBRG: Green at (0,0), Blue at (0,1), Red at (1,0), Green at (1,1)
    Gbrg,
}

impl CfaPattern {
    /// The 2×2 tile as [row0_col0, row0_col1, row1_col0, row1_col1].
    #[inline(always)]
    pub fn pattern_2x2(&self) -> [CfaColor; 4] {
        use CfaColor::{Blue as B, Green as G, Red as R};
        match self {
            CfaPattern::Rggb => [R, G, G, B],
            CfaPattern::Bggr => [B, G, G, R],
            CfaPattern::Grbg => [G, R, B, G],
            CfaPattern::Gbrg => [G, B, R, G],
        }
    }

    #[inline(always)]
    pub fn color_at(&self, x: usize, y: usize) -> CfaColor {
        self.pattern_2x2()[((y & 1) << 1) | (x & 1)]
    }

    /// True when row `y` holds red photosites (so its greens have red left and right).
    #[inline(always)]
    pub fn red_in_row(&self, y: usize) -> bool {
        match self {
            CfaPattern::Rggb | CfaPattern::Grbg => (y & 1) == 0,
            CfaPattern::Bggr | CfaPattern::Gbrg => (y & 1) == 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemosaicError {
    #[error("Demosaicing needs a single-channel image, got {channels} channels")]
    ChannelCount { channels: usize },

    #[error("Frame '{id}' cannot be demosaiced: {channels} channels")]
    FrameChannelCount { id: SourceId, channels: usize },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Demosaicing cancelled")]
    Cancelled(#[from] Cancelled),
}

/// Reconstruct RGB from a single-channel mosaic by bilinear interpolation.
///
/// Missing colors come from the nearest same-color photosites: the row or
/// column pair for red/blue at green sites, the diagonals for red at blue and
/// blue at red, and the orthogonal cross for green.
pub fn demosaic_bilinear(image: &Image, pattern: CfaPattern) -> Result<Image, DemosaicError> {
    let dims = image.dimensions();
    if dims.channels != 1 {
        return Err(DemosaicError::ChannelCount {
            channels: dims.channels,
        });
    }

    let out_dims = ImageDimensions::new(dims.width, dims.height, 3);
    let mut out = Image::try_new(out_dims)?;
    let mosaic = Mosaic {
        data: image.pixels(),
        width: dims.width,
        height: dims.height,
    };

    common::parallel::for_each_row_mut(out.pixels_mut(), out_dims.row_len(), |y, row| {
        let red_row = pattern.red_in_row(y);
        for (x, rgb) in row.chunks_exact_mut(3).enumerate() {
            let value = mosaic.data[y * mosaic.width + x];
            let (r, g, b) = match pattern.color_at(x, y) {
                CfaColor::Red => (
                    value,
                    interpolate_cross(&mosaic, x, y),
                    interpolate_diagonal(&mosaic, x, y),
                ),
                CfaColor::Blue => (
                    interpolate_diagonal(&mosaic, x, y),
                    interpolate_cross(&mosaic, x, y),
                    value,
                ),
                CfaColor::Green if red_row => (
                    interpolate_horizontal(&mosaic, x, y),
                    value,
                    interpolate_vertical(&mosaic, x, y),
                ),
                CfaColor::Green => (
                    interpolate_vertical(&mosaic, x, y),
                    value,
                    interpolate_horizontal(&mosaic, x, y),
                ),
            };
            rgb[0] = r;
            rgb[1] = g;
            rgb[2] = b;
        }
    });

    Ok(out)
}

/// Demosaic every frame of `stack`.
///
/// New images are built in parallel and swapped in only once all succeeded,
/// so cancellation or an error leaves the stack exactly as it was.
pub fn demosaic_stack(
    stack: &mut FrameStack,
    pattern: CfaPattern,
    cancel: &CancelToken,
) -> Result<(), DemosaicError> {
    let images: Vec<Image> = stack
        .frames()
        .par_iter()
        .map(|frame| {
            if cancel.is_cancelled() {
                return Err(DemosaicError::Cancelled(Cancelled));
            }
            let channels = frame.dimensions().channels;
            if channels != 1 {
                return Err(DemosaicError::FrameChannelCount {
                    id: frame.source().clone(),
                    channels,
                });
            }
            debug!(frame = %frame.source(), pattern = %pattern, "Demosaicing frame");
            demosaic_bilinear(frame.image(), pattern)
        })
        .collect::<Result<_, _>>()?;

    let count = images.len();
    for (frame, image) in stack.frames_mut().iter_mut().zip(images) {
        frame.set_derived_image(image);
    }

    info!(role = %stack.role(), frames = count, pattern = %pattern, "Demosaiced stack");
    Ok(())
}
