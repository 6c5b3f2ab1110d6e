//! Keypoint detection and description.

mod orb;
mod stars;


use glam::DVec2;

use crate::image::{Image, ImageDimensions, ImageError, Kernel, KernelKind};
use crate::registration::RegistrationError;
use crate::registration::config::{FeatureDetector, RegistrationConfig};

/// Appearance summary used to match a keypoint across frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// 256-bit oriented BRIEF string, compared by Hamming distance.
    Binary([u8; 32]),
    /// Real-valued vector, compared by Euclidean distance.
    Float(Vec<f32>),
}

impl Descriptor {
    /// Distance between descriptors of the same family, `None` across families.
    #[inline]
    pub fn distance(&self, other: &Descriptor) -> Option<f32> {
        match (self, other) {
            (Descriptor::Binary(a), Descriptor::Binary(b)) => Some(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| (x ^ y).count_ones())
                    .sum::<u32>() as f32,
            ),
            (Descriptor::Float(a), Descriptor::Float(b)) if a.len() == b.len() => Some(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt(),
            ),
            _ => None,
        }
    }
}

/// A detected feature in full-resolution pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub pos: DVec2,
    /// Detector strength; larger is stronger.
    pub response: f32,
    /// Orientation in radians.
    pub angle: f32,
    /// Pyramid level the keypoint was found on.
    pub octave: u8,
    pub descriptor: Descriptor,
}

/// Detect and describe keypoints with the configured detector.
///
/// Color images are reduced to luminance first. The result is sorted by
/// descending response and capped at `config.max_keypoints`. A frame without
/// texture yields an empty list.
pub fn extract_keypoints(
    image: &Image,
    config: &RegistrationConfig,
) -> Result<Vec<Keypoint>, RegistrationError> {
    let kernel = Kernel::new(KernelKind::Gaussian, config.smoothing_kernel)
        .map_err(|e| RegistrationError::InvalidConfig(e.to_string()))?;
    let gray = normalized_luminance(image)?;

    let mut keypoints = match config.detector {
        FeatureDetector::Orb => orb::detect(&gray, &kernel, config)?,
        FeatureDetector::Stars => stars::detect(&gray, &kernel, config)?,
    };

    keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
    keypoints.truncate(config.max_keypoints);
    Ok(keypoints)
}

/// Luminance rescaled to [0, 1]. Non-finite samples become 0; a flat image becomes all 0.
pub(crate) fn normalized_luminance(image: &Image) -> Result<Image, ImageError> {
    let mut gray = image.luminance()?;

    let (min, max) = gray
        .pixels()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    for v in gray.pixels_mut() {
        *v = if v.is_finite() && range > f32::EPSILON {
            (*v - min) / range
        } else {
            0.0
        };
    }
    Ok(gray)
}

/// Bilinear downscale of a single-channel image by `factor`.
pub(crate) fn downscale(image: &Image, factor: f32) -> Result<Image, ImageError> {
    let width = (image.width() as f32 / factor).floor() as usize;
    let height = (image.height() as f32 / factor).floor() as usize;
    let mut out = Image::try_new(ImageDimensions::new(width, height, 1))?;
    if width == 0 || height == 0 {
        return Ok(out);
    }

    let src_w = image.width();
    let src_h = image.height();
    let src = image.pixels();
    common::parallel::for_each_row_mut(out.pixels_mut(), width, |y, row| {
        let sy = ((y as f32 + 0.5) * factor - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = sy - y0 as f32;
        for (x, out) in row.iter_mut().enumerate() {
            let sx = ((x as f32 + 0.5) * factor - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = sx - x0 as f32;
            let top = src[y0 * src_w + x0] * (1.0 - fx) + src[y0 * src_w + x1] * fx;
            let bottom = src[y1 * src_w + x0] * (1.0 - fx) + src[y1 * src_w + x1] * fx;
            *out = top * (1.0 - fy) + bottom * fy;
        }
    });
    Ok(out)
}
