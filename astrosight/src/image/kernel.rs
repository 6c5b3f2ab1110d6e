//! Square smoothing kernels and 2D convolution.

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

use super::{Image, ImageError};

/// Weight profile used to build a [`Kernel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KernelKind {
    /// Uniform box average.
    Mean,
    /// Gaussian falloff with σ tied to the kernel size.
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("Kernel size must be odd and non-zero, got {0}")]
    InvalidSize(usize),
}

/// Square, odd-sized weight matrix normalized to sum 1. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    kind: KernelKind,
    size: usize,
    weights: Vec<f32>,
}

impl Kernel {
    pub fn new(kind: KernelKind, size: usize) -> Result<Self, KernelError> {
        if size == 0 || size % 2 == 0 {
            return Err(KernelError::InvalidSize(size));
        }

        let radius = (size / 2) as i64;
        let mut weights = match kind {
            KernelKind::Mean => vec![1.0f64; size * size],
            KernelKind::Gaussian => {
                // 2σ² = size² / 4
                let inv_two_sigma_sq = 4.0 / (size * size) as f64;
                let mut w = Vec::with_capacity(size * size);
                for dy in -radius..=radius {
                    for dx in -radius..=radius {
                        let d2 = (dx * dx + dy * dy) as f64;
                        w.push((-d2 * inv_two_sigma_sq).exp());
                    }
                }
                w
            }
        };

        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }

        Ok(Self {
            kind,
            size,
            weights: weights.into_iter().map(|w| w as f32).collect(),
        })
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }

    /// Row-major weights, `size * size` long.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at offset (dx, dy) from the center.
    #[inline]
    pub fn weight(&self, dx: isize, dy: isize) -> f32 {
        let r = self.radius() as isize;
        self.weights[((dy + r) as usize) * self.size + (dx + r) as usize]
    }
}

impl Image {
    /// Convolve every channel with `kernel`, clamping reads to the image edge.
    pub fn convolve(&self, kernel: &Kernel) -> Result<Image, ImageError> {
        let dims = self.dimensions();
        let mut out = Image::try_new(dims)?;
        if !self.is_allocated() {
            return Ok(out);
        }

        let width = dims.width as isize;
        let height = dims.height as isize;
        let channels = dims.channels;
        let radius = kernel.radius() as isize;
        let src = self.pixels();

        common::parallel::for_each_row_mut(out.pixels_mut(), dims.row_len(), |y, row| {
            let y = y as isize;
            for x in 0..width {
                for c in 0..channels {
                    let mut acc = 0.0f32;
                    for dy in -radius..=radius {
                        let sy = (y + dy).clamp(0, height - 1) as usize;
                        for dx in -radius..=radius {
                            let sx = (x + dx).clamp(0, width - 1) as usize;
                            acc += kernel.weight(dx, dy)
                                * src[(sy * dims.width + sx) * channels + c];
                        }
                    }
                    row[x as usize * channels + c] = acc;
                }
            }
        });

        Ok(out)
    }
}
