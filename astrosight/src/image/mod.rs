//! Dense floating-point image buffers.

mod kernel;


use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use kernel::{Kernel, KernelError, KernelKind};

/// Image dimensions. Samples are interleaved: `(y * width + x) * channels + c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
}

impl ImageDimensions {
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of pixels (width × height).
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Number of samples, or `None` when the product overflows.
    pub fn sample_count(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.channels))
    }

    /// Samples per row (width × channels).
    pub fn row_len(&self) -> usize {
        self.width * self.channels
    }
}

impl std::fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("Failed to allocate {samples} samples for a {dimensions} image")]
    Allocation {
        dimensions: ImageDimensions,
        samples: usize,
    },

    #[error("Buffer of {actual} samples does not fit a {dimensions} image ({expected} expected)")]
    BufferLength {
        dimensions: ImageDimensions,
        expected: usize,
        actual: usize,
    },
}

/// Dense image buffer. `pixels.len()` always equals `width * height * channels`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    dimensions: ImageDimensions,
    pixels: Vec<f32>,
}

impl Image {
    /// Allocate a zero-filled image, reporting allocation failure instead of aborting.
    pub fn try_new(dimensions: ImageDimensions) -> Result<Self, ImageError> {
        Self::filled(dimensions, 0.0)
    }

    /// Allocate an image with every sample set to `value`.
    pub fn filled(dimensions: ImageDimensions, value: f32) -> Result<Self, ImageError> {
        let samples = dimensions
            .sample_count()
            .ok_or(ImageError::Allocation {
                dimensions,
                samples: usize::MAX,
            })?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(samples)
            .map_err(|_| ImageError::Allocation {
                dimensions,
                samples,
            })?;
        pixels.resize(samples, value);

        Ok(Self { dimensions, pixels })
    }

    /// Wrap an existing buffer. Fails when the length disagrees with `dimensions`.
    pub fn from_pixels(dimensions: ImageDimensions, pixels: Vec<f32>) -> Result<Self, ImageError> {
        let expected = dimensions.sample_count().ok_or(ImageError::Allocation {
            dimensions,
            samples: usize::MAX,
        })?;
        if pixels.len() != expected {
            return Err(ImageError::BufferLength {
                dimensions,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { dimensions, pixels })
    }

    pub fn dimensions(&self) -> ImageDimensions {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.width
    }

    pub fn height(&self) -> usize {
        self.dimensions.height
    }

    pub fn channels(&self) -> usize {
        self.dimensions.channels
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [f32] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<f32> {
        self.pixels
    }

    /// True when the buffer holds at least one sample.
    pub fn is_allocated(&self) -> bool {
        !self.pixels.is_empty()
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, c: usize) -> usize {
        (y * self.dimensions.width + x) * self.dimensions.channels + c
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.pixels[self.index(x, y, c)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        let idx = self.index(x, y, c);
        self.pixels[idx] = value;
    }

    /// Extract one channel as a single-channel image.
    pub fn channel(&self, c: usize) -> Result<Image, ImageError> {
        debug_assert!(c < self.channels());
        let dims = ImageDimensions::new(self.width(), self.height(), 1);
        let mut out = Image::try_new(dims)?;
        let channels = self.channels();
        for (dst, src) in out
            .pixels
            .iter_mut()
            .zip(self.pixels.chunks_exact(channels))
        {
            *dst = src[c];
        }
        Ok(out)
    }

    /// Interleave single-channel planes of equal size into one image.
    pub fn from_planes(planes: &[&Image]) -> Result<Image, ImageError> {
        let Some(first) = planes.first() else {
            return Image::try_new(ImageDimensions::new(0, 0, 0));
        };
        let dims = ImageDimensions::new(first.width(), first.height(), planes.len());
        let mut out = Image::try_new(dims)?;
        for (c, plane) in planes.iter().enumerate() {
            debug_assert_eq!(plane.channels(), 1);
            debug_assert_eq!(plane.pixels.len(), first.pixels.len());
            for (i, &v) in plane.pixels.iter().enumerate() {
                out.pixels[i * planes.len() + c] = v;
            }
        }
        Ok(out)
    }

    /// Single-channel luminance. RGB uses Rec.709 weights, other layouts the channel mean.
    pub fn luminance(&self) -> Result<Image, ImageError> {
        let channels = self.channels();
        if channels == 1 {
            return Ok(self.clone());
        }

        let dims = ImageDimensions::new(self.width(), self.height(), 1);
        let mut out = Image::try_new(dims)?;
        if channels == 0 {
            return Ok(out);
        }

        for (dst, px) in out
            .pixels
            .iter_mut()
            .zip(self.pixels.chunks_exact(channels))
        {
            *dst = if channels == 3 {
                0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2]
            } else {
                px.iter().sum::<f32>() / channels as f32
            };
        }
        Ok(out)
    }
}
