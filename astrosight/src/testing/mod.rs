//! Testing utilities: tracing setup and deterministic synthetic frames.

#![allow(dead_code)]

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::frame::Frame;
use crate::image::{Image, ImageDimensions};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn constant_image(width: usize, height: usize, channels: usize, value: f32) -> Image {
    Image::filled(ImageDimensions::new(width, height, channels), value).unwrap()
}

pub fn constant_frame(id: &str, width: usize, height: usize, channels: usize, value: f32) -> Frame {
    Frame::new(id, constant_image(width, height, channels, value))
}

/// Single-channel image from a closure over (x, y).
pub fn image_from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Image {
    let mut img = constant_image(width, height, 1, 0.0);
    for y in 0..height {
        for x in 0..width {
            img.set(x, y, 0, f(x, y));
        }
    }
    img
}

fn add_gaussian(img: &mut Image, center: DVec2, sigma: f64, amplitude: f32) {
    let radius = (sigma * 4.0).ceil() as i64;
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
    for y in (cy - radius).max(0)..=(cy + radius).min(img.height() as i64 - 1) {
        for x in (cx - radius).max(0)..=(cx + radius).min(img.width() as i64 - 1) {
            let dx = x as f64 - center.x;
            let dy = y as f64 - center.y;
            let w = (-(dx * dx + dy * dy) * inv_two_sigma_sq).exp() as f32;
            let v = img.get(x as usize, y as usize, 0);
            img.set(x as usize, y as usize, 0, v + amplitude * w);
        }
    }
}

/// Busy single-channel texture of overlapping Gaussian blobs plus faint noise.
pub fn textured_image(width: usize, height: usize, seed: u64) -> Image {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = constant_image(width, height, 1, 0.1);

    let blobs = (width * height) / 60;
    for _ in 0..blobs {
        let center = DVec2::new(
            rng.random_range(0.0..width as f64),
            rng.random_range(0.0..height as f64),
        );
        let sigma = rng.random_range(1.2..3.0);
        let amplitude = rng.random_range(0.2f32..1.0);
        add_gaussian(&mut img, center, sigma, amplitude);
    }

    for v in img.pixels_mut() {
        *v += rng.random_range(-0.005f32..0.005);
    }
    img
}

/// Star field with Gaussian stars on a flat background. Returns the image and star centers.
pub fn star_field(width: usize, height: usize, count: usize, seed: u64) -> (Image, Vec<DVec2>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = constant_image(width, height, 1, 0.05);
    let margin = 10.0;
    let min_separation = 8.0;

    let mut stars: Vec<DVec2> = Vec::with_capacity(count);
    let mut attempts = 0;
    while stars.len() < count && attempts < count * 100 {
        attempts += 1;
        let candidate = DVec2::new(
            rng.random_range(margin..width as f64 - margin),
            rng.random_range(margin..height as f64 - margin),
        );
        if stars
            .iter()
            .all(|s| s.distance(candidate) >= min_separation)
        {
            stars.push(candidate);
        }
    }

    for &star in &stars {
        let amplitude = rng.random_range(0.4f32..1.0);
        add_gaussian(&mut img, star, 1.5, amplitude);
    }
    for v in img.pixels_mut() {
        *v += rng.random_range(-0.002f32..0.002);
    }

    (img, stars)
}

/// Copy of `image` shifted by an integer offset; uncovered pixels are zero.
pub fn translate(image: &Image, dx: i64, dy: i64) -> Image {
    let dims = image.dimensions();
    let mut out = Image::try_new(dims).unwrap();
    for y in 0..dims.height as i64 {
        for x in 0..dims.width as i64 {
            let sx = x - dx;
            let sy = y - dy;
            if sx < 0 || sy < 0 || sx >= dims.width as i64 || sy >= dims.height as i64 {
                continue;
            }
            for c in 0..dims.channels {
                out.set(
                    x as usize,
                    y as usize,
                    c,
                    image.get(sx as usize, sy as usize, c),
                );
            }
        }
    }
    out
}
