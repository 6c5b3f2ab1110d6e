//! Oriented FAST keypoints with rotated BRIEF descriptors.
//!
//! FAST-9 runs on each level of a bilinear pyramid. Orientation comes from the
//! intensity centroid of a circular patch, and descriptor pairs are rotated by
//! it before sampling the Gaussian-smoothed level.

use std::sync::OnceLock;

use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::{Descriptor, Keypoint, downscale};
use crate::image::{Image, ImageError, Kernel};
use crate::registration::config::RegistrationConfig;

/// Radius of the orientation and descriptor patch.
const PATCH_RADIUS: i32 = 15;

/// Border kept clear of keypoints so rotated samples stay inside the level.
/// ceil(15 × √2) + 1.
const EDGE: usize = 23;

/// Contiguous circle pixels required by FAST.
const FAST_ARC: usize = 9;

const DESCRIPTOR_BITS: usize = 256;

/// Bresenham circle of radius 3, clockwise from 12 o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Sampling pairs `[ax, ay, bx, by]`, fixed for every run so descriptors are comparable.
fn brief_pattern() -> &'static [[f32; 4]; DESCRIPTOR_BITS] {
    static PATTERN: OnceLock<[[f32; 4]; DESCRIPTOR_BITS]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(0xB41EF);
        let half = PATCH_RADIUS as f32 / 2.0;
        let mut pattern = [[0.0f32; 4]; DESCRIPTOR_BITS];
        for pair in pattern.iter_mut() {
            for v in pair.iter_mut() {
                // triangular distribution over [-15, 15], denser near the center
                let t = rng.random_range(-half..=half) + rng.random_range(-half..=half);
                *v = t.round();
            }
        }
        pattern
    })
}

/// Half-widths of the circular patch per row offset.
fn patch_extents() -> &'static [i32; PATCH_RADIUS as usize + 1] {
    static EXTENTS: OnceLock<[i32; PATCH_RADIUS as usize + 1]> = OnceLock::new();
    EXTENTS.get_or_init(|| {
        let mut extents = [0; PATCH_RADIUS as usize + 1];
        let r2 = (PATCH_RADIUS * PATCH_RADIUS) as f32;
        for (dy, e) in extents.iter_mut().enumerate() {
            *e = (r2 - (dy * dy) as f32).sqrt().floor() as i32;
        }
        extents
    })
}

pub(super) fn detect(
    gray: &Image,
    kernel: &Kernel,
    config: &RegistrationConfig,
) -> Result<Vec<Keypoint>, ImageError> {
    let mut level = gray.clone();
    let mut scale = 1.0f64;
    let mut keypoints = Vec::new();

    for octave in 0..config.pyramid_levels {
        if level.width() <= 2 * EDGE || level.height() <= 2 * EDGE {
            break;
        }

        let smoothed = level.convolve(kernel)?;
        let corners = fast_corners(&level, config.fast_threshold);

        keypoints.extend(corners.into_par_iter().map(|(x, y, response)| {
            let angle = orientation(&smoothed, x, y);
            let descriptor = describe(&smoothed, x, y, angle);
            Keypoint {
                pos: DVec2::new(
                    (x as f64 + 0.5) * scale - 0.5,
                    (y as f64 + 0.5) * scale - 0.5,
                ),
                response,
                angle,
                octave: octave as u8,
                descriptor: Descriptor::Binary(descriptor),
            }
        }).collect::<Vec<_>>());

        if octave + 1 < config.pyramid_levels {
            level = downscale(&level, config.pyramid_scale)?;
            scale *= config.pyramid_scale as f64;
        }
    }

    Ok(keypoints)
}

/// FAST-9 corners after 3×3 non-maximum suppression, as (x, y, score).
fn fast_corners(level: &Image, threshold: f32) -> Vec<(usize, usize, f32)> {
    let width = level.width();
    let height = level.height();
    let mut scores = vec![0.0f32; width * height];

    common::parallel::for_each_row_mut(&mut scores, width, |y, row| {
        if y < EDGE || y + EDGE >= height {
            return;
        }
        for (x, score) in row.iter_mut().enumerate().take(width - EDGE).skip(EDGE) {
            *score = fast_score(level, x, y, threshold);
        }
    });

    (EDGE..height - EDGE)
        .into_par_iter()
        .flat_map_iter(|y| {
            let scores = &scores;
            (EDGE..width - EDGE).filter_map(move |x| {
                let s = scores[y * width + x];
                if s > 0.0 && is_local_max(scores, width, x, y) {
                    Some((x, y, s))
                } else {
                    None
                }
            })
        })
        .collect()
}

/// Strict maximum over the 3×3 neighbourhood; ties go to the later pixel in raster order.
#[inline]
pub(super) fn is_local_max(values: &[f32], width: usize, x: usize, y: usize) -> bool {
    let v = values[y * width + x];
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = (x as i32 + dx) as usize;
            let ny = (y as i32 + dy) as usize;
            let n = values[ny * width + nx];
            let earlier = dy < 0 || (dy == 0 && dx < 0);
            if n > v || (earlier && n == v) {
                return false;
            }
        }
    }
    true
}

/// FAST score: summed excess contrast of the qualifying arc, or 0 when not a corner.
fn fast_score(level: &Image, x: usize, y: usize, threshold: f32) -> f32 {
    let width = level.width();
    let data = level.pixels();
    let center = data[y * width + x];
    let hi = center + threshold;
    let lo = center - threshold;

    let mut ring = [0.0f32; 16];
    for (v, &(dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
        *v = data[(y as i32 + dy) as usize * width + (x as i32 + dx) as usize];
    }

    // Any 9-arc covers at least two of the four compass points.
    let compass = [ring[0], ring[4], ring[8], ring[12]];
    let bright_compass = compass.iter().filter(|&&v| v > hi).count();
    let dark_compass = compass.iter().filter(|&&v| v < lo).count();
    if bright_compass < 2 && dark_compass < 2 {
        return 0.0;
    }

    let bright = ring.map(|v| v > hi);
    let dark = ring.map(|v| v < lo);

    let mut score = 0.0f32;
    if has_arc(&bright) {
        score = score.max(ring.iter().filter(|&&v| v > hi).map(|&v| v - hi).sum());
    }
    if has_arc(&dark) {
        score = score.max(ring.iter().filter(|&&v| v < lo).map(|&v| lo - v).sum());
    }
    score
}

#[inline]
fn has_arc(flags: &[bool; 16]) -> bool {
    let mut run = 0;
    for i in 0..16 + FAST_ARC - 1 {
        if flags[i % 16] {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// Intensity-centroid angle of the circular patch around (x, y).
fn orientation(smoothed: &Image, x: usize, y: usize) -> f32 {
    let width = smoothed.width() as i32;
    let height = smoothed.height() as i32;
    let data = smoothed.pixels();
    let extents = patch_extents();

    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        let sy = (y as i32 + dy).clamp(0, height - 1);
        let e = extents[dy.unsigned_abs() as usize];
        for dx in -e..=e {
            let sx = (x as i32 + dx).clamp(0, width - 1);
            let v = data[(sy * width + sx) as usize];
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

/// Rotated BRIEF bits: bit i is set when sample a of pair i is darker than sample b.
fn describe(smoothed: &Image, x: usize, y: usize, angle: f32) -> [u8; 32] {
    let width = smoothed.width() as i32;
    let height = smoothed.height() as i32;
    let data = smoothed.pixels();
    let (sin, cos) = angle.sin_cos();

    let sample = |px: f32, py: f32| -> f32 {
        let rx = (px * cos - py * sin).round() as i32;
        let ry = (px * sin + py * cos).round() as i32;
        let sx = (x as i32 + rx).clamp(0, width - 1);
        let sy = (y as i32 + ry).clamp(0, height - 1);
        data[(sy * width + sx) as usize]
    };

    let mut bits = [0u8; 32];
    for (i, pair) in brief_pattern().iter().enumerate() {
        if sample(pair[0], pair[1]) < sample(pair[2], pair[3]) {
            bits[i / 8] |= 1 << (i % 8);
        }
    }
    bits
}
