//! Point-source detection for sparse star fields.
//!
//! Stars are local maxima of the smoothed frame above a robust background
//! threshold. Each star is described by the sorted distances to its nearest
//! neighbours, divided by the farthest of them, which survives translation,
//! rotation and uniform scale.

use glam::DVec2;

use super::{Descriptor, Keypoint};
use crate::image::{Image, ImageError, Kernel};
use crate::math::{mad_to_sigma, median_and_mad_f32_mut};
use crate::registration::config::RegistrationConfig;

/// Half-size of the centroid window.
const CENTROID_RADIUS: usize = 2;

struct Star {
    pos: DVec2,
    peak: f32,
}

pub(super) fn detect(
    gray: &Image,
    kernel: &Kernel,
    config: &RegistrationConfig,
) -> Result<Vec<Keypoint>, ImageError> {
    let width = gray.width();
    let height = gray.height();
    if width <= 2 * CENTROID_RADIUS || height <= 2 * CENTROID_RADIUS {
        return Ok(Vec::new());
    }

    let smoothed = gray.convolve(kernel)?;
    let mut scratch = smoothed.pixels().to_vec();
    let (background, mad) = median_and_mad_f32_mut(&mut scratch);
    let threshold = background + config.star_sigma * mad_to_sigma(mad);

    let mut stars = find_stars(gray, &smoothed, background, threshold);
    stars.sort_by(|a, b| b.peak.total_cmp(&a.peak));
    stars.truncate(config.max_keypoints);

    tracing::debug!(
        stars = stars.len(),
        background,
        threshold,
        "star detection"
    );

    Ok(describe(&stars, config.star_neighbors))
}

/// Peaks are found on `smoothed`; centroids are measured on the unsmoothed `gray`.
fn find_stars(gray: &Image, smoothed: &Image, background: f32, threshold: f32) -> Vec<Star> {
    let width = smoothed.width();
    let height = smoothed.height();
    let data = smoothed.pixels();
    let raw = gray.pixels();
    let r = CENTROID_RADIUS;

    let mut stars = Vec::new();
    for y in r..height - r {
        for x in r..width - r {
            let v = data[y * width + x];
            if v <= threshold || !super::orb::is_local_max(data, width, x, y) {
                continue;
            }

            let mut sum = 0.0f64;
            let mut cx = 0.0f64;
            let mut cy = 0.0f64;
            for wy in y - r..=y + r {
                for wx in x - r..=x + r {
                    let w = (raw[wy * width + wx] - background).max(0.0) as f64;
                    sum += w;
                    cx += w * wx as f64;
                    cy += w * wy as f64;
                }
            }
            if sum <= 0.0 {
                continue;
            }

            stars.push(Star {
                pos: DVec2::new(cx / sum, cy / sum),
                peak: v - background,
            });
        }
    }
    stars
}

/// Stars with fewer than `neighbors` other stars get no keypoint.
fn describe(stars: &[Star], neighbors: usize) -> Vec<Keypoint> {
    if stars.len() <= neighbors {
        return Vec::new();
    }

    let mut distances = Vec::with_capacity(stars.len());
    stars
        .iter()
        .enumerate()
        .filter_map(|(i, star)| {
            distances.clear();
            distances.extend(
                stars
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, other)| star.pos.distance(other.pos)),
            );
            distances.select_nth_unstable_by(neighbors - 1, f64::total_cmp);
            let nearest = &mut distances[..neighbors];
            nearest.sort_by(f64::total_cmp);

            let farthest = nearest[neighbors - 1];
            if farthest <= f64::EPSILON {
                return None;
            }
            let ratios = nearest[..neighbors - 1]
                .iter()
                .map(|&d| (d / farthest) as f32)
                .collect();

            Some(Keypoint {
                pos: star.pos,
                response: star.peak,
                angle: 0.0,
                octave: 0,
                descriptor: Descriptor::Float(ratios),
            })
        })
        .collect()
}
