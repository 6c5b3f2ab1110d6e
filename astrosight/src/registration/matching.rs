//! Brute-force descriptor matching with cross-check and ratio test.

use rayon::prelude::*;

use crate::registration::features::Keypoint;

/// A descriptor match between a frame keypoint and a reference keypoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub frame_idx: usize,
    pub reference_idx: usize,
    pub distance: f32,
}

/// Nearest and second-nearest candidate for one query keypoint.
#[derive(Debug, Clone, Copy)]
struct Nearest {
    best: Option<(usize, f32)>,
    second: Option<f32>,
}

impl Nearest {
    /// Unambiguous best index, or `None` when the second-best is within `ratio` of it.
    fn accepted(&self, ratio: f32) -> Option<(usize, f32)> {
        let (idx, best) = self.best?;
        match self.second {
            Some(second) if best >= ratio * second => None,
            _ => Some((idx, best)),
        }
    }
}

fn nearest_neighbours(queries: &[Keypoint], candidates: &[Keypoint]) -> Vec<Nearest> {
    queries
        .par_iter()
        .map(|q| {
            let mut nearest = Nearest {
                best: None,
                second: None,
            };
            for (j, c) in candidates.iter().enumerate() {
                let Some(d) = q.descriptor.distance(&c.descriptor) else {
                    continue;
                };
                match nearest.best {
                    Some((_, best)) if d >= best => {
                        if nearest.second.is_none_or(|s| d < s) {
                            nearest.second = Some(d);
                        }
                    }
                    _ => {
                        nearest.second = nearest.best.map(|(_, b)| b);
                        nearest.best = Some((j, d));
                    }
                }
            }
            nearest
        })
        .collect()
}

/// Match `frame` keypoints against `reference` keypoints.
///
/// A pair is kept only when each is the other's nearest neighbour and, in both
/// directions, the best distance is strictly below `ratio` times the second
/// best. Equal best and second-best distances are therefore always rejected.
/// The result is ordered by `frame_idx`.
pub fn match_keypoints(
    frame: &[Keypoint],
    reference: &[Keypoint],
    ratio: f32,
) -> Vec<Correspondence> {
    if frame.is_empty() || reference.is_empty() {
        return Vec::new();
    }

    let forward = nearest_neighbours(frame, reference);
    let backward = nearest_neighbours(reference, frame);

    forward
        .iter()
        .enumerate()
        .filter_map(|(i, nearest)| {
            let (j, distance) = nearest.accepted(ratio)?;
            let (back, _) = backward[j].accepted(ratio)?;
            (back == i).then_some(Correspondence {
                frame_idx: i,
                reference_idx: j,
                distance,
            })
        })
        .collect()
}
