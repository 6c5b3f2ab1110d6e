//! Direct Linear Transform homography fitting.

use glam::DVec2;
use nalgebra::{DMatrix, SVD};

use crate::registration::transform::Homography;

/// Fit a homography mapping `src` onto `dst` with normalized DLT.
///
/// Exactly determined for four points, least squares beyond that. Returns
/// `None` for fewer than four points or a singular result.
pub(crate) fn estimate_homography(src: &[DVec2], dst: &[DVec2]) -> Option<Homography> {
    debug_assert_eq!(src.len(), dst.len());
    if src.len() < 4 {
        return None;
    }

    let (src_norm, src_t) = normalize_points(src);
    let (dst_norm, dst_t) = normalize_points(dst);

    // Each correspondence (x, y) -> (x', y') contributes two rows:
    // [-x -y -1  0  0  0  x*x'  y*x'  x']
    // [ 0  0  0 -x -y -1  x*y'  y*y'  y']
    let n = src_norm.len();
    let mut a_data = vec![0.0f64; 2 * n * 9];
    for (i, (s, d)) in src_norm.iter().zip(&dst_norm).enumerate() {
        let base = i * 18;
        a_data[base..base + 9]
            .copy_from_slice(&[-s.x, -s.y, -1.0, 0.0, 0.0, 0.0, s.x * d.x, s.y * d.x, d.x]);
        a_data[base + 9..base + 18]
            .copy_from_slice(&[0.0, 0.0, 0.0, -s.x, -s.y, -1.0, s.x * d.y, s.y * d.y, d.y]);
    }
    let a = DMatrix::from_row_slice(2 * n, 9, &a_data);

    let h_norm = Homography::from_row_major(solve_homogeneous_svd(a)?);

    // H = T_dst⁻¹ · H_norm · T_src
    let dst_t_inv = dst_t.inverse()?;
    let h = dst_t_inv.compose(&h_norm).compose(&src_t).normalized()?;

    h.is_valid().then_some(h)
}

/// Translate to the centroid and scale so the mean distance from it is √2.
pub(crate) fn normalize_points(points: &[DVec2]) -> (Vec<DVec2>, Homography) {
    if points.is_empty() {
        return (Vec::new(), Homography::IDENTITY);
    }

    let c = centroid(points);
    let avg_dist = points.iter().map(|p| (*p - c).length()).sum::<f64>() / points.len() as f64;
    if avg_dist < 1e-10 {
        return (points.to_vec(), Homography::IDENTITY);
    }

    let scale = std::f64::consts::SQRT_2 / avg_dist;
    let normalized = points.iter().map(|p| (*p - c) * scale).collect();
    let t = Homography::from_row_major([
        scale,
        0.0,
        -c.x * scale,
        0.0,
        scale,
        -c.y * scale,
        0.0,
        0.0,
        1.0,
    ]);

    (normalized, t)
}

pub(crate) fn centroid(points: &[DVec2]) -> DVec2 {
    if points.is_empty() {
        return DVec2::ZERO;
    }
    points.iter().copied().sum::<DVec2>() / points.len() as f64
}

/// True when any three of the four sample points are nearly collinear.
pub(crate) fn is_degenerate_sample(points: &[DVec2]) -> bool {
    let scale = points
        .iter()
        .flat_map(|a| points.iter().map(move |b| a.distance_squared(*b)))
        .fold(0.0, f64::max);
    if scale < 1e-12 {
        return true;
    }

    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let area = (points[j] - points[i]).perp_dot(points[k] - points[i]).abs();
                if area < 1e-6 * scale {
                    return true;
                }
            }
        }
    }
    false
}

/// Null vector of `a` as row-major entries, via SVD of the design matrix.
///
/// Rows are zero-padded to at least nine so the thin SVD still yields the
/// full set of right singular vectors.
fn solve_homogeneous_svd(a: DMatrix<f64>) -> Option<[f64; 9]> {
    let nrows = a.nrows();
    let ncols = a.ncols();
    let a = if nrows < ncols {
        let mut padded = DMatrix::zeros(ncols, ncols);
        padded.view_mut((0, 0), (nrows, ncols)).copy_from(&a);
        padded
    } else {
        a
    };

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;

    // nalgebra does not guarantee sorted singular values.
    let smallest = svd.singular_values.argmin().0;
    let row = v_t.row(smallest);

    let mut data = [0.0f64; 9];
    for (d, &v) in data.iter_mut().zip(row.iter()) {
        *d = v;
    }
    if data.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(data)
}
