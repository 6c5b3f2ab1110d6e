//! Projective transform between image planes.

use glam::{DMat3, DVec2, DVec3};

/// 3×3 projective transform acting on homogeneous pixel coordinates.
///
/// Stored as a glam column-major matrix; `from_row_major`/`to_row_major`
/// convert from and to the conventional row-major reading order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: DMat3,
}

impl Default for Homography {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Homography {
    pub const IDENTITY: Homography = Homography {
        matrix: DMat3::IDENTITY,
    };

    pub fn from_matrix(matrix: DMat3) -> Self {
        Self { matrix }
    }

    /// [h00, h01, h02, h10, h11, h12, h20, h21, h22]
    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self {
            matrix: DMat3::from_cols_array(&values).transpose(),
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self::from_row_major([1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0])
    }

    pub fn matrix(&self) -> DMat3 {
        self.matrix
    }

    pub fn to_row_major(&self) -> [f64; 9] {
        self.matrix.transpose().to_cols_array()
    }

    /// Map a point. Points sent to infinity come back non-finite.
    #[inline]
    pub fn apply(&self, p: DVec2) -> DVec2 {
        let v = self.matrix * DVec3::new(p.x, p.y, 1.0);
        DVec2::new(v.x / v.z, v.y / v.z)
    }

    /// `self` applied after `other`.
    pub fn compose(&self, other: &Homography) -> Homography {
        Homography {
            matrix: self.matrix * other.matrix,
        }
    }

    pub fn inverse(&self) -> Option<Homography> {
        let det = self.matrix.determinant();
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        Some(Homography {
            matrix: self.matrix.inverse(),
        })
    }

    /// Scale so the bottom-right entry is 1. Returns `None` when it is ~0.
    pub fn normalized(&self) -> Option<Homography> {
        let h22 = self.matrix.z_axis.z;
        if !h22.is_finite() || h22.abs() < 1e-12 {
            return None;
        }
        Some(Homography {
            matrix: self.matrix * (1.0 / h22),
        })
    }

    /// Finite entries and an invertible matrix.
    pub fn is_valid(&self) -> bool {
        self.to_row_major().iter().all(|v| v.is_finite()) && self.inverse().is_some()
    }

    /// Largest absolute entry difference from the identity after normalization.
    pub fn deviation_from_identity(&self) -> f64 {
        let Some(h) = self.normalized() else {
            return f64::INFINITY;
        };
        h.to_row_major()
            .iter()
            .zip(Homography::IDENTITY.to_row_major())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
