//! Rotation to quaternion conversion.
//!
//! Quaternions are reported in `(x, y, z, w)` order and always lie in the
//! `w >= 0` hemisphere. When `w == 0` the first non-zero vector component is
//! made positive, so every rotation has exactly one representative.

use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Unit quaternion `x i + y j + z k + w`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Convert a proper rotation matrix with Shepperd's method.
    ///
    /// The branch is chosen by the largest of `trace, m00, m11, m22`, which
    /// keeps the divisor away from zero.
    pub fn from_rotation_matrix(m: &Matrix3<f64>) -> Self {
        let (m00, m11, m22) = (m[(0, 0)], m[(1, 1)], m[(2, 2)]);
        let trace = m00 + m11 + m22;

        let q = if trace >= m00 && trace >= m11 && trace >= m22 {
            let s = 2.0 * (1.0 + trace).sqrt();
            Self {
                w: 0.25 * s,
                x: (m[(2, 1)] - m[(1, 2)]) / s,
                y: (m[(0, 2)] - m[(2, 0)]) / s,
                z: (m[(1, 0)] - m[(0, 1)]) / s,
            }
        } else if m00 >= m11 && m00 >= m22 {
            let s = 2.0 * (1.0 + m00 - m11 - m22).sqrt();
            Self {
                w: (m[(2, 1)] - m[(1, 2)]) / s,
                x: 0.25 * s,
                y: (m[(0, 1)] + m[(1, 0)]) / s,
                z: (m[(0, 2)] + m[(2, 0)]) / s,
            }
        } else if m11 >= m22 {
            let s = 2.0 * (1.0 - m00 + m11 - m22).sqrt();
            Self {
                w: (m[(0, 2)] - m[(2, 0)]) / s,
                x: (m[(0, 1)] + m[(1, 0)]) / s,
                y: 0.25 * s,
                z: (m[(1, 2)] + m[(2, 1)]) / s,
            }
        } else {
            let s = 2.0 * (1.0 - m00 - m11 + m22).sqrt();
            Self {
                w: (m[(1, 0)] - m[(0, 1)]) / s,
                x: (m[(0, 2)] + m[(2, 0)]) / s,
                y: (m[(1, 2)] + m[(2, 1)]) / s,
                z: 0.25 * s,
            }
        };

        q.normalized().canonical()
    }

    pub fn from_rotation(r: &Rotation3<f64>) -> Self {
        Self::from_rotation_matrix(r.matrix())
    }

    /// Convert an axis-angle (Rodrigues) vector.
    pub fn from_axis_angle(rvec: &Vector3<f64>) -> Self {
        Self::from_rotation(&Rotation3::new(*rvec))
    }

    #[inline]
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Rotation matrix of this (unit) quaternion.
    pub fn to_rotation_matrix(&self) -> Matrix3<f64> {
        let Self { x, y, z, w } = *self;
        Matrix3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - z * w),
            2.0 * (x * z + y * w),
            2.0 * (x * y + z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - x * w),
            2.0 * (x * z - y * w),
            2.0 * (y * z + x * w),
            1.0 - 2.0 * (x * x + y * y),
        )
    }

    /// Angle in radians of the relative rotation between `self` and `other`.
    pub fn angle_to(&self, other: &Self) -> f64 {
        let dot = self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w;
        2.0 * dot.abs().min(1.0).acos()
    }

    fn normalized(self) -> Self {
        let n = self.norm();
        Self {
            x: self.x / n,
            y: self.y / n,
            z: self.z / n,
            w: self.w / n,
        }
    }

    fn canonical(self) -> Self {
        let leading = [self.w, self.x, self.y, self.z]
            .into_iter()
            .find(|&c| c != 0.0)
            .unwrap_or(1.0);
        if leading < 0.0 {
            Self {
                x: -self.x,
                y: -self.y,
                z: -self.z,
                w: -self.w,
            }
        } else {
            self
        }
    }
}

impl From<&Rotation3<f64>> for Quaternion {
    fn from(r: &Rotation3<f64>) -> Self {
        Self::from_rotation(r)
    }
}
