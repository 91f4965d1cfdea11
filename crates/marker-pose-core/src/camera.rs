//! Pinhole camera intrinsics with OpenCV-ordered lens distortion.
//!
//! Coefficients follow `k1, k2, p1, p2[, k3[, k4, k5, k6]]`; the rational
//! terms `k4..k6` are only used when all eight coefficients are supplied.

use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

const UNDISTORT_MAX_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-14;

/// Errors produced when validating [`Intrinsics`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntrinsicsError {
    #[error("focal lengths must be finite and positive (fx={fx}, fy={fy})")]
    InvalidFocalLength { fx: f64, fy: f64 },
    #[error("principal point must be finite (ppx={ppx}, ppy={ppy})")]
    InvalidPrincipalPoint { ppx: f64, ppy: f64 },
    #[error("unsupported distortion vector length {0} (expected 0, 4, 5 or 8)")]
    UnsupportedDistortionLength(usize),
    #[error("distortion coefficient {index} is not finite")]
    NonFiniteDistortion { index: usize },
}

/// Fixed projection parameters of one capture session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length along x, pixels.
    pub fx: f64,
    /// Focal length along y, pixels.
    pub fy: f64,
    /// Principal point x, pixels.
    pub ppx: f64,
    /// Principal point y, pixels.
    pub ppy: f64,
    /// Distortion coefficients, possibly empty.
    #[serde(default)]
    pub distortion: Vec<f64>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Coeffs {
    k1: f64,
    k2: f64,
    p1: f64,
    p2: f64,
    k3: f64,
    k4: f64,
    k5: f64,
    k6: f64,
}

impl Coeffs {
    fn from_slice(d: &[f64]) -> Self {
        let at = |i: usize| d.get(i).copied().unwrap_or(0.0);
        Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        }
    }

    fn radial(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        num / den
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        (
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }
}

impl Intrinsics {
    /// Build validated intrinsics.
    pub fn new(
        fx: f64,
        fy: f64,
        ppx: f64,
        ppy: f64,
        distortion: Vec<f64>,
    ) -> Result<Self, IntrinsicsError> {
        let intrinsics = Self {
            fx,
            fy,
            ppx,
            ppy,
            distortion,
        };
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Distortion-free pinhole intrinsics.
    pub fn pinhole(fx: f64, fy: f64, ppx: f64, ppy: f64) -> Result<Self, IntrinsicsError> {
        Self::new(fx, fy, ppx, ppy, Vec::new())
    }

    /// Check the invariants required by projection and pose estimation.
    pub fn validate(&self) -> Result<(), IntrinsicsError> {
        if !(self.fx.is_finite() && self.fy.is_finite() && self.fx > 0.0 && self.fy > 0.0) {
            return Err(IntrinsicsError::InvalidFocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        if !(self.ppx.is_finite() && self.ppy.is_finite()) {
            return Err(IntrinsicsError::InvalidPrincipalPoint {
                ppx: self.ppx,
                ppy: self.ppy,
            });
        }
        if !matches!(self.distortion.len(), 0 | 4 | 5 | 8) {
            return Err(IntrinsicsError::UnsupportedDistortionLength(
                self.distortion.len(),
            ));
        }
        if let Some(index) = self.distortion.iter().position(|c| !c.is_finite()) {
            return Err(IntrinsicsError::NonFiniteDistortion { index });
        }
        Ok(())
    }

    /// `K = [[fx, 0, ppx], [0, fy, ppy], [0, 0, 1]]`.
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.ppx, //
            0.0, self.fy, self.ppy, //
            0.0, 0.0, 1.0,
        )
    }

    /// True when no coefficient is non-zero.
    #[inline]
    pub fn is_distortion_free(&self) -> bool {
        self.distortion.iter().all(|&c| c == 0.0)
    }

    /// Project a camera-frame point to pixels, or `None` when `z <= 0`.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if !(p.z > 0.0) {
            return None;
        }
        let px = self.normalized_to_pixel(Point2::new(p.x / p.z, p.y / p.z));
        (px.x.is_finite() && px.y.is_finite()).then_some(px)
    }

    /// Apply distortion to a normalized point and map it through `K`.
    pub fn normalized_to_pixel(&self, n: Point2<f64>) -> Point2<f64> {
        let (x, y) = if self.is_distortion_free() {
            (n.x, n.y)
        } else {
            let c = Coeffs::from_slice(&self.distortion);
            let r2 = n.x * n.x + n.y * n.y;
            let radial = c.radial(r2);
            let (dx, dy) = c.tangential(n.x, n.y, r2);
            (n.x * radial + dx, n.y * radial + dy)
        };
        Point2::new(self.fx * x + self.ppx, self.fy * y + self.ppy)
    }

    /// Map a distorted pixel to undistorted normalized coordinates.
    ///
    /// The distortion model is inverted by fixed-point iteration. If the
    /// radial factor collapses the last finite estimate is returned.
    pub fn undistort(&self, px: Point2<f64>) -> Point2<f64> {
        let x0 = (px.x - self.ppx) / self.fx;
        let y0 = (px.y - self.ppy) / self.fy;
        if self.is_distortion_free() {
            return Point2::new(x0, y0);
        }

        let c = Coeffs::from_slice(&self.distortion);
        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_MAX_ITERS {
            let r2 = x * x + y * y;
            let radial = c.radial(r2);
            if !(radial.is_finite() && radial > 0.0) {
                break;
            }
            let (dx, dy) = c.tangential(x, y, r2);
            let nx = (x0 - dx) / radial;
            let ny = (y0 - dy) / radial;
            if !(nx.is_finite() && ny.is_finite()) {
                break;
            }
            let step = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
            x = nx;
            y = ny;
            if step < UNDISTORT_EPS {
                break;
            }
        }
        Point2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d435_like() -> Intrinsics {
        Intrinsics::new(
            615.3,
            615.9,
            320.1,
            240.4,
            vec![-0.08, 0.03, 0.0008, -0.0005, 0.0],
        )
        .expect("valid intrinsics")
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            Intrinsics::pinhole(0.0, 600.0, 320.0, 240.0),
            Err(IntrinsicsError::InvalidFocalLength { fx: 0.0, fy: 600.0 })
        );
        assert_eq!(
            Intrinsics::new(600.0, 600.0, 320.0, 240.0, vec![0.0; 3]),
            Err(IntrinsicsError::UnsupportedDistortionLength(3))
        );
        assert_eq!(
            Intrinsics::new(600.0, 600.0, 320.0, 240.0, vec![0.0, f64::NAN, 0.0, 0.0]),
            Err(IntrinsicsError::NonFiniteDistortion { index: 1 })
        );
        assert!(Intrinsics::new(600.0, 600.0, 320.0, 240.0, vec![0.0; 5])
            .expect("zero vector")
            .is_distortion_free());
    }

    #[test]
    fn projects_principal_ray_to_principal_point() {
        let k = d435_like();
        let px = k.project(&Point3::new(0.0, 0.0, 2.0)).expect("in front");
        assert!((px.x - k.ppx).abs() < 1e-12);
        assert!((px.y - k.ppy).abs() < 1e-12);
        assert!(k.project(&Point3::new(0.1, 0.0, -1.0)).is_none());
        assert!(k.project(&Point3::new(0.1, 0.0, 0.0)).is_none());
    }

    #[test]
    fn undistort_inverts_projection() {
        let k = d435_like();
        for p in [
            Point3::new(0.1, -0.05, 0.6),
            Point3::new(-0.2, 0.12, 0.9),
            Point3::new(0.0, 0.0, 1.0),
        ] {
            let px = k.project(&p).expect("in front");
            let n = k.undistort(px);
            assert!((n.x - p.x / p.z).abs() < 1e-10, "x {} vs {}", n.x, p.x / p.z);
            assert!((n.y - p.y / p.z).abs() < 1e-10, "y {} vs {}", n.y, p.y / p.z);
        }
    }

    #[test]
    fn rational_model_round_trips() {
        let k = Intrinsics::new(
            800.0,
            800.0,
            640.0,
            360.0,
            vec![0.1, -0.02, 0.0, 0.0, 0.001, 0.05, -0.01, 0.002],
        )
        .expect("valid");
        let px = k.project(&Point3::new(0.15, 0.08, 1.0)).expect("in front");
        let n = k.undistort(px);
        assert!((n.x - 0.15).abs() < 1e-10);
        assert!((n.y - 0.08).abs() < 1e-10);
    }

    #[test]
    fn camera_matrix_layout() {
        let k = d435_like();
        let m = k.camera_matrix();
        assert_eq!(m[(0, 0)], k.fx);
        assert_eq!(m[(1, 1)], k.fy);
        assert_eq!(m[(0, 2)], k.ppx);
        assert_eq!(m[(1, 2)], k.ppy);
        assert_eq!(m[(2, 2)], 1.0);
    }

    #[test]
    fn deserializes_without_distortion_field() {
        let k: Intrinsics =
            serde_json::from_str(r#"{"fx":600.0,"fy":601.0,"ppx":320.0,"ppy":240.0}"#)
                .expect("json");
        assert!(k.distortion.is_empty());
        assert!(k.validate().is_ok());
    }
}
