//! Single square-marker pose estimation.
//!
//! The solver is a planar PnP specialised to the four corners of a square:
//! 1. Undistort the image corners into normalized camera coordinates.
//! 2. Fit the model-plane to image homography from the four correspondences.
//! 3. Decompose `H ~ [r1 r2 t]` into an initial rotation and translation.
//! 4. Refine rotation and translation with Levenberg-Marquardt on the
//!    focal-scaled reprojection residuals.
//!
//! Every step is deterministic; the same input always produces the same bits.

use crate::{homography_from_4pt, Intrinsics, Quaternion};
use log::{debug, trace};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a corner set could not produce a pose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateReason {
    NonFiniteCorners,
    TooSmall,
    CollinearCorners,
    SingularHomography,
    NonFinitePose,
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NonFiniteCorners => "corner coordinates are not finite",
            Self::TooSmall => "corner quad is too small",
            Self::CollinearCorners => "three or more corners are collinear",
            Self::SingularHomography => "plane homography is singular",
            Self::NonFinitePose => "solver produced a non-finite pose",
        };
        f.write_str(s)
    }
}

/// Per-marker pose failure. Recoverable: the caller skips this marker only.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoseError {
    #[error("pose degenerate: {reason}")]
    PoseDegenerate { reason: DegenerateReason },
    #[error("marker behind camera (min depth {depth:.6})")]
    MarkerBehindCamera { depth: f64 },
}

/// Errors produced when validating [`MarkerGeometry`].
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum GeometryError {
    #[error("marker edge length must be finite and positive, got {0}")]
    InvalidEdgeLength(f64),
}

/// Physical size of a square marker, identical for every id of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerGeometry {
    /// Edge length in meters.
    pub edge_length: f64,
}

impl MarkerGeometry {
    pub fn new(edge_length: f64) -> Result<Self, GeometryError> {
        if edge_length.is_finite() && edge_length > 0.0 {
            Ok(Self { edge_length })
        } else {
            Err(GeometryError::InvalidEdgeLength(edge_length))
        }
    }

    /// Model corners in the marker frame, z = 0, ordered TL, TR, BR, BL.
    ///
    /// The marker y axis points up, so "top" corners have positive y.
    pub fn object_corners(&self) -> [Point3<f64>; 4] {
        let s = self.edge_length / 2.0;
        [
            Point3::new(-s, s, 0.0),
            Point3::new(s, s, 0.0),
            Point3::new(s, -s, 0.0),
            Point3::new(-s, -s, 0.0),
        ]
    }
}

/// Rigid transform from the marker frame into the camera frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "PoseRecord", from = "PoseRecord")]
pub struct Pose {
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct PoseRecord {
    rvec: [f64; 3],
    tvec: [f64; 3],
}

impl From<Pose> for PoseRecord {
    fn from(p: Pose) -> Self {
        let r = p.rvec();
        let t = p.translation;
        Self {
            rvec: [r.x, r.y, r.z],
            tvec: [t.x, t.y, t.z],
        }
    }
}

impl From<PoseRecord> for Pose {
    fn from(r: PoseRecord) -> Self {
        Pose::from_axis_angle(Vector3::from(r.rvec), Vector3::from(r.tvec))
    }
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_axis_angle(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(rvec), tvec)
    }

    #[inline]
    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    #[inline]
    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    /// Axis-angle form of the rotation (angle in radians times unit axis).
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    pub fn quaternion(&self) -> Quaternion {
        Quaternion::from_rotation(&self.rotation)
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }
}

/// Solver tuning. Defaults suit 640x480 class images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseEstimatorParams {
    /// Minimum distance in pixels between the two farthest corners.
    pub min_extent_px: f64,
    /// Minimum area of any three-corner triangle relative to `extent^2`.
    pub min_relative_area: f64,
    /// Levenberg-Marquardt iterations after the linear solve; 0 disables refinement.
    pub max_refine_iterations: usize,
    /// Allowed `|R^T R - I|` and `|det R - 1|` before re-orthonormalizing.
    pub orthonormal_tolerance: f64,
}

impl Default for PoseEstimatorParams {
    fn default() -> Self {
        Self {
            min_extent_px: 2.0,
            min_relative_area: 1e-3,
            max_refine_iterations: 20,
            orthonormal_tolerance: 1e-6,
        }
    }
}

/// Pose plus its fit quality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub pose: Pose,
    /// RMS pixel distance between the input corners and the reprojected model.
    pub reprojection_rms_px: f64,
}

/// Square-marker pose estimator bound to one marker geometry.
#[derive(Clone, Debug)]
pub struct PoseEstimator {
    geometry: MarkerGeometry,
    params: PoseEstimatorParams,
}

impl PoseEstimator {
    pub fn new(geometry: MarkerGeometry, params: PoseEstimatorParams) -> Self {
        Self { geometry, params }
    }

    #[inline]
    pub fn geometry(&self) -> &MarkerGeometry {
        &self.geometry
    }

    #[inline]
    pub fn params(&self) -> &PoseEstimatorParams {
        &self.params
    }

    /// Estimate the marker pose from its image corners (TL, TR, BR, BL).
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn estimate(
        &self,
        corners: &[Point2<f64>; 4],
        intrinsics: &Intrinsics,
    ) -> Result<PoseEstimate, PoseError> {
        check_corner_quad(corners, &self.params)?;

        let object = self.geometry.object_corners();
        let plane = object.map(|p| Point2::new(p.x, p.y));
        let normalized = corners.map(|c| intrinsics.undistort(c));
        if normalized.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(degenerate(DegenerateReason::NonFiniteCorners));
        }

        let h = homography_from_4pt(&plane, &normalized)
            .ok_or(degenerate(DegenerateReason::SingularHomography))?;
        let (rotation, translation) = decompose_plane_homography(&h.h)?;
        check_cheirality(&object, &rotation, &translation)?;

        let (rotation, translation) = refine_pose(
            &object,
            &normalized,
            intrinsics.fx,
            intrinsics.fy,
            rotation,
            translation,
            self.params.max_refine_iterations,
        );

        let rotation = ensure_orthonormal(rotation, self.params.orthonormal_tolerance)?;
        if translation.iter().any(|v| !v.is_finite()) {
            return Err(degenerate(DegenerateReason::NonFinitePose));
        }
        check_cheirality(&object, &rotation, &translation)?;

        let pose = Pose::new(rotation, translation);
        let reprojection_rms_px = reprojection_rms(&pose, &object, corners, intrinsics);
        debug!(
            "marker pose t=[{:.4}, {:.4}, {:.4}] rms={:.3}px",
            translation.x, translation.y, translation.z, reprojection_rms_px
        );

        Ok(PoseEstimate {
            pose,
            reprojection_rms_px,
        })
    }
}

/// Estimate a pose with default solver parameters.
pub fn estimate_marker_pose(
    corners: &[Point2<f64>; 4],
    geometry: &MarkerGeometry,
    intrinsics: &Intrinsics,
) -> Result<PoseEstimate, PoseError> {
    PoseEstimator::new(*geometry, PoseEstimatorParams::default()).estimate(corners, intrinsics)
}

/// Pixel positions of the marker origin and the tips of its x, y, z axes.
///
/// Returns `None` when any of the four points is not in front of the camera.
pub fn project_axes(
    pose: &Pose,
    intrinsics: &Intrinsics,
    length: f64,
) -> Option<[Point2<f64>; 4]> {
    let pts = [
        Point3::origin(),
        Point3::new(length, 0.0, 0.0),
        Point3::new(0.0, length, 0.0),
        Point3::new(0.0, 0.0, length),
    ];
    let [o, x, y, z] = pts.map(|p| intrinsics.project(&pose.transform_point(&p)));
    Some([o?, x?, y?, z?])
}

fn degenerate(reason: DegenerateReason) -> PoseError {
    PoseError::PoseDegenerate { reason }
}

fn check_corner_quad(
    corners: &[Point2<f64>; 4],
    params: &PoseEstimatorParams,
) -> Result<(), PoseError> {
    if corners.iter().any(|c| !(c.x.is_finite() && c.y.is_finite())) {
        return Err(degenerate(DegenerateReason::NonFiniteCorners));
    }

    let mut extent = 0.0_f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            extent = extent.max((corners[i] - corners[j]).norm());
        }
    }
    if extent < params.min_extent_px {
        return Err(degenerate(DegenerateReason::TooSmall));
    }

    let min_area = params.min_relative_area * extent * extent;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let area = 0.5 * ((b - a).perp(&(c - a))).abs();
        if area < min_area {
            return Err(degenerate(DegenerateReason::CollinearCorners));
        }
    }
    Ok(())
}

// H ~ [r1 r2 t] in normalized coordinates (K = I). `h[(2,2)] == 1` puts the
// marker centre at positive depth; corner depths are checked separately.
fn decompose_plane_homography(
    h: &Matrix3<f64>,
) -> Result<(Rotation3<f64>, Vector3<f64>), PoseError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let denom = h1.norm() + h2.norm();
    let lambda = 2.0 / denom;
    if !lambda.is_finite() || denom < 1e-12 {
        return Err(degenerate(DegenerateReason::SingularHomography));
    }

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    let t = h3 * lambda;

    let m = Matrix3::from_columns(&[r1, r2, r3]);
    let rotation = project_to_so3(&m).ok_or(degenerate(DegenerateReason::SingularHomography))?;
    Ok((rotation, t))
}

fn project_to_so3(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    if m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}

fn ensure_orthonormal(r: Rotation3<f64>, tol: f64) -> Result<Rotation3<f64>, PoseError> {
    let m = r.matrix();
    let drift = (m.transpose() * m - Matrix3::identity()).abs().max();
    let det_err = (m.determinant() - 1.0).abs();
    if !(drift.is_finite() && det_err.is_finite()) {
        return Err(degenerate(DegenerateReason::NonFinitePose));
    }
    if drift <= tol && det_err <= tol {
        return Ok(r);
    }
    trace!("re-orthonormalizing rotation (drift={drift:.3e}, det_err={det_err:.3e})");
    project_to_so3(m).ok_or(degenerate(DegenerateReason::NonFinitePose))
}

fn check_cheirality(
    object: &[Point3<f64>; 4],
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Result<(), PoseError> {
    let min_depth = object
        .iter()
        .map(|p| (rotation * p + translation).z)
        .fold(translation.z, f64::min);
    if min_depth > 0.0 {
        Ok(())
    } else {
        Err(PoseError::MarkerBehindCamera { depth: min_depth })
    }
}

// Sum of squared focal-scaled residuals, `None` if a point is not in front.
fn reprojection_cost(
    object: &[Point3<f64>; 4],
    normalized: &[Point2<f64>; 4],
    fx: f64,
    fy: f64,
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
) -> Option<f64> {
    let mut cost = 0.0;
    for (p, n) in object.iter().zip(normalized) {
        let pc = rotation * p + translation;
        if !(pc.z > 0.0) {
            return None;
        }
        let ex = fx * (pc.x / pc.z - n.x);
        let ey = fy * (pc.y / pc.z - n.y);
        cost += ex * ex + ey * ey;
    }
    cost.is_finite().then_some(cost)
}

fn refine_pose(
    object: &[Point3<f64>; 4],
    normalized: &[Point2<f64>; 4],
    fx: f64,
    fy: f64,
    mut rotation: Rotation3<f64>,
    mut translation: Vector3<f64>,
    max_iterations: usize,
) -> (Rotation3<f64>, Vector3<f64>) {
    let Some(mut cost) = reprojection_cost(object, normalized, fx, fy, &rotation, &translation)
    else {
        return (rotation, translation);
    };
    let mut mu = 1e-3;

    for iter in 0..max_iterations {
        if cost < 1e-24 {
            break;
        }

        let mut jtj = SMatrix::<f64, 6, 6>::zeros();
        let mut jtr = SVector::<f64, 6>::zeros();
        for (p, n) in object.iter().zip(normalized) {
            let rp = rotation * p;
            let pc = rp + translation;
            let inv_z = 1.0 / pc.z;
            let res = [fx * (pc.x * inv_z - n.x), fy * (pc.y * inv_z - n.y)];

            // d(residual)/d(pc)
            let a = SMatrix::<f64, 2, 3>::new(
                fx * inv_z,
                0.0,
                -fx * pc.x * inv_z * inv_z,
                0.0,
                fy * inv_z,
                -fy * pc.y * inv_z * inv_z,
            );
            // Left perturbation R <- exp(w) R: d(pc)/dw = -[R p]x
            let j_rot = a * (-rp.coords.cross_matrix());
            let mut j = SMatrix::<f64, 2, 6>::zeros();
            j.fixed_view_mut::<2, 3>(0, 0).copy_from(&j_rot);
            j.fixed_view_mut::<2, 3>(0, 3).copy_from(&a);

            jtj += j.transpose() * j;
            jtr += j.transpose() * SVector::<f64, 2>::new(res[0], res[1]);
        }

        let mut damped = jtj;
        for d in 0..6 {
            damped[(d, d)] += mu * jtj[(d, d)].max(1e-12);
        }
        let Some(chol) = damped.cholesky() else {
            mu *= 10.0;
            continue;
        };
        let delta = -chol.solve(&jtr);

        let w = Vector3::new(delta[0], delta[1], delta[2]);
        let dt = Vector3::new(delta[3], delta[4], delta[5]);
        let cand_r = Rotation3::new(w) * rotation;
        let cand_t = translation + dt;

        match reprojection_cost(object, normalized, fx, fy, &cand_r, &cand_t) {
            Some(c) if c < cost => {
                rotation = cand_r;
                translation = cand_t;
                cost = c;
                mu = (mu * 0.1).max(1e-12);
                if delta.norm() < 1e-12 {
                    trace!("refinement converged after {} iterations", iter + 1);
                    break;
                }
            }
            _ => {
                mu *= 10.0;
                if mu > 1e8 {
                    break;
                }
            }
        }
    }

    (rotation, translation)
}

fn reprojection_rms(
    pose: &Pose,
    object: &[Point3<f64>; 4],
    corners: &[Point2<f64>; 4],
    intrinsics: &Intrinsics,
) -> f64 {
    let mut sum = 0.0;
    for (p, c) in object.iter().zip(corners) {
        match intrinsics.project(&pose.transform_point(p)) {
            Some(px) => sum += (px - c).norm_squared(),
            None => return f64::INFINITY,
        }
    }
    (sum / 4.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> Intrinsics {
        Intrinsics::pinhole(600.0, 600.0, 320.0, 240.0).expect("valid")
    }

    fn project_exact(pose: &Pose, geometry: &MarkerGeometry, k: &Intrinsics) -> [Point2<f64>; 4] {
        geometry
            .object_corners()
            .map(|p| k.project(&pose.transform_point(&p)).expect("in front"))
    }

    #[test]
    fn rejects_invalid_edge_length() {
        assert!(MarkerGeometry::new(0.0).is_err());
        assert!(MarkerGeometry::new(-0.03).is_err());
        assert!(MarkerGeometry::new(f64::NAN).is_err());
        assert!(MarkerGeometry::new(0.03).is_ok());
    }

    #[test]
    fn object_corners_follow_detector_winding() {
        let g = MarkerGeometry::new(0.04).expect("valid");
        let c = g.object_corners();
        assert_eq!(c[0], Point3::new(-0.02, 0.02, 0.0));
        assert_eq!(c[1], Point3::new(0.02, 0.02, 0.0));
        assert_eq!(c[2], Point3::new(0.02, -0.02, 0.0));
        assert_eq!(c[3], Point3::new(-0.02, -0.02, 0.0));
    }

    #[test]
    fn fronto_parallel_marker_is_recovered() {
        let g = MarkerGeometry::new(0.05).expect("valid");
        let k = intrinsics();
        // Marker y up, camera y down: a half turn about x faces the camera.
        let truth = Pose::from_axis_angle(
            Vector3::new(std::f64::consts::PI, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.5),
        );
        let corners = project_exact(&truth, &g, &k);
        // Top-left corner sits up and to the left of the principal point.
        assert!(corners[0].x < 320.0 && corners[0].y < 240.0);

        let est = estimate_marker_pose(&corners, &g, &k).expect("pose");
        assert!((est.pose.translation() - truth.translation()).norm() < 1e-9);
        assert!(est.pose.rotation().angle_to(truth.rotation()) < 1e-9);
        assert!(est.reprojection_rms_px < 1e-6);
    }

    #[test]
    fn oblique_pose_round_trips() {
        let g = MarkerGeometry::new(0.05).expect("valid");
        let k = Intrinsics::pinhole(615.3, 615.9, 320.1, 240.4).expect("valid");
        let truth = Pose::from_axis_angle(
            Vector3::new(0.3, -0.2, 0.1),
            Vector3::new(0.05, -0.03, 0.6),
        );
        let corners = project_exact(&truth, &g, &k);

        let est = estimate_marker_pose(&corners, &g, &k).expect("pose");
        assert!((est.pose.translation() - truth.translation()).norm() < 1e-6);
        assert!(est.pose.rotation().angle_to(truth.rotation()) < 1e-6);
        assert!(est.pose.quaternion().angle_to(&truth.quaternion()) < 1e-6);
    }

    #[test]
    fn distorted_corners_round_trip() {
        let g = MarkerGeometry::new(0.03).expect("valid");
        let k = Intrinsics::new(
            615.3,
            615.9,
            320.1,
            240.4,
            vec![-0.08, 0.03, 0.0008, -0.0005, 0.0],
        )
        .expect("valid");
        let truth = Pose::from_axis_angle(
            Vector3::new(2.8, 0.3, -0.2),
            Vector3::new(-0.08, 0.04, 0.45),
        );
        let corners = project_exact(&truth, &g, &k);

        let est = estimate_marker_pose(&corners, &g, &k).expect("pose");
        assert!((est.pose.translation() - truth.translation()).norm() < 1e-6);
        assert!(est.pose.rotation().angle_to(truth.rotation()) < 1e-6);
        assert!(est.reprojection_rms_px < 1e-4);
    }

    #[test]
    fn refinement_reduces_noisy_residual() {
        let g = MarkerGeometry::new(0.05).expect("valid");
        let k = intrinsics();
        let truth = Pose::from_axis_angle(
            Vector3::new(2.9, -0.4, 0.2),
            Vector3::new(0.02, 0.01, 0.5),
        );
        let mut corners = project_exact(&truth, &g, &k);
        corners[0].x += 0.4;
        corners[2].y -= 0.3;

        let linear = PoseEstimator::new(
            g,
            PoseEstimatorParams {
                max_refine_iterations: 0,
                ..PoseEstimatorParams::default()
            },
        )
        .estimate(&corners, &k)
        .expect("pose");
        let refined = estimate_marker_pose(&corners, &g, &k).expect("pose");
        assert!(refined.reprojection_rms_px <= linear.reprojection_rms_px);
        assert!((refined.pose.translation() - truth.translation()).norm() < 5e-3);
    }

    #[test]
    fn estimation_is_bit_deterministic() {
        let g = MarkerGeometry::new(0.05).expect("valid");
        let k = intrinsics();
        let corners = [
            Point2::new(281.3, 197.2),
            Point2::new(362.8, 201.9),
            Point2::new(358.1, 284.4),
            Point2::new(277.6, 279.0),
        ];
        let a = estimate_marker_pose(&corners, &g, &k).expect("pose");
        let b = estimate_marker_pose(&corners, &g, &k).expect("pose");
        assert_eq!(
            a.pose.rvec().map(f64::to_bits),
            b.pose.rvec().map(f64::to_bits)
        );
        assert_eq!(
            a.pose.translation().map(f64::to_bits),
            b.pose.translation().map(f64::to_bits)
        );
        assert_eq!(
            a.reprojection_rms_px.to_bits(),
            b.reprojection_rms_px.to_bits()
        );
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(300.0, 100.0),
            Point2::new(150.0, 300.0),
        ];
        let g = MarkerGeometry::new(0.03).expect("valid");
        assert_eq!(
            estimate_marker_pose(&corners, &g, &intrinsics()),
            Err(PoseError::PoseDegenerate {
                reason: DegenerateReason::CollinearCorners
            })
        );
    }

    #[test]
    fn corners_on_one_line_enclose_no_area() {
        let g = MarkerGeometry::new(0.03).expect("valid");
        let horizontal = [100.0, 200.0, 300.0, 400.0].map(|x| Point2::new(x, 100.0));
        let diagonal = [
            Point2::new(50.0, 40.0),
            Point2::new(150.0, 140.0),
            Point2::new(250.0, 240.0),
            Point2::new(400.0, 390.0),
        ];
        for corners in [horizontal, diagonal] {
            assert_eq!(
                estimate_marker_pose(&corners, &g, &intrinsics()),
                Err(PoseError::PoseDegenerate {
                    reason: DegenerateReason::CollinearCorners
                }),
                "{corners:?}"
            );
        }
    }

    #[test]
    fn marker_straddling_image_plane_is_behind_camera() {
        let g = MarkerGeometry::new(0.1).expect("valid");
        let k = intrinsics();
        // Tilted 60 degrees about x and pushed back through the camera
        // centre: the top edge is in front, the bottom edge is behind.
        let pose = Pose::from_axis_angle(
            Vector3::new(std::f64::consts::FRAC_PI_3, 0.0, 0.0),
            Vector3::new(0.0, 0.0, -0.01),
        );
        let corners = g.object_corners().map(|p| {
            let c = pose.transform_point(&p);
            Point2::new(k.fx * c.x / c.z + k.ppx, k.fy * c.y / c.z + k.ppy)
        });

        match estimate_marker_pose(&corners, &g, &k) {
            Err(PoseError::MarkerBehindCamera { depth }) => assert!(depth < 0.0, "depth {depth}"),
            other => panic!("expected MarkerBehindCamera, got {other:?}"),
        }
    }

    #[test]
    fn too_small_quad_is_degenerate() {
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(100.5, 100.0),
            Point2::new(100.5, 100.5),
            Point2::new(100.0, 100.5),
        ];
        let g = MarkerGeometry::new(0.03).expect("valid");
        assert_eq!(
            estimate_marker_pose(&corners, &g, &intrinsics()),
            Err(PoseError::PoseDegenerate {
                reason: DegenerateReason::TooSmall
            })
        );
    }

    #[test]
    fn nan_corner_is_degenerate() {
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(f64::NAN, 100.0),
            Point2::new(200.0, 200.0),
            Point2::new(100.0, 200.0),
        ];
        let g = MarkerGeometry::new(0.03).expect("valid");
        assert_eq!(
            estimate_marker_pose(&corners, &g, &intrinsics()),
            Err(PoseError::PoseDegenerate {
                reason: DegenerateReason::NonFiniteCorners
            })
        );
    }

    #[test]
    fn project_axes_starts_at_marker_origin() {
        let k = intrinsics();
        let pose = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(0.0, 0.0, 1.0));
        let [o, x, y, z] = project_axes(&pose, &k, 0.1).expect("in front");
        assert_eq!(o, Point2::new(320.0, 240.0));
        assert!((x.x - 380.0).abs() < 1e-9);
        assert!((y.y - 300.0).abs() < 1e-9);
        // z axis points straight at the principal point, farther away
        assert!((z - o).norm() < 1e-9);

        let behind = Pose::from_axis_angle(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        assert!(project_axes(&behind, &k, 0.1).is_none());
    }

    #[test]
    fn pose_serializes_as_rvec_tvec() {
        let pose = Pose::from_axis_angle(Vector3::new(0.1, 0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let json = serde_json::to_value(&pose).expect("serialize");
        let tvec: Vec<f64> = serde_json::from_value(json["tvec"].clone()).expect("tvec");
        assert_eq!(tvec, vec![1.0, 2.0, 3.0]);
        let back: Pose = serde_json::from_value(json).expect("deserialize");
        assert!(back.rotation().angle_to(pose.rotation()) < 1e-12);
    }
}
