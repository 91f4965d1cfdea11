//! Geometry core for fiducial marker pose estimation.
//!
//! This crate turns the four image corners of a square marker, plus the
//! camera intrinsics, into a 6-DoF pose and a canonical unit quaternion. It
//! knows nothing about capture devices, detectors or renderers.
//!
//! ```
//! use marker_pose_core::{estimate_marker_pose, Intrinsics, MarkerGeometry};
//! use nalgebra::Point2;
//!
//! let intrinsics = Intrinsics::pinhole(600.0, 600.0, 320.0, 240.0).unwrap();
//! let geometry = MarkerGeometry::new(0.03).unwrap();
//! let corners = [
//!     Point2::new(290.0, 210.0),
//!     Point2::new(350.0, 210.0),
//!     Point2::new(350.0, 270.0),
//!     Point2::new(290.0, 270.0),
//! ];
//! let estimate = estimate_marker_pose(&corners, &geometry, &intrinsics).unwrap();
//! assert!((estimate.pose.translation().z - 0.3).abs() < 1e-9);
//! assert!((estimate.pose.quaternion().norm() - 1.0).abs() < 1e-12);
//! ```

mod camera;
mod frame;
mod homography;
mod logger;
mod orientation;
mod pose;

pub use camera::{Intrinsics, IntrinsicsError};
pub use frame::{FrameError, GrayImage, PixelFormat, RawFrame};
pub use homography::{homography_from_4pt, Homography};
pub use orientation::Quaternion;
pub use pose::{
    estimate_marker_pose, project_axes, DegenerateReason, GeometryError, MarkerGeometry, Pose,
    PoseError, PoseEstimate, PoseEstimator, PoseEstimatorParams,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
