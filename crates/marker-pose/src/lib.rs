//! High-level facade crate for the `marker-pose-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - the `marker-pose` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! Replay a recording through the full pipeline and stream results as JSON
//! lines:
//!
//! ```no_run
//! use marker_pose::pipeline::{
//!     JsonLinesRenderer, NeverCancel, PoseSession, ReplayDetector, ReplaySource, SessionConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let detector = ReplayDetector::new();
//! let source = ReplaySource::new("session.json", &detector);
//! let mut renderer = JsonLinesRenderer::create("poses.jsonl")?;
//!
//! let mut session = PoseSession::new(SessionConfig::default(), detector)?;
//! let summary = session.run(&source, None, &mut renderer, &mut NeverCancel)?;
//! println!("{} frames, {} poses", summary.frames_processed, summary.markers_estimated);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `marker_pose::core`: intrinsics, homography, pose solver, quaternions, frames.
//! - `marker_pose::aruco`: dictionaries, observations, the detector trait.
//! - `marker_pose::pipeline`: capture fallback, session controller, renderers, replay.

pub use marker_pose_aruco as aruco;
pub use marker_pose_core as core;
pub use marker_pose_pipeline as pipeline;

pub use marker_pose_aruco::{DictionaryId, MarkerDetector, MarkerObservation};
pub use marker_pose_core::{
    estimate_marker_pose, Intrinsics, MarkerGeometry, Pose, PoseError, PoseEstimate, Quaternion,
};
pub use marker_pose_pipeline::{FrameResult, PoseSession, SessionConfig, SessionError};
