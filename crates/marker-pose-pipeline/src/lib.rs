//! Frame pipeline controller for square-marker pose estimation.
//!
//! A [`PoseSession`] opens a [`CaptureSource`] (falling back to a secondary
//! one), resolves the camera intrinsics once, and then for every frame runs
//! the [`MarkerDetector`](marker_pose_aruco::MarkerDetector), estimates one
//! pose per observation and hands the [`FrameResult`] to a [`Renderer`].
//! A [`CancelSource`] is polled between frames.
//!
//! Collaborators shipped here:
//! - [`ReplaySource`] / [`ReplayDetector`] for JSON recordings,
//! - [`LogRenderer`], [`JsonLinesRenderer`] and [`OverlayRenderer`],
//! - [`NeverCancel`], [`FrameBudget`] and [`CancelFlag`].

mod cancel;
mod capture;
mod config;
mod error;
mod overlay;
mod render;
mod replay;
mod result;
mod session;

pub use cancel::{CancelFlag, CancelSource, FrameBudget, NeverCancel};
pub use capture::{
    open_with_fallback, CaptureRequest, CaptureSource, CaptureStream, OpenedStream, StreamGuard,
};
pub use config::SessionConfig;
pub use error::{CaptureError, ConfigError, RenderError, SessionError};
pub use overlay::OverlayRenderer;
pub use render::{JsonLinesRenderer, LogRenderer, Renderer, SessionInfo};
pub use replay::{RecordedFrame, Recording, ReplayDetector, ReplaySource};
pub use result::{FrameResult, MarkerOutcome, MarkerPoseEntry};
pub use session::{PoseSession, SessionState, SessionSummary, StopReason};
