use marker_pose_core::{GeometryError, IntrinsicsError};
use std::path::PathBuf;

/// Failures reported by a capture source or stream.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The device or recording cannot be opened, or exposes no metadata.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    /// One frame was lost; the stream is still usable.
    #[error("frame dropped: {0}")]
    FrameDropped(String),
    /// A finite source has delivered its last frame.
    #[error("end of stream")]
    EndOfStream,
}

/// Errors raised by a [`Renderer`](crate::Renderer).
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("frame buffer does not match {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("{} is not a usable font", path.display())]
    Font { path: PathBuf },
}

/// Errors raised while loading or validating a [`SessionConfig`](crate::SessionConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Intrinsics(#[from] IntrinsicsError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal session errors. The stream is already closed when one is returned.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("no capture source could be started (primary: {primary}; secondary: {secondary})")]
    StreamStartFailed {
        primary: CaptureError,
        secondary: CaptureError,
    },
    #[error("camera intrinsics unavailable: {0}")]
    IntrinsicsUnavailable(CaptureError),
    #[error(transparent)]
    Intrinsics(#[from] IntrinsicsError),
    #[error("capture failed: {0}")]
    Capture(CaptureError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
