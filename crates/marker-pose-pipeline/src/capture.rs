//! Capture seam: sources, streams and the fallback open policy.

use crate::{CaptureError, SessionError};
use log::{debug, info, warn};
use marker_pose_core::{Intrinsics, PixelFormat, RawFrame};
use serde::{Deserialize, Serialize};

/// Stream parameters requested from a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
}

/// An open frame stream.
pub trait CaptureStream {
    /// Intrinsics of the stream, queried once right after opening.
    fn intrinsics(&self) -> Result<Intrinsics, CaptureError>;

    /// Block until the next frame is available.
    fn read_frame(&mut self) -> Result<RawFrame, CaptureError>;

    /// Release the device. Called exactly once by [`StreamGuard`].
    fn close(&mut self);
}

/// A device or recording that can be opened as a [`CaptureStream`].
pub trait CaptureSource {
    fn name(&self) -> &str;

    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Owns an open stream and closes it exactly once, on drop at the latest.
pub struct StreamGuard {
    stream: Box<dyn CaptureStream>,
    closed: bool,
}

impl StreamGuard {
    pub fn new(stream: Box<dyn CaptureStream>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    #[inline]
    pub fn stream(&mut self) -> &mut dyn CaptureStream {
        &mut *self.stream
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stream.close();
            debug!("capture stream closed");
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Result of [`open_with_fallback`].
pub struct OpenedStream {
    /// Name of the source that was opened.
    pub source: String,
    pub used_fallback: bool,
    pub guard: StreamGuard,
}

/// Open `primary`; if it fails, open `secondary`.
///
/// Fails with [`SessionError::StreamStartFailed`] carrying both causes when
/// neither source opens. A missing secondary counts as `DeviceUnavailable`.
pub fn open_with_fallback(
    primary: &dyn CaptureSource,
    secondary: Option<&dyn CaptureSource>,
    request: &CaptureRequest,
) -> Result<OpenedStream, SessionError> {
    let primary_err = match primary.open(request) {
        Ok(stream) => {
            info!("opened capture source '{}'", primary.name());
            return Ok(OpenedStream {
                source: primary.name().to_string(),
                used_fallback: false,
                guard: StreamGuard::new(stream),
            });
        }
        Err(err) => err,
    };

    let Some(secondary) = secondary else {
        return Err(SessionError::StreamStartFailed {
            primary: primary_err,
            secondary: CaptureError::DeviceUnavailable(
                "no secondary source configured".to_string(),
            ),
        });
    };

    warn!(
        "primary source '{}' failed ({primary_err}); trying '{}'",
        primary.name(),
        secondary.name()
    );
    match secondary.open(request) {
        Ok(stream) => {
            info!("opened fallback capture source '{}'", secondary.name());
            Ok(OpenedStream {
                source: secondary.name().to_string(),
                used_fallback: true,
                guard: StreamGuard::new(stream),
            })
        }
        Err(secondary_err) => Err(SessionError::StreamStartFailed {
            primary: primary_err,
            secondary: secondary_err,
        }),
    }
}
