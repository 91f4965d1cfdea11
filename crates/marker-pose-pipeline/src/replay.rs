//! Recorded sessions: a capture source and a detector backed by a JSON file.
//!
//! A recording stores, per frame, the observations an external detector
//! produced, so the pose pipeline can be re-run offline:
//!
//! ```json
//! {
//!   "width": 640, "height": 480,
//!   "intrinsics": { "fx": 615.3, "fy": 615.9, "ppx": 320.1, "ppy": 240.4 },
//!   "frames": [
//!     { "timestamp_ms": 0.0, "markers": [ { "id": 3, "corners": [[290, 210], [350, 210], [350, 270], [290, 270]] } ] },
//!     { "timestamp_ms": 33.3, "dropped": true }
//!   ]
//! }
//! ```
//!
//! `image` paths, when present, are resolved relative to the recording file.

use crate::{CaptureError, CaptureRequest, CaptureSource, CaptureStream};
use log::{debug, warn};
use marker_pose_aruco::{retain_in_dictionary, DictionaryId, MarkerDetector, MarkerObservation};
use marker_pose_core::{GrayImage, Intrinsics, PixelFormat, RawFrame};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    #[serde(default)]
    pub timestamp_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    /// Replays as `CaptureError::FrameDropped`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dropped: bool,
    #[serde(default)]
    pub markers: Vec<MarkerObservation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub width: u32,
    pub height: u32,
    /// Stream metadata; absent for devices that expose none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<Intrinsics>,
    #[serde(default)]
    pub frames: Vec<RecordedFrame>,
}

impl Recording {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("invalid recording {}: {e}", path.display()))
        })
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

#[derive(Debug)]
struct Delivered {
    frame_index: u64,
    markers: Vec<MarkerObservation>,
}

/// Returns the observations recorded for the frame most recently read
/// from any [`ReplaySource`] created with this detector.
#[derive(Clone, Debug, Default)]
pub struct ReplayDetector {
    slot: Rc<RefCell<Option<Delivered>>>,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerDetector for ReplayDetector {
    fn detect(
        &self,
        frame: &RawFrame,
        _gray: Option<&GrayImage>,
        dictionary: DictionaryId,
    ) -> Vec<MarkerObservation> {
        match self.slot.borrow_mut().take() {
            Some(d) if d.frame_index == frame.index => retain_in_dictionary(d.markers, dictionary),
            Some(d) => {
                warn!(
                    "replay observations for frame {} requested for frame {}",
                    d.frame_index, frame.index
                );
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

/// Capture source reading a [`Recording`] from disk.
///
/// A missing or unparsable file is `DeviceUnavailable`, which makes a
/// recording usable as either end of a fallback pair.
pub struct ReplaySource {
    name: String,
    path: PathBuf,
    slot: Rc<RefCell<Option<Delivered>>>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, detector: &ReplayDetector) -> Self {
        let path = path.into();
        Self {
            name: format!("replay:{}", path.display()),
            path,
            slot: detector.slot.clone(),
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, request: &CaptureRequest) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let recording = Recording::load_json(&self.path)?;
        if (recording.width, recording.height) != (request.width, request.height) {
            debug!(
                "recording is {}x{}, requested {}x{}; using the recording size",
                recording.width, recording.height, request.width, request.height
            );
        }
        let base_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Box::new(ReplayStream {
            width: recording.width,
            height: recording.height,
            intrinsics: recording.intrinsics,
            frames: recording.frames.into(),
            next_index: 0,
            base_dir,
            slot: self.slot.clone(),
        }))
    }
}

struct ReplayStream {
    width: u32,
    height: u32,
    intrinsics: Option<Intrinsics>,
    frames: VecDeque<RecordedFrame>,
    next_index: u64,
    base_dir: PathBuf,
    slot: Rc<RefCell<Option<Delivered>>>,
}

impl ReplayStream {
    fn load_pixels(&self, index: u64, recorded: &RecordedFrame) -> Result<RawFrame, CaptureError> {
        let Some(image_path) = &recorded.image else {
            return Ok(RawFrame::metadata_only(
                index,
                recorded.timestamp_ms,
                self.width,
                self.height,
            ));
        };
        let path = self.base_dir.join(image_path);
        let img = image::open(&path)
            .map_err(|e| CaptureError::FrameDropped(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        RawFrame::new(
            index,
            recorded.timestamp_ms,
            w,
            h,
            PixelFormat::Rgb8,
            img.into_raw(),
        )
        .map_err(|e| CaptureError::FrameDropped(e.to_string()))
    }
}

impl CaptureStream for ReplayStream {
    fn intrinsics(&self) -> Result<Intrinsics, CaptureError> {
        self.intrinsics.clone().ok_or_else(|| {
            CaptureError::DeviceUnavailable("recording carries no intrinsics".to_string())
        })
    }

    fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let recorded = self.frames.pop_front().ok_or(CaptureError::EndOfStream)?;
        let index = self.next_index;
        self.next_index += 1;

        if recorded.dropped {
            return Err(CaptureError::FrameDropped(format!(
                "recorded frame {index} was dropped"
            )));
        }
        let frame = self.load_pixels(index, &recorded)?;
        *self.slot.borrow_mut() = Some(Delivered {
            frame_index: index,
            markers: recorded.markers,
        });
        Ok(frame)
    }

    fn close(&mut self) {
        self.frames.clear();
        self.slot.borrow_mut().take();
    }
}
