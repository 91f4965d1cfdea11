//! Renderer seam and the log and JSON-lines renderers.

use crate::{FrameResult, MarkerOutcome, RenderError};
use log::{info, warn};
use marker_pose_core::{Intrinsics, MarkerGeometry, RawFrame};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Session facts a renderer may need before the first frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionInfo {
    pub source: String,
    pub intrinsics: Intrinsics,
    pub geometry: MarkerGeometry,
    /// Length of drawn pose axes in meters.
    pub axis_length_m: f64,
}

/// Consumer of per-frame results, alive for exactly one session.
///
/// `begin` runs once after the stream is open, `present` once per processed
/// frame, `finish` once when the session ends (also after a failure).
pub trait Renderer {
    fn begin(&mut self, _session: &SessionInfo) -> Result<(), RenderError> {
        Ok(())
    }

    fn present(&mut self, frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError>;

    fn finish(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn begin(&mut self, session: &SessionInfo) -> Result<(), RenderError> {
        (**self).begin(session)
    }

    fn present(&mut self, frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError> {
        (**self).present(frame, result)
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        (**self).finish()
    }
}

/// Fan-out: every renderer sees every call; the first error is returned.
impl Renderer for Vec<Box<dyn Renderer>> {
    fn begin(&mut self, session: &SessionInfo) -> Result<(), RenderError> {
        first_error(self.iter_mut().map(|r| r.begin(session)))
    }

    fn present(&mut self, frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError> {
        first_error(self.iter_mut().map(|r| r.present(frame, result)))
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        first_error(self.iter_mut().map(|r| r.finish()))
    }
}

fn first_error(results: impl Iterator<Item = Result<(), RenderError>>) -> Result<(), RenderError> {
    let mut first = Ok(());
    for r in results {
        if first.is_ok() {
            first = r;
        }
    }
    first
}

/// Writes one log line per marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn present(&mut self, _frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError> {
        for entry in &result.markers {
            match &entry.outcome {
                MarkerOutcome::Estimated {
                    pose, quaternion, ..
                } => {
                    let t = pose.translation();
                    info!(
                        "frame {} marker {}: t=[{:.4}, {:.4}, {:.4}] m q=[{:.4}, {:.4}, {:.4}, {:.4}]",
                        result.frame_index,
                        entry.id,
                        t.x,
                        t.y,
                        t.z,
                        quaternion.x,
                        quaternion.y,
                        quaternion.z,
                        quaternion.w
                    );
                }
                MarkerOutcome::Failed { error } => {
                    warn!(
                        "frame {} marker {}: {error}",
                        result.frame_index, entry.id
                    );
                }
            }
        }
        Ok(())
    }
}

/// Streams each [`FrameResult`] as one JSON line. Nothing is retained.
pub struct JsonLinesRenderer<W: Write> {
    writer: W,
    lines: u64,
}

impl JsonLinesRenderer<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    #[inline]
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Renderer for JsonLinesRenderer<W> {
    fn present(&mut self, _frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError> {
        serde_json::to_writer(&mut self.writer, result)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarkerPoseEntry;
    use marker_pose_core::{DegenerateReason, Pose, PoseError};
    use nalgebra::{Point2, Vector3};
    use std::cell::Cell;
    use std::rc::Rc;

    fn result() -> FrameResult {
        let pose = Pose::from_axis_angle(Vector3::new(3.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.5));
        FrameResult {
            frame_index: 4,
            timestamp_ms: 133.0,
            markers: vec![
                MarkerPoseEntry {
                    id: 2,
                    corners: [Point2::new(1.0, 2.0); 4],
                    outcome: MarkerOutcome::Estimated {
                        quaternion: pose.quaternion(),
                        pose,
                        reprojection_rms_px: 0.1,
                    },
                },
                MarkerPoseEntry {
                    id: 9,
                    corners: [Point2::new(0.0, 0.0); 4],
                    outcome: MarkerOutcome::Failed {
                        error: PoseError::PoseDegenerate {
                            reason: DegenerateReason::TooSmall,
                        },
                    },
                },
            ],
        }
    }

    #[test]
    fn json_lines_stream_one_object_per_frame() {
        let frame = RawFrame::metadata_only(4, 133.0, 640, 480);
        let mut r = JsonLinesRenderer::new(Vec::new());
        r.present(&frame, &result()).expect("present");
        r.present(&frame, &result()).expect("present");
        r.finish().expect("finish");
        assert_eq!(r.lines_written(), 2);

        let text = String::from_utf8(r.into_inner()).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(v["frame_index"], 4);
        assert_eq!(v["markers"][0]["status"], "estimated");
        assert_eq!(v["markers"][1]["status"], "failed");
        assert_eq!(v["markers"][1]["error"]["kind"], "pose_degenerate");

        let back: FrameResult = serde_json::from_str(lines[1]).expect("parse back");
        assert_eq!(back.markers.len(), 2);
        assert_eq!(back.estimated_count(), 1);
        assert_eq!(back.markers[1].error(), result().markers[1].error());
    }

    struct Failing;

    impl Renderer for Failing {
        fn present(&mut self, _: &RawFrame, _: &FrameResult) -> Result<(), RenderError> {
            Err(RenderError::FrameSize {
                width: 1,
                height: 1,
            })
        }
    }

    struct Counting(Rc<Cell<u32>>);

    impl Renderer for Counting {
        fn present(&mut self, _: &RawFrame, _: &FrameResult) -> Result<(), RenderError> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn fan_out_reaches_every_renderer() {
        let frame = RawFrame::metadata_only(0, 0.0, 640, 480);
        let seen = Rc::new(Cell::new(0));
        let mut all: Vec<Box<dyn Renderer>> = vec![
            Box::new(Failing),
            Box::new(Counting(seen.clone())),
            Box::new(LogRenderer),
        ];
        assert!(all.present(&frame, &result()).is_err());
        assert_eq!(seen.get(), 1);
        assert!(all.finish().is_ok());
    }
}
