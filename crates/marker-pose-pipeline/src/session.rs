//! The frame pipeline controller.

use crate::{
    open_with_fallback, CancelSource, CaptureError, CaptureSource, FrameResult, MarkerOutcome,
    MarkerPoseEntry, Renderer, SessionConfig, SessionError, SessionInfo, StreamGuard,
};
use log::{debug, info, trace, warn};
use marker_pose_aruco::{MarkerDetector, MarkerObservation};
use marker_pose_core::{Intrinsics, PoseEstimator, RawFrame};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Where the controller is in its loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Streaming,
    Capturing,
    Detecting,
    Estimating,
    Rendering,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    EndOfStream,
}

/// Counters of a finished session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Name of the capture source that was actually used.
    pub source: String,
    pub used_fallback: bool,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub markers_estimated: u64,
    pub markers_failed: u64,
    pub stop_reason: StopReason,
}

/// Runs capture, detection, pose estimation and rendering for one stream.
///
/// Each frame is handled to completion before the next one is read. The
/// only state carried between frames is the intrinsics resolved at start.
pub struct PoseSession<D> {
    config: SessionConfig,
    estimator: PoseEstimator,
    detector: D,
    state: SessionState,
}

impl<D: MarkerDetector> PoseSession<D> {
    /// Validate `config` and build a session in the `Idle` state.
    pub fn new(config: SessionConfig, detector: D) -> Result<Self, SessionError> {
        config.validate()?;
        let estimator = PoseEstimator::new(config.geometry()?, config.estimator.clone());
        Ok(Self {
            config,
            estimator,
            detector,
            state: SessionState::Idle,
        })
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Detect markers in `frame` and estimate a pose for each of them.
    ///
    /// Does not touch session state. A failure on one marker is recorded in
    /// its entry and never affects the others.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(frame = frame.index))
    )]
    pub fn process_frame(&self, frame: &RawFrame, intrinsics: &Intrinsics) -> FrameResult {
        let gray = frame.to_gray();
        let observations = self.detector.detect(frame, gray.as_ref(), self.config.dictionary);
        self.estimate_observations(frame, observations, intrinsics)
    }

    fn estimate_observations(
        &self,
        frame: &RawFrame,
        observations: Vec<MarkerObservation>,
        intrinsics: &Intrinsics,
    ) -> FrameResult {
        let markers = observations
            .into_iter()
            .map(|obs| {
                let outcome = match self.estimator.estimate(&obs.corners, intrinsics) {
                    Ok(est) => MarkerOutcome::Estimated {
                        quaternion: est.pose.quaternion(),
                        pose: est.pose,
                        reprojection_rms_px: est.reprojection_rms_px,
                    },
                    Err(error) => {
                        debug!("frame {} marker {}: {error}", frame.index, obs.id);
                        MarkerOutcome::Failed { error }
                    }
                };
                MarkerPoseEntry {
                    id: obs.id,
                    corners: obs.corners,
                    outcome,
                }
            })
            .collect();

        FrameResult {
            frame_index: frame.index,
            timestamp_ms: frame.timestamp_ms,
            markers,
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!("session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the session until cancellation or end of stream.
    ///
    /// `secondary` is opened only if `primary` fails. The stream is closed on
    /// every exit path before an error is returned, and once
    /// `renderer.begin()` has run, `renderer.finish()` runs too.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(primary = primary.name()))
    )]
    pub fn run(
        &mut self,
        primary: &dyn CaptureSource,
        secondary: Option<&dyn CaptureSource>,
        renderer: &mut dyn Renderer,
        cancel: &mut dyn CancelSource,
    ) -> Result<SessionSummary, SessionError> {
        self.transition(SessionState::Idle);
        let result = self.run_stream(primary, secondary, renderer, cancel);
        self.transition(SessionState::Stopped);

        match &result {
            Ok(summary) => info!(
                "session stopped ({:?}): {} frames, {} dropped, {} poses, {} failures",
                summary.stop_reason,
                summary.frames_processed,
                summary.frames_dropped,
                summary.markers_estimated,
                summary.markers_failed
            ),
            Err(err) => warn!("session failed: {err}"),
        }
        result
    }

    fn run_stream(
        &mut self,
        primary: &dyn CaptureSource,
        secondary: Option<&dyn CaptureSource>,
        renderer: &mut dyn Renderer,
        cancel: &mut dyn CancelSource,
    ) -> Result<SessionSummary, SessionError> {
        let request = self.config.capture_request();
        let opened = open_with_fallback(primary, secondary, &request)?;
        let mut guard = opened.guard;
        self.transition(SessionState::Streaming);

        let intrinsics = match &self.config.intrinsics {
            Some(k) => {
                debug!("using configured intrinsics");
                k.clone()
            }
            None => guard
                .stream()
                .intrinsics()
                .map_err(SessionError::IntrinsicsUnavailable)?,
        };
        intrinsics.validate()?;
        info!(
            "streaming from '{}' fx={:.2} fy={:.2} ppx={:.2} ppy={:.2}",
            opened.source, intrinsics.fx, intrinsics.fy, intrinsics.ppx, intrinsics.ppy
        );
        let dictionary = self.config.dictionary;
        info!(
            "detecting {dictionary}: {bits}x{bits} bits, ids 0..{count}",
            bits = dictionary.marker_bits(),
            count = dictionary.marker_count()
        );

        let mut summary = SessionSummary {
            source: opened.source,
            used_fallback: opened.used_fallback,
            frames_processed: 0,
            frames_dropped: 0,
            markers_estimated: 0,
            markers_failed: 0,
            stop_reason: StopReason::EndOfStream,
        };

        let info = SessionInfo {
            source: summary.source.clone(),
            intrinsics: intrinsics.clone(),
            geometry: *self.estimator.geometry(),
            axis_length_m: self.config.axis_length_m(),
        };
        let streamed = match renderer.begin(&info) {
            Ok(()) => self.stream_loop(&mut guard, &intrinsics, renderer, cancel, &mut summary),
            Err(err) => Err(err.into()),
        };

        guard.close();
        let finished = renderer.finish();
        streamed?;
        finished?;
        Ok(summary)
    }

    fn stream_loop(
        &mut self,
        guard: &mut StreamGuard,
        intrinsics: &Intrinsics,
        renderer: &mut dyn Renderer,
        cancel: &mut dyn CancelSource,
        summary: &mut SessionSummary,
    ) -> Result<(), SessionError> {
        loop {
            if cancel.poll_cancel() {
                summary.stop_reason = StopReason::Cancelled;
                return Ok(());
            }

            self.transition(SessionState::Capturing);
            let frame = match guard.stream().read_frame() {
                Ok(frame) => frame,
                Err(CaptureError::FrameDropped(reason)) => {
                    warn!("{reason}");
                    summary.frames_dropped += 1;
                    self.transition(SessionState::Streaming);
                    continue;
                }
                Err(CaptureError::EndOfStream) => {
                    summary.stop_reason = StopReason::EndOfStream;
                    return Ok(());
                }
                Err(err) => return Err(SessionError::Capture(err)),
            };

            self.transition(SessionState::Detecting);
            let gray = frame.to_gray();
            let observations = self.detector.detect(&frame, gray.as_ref(), self.config.dictionary);

            self.transition(SessionState::Estimating);
            let result = self.estimate_observations(&frame, observations, intrinsics);

            self.transition(SessionState::Rendering);
            renderer.present(&frame, &result)?;

            summary.frames_processed += 1;
            summary.markers_estimated += result.estimated_count() as u64;
            summary.markers_failed += result.failed_count() as u64;
            self.transition(SessionState::Streaming);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NeverCancel;
    use marker_pose_aruco::DictionaryId;
    use marker_pose_core::{GrayImage, PixelFormat};

    struct NoMarkers;

    impl MarkerDetector for NoMarkers {
        fn detect(
            &self,
            _: &RawFrame,
            _: Option<&GrayImage>,
            _: DictionaryId,
        ) -> Vec<MarkerObservation> {
            Vec::new()
        }
    }

    #[test]
    fn new_session_is_idle() {
        let session = PoseSession::new(SessionConfig::default(), NoMarkers).expect("session");
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SessionConfig {
            edge_length_m: -1.0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            PoseSession::new(cfg, NoMarkers),
            Err(SessionError::Config(_))
        ));
    }

    struct Unavailable;

    impl CaptureSource for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn open(
            &self,
            _: &crate::CaptureRequest,
        ) -> Result<Box<dyn crate::CaptureStream>, CaptureError> {
            Err(CaptureError::DeviceUnavailable("unplugged".into()))
        }
    }

    #[test]
    fn failed_start_ends_stopped() {
        let mut session = PoseSession::new(SessionConfig::default(), NoMarkers).expect("session");
        let mut renderer = crate::LogRenderer;
        let err = session
            .run(&Unavailable, None, &mut renderer, &mut NeverCancel)
            .unwrap_err();
        assert!(matches!(err, SessionError::StreamStartFailed { .. }));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[derive(Default)]
    struct SeenGray(std::cell::RefCell<Vec<Option<GrayImage>>>);

    impl MarkerDetector for SeenGray {
        fn detect(
            &self,
            _: &RawFrame,
            gray: Option<&GrayImage>,
            _: DictionaryId,
        ) -> Vec<MarkerObservation> {
            self.0.borrow_mut().push(gray.cloned());
            Vec::new()
        }
    }

    #[test]
    fn detector_receives_luma_view() {
        let session =
            PoseSession::new(SessionConfig::default(), SeenGray::default()).expect("session");
        let k = Intrinsics::pinhole(600.0, 600.0, 320.0, 240.0).expect("intrinsics");
        let pixels = vec![255, 0, 0, 0, 0, 255];
        let bgr = RawFrame::new(0, 0.0, 2, 1, PixelFormat::Bgr8, pixels).expect("frame");
        session.process_frame(&bgr, &k);
        session.process_frame(&RawFrame::metadata_only(1, 33.0, 640, 480), &k);

        let seen = session.detector().0.borrow();
        let gray = seen[0].as_ref().expect("pixel frame converted");
        assert_eq!((gray.width, gray.height), (2, 1));
        assert_eq!(gray.data, vec![29, 76]);
        assert!(seen[1].is_none());
    }
}
