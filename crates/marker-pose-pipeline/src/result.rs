use marker_pose_core::{Pose, PoseError, Quaternion};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// What happened to one observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarkerOutcome {
    Estimated {
        pose: Pose,
        quaternion: Quaternion,
        reprojection_rms_px: f64,
    },
    Failed {
        error: PoseError,
    },
}

/// Pose result for one marker, in detector order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPoseEntry {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
    #[serde(flatten)]
    pub outcome: MarkerOutcome,
}

impl MarkerPoseEntry {
    pub fn pose(&self) -> Option<&Pose> {
        match &self.outcome {
            MarkerOutcome::Estimated { pose, .. } => Some(pose),
            MarkerOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&PoseError> {
        match &self.outcome {
            MarkerOutcome::Estimated { .. } => None,
            MarkerOutcome::Failed { error } => Some(error),
        }
    }
}

/// Everything the pipeline produced for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub frame_index: u64,
    pub timestamp_ms: f64,
    pub markers: Vec<MarkerPoseEntry>,
}

impl FrameResult {
    pub fn estimated_count(&self) -> usize {
        self.markers.iter().filter(|m| m.pose().is_some()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.markers.len() - self.estimated_count()
    }
}
