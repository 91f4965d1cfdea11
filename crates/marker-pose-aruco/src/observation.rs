use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One detected marker in one frame.
///
/// Corners are in pixels, ordered top-left, top-right, bottom-right,
/// bottom-left as seen on the printed marker (clockwise in the image).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
}

impl MarkerObservation {
    pub fn new(id: u32, corners: [Point2<f64>; 4]) -> Self {
        Self { id, corners }
    }
}
