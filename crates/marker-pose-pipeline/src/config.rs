//! JSON session configuration.

use crate::{CaptureRequest, ConfigError};
use marker_pose_aruco::DictionaryId;
use marker_pose_core::{Intrinsics, MarkerGeometry, PixelFormat, PoseEstimatorParams};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

fn default_edge_length_m() -> f64 {
    0.03
}

fn default_capture_width() -> u32 {
    640
}

fn default_capture_height() -> u32 {
    480
}

fn default_fps() -> u32 {
    30
}

fn default_pixel_format() -> PixelFormat {
    PixelFormat::Bgr8
}

fn default_axis_length_rel() -> f64 {
    0.5
}

/// Everything a [`PoseSession`](crate::PoseSession) needs besides its
/// collaborators. Missing JSON fields take the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub dictionary: DictionaryId,
    /// Printed marker edge length in meters.
    #[serde(default = "default_edge_length_m")]
    pub edge_length_m: f64,
    #[serde(default = "default_capture_width")]
    pub capture_width: u32,
    #[serde(default = "default_capture_height")]
    pub capture_height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    /// Offline calibration; when set the stream is never asked for intrinsics.
    #[serde(default)]
    pub intrinsics: Option<Intrinsics>,
    #[serde(default)]
    pub estimator: PoseEstimatorParams,
    /// Length of the drawn pose axes as a fraction of the edge length.
    #[serde(default = "default_axis_length_rel")]
    pub axis_length_rel: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dictionary: DictionaryId::default(),
            edge_length_m: default_edge_length_m(),
            capture_width: default_capture_width(),
            capture_height: default_capture_height(),
            fps: default_fps(),
            pixel_format: default_pixel_format(),
            intrinsics: None,
            estimator: PoseEstimatorParams::default(),
            axis_length_rel: default_axis_length_rel(),
        }
    }
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry()?;
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size must be non-zero, got {}x{}",
                self.capture_width, self.capture_height
            )));
        }
        if self.fps == 0 {
            return Err(ConfigError::Invalid("fps must be non-zero".into()));
        }
        if !(self.axis_length_rel.is_finite() && self.axis_length_rel > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "axis_length_rel must be finite and positive, got {}",
                self.axis_length_rel
            )));
        }
        if let Some(intrinsics) = &self.intrinsics {
            intrinsics.validate()?;
        }

        let est = &self.estimator;
        if !(est.min_extent_px.is_finite() && est.min_extent_px >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "estimator.min_extent_px must be finite and non-negative, got {}",
                est.min_extent_px
            )));
        }
        // A square seen head-on has relative triangle area 0.25.
        if !(est.min_relative_area.is_finite() && (0.0..0.25).contains(&est.min_relative_area)) {
            return Err(ConfigError::Invalid(format!(
                "estimator.min_relative_area must be in [0, 0.25), got {}",
                est.min_relative_area
            )));
        }
        if !(est.orthonormal_tolerance.is_finite() && est.orthonormal_tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "estimator.orthonormal_tolerance must be finite and positive, got {}",
                est.orthonormal_tolerance
            )));
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<MarkerGeometry, ConfigError> {
        Ok(MarkerGeometry::new(self.edge_length_m)?)
    }

    /// Axis length in meters for overlays.
    #[inline]
    pub fn axis_length_m(&self) -> f64 {
        self.edge_length_m * self.axis_length_rel
    }

    pub fn capture_request(&self) -> CaptureRequest {
        CaptureRequest {
            width: self.capture_width,
            height: self.capture_height,
            fps: self.fps,
            format: self.pixel_format,
        }
    }
}
