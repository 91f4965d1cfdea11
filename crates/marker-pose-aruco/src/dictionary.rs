//! Predefined marker dictionary identifiers.
//!
//! Names and sizes match the OpenCV `cv::aruco::PredefinedDictionaryType`
//! table, so a recording or config written for an OpenCV pipeline can be
//! read unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A predefined ArUco or AprilTag dictionary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DictionaryId {
    #[default]
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[serde(rename = "DICT_5X5_1000")]
    Dict5x5_1000,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_100")]
    Dict6x6_100,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_6X6_1000")]
    Dict6x6_1000,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
    #[serde(rename = "DICT_7X7_100")]
    Dict7x7_100,
    #[serde(rename = "DICT_7X7_250")]
    Dict7x7_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
    #[serde(rename = "DICT_ARUCO_ORIGINAL")]
    ArucoOriginal,
    #[serde(rename = "DICT_APRILTAG_16h5")]
    AprilTag16h5,
    #[serde(rename = "DICT_APRILTAG_25h9")]
    AprilTag25h9,
    #[serde(rename = "DICT_APRILTAG_36h10")]
    AprilTag36h10,
    #[serde(rename = "DICT_APRILTAG_36h11")]
    AprilTag36h11,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown marker dictionary `{0}`")]
pub struct UnknownDictionary(pub String);

impl DictionaryId {
    pub const ALL: [DictionaryId; 21] = [
        Self::Dict4x4_50,
        Self::Dict4x4_100,
        Self::Dict4x4_250,
        Self::Dict4x4_1000,
        Self::Dict5x5_50,
        Self::Dict5x5_100,
        Self::Dict5x5_250,
        Self::Dict5x5_1000,
        Self::Dict6x6_50,
        Self::Dict6x6_100,
        Self::Dict6x6_250,
        Self::Dict6x6_1000,
        Self::Dict7x7_50,
        Self::Dict7x7_100,
        Self::Dict7x7_250,
        Self::Dict7x7_1000,
        Self::ArucoOriginal,
        Self::AprilTag16h5,
        Self::AprilTag25h9,
        Self::AprilTag36h10,
        Self::AprilTag36h11,
    ];

    /// OpenCV constant name, e.g. `DICT_4X4_50`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dict4x4_50 => "DICT_4X4_50",
            Self::Dict4x4_100 => "DICT_4X4_100",
            Self::Dict4x4_250 => "DICT_4X4_250",
            Self::Dict4x4_1000 => "DICT_4X4_1000",
            Self::Dict5x5_50 => "DICT_5X5_50",
            Self::Dict5x5_100 => "DICT_5X5_100",
            Self::Dict5x5_250 => "DICT_5X5_250",
            Self::Dict5x5_1000 => "DICT_5X5_1000",
            Self::Dict6x6_50 => "DICT_6X6_50",
            Self::Dict6x6_100 => "DICT_6X6_100",
            Self::Dict6x6_250 => "DICT_6X6_250",
            Self::Dict6x6_1000 => "DICT_6X6_1000",
            Self::Dict7x7_50 => "DICT_7X7_50",
            Self::Dict7x7_100 => "DICT_7X7_100",
            Self::Dict7x7_250 => "DICT_7X7_250",
            Self::Dict7x7_1000 => "DICT_7X7_1000",
            Self::ArucoOriginal => "DICT_ARUCO_ORIGINAL",
            Self::AprilTag16h5 => "DICT_APRILTAG_16h5",
            Self::AprilTag25h9 => "DICT_APRILTAG_25h9",
            Self::AprilTag36h10 => "DICT_APRILTAG_36h10",
            Self::AprilTag36h11 => "DICT_APRILTAG_36h11",
        }
    }

    /// Number of inner bits per marker side.
    pub fn marker_bits(self) -> u32 {
        match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 | Self::Dict4x4_250 | Self::Dict4x4_1000 => 4,
            Self::AprilTag16h5 => 4,
            Self::Dict5x5_50 | Self::Dict5x5_100 | Self::Dict5x5_250 | Self::Dict5x5_1000 => 5,
            Self::ArucoOriginal | Self::AprilTag25h9 => 5,
            Self::Dict6x6_50 | Self::Dict6x6_100 | Self::Dict6x6_250 | Self::Dict6x6_1000 => 6,
            Self::AprilTag36h10 | Self::AprilTag36h11 => 6,
            Self::Dict7x7_50 | Self::Dict7x7_100 | Self::Dict7x7_250 | Self::Dict7x7_1000 => 7,
        }
    }

    /// Number of distinct ids; valid ids are `0..marker_count()`.
    pub fn marker_count(self) -> u32 {
        match self {
            Self::Dict4x4_50 | Self::Dict5x5_50 | Self::Dict6x6_50 | Self::Dict7x7_50 => 50,
            Self::Dict4x4_100 | Self::Dict5x5_100 | Self::Dict6x6_100 | Self::Dict7x7_100 => 100,
            Self::Dict4x4_250 | Self::Dict5x5_250 | Self::Dict6x6_250 | Self::Dict7x7_250 => 250,
            Self::Dict4x4_1000 | Self::Dict5x5_1000 | Self::Dict6x6_1000 | Self::Dict7x7_1000 => {
                1000
            }
            Self::ArucoOriginal => 1024,
            Self::AprilTag16h5 => 30,
            Self::AprilTag25h9 => 35,
            Self::AprilTag36h10 => 2320,
            Self::AprilTag36h11 => 587,
        }
    }

    #[inline]
    pub fn contains(self, id: u32) -> bool {
        id < self.marker_count()
    }
}

impl fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DictionaryId {
    type Err = UnknownDictionary;

    /// Accepts the OpenCV name with or without the `DICT_` prefix, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        let wanted = wanted.strip_prefix("DICT_").unwrap_or(&wanted);
        Self::ALL
            .into_iter()
            .find(|d| d.name()[5..].eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownDictionary(s.to_string()))
    }
}
