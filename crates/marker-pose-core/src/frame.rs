//! Raw frames passed from capture to detection and rendering.

use serde::{Deserialize, Serialize};

/// Pixel layout of [`RawFrame::data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
}

impl PixelFormat {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 | Self::Bgr8 => 3,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} {format:?}")]
    BufferSize {
        width: u32,
        height: u32,
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// Row-major 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

/// One frame as delivered by a capture stream.
///
/// A frame may carry no pixels at all (`data` empty); replayed recordings
/// only need the frame metadata and the pre-detected corners.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
    pub index: u64,
    /// Capture time in milliseconds since the stream started.
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(
        index: u64,
        timestamp_ms: f64,
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * format.channels();
        if !data.is_empty() && data.len() != expected {
            return Err(FrameError::BufferSize {
                width,
                height,
                format,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            index,
            timestamp_ms,
            width,
            height,
            format,
            data,
        })
    }

    /// Frame with dimensions but no pixel buffer.
    pub fn metadata_only(index: u64, timestamp_ms: f64, width: u32, height: u32) -> Self {
        Self {
            index,
            timestamp_ms,
            width,
            height,
            format: PixelFormat::Gray8,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn has_pixels(&self) -> bool {
        !self.data.is_empty()
    }

    /// Interleaved RGB copy of the pixels, `None` for metadata-only frames.
    pub fn to_rgb8(&self) -> Option<Vec<u8>> {
        if !self.has_pixels() {
            return None;
        }
        let out = match self.format {
            PixelFormat::Rgb8 => self.data.clone(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|p| [p[2], p[1], p[0]])
                .collect(),
            PixelFormat::Gray8 => self.data.iter().flat_map(|&g| [g, g, g]).collect(),
        };
        Some(out)
    }

    /// Luma (BT.601) copy of the pixels, `None` for metadata-only frames.
    pub fn to_gray(&self) -> Option<GrayImage> {
        if !self.has_pixels() {
            return None;
        }
        let luma = |r: u8, g: u8, b: u8| -> u8 {
            let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            y.round().clamp(0.0, 255.0) as u8
        };
        let data = match self.format {
            PixelFormat::Gray8 => self.data.clone(),
            PixelFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .map(|p| luma(p[0], p[1], p[2]))
                .collect(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .map(|p| luma(p[2], p[1], p[0]))
                .collect(),
        };
        Some(GrayImage {
            width: self.width as usize,
            height: self.height as usize,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = RawFrame::new(0, 0.0, 4, 2, PixelFormat::Rgb8, vec![0; 10]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferSize {
                expected: 24,
                actual: 10,
                ..
            }
        ));
    }

    #[test]
    fn bgr_converts_to_rgb_and_gray() {
        let frame = RawFrame::new(3, 33.3, 2, 1, PixelFormat::Bgr8, vec![255, 0, 0, 0, 0, 255])
            .expect("valid frame");
        assert_eq!(frame.to_rgb8(), Some(vec![0, 0, 255, 255, 0, 0]));
        let gray = frame.to_gray().expect("pixels");
        assert_eq!((gray.width, gray.height), (2, 1));
        assert_eq!(gray.data, vec![29, 76]);
    }

    #[test]
    fn metadata_only_frame_has_no_pixels() {
        let frame = RawFrame::metadata_only(7, 0.0, 640, 480);
        assert!(!frame.has_pixels());
        assert!(frame.to_rgb8().is_none());
        assert!(frame.to_gray().is_none());
    }
}
