//! PNG overlay renderer: marker outlines, ids and projected pose axes.

use crate::{FrameResult, RenderError, Renderer, SessionInfo};
use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::debug;
use marker_pose_core::{project_axes, Intrinsics, RawFrame};
use nalgebra::Point2;
use std::fs;
use std::path::{Path, PathBuf};

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const FAILED_OUTLINE: Rgb<u8> = Rgb([255, 160, 0]);
const FIRST_CORNER: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL: Rgb<u8> = Rgb([255, 0, 0]);
const AXIS_X: Rgb<u8> = Rgb([255, 0, 0]);
const AXIS_Y: Rgb<u8> = Rgb([0, 255, 0]);
const AXIS_Z: Rgb<u8> = Rgb([0, 0, 255]);
const BACKGROUND: Rgb<u8> = Rgb([32, 32, 32]);
const LABEL_SCALE: f32 = 18.0;

/// Saves one annotated `frame_NNNNNN.png` per processed frame.
///
/// Every marker gets its outline and a small box on corner 0. Marker ids are
/// written next to corner 0 when a label font was supplied with
/// [`OverlayRenderer::with_label_font`]. Frames without pixels are drawn on a
/// dark canvas of the frame size.
pub struct OverlayRenderer {
    out_dir: PathBuf,
    label_font: Option<FontVec>,
    projection: Option<(Intrinsics, f64)>,
    written: u64,
}

impl OverlayRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            label_font: None,
            projection: None,
            written: 0,
        }
    }

    /// Load a TrueType/OpenType font used to print marker ids.
    pub fn with_label_font(mut self, font_path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = font_path.as_ref();
        let bytes = fs::read(path)?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| RenderError::Font {
            path: path.to_path_buf(),
        })?;
        self.label_font = Some(font);
        Ok(self)
    }

    #[inline]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    #[inline]
    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frame_path(&self, frame_index: u64) -> PathBuf {
        self.out_dir.join(format!("frame_{frame_index:06}.png"))
    }

    /// Draw the overlay for one frame without writing it to disk.
    pub fn draw(&self, frame: &RawFrame, result: &FrameResult) -> Result<RgbImage, RenderError> {
        let mut canvas = match frame.to_rgb8() {
            Some(rgb) => RgbImage::from_raw(frame.width, frame.height, rgb).ok_or(
                RenderError::FrameSize {
                    width: frame.width,
                    height: frame.height,
                },
            )?,
            None => RgbImage::from_pixel(frame.width, frame.height, BACKGROUND),
        };

        for entry in &result.markers {
            let color = if entry.pose().is_some() {
                OUTLINE
            } else {
                FAILED_OUTLINE
            };
            for i in 0..4 {
                segment(
                    &mut canvas,
                    entry.corners[i],
                    entry.corners[(i + 1) % 4],
                    color,
                );
            }
            mark_first_corner(&mut canvas, entry.corners[0]);
            if let Some(font) = &self.label_font {
                let c = entry.corners[0];
                if c.x.is_finite() && c.y.is_finite() {
                    let (x, y) = (c.x as i32, c.y as i32 - LABEL_SCALE as i32);
                    let text = format!("id={}", entry.id);
                    draw_text_mut(&mut canvas, LABEL, x, y, LABEL_SCALE, font, &text);
                }
            }

            let (Some(pose), Some((intrinsics, length))) = (entry.pose(), &self.projection) else {
                continue;
            };
            if let Some([o, x, y, z]) = project_axes(pose, intrinsics, *length) {
                segment(&mut canvas, o, x, AXIS_X);
                segment(&mut canvas, o, y, AXIS_Y);
                segment(&mut canvas, o, z, AXIS_Z);
            }
        }
        Ok(canvas)
    }
}

impl Renderer for OverlayRenderer {
    fn begin(&mut self, session: &SessionInfo) -> Result<(), RenderError> {
        fs::create_dir_all(&self.out_dir)?;
        self.projection = Some((session.intrinsics.clone(), session.axis_length_m));
        Ok(())
    }

    fn present(&mut self, frame: &RawFrame, result: &FrameResult) -> Result<(), RenderError> {
        let canvas = self.draw(frame, result)?;
        let path = self.frame_path(result.frame_index);
        canvas.save(&path)?;
        self.written += 1;
        debug!("overlay written to {}", path.display());
        Ok(())
    }
}

fn segment(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
        return;
    }
    // imageproc walks every point of the segment, on canvas or not.
    let limit = 4.0 * f64::from(img.width().max(img.height()).max(1));
    let to_px = |p: Point2<f64>| (p.x.clamp(-limit, limit) as f32, p.y.clamp(-limit, limit) as f32);
    draw_line_segment_mut(img, to_px(a), to_px(b), color);
}

fn mark_first_corner(img: &mut RgbImage, c: Point2<f64>) {
    if !(c.x.is_finite() && c.y.is_finite()) {
        return;
    }
    let rect = Rect::at(c.x.round() as i32 - 3, c.y.round() as i32 - 3).of_size(7, 7);
    draw_hollow_rect_mut(img, rect, FIRST_CORNER);
}
