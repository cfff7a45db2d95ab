use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

const BOX_THICKNESS: u32 = 3;
const LABEL_SCALE: f32 = 18.0;
const LABEL_PADDING: u32 = 4;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum FontError {
    #[error("failed to read font file: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid font data")]
    Invalid,
}

/// Draws species-coloured boxes and labels onto a copy of a frame.
///
/// Without a font only the box outlines and label tabs are drawn.
#[derive(Default)]
pub struct BoxRenderer {
    font: Option<FontVec>,
}

impl BoxRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_file(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes).map_err(|_| FontError::Invalid)?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Returns an annotated copy; the input frame is left untouched.
    pub fn draw_boxes(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let Some(mut canvas) = frame.to_rgb_image() else {
            log::warn!("Cannot annotate malformed frame {}", frame.index());
            return frame.clone();
        };
        let (width, height) = canvas.dimensions();

        for det in detections {
            let color = Rgb(det.label.color());
            let Some((x1, y1, box_w, box_h)) = clip_box(det, width, height) else {
                continue;
            };

            for inset in 0..BOX_THICKNESS {
                let w = box_w.saturating_sub(2 * inset);
                let h = box_h.saturating_sub(2 * inset);
                if w == 0 || h == 0 {
                    break;
                }
                let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32).of_size(w, h);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            let text = label_text(det);
            let scale = PxScale::from(LABEL_SCALE);
            let (text_w, text_h) = match &self.font {
                Some(font) => text_size(scale, font, &text),
                None => (text.chars().count() as u32 * 8, LABEL_SCALE as u32),
            };
            let tab_w = text_w + 2 * LABEL_PADDING;
            let tab_h = text_h + 2 * LABEL_PADDING;
            // Put the tab above the box, or inside it when the box touches the top edge.
            let tab_y = if y1 >= tab_h { y1 - tab_h } else { y1 };
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(x1 as i32, tab_y as i32).of_size(tab_w, tab_h),
                color,
            );

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    LABEL_TEXT_COLOR,
                    (x1 + LABEL_PADDING) as i32,
                    (tab_y + LABEL_PADDING) as i32,
                    scale,
                    font,
                    &text,
                );
            }
        }

        Frame::from_rgb_image(canvas, frame.index())
    }
}

/// Clips a detection box to the canvas as `(x, y, width, height)`.
fn clip_box(det: &Detection, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (x1, y1, x2, y2) = det.bbox.as_tuple();
    let x1 = x1.clamp(0, width as i32) as u32;
    let y1 = y1.clamp(0, height as i32) as u32;
    let x2 = x2.clamp(0, width as i32) as u32;
    let y2 = y2.clamp(0, height as i32) as u32;
    (x2 > x1 && y2 > y1).then_some((x1, y1, x2 - x1, y2 - y1))
}

/// "Tiger 87.5%", or "Class_9 61.0%" for labels outside the taxonomy.
pub fn label_text(det: &Detection) -> String {
    format!("{} {:.1}%", det.label, det.confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::detection::BoundingBox;

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 3, 7)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        let d = frame.data();
        [d[i], d[i + 1], d[i + 2]]
    }

    #[test]
    fn test_label_text() {
        let det = Detection::new(3, 0.875, BoundingBox::new(0, 0, 10, 10).unwrap());
        assert_eq!(label_text(&det), "Tiger 87.5%");
        let det = Detection::new(9, 0.61, BoundingBox::new(0, 0, 10, 10).unwrap());
        assert_eq!(label_text(&det), "Class_9 61.0%");
    }

    #[test]
    fn test_draws_species_colour_outline() {
        let frame = blank(100, 100);
        let det = Detection::new(1, 0.9, BoundingBox::new(20, 40, 80, 90).unwrap());
        let out = BoxRenderer::new().draw_boxes(&frame, &[det]);

        assert_eq!(out.index(), 7);
        assert_eq!(pixel(&out, 20, 60), [128, 128, 128]);
        assert_eq!(pixel(&out, 22, 60), [128, 128, 128]);
        // Interior stays untouched.
        assert_eq!(pixel(&out, 50, 70), [0, 0, 0]);
        // Input is not modified.
        assert_eq!(pixel(&frame, 20, 60), [0, 0, 0]);
    }

    #[test]
    fn test_unknown_class_uses_fallback_colour() {
        let frame = blank(50, 50);
        let det = Detection::new(42, 0.9, BoundingBox::new(5, 30, 45, 48).unwrap());
        let out = BoxRenderer::new().draw_boxes(&frame, &[det]);
        assert_eq!(pixel(&out, 5, 40), [0, 255, 0]);
    }

    #[test]
    fn test_box_outside_canvas_is_skipped() {
        let frame = blank(20, 20);
        let det = Detection::new(0, 0.9, BoundingBox::new(30, 30, 40, 40).unwrap());
        let out = BoxRenderer::new().draw_boxes(&frame, &[det]);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn test_no_detections_returns_identical_pixels() {
        let frame = blank(16, 16);
        let out = BoxRenderer::new().draw_boxes(&frame, &[]);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn test_invalid_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(
            BoxRenderer::with_font_file(&path),
            Err(FontError::Invalid)
        ));
        assert!(matches!(
            BoxRenderer::with_font_file(&dir.path().join("missing.ttf")),
            Err(FontError::Read(_))
        ));
    }
}
