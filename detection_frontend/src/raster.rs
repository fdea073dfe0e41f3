use crate::overlay::Surface;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::{drawing, rect::Rect};
use std::{io::Cursor, path::Path};
use thiserror::Error;

const LABEL_FONT_SIZE: f32 = 16.0;

/// DejaVu Sans, used for labels when no font file is configured or it fails to load.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Failed to read font file: {0}")]
    FontRead(#[from] std::io::Error),
    #[error("Invalid font: {0}")]
    InvalidFont(#[from] ab_glyph::InvalidFont),
    #[error("Failed to encode surface: {0}")]
    EncodeFailed(#[from] image::ImageError),
}

/// In-memory RGBA canvas. Text needs a font; without one labels are not drawn.
#[derive(Clone)]
pub struct RasterSurface {
    canvas: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            font,
        }
    }

    pub fn load_font(path: &Path) -> Result<FontArc, RasterError> {
        let data = std::fs::read(path)?;
        Ok(FontArc::try_from_vec(data)?)
    }

    pub fn bundled_font() -> Result<FontArc, RasterError> {
        Ok(FontArc::try_from_slice(BUNDLED_FONT)?)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn is_blank(&self) -> bool {
        self.canvas.width() == 0 || self.canvas.height() == 0
    }

    /// PNG encoding of the canvas, `None` while nothing has been drawn.
    pub fn to_png(&self) -> Result<Option<Vec<u8>>, RasterError> {
        if self.is_blank() {
            return Ok(None);
        }
        let mut buf = Vec::new();
        self.canvas
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        Ok(Some(buf))
    }
}

impl Surface for RasterSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        self.canvas = RgbaImage::new(0, 0);
    }

    fn draw_image(&mut self, bitmap: &RgbaImage) {
        image::imageops::replace(&mut self.canvas, bitmap, 0, 0);
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>, line_width: u32) {
        // Like a canvas stroke, the line is centred on the rectangle edge.
        // Edges past the canvas are pulled in to just outside of it.
        let margin = line_width as f32;
        let (left, right) = clamp_span(x, width, self.canvas.width(), margin);
        let (top, bottom) = clamp_span(y, height, self.canvas.height(), margin);
        let (width, height) = (right - left, bottom - top);
        if width == 0 && height == 0 {
            return;
        }
        let half = (line_width / 2) as i32;

        for step in 0..line_width as i32 {
            let inset = step - half;
            let w = width.saturating_sub(inset.saturating_mul(2));
            let h = height.saturating_sub(inset.saturating_mul(2));
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(left.saturating_add(inset), top.saturating_add(inset))
                .of_size(w as u32, h as u32);
            drawing::draw_hollow_rect_mut(&mut self.canvas, rect, color);
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>) {
        let Some(font) = &self.font else {
            tracing::debug!("No font loaded, skipping label {:?}", text);
            return;
        };
        let scale = PxScale::from(LABEL_FONT_SIZE);
        let ascent = font.as_scaled(scale).ascent();
        let top = (y - ascent).round() as i32;

        drawing::draw_text_mut(
            &mut self.canvas,
            color,
            x.round() as i32,
            top,
            scale,
            font,
            text,
        );
    }
}

/// Start and end of a span along one axis, clamped to `[-margin, limit + margin]`.
fn clamp_span(start: f32, extent: f32, limit: u32, margin: f32) -> (i32, i32) {
    let (from, to) = if extent < 0.0 {
        (start + extent, start)
    } else {
        (start, start + extent)
    };
    let (low, high) = (-margin, limit as f32 + margin);
    (
        from.clamp(low, high).round() as i32,
        to.clamp(low, high).round() as i32,
    )
}
