use crate::media::{MediaError, SelectedFile};
use detection_types::{BoundingBox, ImageResult};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

pub const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const LINE_WIDTH: u32 = 2;

const LABEL_MIN_TOP: f32 = 20.0;
const LABEL_OFFSET_ABOVE: f32 = 5.0;
const LABEL_OFFSET_BELOW: f32 = 20.0;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Could not decode the selected file: {0}")]
    Decode(#[from] MediaError),
}

/// Drawing target with canvas-like semantics: coordinates are pixels,
/// text is anchored on its baseline.
pub trait Surface: Send + 'static {
    /// Resizes the surface, discarding whatever was drawn.
    fn resize(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    fn draw_image(&mut self, bitmap: &RgbaImage);
    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>, line_width: u32);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Result or file missing, the surface was not touched.
    Skipped,
    /// Inputs identical to the ones already drawn.
    Unchanged,
    /// A newer result/file pair arrived while this one was decoding.
    Superseded,
    Drawn {
        width: u32,
        height: u32,
        annotations: usize,
    },
}

/// Baseline-left point of a detection label: above the box when there is
/// room for it, inside the box otherwise.
pub fn label_anchor(bbox: &BoundingBox) -> (f32, f32) {
    if bbox.y1 > LABEL_MIN_TOP {
        (bbox.x1, bbox.y1 - LABEL_OFFSET_ABOVE)
    } else {
        (bbox.x1, bbox.y1 + LABEL_OFFSET_BELOW)
    }
}

/// Draws `bitmap` at its natural size followed by one box and label per detection.
pub fn paint<S: Surface + ?Sized>(surface: &mut S, bitmap: &RgbaImage, result: &ImageResult) -> RenderOutcome {
    let (width, height) = bitmap.dimensions();
    surface.resize(width, height);
    surface.draw_image(bitmap);

    for detection in &result.detections {
        let bbox = &detection.bbox;
        surface.stroke_rect(
            bbox.x1,
            bbox.y1,
            bbox.width(),
            bbox.height(),
            HIGHLIGHT_COLOR,
            LINE_WIDTH,
        );

        let (x, y) = label_anchor(bbox);
        surface.fill_text(&detection.overlay_label(), x, y, HIGHLIGHT_COLOR);
    }

    RenderOutcome::Drawn {
        width,
        height,
        annotations: result.detections.len(),
    }
}

/// One-shot render of `result` over `file`. Missing inputs leave the surface as is.
pub async fn render<S: Surface + ?Sized>(
    result: Option<&ImageResult>,
    file: Option<&SelectedFile>,
    surface: &mut S,
) -> Result<RenderOutcome, OverlayError> {
    let (Some(result), Some(file)) = (result, file) else {
        return Ok(RenderOutcome::Skipped);
    };

    let decoded = file.decode_image().await;
    finish(surface, decoded, result, file)
}

fn finish<S: Surface + ?Sized>(
    surface: &mut S,
    decoded: Result<RgbaImage, MediaError>,
    result: &ImageResult,
    file: &SelectedFile,
) -> Result<RenderOutcome, OverlayError> {
    match decoded {
        Ok(bitmap) => Ok(paint(surface, &bitmap, result)),
        Err(e) => {
            tracing::warn!("Skipping overlay for {}: {}", file.file_name(), e);
            surface.clear();
            Err(OverlayError::Decode(e))
        }
    }
}

struct OverlayState<S> {
    result: Option<Arc<ImageResult>>,
    file: Option<Arc<SelectedFile>>,
    generation: u64,
    surface: S,
}

/// Keeps the surface in sync with the latest result/file pair.
pub struct OverlayView<S: Surface> {
    state: Mutex<OverlayState<S>>,
}

impl<S: Surface> OverlayView<S> {
    pub fn new(surface: S) -> Self {
        Self {
            state: Mutex::new(OverlayState {
                result: None,
                file: None,
                generation: 0,
                surface,
            }),
        }
    }

    /// Replaces the inputs and redraws when either reference changed.
    /// The drawing only lands if no newer pair was set while decoding.
    pub async fn update(
        &self,
        result: Option<Arc<ImageResult>>,
        file: Option<Arc<SelectedFile>>,
    ) -> Result<RenderOutcome, OverlayError> {
        let generation = {
            let mut state = self.state.lock();
            if same_ref(&state.result, &result) && same_ref(&state.file, &file) {
                return Ok(RenderOutcome::Unchanged);
            }
            state.result = result.clone();
            state.file = file.clone();
            state.generation += 1;
            state.generation
        };

        let (Some(result), Some(file)) = (result, file) else {
            return Ok(RenderOutcome::Skipped);
        };

        let decoded = file.decode_image().await;

        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(
                "Dropping overlay render {} superseded by {}",
                generation,
                state.generation
            );
            return Ok(RenderOutcome::Superseded);
        }

        finish(&mut state.surface, decoded, &result, &file)
    }

    pub fn current_result(&self) -> Option<Arc<ImageResult>> {
        self.state.lock().result.clone()
    }

    pub fn with_surface<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        f(&self.state.lock().surface)
    }
}

fn same_ref<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
