use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the source media.
/// `(x1, y1)` is the top-left corner, `(x2, y2)` the bottom-right one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    /// Label drawn on the image overlay, confidence printed as received.
    pub fn overlay_label(&self) -> String {
        format!("{} ({})", self.class_label, self.confidence)
    }

    /// Label used in the per-frame video summary, confidence as a whole percentage.
    pub fn summary_label(&self) -> String {
        format!("{} ({}%)", self.class_label, confidence_percent(self.confidence))
    }
}

/// Whole percent of a confidence score. Scores outside `[0, 1]` are clamped
/// and NaN counts as 0.
pub fn confidence_percent(confidence: f64) -> i64 {
    if confidence.is_nan() {
        return 0;
    }
    (confidence.clamp(0.0, 1.0) * 100.0).round() as i64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<u64>,
    pub detections: Vec<Detection>,
}

impl ImageResult {
    pub fn stats(&self) -> ImageStats {
        ImageStats {
            detection_count: self.detections.len(),
            mean_confidence: mean(self.detections.iter().map(|d| d.confidence)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_processed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<u64>,
    pub summary: Vec<FrameSummary>,
}

impl VideoResult {
    pub fn stats(&self) -> VideoStats {
        let frames_analyzed = self.summary.len();
        let total_detections: usize = self.summary.iter().map(|f| f.detections.len()).sum();
        let mean_per_frame = if frames_analyzed == 0 {
            0.0
        } else {
            total_detections as f64 / frames_analyzed as f64
        };

        VideoStats {
            frames_analyzed,
            total_detections,
            mean_per_frame,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageStats {
    pub detection_count: usize,
    /// `None` when nothing was detected.
    pub mean_confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoStats {
    pub frames_analyzed: usize,
    pub total_detections: usize,
    pub mean_per_frame: f64,
}

/// Body of the detection API health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiHealth {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Error body returned by the detection API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}
