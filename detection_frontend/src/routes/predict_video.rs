use super::read_file_field;
use crate::{
    server::SharedState,
    submit::{SubmitError, SubmitOutcome},
    video_upload::{summary_lines, FrameLine, VideoUploader},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use detection_types::VideoStats;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictVideoError {
    #[error("Invalid upload form: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No video selected")]
    NoFile,
    #[error("A video analysis is already running")]
    InFlight,
    #[error("{0}")]
    Submit(#[from] SubmitError),
}

impl IntoResponse for PredictVideoError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictVideoError::Multipart(ref e) => e.status(),
            PredictVideoError::NoFile => StatusCode::BAD_REQUEST,
            PredictVideoError::InFlight => StatusCode::CONFLICT,
            PredictVideoError::Submit(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VideoSummaryResponse {
    pub in_flight: bool,
    pub frames: Vec<FrameLine>,
    pub stats: Option<VideoStats>,
}

impl VideoSummaryResponse {
    fn from_uploader(uploader: &VideoUploader) -> Self {
        let results = uploader.results();
        Self {
            in_flight: uploader.is_in_flight(),
            frames: results.as_deref().map(summary_lines).unwrap_or_default(),
            stats: results.as_deref().map(|r| r.stats()),
        }
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict_video(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<VideoSummaryResponse>, PredictVideoError> {
    state.metrics.record_request("/video");
    let uploader = &state.frontend.video;

    let file = read_file_field(multipart).await?;

    let started = Instant::now();
    let outcome = uploader
        .select_and_submit(file, state.detection_api.as_ref())
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(SubmitOutcome::Completed(result)) => {
            let total = result.summary.iter().map(|f| f.detections.len()).sum();
            state.metrics.record_api_call("video", elapsed_ms, Some(total));
            state.frontend.clear_notification();
        }
        Ok(SubmitOutcome::NoFile) => return Err(PredictVideoError::NoFile),
        Ok(SubmitOutcome::InFlight) | Ok(SubmitOutcome::Superseded) => {
            return Err(PredictVideoError::InFlight)
        }
        Err(e) => {
            state.metrics.record_api_call("video", elapsed_ms, None);
            state.frontend.notify(e.to_string());
            return Err(e.into());
        }
    }

    Ok(Json(VideoSummaryResponse::from_uploader(uploader)))
}

pub async fn video_summary(State(state): State<SharedState>) -> Json<VideoSummaryResponse> {
    state.metrics.record_request("/video/summary");
    Json(VideoSummaryResponse::from_uploader(&state.frontend.video))
}
