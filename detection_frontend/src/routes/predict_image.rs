use super::read_file_field;
use crate::{
    overlay::{OverlayError, RenderOutcome},
    raster::RasterError,
    server::SharedState,
    submit::{SubmitError, SubmitOutcome},
};
use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const PNG_CONTENT_TYPE: &str = "image/png";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("Invalid upload form: {0}")]
    Multipart(#[from] MultipartError),
    #[error("No image selected")]
    NoFile,
    #[error("{0}")]
    Submit(#[from] SubmitError),
    #[error("A newer image upload replaced this one")]
    Superseded,
    #[error("{0}")]
    Overlay(#[from] OverlayError),
    #[error("Failed to encode overlay: {0}")]
    Encode(#[from] RasterError),
    #[error("No overlay has been drawn yet")]
    NoOverlay,
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictImageError::Multipart(ref e) => e.status(),
            PredictImageError::NoFile => StatusCode::BAD_REQUEST,
            PredictImageError::Submit(_) => StatusCode::BAD_GATEWAY,
            PredictImageError::Superseded => StatusCode::CONFLICT,
            PredictImageError::Overlay(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictImageError::NoOverlay => StatusCode::NOT_FOUND,
            PredictImageError::Encode(_) | PredictImageError::HttpBuilder(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

fn png_response(state: &SharedState) -> Result<Response, PredictImageError> {
    let png = state
        .frontend
        .overlay
        .with_surface(|surface| surface.to_png())?
        .ok_or(PredictImageError::NoOverlay)?;

    Response::builder()
        .header(header::CONTENT_TYPE, PNG_CONTENT_TYPE)
        .body(Body::from(png))
        .map_err(|e| PredictImageError::HttpBuilder(e.to_string()))
}

#[instrument(skip(state, multipart))]
pub async fn predict_image(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Response, PredictImageError> {
    state.metrics.record_request("/image");
    let frontend = &state.frontend;

    let file = read_file_field(multipart).await?;

    let started = Instant::now();
    let outcome = frontend
        .image
        .select_and_submit(file, state.detection_api.as_ref())
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let submission = match outcome {
        Ok(SubmitOutcome::Completed(submission)) => {
            let count = submission.result.detections.len();
            state.metrics.record_api_call("image", elapsed_ms, Some(count));
            submission
        }
        Ok(SubmitOutcome::NoFile) => return Err(PredictImageError::NoFile),
        Ok(SubmitOutcome::Superseded) | Ok(SubmitOutcome::InFlight) => {
            return Err(PredictImageError::Superseded)
        }
        Err(e) => {
            state.metrics.record_api_call("image", elapsed_ms, None);
            frontend.notify(e.to_string());
            return Err(e.into());
        }
    };

    let rendered = frontend
        .overlay
        .update(Some(submission.result), Some(submission.file))
        .await
        .inspect_err(|e| frontend.notify(e.to_string()))?;

    match rendered {
        RenderOutcome::Superseded => Err(PredictImageError::Superseded),
        _ => {
            frontend.clear_notification();
            png_response(&state)
        }
    }
}

pub async fn overlay_image(State(state): State<SharedState>) -> Result<Response, PredictImageError> {
    state.metrics.record_request("/image/overlay");
    png_response(&state)
}
