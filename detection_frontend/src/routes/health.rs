use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use detection_types::ApiHealth;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    detection_api: Option<ApiHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detection_api_error: Option<String>,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    state.metrics.record_request("/health");

    let (detection_api, detection_api_error) = match state.detection_api.health().await {
        Ok(health) => (Some(health), None),
        Err(e) => {
            tracing::warn!("Detection API health check failed: {}", e);
            (None, Some(e.to_string()))
        }
    };

    Json(Status {
        status: "Available".into(),
        detection_api,
        detection_api_error,
    })
}
