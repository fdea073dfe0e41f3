use crate::config::DetectionApiConfig;
use crate::media::SelectedFile;
use async_trait::async_trait;
use detection_types::{ApiErrorBody, ApiHealth, ImageResult, VideoResult};
use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

pub const IMAGE_ENDPOINT: &str = "/predict/image";
pub const VIDEO_ENDPOINT: &str = "/predict/video";
pub const HEALTH_ENDPOINT: &str = "/health";

#[derive(Error, Debug)]
pub enum DetectionApiError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("Request to detection API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Detection API answered {status}: {message}")]
    Status { status: StatusCode, message: String },
}

/// Video sampling sent along with every video upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingParams {
    /// Every Nth frame is analysed.
    pub frame_stride: u32,
    pub max_frames: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            frame_stride: 10,
            max_frames: 50,
        }
    }
}

#[async_trait]
pub trait DetectionApi: Send + Sync + 'static {
    async fn predict_image(&self, file: &SelectedFile) -> Result<ImageResult, DetectionApiError>;
    async fn predict_video(
        &self,
        file: &SelectedFile,
        params: SamplingParams,
    ) -> Result<VideoResult, DetectionApiError>;
    async fn health(&self) -> Result<ApiHealth, DetectionApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    client: Client,
    base_url: String,
}

impl HttpDetectionClient {
    pub fn new(config: &DetectionApiConfig) -> Result<Self, DetectionApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.get_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(DetectionApiError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: config.get_base_url().to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
    ) -> Result<T, DetectionApiError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .multipart(form)
            .send()
            .await?;

        parse_response(response).await
    }
}

fn file_part(file: &SelectedFile) -> Result<Part, DetectionApiError> {
    let part = Part::bytes(file.data().to_vec())
        .file_name(file.file_name().to_string())
        .mime_str(file.content_type())?;
    Ok(part)
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, DetectionApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(error_body) => error_body.error,
        Err(_) if body.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => body,
    };

    Err(DetectionApiError::Status { status, message })
}

#[async_trait]
impl DetectionApi for HttpDetectionClient {
    #[instrument(skip(self, file), fields(file = file.file_name(), bytes = file.len()))]
    async fn predict_image(&self, file: &SelectedFile) -> Result<ImageResult, DetectionApiError> {
        let form = Form::new().part("file", file_part(file)?);
        let result: ImageResult = self.post_form(IMAGE_ENDPOINT, form).await?;

        tracing::debug!("Received {} detections", result.detections.len());
        Ok(result)
    }

    #[instrument(skip(self, file), fields(file = file.file_name(), bytes = file.len()))]
    async fn predict_video(
        &self,
        file: &SelectedFile,
        params: SamplingParams,
    ) -> Result<VideoResult, DetectionApiError> {
        let form = Form::new()
            .part("file", file_part(file)?)
            .text("frame_stride", params.frame_stride.to_string())
            .text("max_frames", params.max_frames.to_string());
        let result: VideoResult = self.post_form(VIDEO_ENDPOINT, form).await?;

        tracing::debug!("Received summary for {} frames", result.summary.len());
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn health(&self) -> Result<ApiHealth, DetectionApiError> {
        let response = self.client.get(self.url(HEALTH_ENDPOINT)).send().await?;
        parse_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::png_file;
    use axum::{
        extract::{Multipart, State},
        http::StatusCode as AxumStatus,
        routing::{get, post},
        Json, Router,
    };
    use std::{collections::HashMap, sync::Arc};
    use tokio::{net::TcpListener, sync::Mutex};

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn capture_fields(mut multipart: Multipart) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let value = match file_name {
                Some(file_name) => {
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let len = field.bytes().await.unwrap().len();
                    format!("{}|{}|{}", file_name, content_type, len)
                }
                None => field.text().await.unwrap(),
            };
            fields.insert(name, value);
        }
        fields
    }

    async fn fake_image(
        State(captured): State<Captured>,
        multipart: Multipart,
    ) -> Json<serde_json::Value> {
        captured.lock().await.push(capture_fields(multipart).await);
        Json(serde_json::json!({
            "filename": "cat.png",
            "inference_time_ms": 12,
            "detections": [
                {"class": "cat", "confidence": 0.91, "bbox": {"x1": 10, "y1": 10, "x2": 100, "y2": 100}}
            ]
        }))
    }

    async fn fake_video(
        State(captured): State<Captured>,
        multipart: Multipart,
    ) -> Json<serde_json::Value> {
        captured.lock().await.push(capture_fields(multipart).await);
        Json(serde_json::json!({
            "frames_processed": 2,
            "summary": [
                {"frame_index": 0, "detections": []},
                {"frame_index": 10, "detections": [
                    {"class": "poubelle", "confidence": 0.8734, "bbox": {"x1": 1, "y1": 2, "x2": 3, "y2": 4}}
                ]}
            ]
        }))
    }

    async fn fake_health() -> Json<serde_json::Value> {
        Json(serde_json::json!({"status": "ok", "model_loaded": true, "classes": ["poubelle"]}))
    }

    async fn spawn_fake_api(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base_url: String) -> HttpDetectionClient {
        HttpDetectionClient::new(&DetectionApiConfig {
            base_url,
            timeout_secs: Some(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_predict_image_sends_single_file_field() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(IMAGE_ENDPOINT, post(fake_image))
            .with_state(captured.clone());
        let client = client_for(spawn_fake_api(router).await);
        let file = png_file("cat.png", 30, 20);

        let result = client.predict_image(&file).await.unwrap();

        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].overlay_label(), "cat (0.91)");
        assert_eq!(result.inference_time_ms, Some(12));

        let requests = captured.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 1);
        assert_eq!(
            requests[0]["file"],
            format!("cat.png|image/png|{}", file.len())
        );
    }

    #[tokio::test]
    async fn test_predict_video_sends_sampling_params() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(VIDEO_ENDPOINT, post(fake_video))
            .with_state(captured.clone());
        let client = client_for(spawn_fake_api(router).await);
        let file = png_file("clip.mp4", 2, 2);

        let result = client
            .predict_video(&file, SamplingParams::default())
            .await
            .unwrap();

        assert_eq!(result.frames_processed, Some(2));
        assert_eq!(result.summary.len(), 2);

        let requests = captured.lock().await;
        assert_eq!(requests[0]["frame_stride"], "10");
        assert_eq!(requests[0]["max_frames"], "50");
        assert!(requests[0]["file"].starts_with("clip.mp4|"));
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let router = Router::new().route(
            IMAGE_ENDPOINT,
            post(|| async {
                (
                    AxumStatus::BAD_REQUEST,
                    Json(serde_json::json!({"error": "Aucun fichier 'file' fourni"})),
                )
            }),
        );
        let client = client_for(spawn_fake_api(router).await);

        let err = client
            .predict_image(&png_file("cat.png", 2, 2))
            .await
            .unwrap_err();

        match err {
            DetectionApiError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "Aucun fichier 'file' fourni");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(format!("http://{}", addr));

        let err = client.health().await.unwrap_err();

        assert!(matches!(err, DetectionApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_health() {
        let router = Router::new().route(HEALTH_ENDPOINT, get(fake_health));
        let client = client_for(spawn_fake_api(router).await);

        let health = client.health().await.unwrap();

        assert_eq!(health.status, "ok");
        assert!(health.model_loaded);
        assert_eq!(health.classes, vec!["poubelle".to_string()]);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = client_for("http://localhost:5000/".to_string());
        assert_eq!(client.url(IMAGE_ENDPOINT), "http://localhost:5000/predict/image");
    }
}
