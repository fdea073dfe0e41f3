mod health;
mod index;
mod metrics;
mod predict_image;
mod predict_video;

use crate::{media::SelectedFile, server::SharedState};
use axum::{
    extract::{multipart::MultipartError, Multipart},
    routing::{get, post},
    Router,
};
use health::healthcheck;
use index::index;
use metrics::metrics_handler;
use predict_image::{overlay_image, predict_image};
use predict_video::{predict_video, video_summary};

pub const FILE_FIELD: &str = "file";

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
        .route("/image", post(predict_image))
        .route("/image/overlay", get(overlay_image))
        .route("/video", post(predict_video))
        .route("/video/summary", get(video_summary))
}

/// Reads the `file` field of an upload form. A field without a file name or
/// without content counts as no selection.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<SelectedFile>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Ok(None),
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        if data.is_empty() {
            return Ok(None);
        }
        return Ok(Some(SelectedFile::new(file_name, content_type, data)));
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::client::DetectionApi;
    use crate::raster::RasterSurface;
    use crate::server::{build_router, SharedState};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Serves the front-end on an ephemeral port and returns its base URL.
    pub(crate) async fn spawn_frontend(api: Arc<dyn DetectionApi>) -> (String, SharedState) {
        let font = RasterSurface::bundled_font().unwrap();
        let state = SharedState::new(api, Some(font)).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = build_router(state.clone(), 16 * 1024 * 1024);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    pub(crate) fn upload_form(file_name: &str, data: Vec<u8>) -> reqwest::multipart::Form {
        let part = reqwest::multipart::Part::bytes(data).file_name(file_name.to_string());
        reqwest::multipart::Form::new().part("file", part)
    }
}
