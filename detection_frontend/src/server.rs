use crate::{
    client::DetectionApi,
    config::Config,
    image_upload::ImageUploader,
    overlay::OverlayView,
    raster::RasterSurface,
    routes::api_routes,
    telemetry::Metrics,
    video_upload::VideoUploader,
};
use ab_glyph::FontArc;
use axum::{extract::DefaultBodyLimit, Router};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

/// View state of the single front-end session served by this process.
pub struct FrontendState {
    pub image: ImageUploader,
    pub overlay: OverlayView<RasterSurface>,
    pub video: VideoUploader,
    notification: Mutex<Option<String>>,
}

impl FrontendState {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            image: ImageUploader::new(),
            overlay: OverlayView::new(RasterSurface::new(font)),
            video: VideoUploader::new(),
            notification: Mutex::new(None),
        }
    }

    /// Records the message shown to the user for the last failed action.
    pub fn notify(&self, message: impl Into<String>) {
        *self.notification.lock() = Some(message.into());
    }

    /// Drops the notification once a later action succeeded.
    pub fn clear_notification(&self) {
        self.notification.lock().take();
    }

    pub fn last_notification(&self) -> Option<String> {
        self.notification.lock().clone()
    }
}

#[derive(Clone)]
pub struct SharedState {
    pub detection_api: Arc<dyn DetectionApi>,
    pub frontend: Arc<FrontendState>,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn new(detection_api: Arc<dyn DetectionApi>, font: Option<FontArc>) -> anyhow::Result<Self> {
        Ok(Self {
            detection_api,
            frontend: Arc::new(FrontendState::new(font)),
            metrics: Arc::new(Metrics::new()?),
        })
    }
}

pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(api_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = build_router(state, config.server.max_upload_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
