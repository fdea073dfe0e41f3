use crate::client::HttpDetectionClient;
use crate::config::Config;
use crate::raster::{RasterError, RasterSurface};
use crate::server::{HttpServer, SharedState};

use ab_glyph::FontArc;
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

fn load_label_font(config: &Config) -> Result<FontArc, RasterError> {
    if let Some(path) = &config.overlay.font_path {
        match RasterSurface::load_font(path) {
            Ok(font) => return Ok(font),
            Err(e) => tracing::warn!(
                "Failed to load label font {}: {}. Using the bundled font",
                path.display(),
                e
            ),
        }
    }
    RasterSurface::bundled_font()
}

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let detection_api = match HttpDetectionClient::new(&config.detection_api) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize detection API client: {:?}", e);
            return Err(Box::new(e));
        }
    };
    tracing::info!(
        "Forwarding detections to {}",
        config.detection_api.get_base_url()
    );

    let font = match load_label_font(&config) {
        Ok(font) => font,
        Err(e) => {
            tracing::error!("Failed to load a label font: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let state = SharedState::new(detection_api, Some(font))?;
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
