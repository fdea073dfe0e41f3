mod routes;
mod server;

pub mod app;
pub mod client;
pub mod config;
pub mod image_upload;
pub mod media;
pub mod overlay;
pub mod raster;
pub mod submit;
pub mod telemetry;
pub mod video_upload;

pub use app::start_app;
