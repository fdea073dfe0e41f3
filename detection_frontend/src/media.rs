use bytes::Bytes;
use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Decode task failed: {0}")]
    DecodeTask(#[from] tokio::task::JoinError),
}

/// A file picked by the user. The bytes are never mutated; clones share them.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

impl SelectedFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, MediaError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = guess_content_type(&file_name).map(str::to_string);

        Ok(Self::new(file_name, content_type, Bytes::from(data)))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the file into an RGBA bitmap on the blocking pool.
    pub async fn decode_image(&self) -> Result<RgbaImage, MediaError> {
        let data = self.data.clone();
        let bitmap = tokio::task::spawn_blocking(move || decode_rgba(&data)).await??;
        Ok(bitmap)
    }
}

fn decode_rgba(data: &[u8]) -> Result<RgbaImage, image::ImageError> {
    let reader = image::ImageReader::new(std::io::Cursor::new(data)).with_guessed_format()?;
    Ok(reader.decode()?.to_rgba8())
}

fn guess_content_type(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    let content_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(content_type)
}
