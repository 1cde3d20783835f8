use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;

use crate::utils::http::get_http_client;

pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];
const FALLBACK_IMAGE_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported image format for {name}. Allowed formats: {}", ALLOWED_IMAGE_EXTENSIONS.join(", "))]
    UnsupportedFormat { name: String },
    #[error("Failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raw upload bytes and the name shown next to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub name: String,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        Self {
            bytes,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> EncodedImage {
        EncodedImage::from_bytes(&self.bytes)
    }
}

/// Where image bytes come from: an upload already in memory, or a file on disk.
#[derive(Debug, Clone)]
pub enum ImageSource {
    InMemory { bytes: Vec<u8>, name: String },
    Path(PathBuf),
}

impl From<UploadedImage> for ImageSource {
    fn from(image: UploadedImage) -> Self {
        ImageSource::InMemory {
            bytes: image.bytes,
            name: image.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub mime_type: String,
}

impl EncodedImage {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mime_type = detect_mime_type(bytes)
            .filter(|mime| mime.starts_with("image/"))
            .unwrap_or_else(|| FALLBACK_IMAGE_MIME_TYPE.to_string());
        Self {
            base64: general_purpose::STANDARD.encode(bytes),
            mime_type,
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .map(|ext| ALLOWED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_allowed_image_name(name: &str) -> bool {
    has_allowed_extension(Path::new(name))
}

/// Existence is checked before the extension, so a missing `notes.txt`
/// reports `NotFound`.
pub fn validate_image_path(path: &Path) -> Result<&Path, ImageError> {
    if !path.exists() {
        return Err(ImageError::NotFound(path.to_path_buf()));
    }
    if !has_allowed_extension(path) {
        return Err(ImageError::UnsupportedFormat {
            name: path.display().to_string(),
        });
    }
    Ok(path)
}

pub fn load_image(source: &ImageSource) -> Result<UploadedImage, ImageError> {
    match source {
        ImageSource::InMemory { bytes, name } => Ok(UploadedImage::new(bytes.clone(), name)),
        ImageSource::Path(path) => {
            let path = validate_image_path(path)?;
            let bytes = fs::read(path).map_err(|source| ImageError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(UploadedImage::new(bytes, name))
        }
    }
}

pub async fn download_media(url: &str) -> anyhow::Result<Vec<u8>> {
    let response = get_http_client().get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow::anyhow!("Media download failed with status {status}"));
    }
    Ok(response.bytes().await?.to_vec())
}
