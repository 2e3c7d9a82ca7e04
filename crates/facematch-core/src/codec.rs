//! Image codec: raw file bytes to a text-safe [`EncodedImage`] and back.

use crate::types::EncodedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::Path;
use thiserror::Error;

const IMAGE_MEDIA_PREFIX: &str = "image/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("not an image: declared media type {0:?}")]
    NotAnImage(String),
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    #[error("cannot determine image type of {0}")]
    Unrecognized(String),
    #[error("corrupt image payload: {0}")]
    CorruptPayload(String),
}

/// Encode image bytes under their declared media type.
///
/// The media type is trimmed and lowercased; anything outside `image/*`
/// is rejected.
pub fn encode(bytes: &[u8], declared_media_type: &str) -> Result<EncodedImage, CodecError> {
    let media_type = normalize_media_type(declared_media_type)?;
    Ok(EncodedImage::new(STANDARD.encode(bytes), media_type))
}

/// Read and encode an image file, inferring its media type.
pub fn encode_file(path: impl AsRef<Path>) -> Result<EncodedImage, CodecError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| CodecError::Unreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let media_type = media_type_for(path, &bytes)
        .ok_or_else(|| CodecError::Unrecognized(path.display().to_string()))?;

    tracing::debug!(path = %path.display(), media_type, len = bytes.len(), "encoding image file");
    encode(&bytes, media_type)
}

/// Media type for a file: by extension first, then by sniffing its magic bytes.
pub fn media_type_for(path: &Path, bytes: &[u8]) -> Option<&'static str> {
    ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(bytes))
        .ok()
        .map(|format| format.to_mime_type())
}

/// Recover the original bytes of an encoded image.
pub fn decode(image: &EncodedImage) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(image.data())
        .map_err(|e| CodecError::CorruptPayload(e.to_string()))
}

fn normalize_media_type(declared: &str) -> Result<String, CodecError> {
    let media_type = declared.trim().to_ascii_lowercase();
    match media_type.strip_prefix(IMAGE_MEDIA_PREFIX) {
        Some(subtype) if !subtype.is_empty() => Ok(media_type),
        _ => Err(CodecError::NotAnImage(declared.to_string())),
    }
}

impl EncodedImage {
    /// See [`decode`].
    pub fn decode(&self) -> Result<Vec<u8>, CodecError> {
        decode(self)
    }
}
