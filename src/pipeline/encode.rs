//! Image encoding: page image file → base64 wrapped in `ImageData`.
//!
//! VLM APIs accept images as base64 payloads embedded in the JSON request
//! body. The rasteriser writes lossless PNG, but any recognised image
//! extension left in the scratch directory is sent with its own media type.

use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Media type for a page image, from its extension.
pub fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// Base64-encode raw image bytes for the VLM API.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; small
/// print on scanned reports is lost at the single-tile setting.
pub fn encode_bytes(bytes: &[u8], media_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, media_type).with_detail("high")
}

/// Read a page image from disk and encode it.
pub async fn encode_image_file(path: &Path) -> Result<ImageData, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::ImageReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(encode_bytes(&bytes, media_type_for(path)))
}
