use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::error::StudioError;
use crate::imaging::asset::ImageResource;
use crate::llm::media::{detect_mime_type, FALLBACK_MIME_TYPE};

/// Base64 image content (no data-URI prefix) and its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub base64: String,
    pub mime_type: String,
}

/// Reads and encodes `resource`. Nothing is cached; every call re-reads.
pub async fn encode_image(resource: &ImageResource) -> Result<EncodedImage, StudioError> {
    let bytes = resource.read().await.map_err(|err| StudioError::Encode {
        name: resource.name().to_string(),
        reason: err.to_string(),
    })?;

    let mime_type = match resource.declared_type() {
        Some(declared) => declared.to_string(),
        None => detect_mime_type(&bytes).unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
    };
    let encoded = general_purpose::STANDARD.encode(&bytes);
    debug!(
        "Encoded {} ({}, {} bytes -> {} chars)",
        resource.name(),
        mime_type,
        bytes.len(),
        encoded.len()
    );

    Ok(EncodedImage {
        base64: encoded,
        mime_type,
    })
}
