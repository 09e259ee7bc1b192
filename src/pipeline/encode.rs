//! Image encoding: raw image bytes → base64 payload with a sniffed MIME type.
//!
//! Uploaded invoices arrive as whatever the scanner or phone produced. The
//! bytes are forwarded untouched (no re-encoding, so no extra compression
//! artefacts on fine print); only the MIME type is derived from the magic
//! bytes, since the declared file extension is often wrong.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use thiserror::Error;
use tracing::debug;

/// Formats the vision providers accept as inline data.
const SUPPORTED: [ImageFormat; 4] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// A base64 image ready for a multimodal request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("payload is not a recognised image")]
    Unrecognised,
    #[error("image format {0:?} is not supported (use PNG, JPEG, GIF or WebP)")]
    Unsupported(ImageFormat),
}

/// Sniff and base64-encode an invoice image.
pub fn encode_image(bytes: &[u8]) -> Result<ImagePayload, EncodeError> {
    if bytes.is_empty() {
        return Err(EncodeError::Empty);
    }

    let format = image::guess_format(bytes).map_err(|_| EncodeError::Unrecognised)?;
    if !SUPPORTED.contains(&format) {
        return Err(EncodeError::Unsupported(format));
    }

    let data = STANDARD.encode(bytes);
    debug!("Encoded {:?} image → {} bytes base64", format, data.len());

    Ok(ImagePayload {
        data,
        mime_type: format.to_mime_type(),
    })
}
