//! Image encoding for OCR requests: raw bytes → base64 + MIME type.
//!
//! Document AI takes the image inline in the JSON body as base64
//! `rawDocument.content` and rejects requests whose `mimeType` does not match
//! the payload. The compressor may have turned a `.png` upload into JPEG
//! bytes, so the MIME type is sniffed from content, never taken from the
//! filename.

use crate::pipeline::orient::sniff_format;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use tracing::debug;

/// An image ready to embed in an OCR request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard base64, no data-URI prefix.
    pub data: String,
    pub mime_type: &'static str,
}

/// MIME type of an image, from its content. Unknown content is sent as
/// `application/octet-stream` and left for the service to reject.
pub fn mime_type(bytes: &[u8]) -> &'static str {
    match sniff_format(bytes) {
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Png) => "image/png",
        Some(other) => other.to_mime_type(),
        None => "application/octet-stream",
    }
}

/// Base64-encode image bytes.
pub fn encode_image(bytes: &[u8]) -> EncodedImage {
    let data = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", data.len());
    EncodedImage {
        data,
        mime_type: mime_type(bytes),
    }
}
