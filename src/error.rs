//! Error types for the cardscan library.
//!
//! Only fatal conditions live here. Degradations that the pipeline can absorb
//! (unreadable EXIF, a compression pass that fails) are logged with `warn!`
//! and never reach the caller.
//!
//! Every variant maps onto one of three [`ErrorClass`]es so the HTTP boundary
//! can turn any failure into a status code without matching on variants.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Caller supplied the wrong number of files.
    #[error("Please upload exactly two images.")]
    InvalidUpload { got: usize },

    /// An uploaded file has no usable filename.
    #[error("Uploaded file #{index} has no filename")]
    MissingFilename { index: usize },

    /// An uploaded file's extension is not on the allow-list.
    #[error("File '{filename}' is not an allowed image type (allowed: .jpg, .jpeg, .png)")]
    UnsupportedExtension { filename: String },

    /// Request body exceeded the configured upload limit.
    #[error("Upload exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge { limit_bytes: usize },

    // ── Assembly preconditions ────────────────────────────────────────────
    /// Nothing qualified for the PDF.
    #[error("No images to convert!")]
    NoImages,

    /// Only one image qualified; a card needs a front and a back.
    #[error("Need at least 2 images for front and back of insurance card (got {got})")]
    NotEnoughImages { got: usize },

    /// An image could not be decoded when building the PDF.
    #[error("Could not decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    // ── External services ─────────────────────────────────────────────────
    /// OCR service call failed.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// LLM field extraction call failed.
    #[error("Field extraction failed: {0}")]
    Extraction(String),

    /// Upload of the assembled PDF failed.
    #[error("Storage upload failed: {0}")]
    Storage(String),

    /// Database update failed (the transaction was rolled back).
    #[error("Database error: {0}")]
    Database(String),

    // ── Config / local ────────────────────────────────────────────────────
    /// A required setting is missing or malformed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local file-system error on the run's scratch directory.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the upload boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad request from the client; no external call was made.
    InvalidInput,
    /// Request body too large.
    TooLarge,
    /// Anything that went wrong while processing a valid request.
    Processing,
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::InvalidUpload { .. }
            | ScanError::MissingFilename { .. }
            | ScanError::UnsupportedExtension { .. }
            | ScanError::NoImages
            | ScanError::NotEnoughImages { .. }
            | ScanError::ImageDecode { .. } => ErrorClass::InvalidInput,
            ScanError::PayloadTooLarge { .. } => ErrorClass::TooLarge,
            ScanError::Ocr(_)
            | ScanError::Extraction(_)
            | ScanError::Storage(_)
            | ScanError::Database(_)
            | ScanError::InvalidConfig(_)
            | ScanError::Io { .. }
            | ScanError::Internal(_) => ErrorClass::Processing,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::InvalidInput => 400,
            ErrorClass::TooLarge => 413,
            ErrorClass::Processing => 500,
        }
    }

    /// Message safe to hand back to an HTTP client.
    ///
    /// Processing failures collapse to a generic message; the detail is in
    /// the server log.
    pub fn client_message(&self) -> String {
        match self.class() {
            ErrorClass::Processing => "Failed to process insurance card images".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<sqlx::Error> for ScanError {
    fn from(e: sqlx::Error) -> Self {
        ScanError::Database(e.to_string())
    }
}
