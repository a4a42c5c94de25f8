//! Input staging: validate the two uploaded images and save them to a
//! per-run scratch directory.
//!
//! Every file a run touches (the uploads, their rotated and compressed
//! rewrites, the assembled PDF) lives in one [`TempDir`] owned by
//! [`StagedUploads`]. Dropping it removes the directory on every exit path,
//! including early returns on service errors and panics.

use crate::error::ScanError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Extensions accepted at the upload boundary and by the PDF assembler.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Number of images in one card scan: front, then back.
pub const REQUIRED_IMAGES: usize = 2;

/// One uploaded file, as received.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Read a local file, keeping its file name.
    pub async fn from_path(path: &Path) -> Result<Self, ScanError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ScanError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self { filename, bytes })
    }
}

/// True if `name` ends in an allowed image extension (case-insensitive).
pub fn has_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Directory components are dropped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`. Returns `None` when nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Check count, filenames and extensions. Makes no external calls.
pub fn validate_uploads(uploads: &[UploadedImage]) -> Result<(), ScanError> {
    if uploads.len() != REQUIRED_IMAGES {
        return Err(ScanError::InvalidUpload { got: uploads.len() });
    }
    for (index, upload) in uploads.iter().enumerate() {
        let Some(name) = sanitize_filename(&upload.filename) else {
            return Err(ScanError::MissingFilename { index });
        };
        if !has_allowed_extension(&name) {
            return Err(ScanError::UnsupportedExtension {
                filename: upload.filename.clone(),
            });
        }
    }
    Ok(())
}

/// Uploads saved to a scratch directory, in caller order.
///
/// The directory and everything in it is deleted when this is dropped.
pub struct StagedUploads {
    paths: Vec<PathBuf>,
    temp_dir: TempDir,
}

impl StagedUploads {
    /// Saved image paths, front first.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The run's scratch directory.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Validate and save uploads into a fresh scratch directory under `root`
/// (system temp dir when `None`).
///
/// Files are named `<index>_<sanitized name>` so two uploads with the same
/// name cannot overwrite each other.
pub async fn stage_uploads(
    uploads: &[UploadedImage],
    root: Option<&Path>,
) -> Result<StagedUploads, ScanError> {
    validate_uploads(uploads)?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("cardscan-");
    let temp_dir = match root {
        Some(root) => builder.tempdir_in(root).map_err(|e| ScanError::io(root, e))?,
        None => builder
            .tempdir()
            .map_err(|e| ScanError::io(std::env::temp_dir(), e))?,
    };

    let mut paths = Vec::with_capacity(uploads.len());
    for (index, upload) in uploads.iter().enumerate() {
        let name = sanitize_filename(&upload.filename)
            .ok_or(ScanError::MissingFilename { index })?;
        let path = temp_dir.path().join(format!("{index}_{name}"));
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| ScanError::io(&path, e))?;
        debug!("Saved upload {} ({} bytes)", path.display(), upload.bytes.len());
        paths.push(path);
    }

    Ok(StagedUploads { paths, temp_dir })
}
