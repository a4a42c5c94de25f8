//! Size compression: bound pixel dimensions, then step JPEG quality down
//! until the encoding fits under a byte ceiling.
//!
//! The ceiling is best effort. OCR accuracy collapses below roughly quality
//! 25–30, so once the floor is reached the last encoding is kept even if it
//! is still too large. Compression never fails a scan: the orchestrator logs
//! the error and carries on with the uncompressed file.

use crate::config::PipelineConfig;
use crate::error::ScanError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, info};

/// Compression parameters, extracted from [`PipelineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionTarget {
    pub max_bytes: u64,
    pub max_dimension: u32,
    pub quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl From<&PipelineConfig> for CompressionTarget {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            max_bytes: c.max_bytes,
            max_dimension: c.max_dimension,
            quality: c.jpeg_quality,
            min_quality: c.min_quality,
            quality_step: c.quality_step,
        }
    }
}

/// Result of one compression.
#[derive(Debug, Clone)]
pub struct Compressed {
    /// Final JPEG bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality of the final encoding.
    pub quality: u8,
    /// False when the floor was reached and the result is still too large.
    pub within_target: bool,
}

/// Dimensions after bounding the longer side to `max`, aspect preserved.
///
/// Returns the input unchanged when both sides already fit.
pub fn bounded_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let (w, h, m) = (width as u64, height as u64, max as u64);
    if w > h {
        (max, ((h * m) / w).max(1) as u32)
    } else {
        (((w * m) / h).max(1) as u32, max)
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(buf)
}

/// Compress a decoded image.
pub fn compress_image(
    img: &DynamicImage,
    target: &CompressionTarget,
) -> Result<Compressed, image::ImageError> {
    // JPEG has no alpha; drop alpha/palette up front.
    let mut rgb = DynamicImage::ImageRgb8(img.to_rgb8());

    let (w, h) = bounded_dimensions(rgb.width(), rgb.height(), target.max_dimension);
    if (w, h) != (rgb.width(), rgb.height()) {
        debug!("Resizing {}x{} → {}x{}", rgb.width(), rgb.height(), w, h);
        rgb = rgb.resize_exact(w, h, FilterType::Lanczos3);
    }

    let mut quality = target.quality;
    let mut bytes = encode_jpeg(&rgb, quality)?;

    // A zero step would never reach the floor; treat it as 1.
    let step = target.quality_step.max(1);
    while bytes.len() as u64 > target.max_bytes && quality > target.min_quality {
        let next = quality.saturating_sub(step).max(1);
        if next == quality {
            break;
        }
        quality = next;
        bytes = encode_jpeg(&rgb, quality)?;
        debug!("Re-encoded at quality {} → {} bytes", quality, bytes.len());
    }

    Ok(Compressed {
        within_target: bytes.len() as u64 <= target.max_bytes,
        width: w,
        height: h,
        quality,
        bytes,
    })
}

/// Compress encoded image bytes (any supported container).
pub fn compress_bytes(
    bytes: &[u8],
    target: &CompressionTarget,
) -> Result<Compressed, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    compress_image(&img, target)
}

/// Compress an image file in place.
///
/// On any error the file keeps its previous content.
pub fn compress_file(path: &Path, target: &CompressionTarget) -> Result<Compressed, ScanError> {
    let original = std::fs::read(path).map_err(|e| ScanError::io(path, e))?;
    let compressed = compress_bytes(&original, target).map_err(|e| ScanError::ImageDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    // Write beside the original and rename so a failed write never
    // leaves a truncated image behind.
    let tmp = path.with_extension("compressing");
    std::fs::write(&tmp, &compressed.bytes).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ScanError::io(&tmp, e)
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ScanError::io(path, e)
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    info!(
        "Compressed {}: {:.2}MB (quality: {}, {}x{})",
        name,
        compressed.bytes.len() as f64 / (1024.0 * 1024.0),
        compressed.quality,
        compressed.width,
        compressed.height
    );
    Ok(compressed)
}
