//! Orientation correction from EXIF metadata.
//!
//! Phone cameras store pixels in sensor order and record the intended
//! rotation in EXIF tag 0x0112. Downstream stages (compression, PDF
//! embedding) drop EXIF, so the rotation has to be baked into the pixels
//! first or the card ends up sideways in the PDF.
//!
//! Only the three pure rotations are honoured:
//!
//! | Tag | Meaning            | Applied              |
//! |-----|--------------------|----------------------|
//! | 3   | upside down        | rotate 180°          |
//! | 6   | rotated 90° CCW    | rotate 90° clockwise |
//! | 8   | rotated 90° CW     | rotate 270° clockwise|
//!
//! Everything else (1, mirrored variants, garbage, no EXIF) is a no-op.

use crate::error::ScanError;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Clockwise rotation applied to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Rotation that makes an image with the given EXIF orientation upright.
    pub fn from_exif(orientation: u32) -> Self {
        match orientation {
            3 => Rotation::Cw180,
            6 => Rotation::Cw90,
            8 => Rotation::Cw270,
            _ => Rotation::None,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => img,
            Rotation::Cw90 => img.rotate90(),
            Rotation::Cw180 => img.rotate180(),
            Rotation::Cw270 => img.rotate270(),
        }
    }
}

/// Image bytes after orientation correction.
#[derive(Debug, Clone)]
pub struct Oriented {
    pub bytes: Vec<u8>,
    pub rotation: Rotation,
}

/// Read the EXIF orientation tag, if the container has one.
pub fn read_exif_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
}

/// Return upright image bytes.
///
/// When no rotation is needed the input bytes are returned as-is, so pixel
/// data is untouched. Otherwise the image is decoded, rotated and re-encoded
/// in its original container format without EXIF, which makes a second pass
/// a no-op.
pub fn correct_orientation(bytes: &[u8]) -> Result<Oriented, image::ImageError> {
    let rotation = read_exif_orientation(bytes)
        .map(Rotation::from_exif)
        .unwrap_or(Rotation::None);

    if rotation == Rotation::None {
        return Ok(Oriented {
            bytes: bytes.to_vec(),
            rotation,
        });
    }

    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let upright = rotation.apply(img);

    let mut out = Vec::with_capacity(bytes.len());
    upright.write_to(&mut Cursor::new(&mut out), format)?;
    debug!("Applied {:?} ({:?}): {} → {} bytes", rotation, format, bytes.len(), out.len());

    Ok(Oriented {
        bytes: out,
        rotation,
    })
}

/// Correct the orientation of an image file in place.
///
/// The file is only rewritten when a rotation was applied.
pub fn orient_file(path: &Path) -> Result<Rotation, ScanError> {
    let bytes = std::fs::read(path).map_err(|e| ScanError::io(path, e))?;
    let oriented = correct_orientation(&bytes).map_err(|e| ScanError::ImageDecode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    if oriented.rotation != Rotation::None {
        std::fs::write(path, &oriented.bytes).map_err(|e| ScanError::io(path, e))?;
    }
    Ok(oriented.rotation)
}

/// Container format of a file, guessed from content.
pub(crate) fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    /// 40×20 image, red left half, blue right half.
    pub fn split_image() -> DynamicImage {
        let img = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    pub fn encode_jpeg(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Big-endian TIFF block with a single Orientation entry.
    fn orientation_tiff(orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());
        tiff
    }

    /// JPEG with a minimal EXIF APP1 carrying only the Orientation tag.
    pub fn jpeg_with_orientation(img: &DynamicImage, orientation: u16) -> Vec<u8> {
        let jpeg = encode_jpeg(img);
        let tiff = orientation_tiff(orientation);

        let mut app1 = Vec::new();
        app1.extend_from_slice(&[0xFF, 0xE1]);
        app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
        app1.extend_from_slice(b"Exif\x00\x00");
        app1.extend_from_slice(&tiff);

        let mut out = Vec::with_capacity(jpeg.len() + app1.len());
        out.extend_from_slice(&jpeg[..2]);
        out.extend_from_slice(&app1);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    /// CRC-32 (IEEE) as used by PNG chunks.
    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &b in bytes {
            crc ^= b as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    /// PNG with an `eXIf` chunk right after IHDR carrying only the Orientation tag.
    pub fn png_with_orientation(img: &DynamicImage, orientation: u16) -> Vec<u8> {
        let png = encode_png(img);
        let tiff = orientation_tiff(orientation);

        let mut typed = b"eXIf".to_vec();
        typed.extend_from_slice(&tiff);
        let mut chunk = (tiff.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(&typed);
        chunk.extend_from_slice(&crc32(&typed).to_be_bytes());

        // Signature (8) + IHDR chunk (4 + 4 + 13 + 4).
        let ihdr_end = 8 + 25;
        let mut out = Vec::with_capacity(png.len() + chunk.len());
        out.extend_from_slice(&png[..ihdr_end]);
        out.extend_from_slice(&chunk);
        out.extend_from_slice(&png[ihdr_end..]);
        out
    }

    pub fn is_reddish(p: [u8; 3]) -> bool {
        p[0] > 150 && p[2] < 100
    }

    pub fn is_bluish(p: [u8; 3]) -> bool {
        p[2] > 150 && p[0] < 100
    }
}
