//! Document assembly: card images → one multi-page PDF.
//!
//! One page per image, in the order given, each page exactly the size of its
//! image (1 px = 1 pt). Images are embedded as baseline JPEG with the
//! `DCTDecode` filter so a PDF viewer decodes them natively and the file
//! stays close to the sum of its images.

use crate::error::ScanError;
use crate::pipeline::input::has_allowed_extension;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The written PDF.
#[derive(Debug, Clone)]
pub struct AssembledPdf {
    pub path: PathBuf,
    pub page_count: usize,
}

/// Build a PDF from the images among `inputs`, in order.
///
/// Inputs without an allowed image extension, or that are not existing
/// files, are skipped. Fails with
/// [`ScanError::NoImages`] or [`ScanError::NotEnoughImages`] when fewer than
/// two qualify. Source files are not modified.
pub fn assemble_pdf(
    inputs: &[PathBuf],
    out_path: &Path,
    jpeg_quality: u8,
) -> Result<AssembledPdf, ScanError> {
    let images: Vec<&PathBuf> = inputs
        .iter()
        .filter(|p| {
            let is_image = p
                .file_name()
                .and_then(|n| n.to_str())
                .map(has_allowed_extension)
                .unwrap_or(false);
            if !is_image {
                debug!("Skipping non-image {}", p.display());
                return false;
            }
            if !p.is_file() {
                debug!("Skipping missing {}", p.display());
                return false;
            }
            true
        })
        .collect();

    match images.len() {
        0 => return Err(ScanError::NoImages),
        1 => return Err(ScanError::NotEnoughImages { got: 1 }),
        _ => {}
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for path in &images {
        // The compressor writes JPEG bytes under the upload's original
        // extension, so decode by content.
        let bytes = std::fs::read(path).map_err(|e| ScanError::io(path.as_path(), e))?;
        let img = image::load_from_memory(&bytes).map_err(|e| ScanError::ImageDecode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let page_id = add_image_page(&mut doc, pages_id, &img, jpeg_quality).map_err(|e| {
            ScanError::ImageDecode {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        })?;
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(out_path).map_err(|e| ScanError::io(out_path, e))?;
    info!("Assembled {} pages → {}", page_count, out_path.display());

    Ok(AssembledPdf {
        path: out_path.to_path_buf(),
        page_count,
    })
}

/// Append one page showing `img` at full size.
fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    img: &DynamicImage,
    quality: u8,
) -> Result<ObjectId, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = (rgb.width() as i64, rgb.height() as i64);

    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality))?;
    debug!("Page image {}x{} → {} bytes JPEG", width, height, jpeg.len());

    let mut img_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    );
    img_stream.allows_compression = false;
    let img_id = doc.add_object(img_stream);

    let content = format!("q {width} 0 0 {height} 0 0 cm /Im0 Do Q");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => img_id,
            },
        },
    }))
}
