//! Shared fixtures: in-memory collaborators and synthetic card images.

#![allow(dead_code)]

use async_trait::async_trait;
use cardscan::{
    ArtifactSink, CardScanner, InsuranceType, OcrService, PipelineConfig, PipelineConfigBuilder,
    RecordSink, ScanError, ScanProgressCallback, ScanStage, TextCompleter, UploadedImage,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const LINK_PREFIX: &str = "https://cards.example.test/uploads/";

pub const FULL_REPLY: &str = "Patient First Name: jane\n\
                              Patient Last Name: doe\n\
                              Member ID: W123456789\n\
                              Group ID: 00421\n\
                              Insurance Company: Blue Cross";

// ── Collaborators ────────────────────────────────────────────────────────────

pub struct MockOcr {
    pub text: String,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub mime_types: Mutex<Vec<String>>,
}

#[async_trait]
impl OcrService for MockOcr {
    async fn recognize(&self, _bytes: &[u8], mime_type: &str) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Ocr("processor unavailable".into()));
        }
        Ok(self.text.clone())
    }
}

pub struct MockCompleter {
    pub reply: Mutex<String>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextCompleter for MockCompleter {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Extraction("rate limited".into()));
        }
        Ok(self.reply.lock().unwrap().clone())
    }
}

/// Keeps every stored file in memory.
pub struct MockSink {
    pub fail: AtomicBool,
    pub stored: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl ArtifactSink for MockSink {
    async fn store(&self, path: &Path, file_name: &str) -> Result<String, ScanError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScanError::Storage("AccessDenied".into()));
        }
        let bytes = std::fs::read(path).map_err(|e| ScanError::Internal(e.to_string()))?;
        self.stored
            .lock()
            .unwrap()
            .push((file_name.to_string(), bytes));
        Ok(format!("{LINK_PREFIX}{file_name}"))
    }
}

#[derive(Default)]
pub struct MockRecords {
    pub fail_attach: AtomicBool,
    pub fail_interaction: AtomicBool,
    pub attached: Mutex<Vec<(i64, InsuranceType, String)>>,
    pub interactions: Mutex<Vec<(String, InsuranceType)>>,
}

#[async_trait]
impl RecordSink for MockRecords {
    async fn attach_card(
        &self,
        insurance_id: i64,
        insurance_type: InsuranceType,
        url: &str,
    ) -> Result<(), ScanError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(ScanError::Database("deadlock detected".into()));
        }
        self.attached
            .lock()
            .unwrap()
            .push((insurance_id, insurance_type, url.to_string()));
        Ok(())
    }

    async fn record_interaction(
        &self,
        url: &str,
        insurance_type: InsuranceType,
    ) -> Result<(), ScanError> {
        if self.fail_interaction.load(Ordering::SeqCst) {
            return Err(ScanError::Database("interaction table missing".into()));
        }
        self.interactions
            .lock()
            .unwrap()
            .push((url.to_string(), insurance_type));
        Ok(())
    }
}

/// Records every progress event.
#[derive(Default)]
pub struct StageLog {
    pub stages: Mutex<Vec<ScanStage>>,
    pub degraded: Mutex<Vec<ScanStage>>,
    pub failed: Mutex<Option<ScanStage>>,
}

impl ScanProgressCallback for StageLog {
    fn on_stage(&self, stage: ScanStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_degraded(&self, stage: ScanStage, _detail: String) {
        self.degraded.lock().unwrap().push(stage);
    }

    fn on_failed(&self, last_stage: ScanStage, _error: String) {
        *self.failed.lock().unwrap() = Some(last_stage);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// Mock collaborators plus a scratch root that should be empty after every run.
pub struct Harness {
    pub scratch: TempDir,
    pub ocr: Arc<MockOcr>,
    pub completer: Arc<MockCompleter>,
    pub sink: Arc<MockSink>,
    pub records: Arc<MockRecords>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            scratch: tempfile::tempdir().unwrap(),
            ocr: Arc::new(MockOcr {
                text: "BLUE CROSS\nMEMBER JANE DOE\nID W123456789".into(),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                mime_types: Mutex::new(Vec::new()),
            }),
            completer: Arc::new(MockCompleter {
                reply: Mutex::new(FULL_REPLY.into()),
                fail: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }),
            sink: Arc::new(MockSink {
                fail: AtomicBool::new(false),
                stored: Mutex::new(Vec::new()),
            }),
            records: Arc::new(MockRecords::default()),
        }
    }

    /// Scanner with default pipeline settings.
    pub fn scanner(&self) -> CardScanner {
        self.scanner_with(PipelineConfig::builder())
    }

    /// Scanner from a partially configured builder; the scratch root is set here.
    pub fn scanner_with(&self, builder: PipelineConfigBuilder) -> CardScanner {
        let config = builder.scratch_root(self.scratch.path()).build().unwrap();
        CardScanner::new(
            self.ocr.clone(),
            self.completer.clone(),
            self.sink.clone(),
            config,
        )
        .with_records(self.records.clone())
    }

    /// Number of entries left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

// ── Images ───────────────────────────────────────────────────────────────────

/// `w`×`h` image, red left half, blue right half.
pub fn split_image(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
        if x < w / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    }))
}

pub fn encode(img: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

pub fn jpeg(w: u32, h: u32) -> Vec<u8> {
    encode(&split_image(w, h), image::ImageFormat::Jpeg)
}

pub fn png(w: u32, h: u32) -> Vec<u8> {
    encode(&split_image(w, h), image::ImageFormat::Png)
}

/// JPEG with a minimal EXIF APP1 segment carrying only the Orientation tag.
pub fn jpeg_with_orientation(w: u32, h: u32, orientation: u16) -> Vec<u8> {
    let jpeg = jpeg(w, h);
    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a\x00\x00\x00\x08");
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\x00\x00");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn card_uploads() -> Vec<UploadedImage> {
    vec![
        UploadedImage::new("front.jpg", jpeg(60, 40)),
        UploadedImage::new("back.png", png(60, 40)),
    ]
}

/// `(width, height)` of each page's MediaBox, in page order.
pub fn pdf_page_sizes(pdf: &[u8]) -> Vec<(i64, i64)> {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let mbox = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (mbox[2].as_i64().unwrap(), mbox[3].as_i64().unwrap())
        })
        .collect()
}

// ── Multipart ────────────────────────────────────────────────────────────────

pub const BOUNDARY: &str = "cardscan-test-boundary";

/// One multipart part: field name, optional filename, content.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content: Vec<u8>,
}

pub fn file_part<'a>(filename: &'a str, content: Vec<u8>) -> Part<'a> {
    Part {
        name: "images",
        filename: Some(filename),
        content,
    }
}

pub fn text_part<'a>(name: &'a str, value: &str) -> Part<'a> {
    Part {
        name,
        filename: None,
        content: value.as_bytes().to_vec(),
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    part.name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                    .as_bytes(),
            ),
        }
        body.extend_from_slice(&part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
