//! Scan orchestration: two uploaded images in, a stored PDF and the
//! patient's card fields out.
//!
//! ```text
//! stage uploads ─▶ orient ─▶ compress ─▶ OCR(front) ─▶ extract ─▶ assemble ─▶ store ─▶ [persist]
//! ```
//!
//! Stages run strictly in sequence. Image work runs on the blocking pool.
//! Orientation and compression failures degrade (the image is used as-is),
//! except that an image which cannot be decoded at all ends the run with
//! [`ScanError::ImageDecode`] before any external call. Every other failure
//! aborts the run. All scratch files live in the run's
//! [`StagedUploads`] directory, which is removed when `process` returns on
//! any path.

use crate::config::{PipelineConfig, ServiceConfig, SinkSettings};
use crate::error::ScanError;
use crate::output::{InsuranceType, ScanOutcome};
use crate::pipeline::assemble::{assemble_pdf, AssembledPdf};
use crate::pipeline::compress::{compress_file, CompressionTarget};
use crate::pipeline::encode::mime_type;
use crate::pipeline::extract::extract_fields;
use crate::pipeline::input::{stage_uploads, StagedUploads, UploadedImage};
use crate::pipeline::orient::{orient_file, Rotation};
use crate::progress::{ProgressCallback, ScanStage};
use crate::services::documentai::DocumentAiOcr;
use crate::services::drive::DriveSink;
use crate::services::llm::ProviderCompleter;
use crate::services::postgres::PgRecordSink;
use crate::services::s3::S3Sink;
use crate::services::{ArtifactSink, OcrService, RecordSink, TextCompleter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs card scans against a fixed set of collaborators.
///
/// Cheap to clone; clones share the collaborators.
#[derive(Clone)]
pub struct CardScanner {
    ocr: Arc<dyn OcrService>,
    completer: Arc<dyn TextCompleter>,
    sink: Arc<dyn ArtifactSink>,
    records: Option<Arc<dyn RecordSink>>,
    config: PipelineConfig,
}

/// Forwards stage events to the optional callback and remembers the last
/// stage reached, for `on_failed`.
struct StageTracker {
    callback: Option<ProgressCallback>,
    last: Mutex<ScanStage>,
}

impl StageTracker {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: Mutex::new(ScanStage::Received),
        }
    }

    fn reach(&self, stage: ScanStage) {
        if let Ok(mut last) = self.last.lock() {
            *last = stage;
        }
        debug!("Stage: {}", stage);
        if let Some(ref cb) = self.callback {
            cb.on_stage(stage);
        }
    }

    fn degrade(&self, stage: ScanStage, detail: String) {
        warn!("{} degraded: {}", stage, detail);
        if let Some(ref cb) = self.callback {
            cb.on_degraded(stage, detail);
        }
    }

    fn fail(&self, error: &ScanError) {
        let last = self.last.lock().map(|s| *s).unwrap_or(ScanStage::Received);
        if let Some(ref cb) = self.callback {
            cb.on_failed(last, error.to_string());
        }
    }
}

impl CardScanner {
    pub fn new(
        ocr: Arc<dyn OcrService>,
        completer: Arc<dyn TextCompleter>,
        sink: Arc<dyn ArtifactSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ocr,
            completer,
            sink,
            records: None,
            config,
        }
    }

    /// Persist card links (and interaction records) through `records`.
    pub fn with_records(mut self, records: Arc<dyn RecordSink>) -> Self {
        self.records = Some(records);
        self
    }

    /// Build the production collaborators from service settings.
    ///
    /// Must be called inside a tokio runtime; the database pool connects
    /// lazily on first use.
    pub fn from_service_config(
        services: &ServiceConfig,
        config: PipelineConfig,
    ) -> Result<Self, ScanError> {
        let ocr: Arc<dyn OcrService> = Arc::new(DocumentAiOcr::new(&services.ocr)?);
        let completer: Arc<dyn TextCompleter> =
            Arc::new(ProviderCompleter::from_settings(&services.llm, &config)?);
        let sink: Arc<dyn ArtifactSink> = match services.sink {
            SinkSettings::S3(ref s3) => Arc::new(S3Sink::new(s3)),
            SinkSettings::Drive(ref drive) => Arc::new(DriveSink::new(drive)?),
        };

        let scanner = Self::new(ocr, completer, sink, config);
        match services.database {
            Some(ref db) => Ok(scanner.with_records(Arc::new(PgRecordSink::connect_lazy(
                db,
                services.interaction_from_id,
            )?))),
            None => Ok(scanner),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one scan. `uploads` must be the front then the back of the card.
    pub async fn process(
        &self,
        uploads: Vec<UploadedImage>,
        insurance_id: Option<i64>,
        insurance_type: InsuranceType,
    ) -> Result<ScanOutcome, ScanError> {
        let tracker = StageTracker::new(self.config.progress_callback.clone());
        tracker.reach(ScanStage::Received);

        match self.run(&tracker, &uploads, insurance_id, insurance_type).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("Scan failed: {}", e);
                tracker.fail(&e);
                Err(e)
            }
        }
    }

    /// Synchronous wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn process_sync(
        &self,
        uploads: Vec<UploadedImage>,
        insurance_id: Option<i64>,
        insurance_type: InsuranceType,
    ) -> Result<ScanOutcome, ScanError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.process(uploads, insurance_id, insurance_type))
    }

    async fn run(
        &self,
        tracker: &StageTracker,
        uploads: &[UploadedImage],
        insurance_id: Option<i64>,
        insurance_type: InsuranceType,
    ) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();

        // ── Step 1: Validate and stage ───────────────────────────────────────
        let staged = stage_uploads(uploads, self.config.scratch_root.as_deref()).await?;
        tracker.reach(ScanStage::Validated);
        info!("Processing {} images in {}", staged.paths().len(), staged.dir().display());

        // ── Step 2: Orientation ──────────────────────────────────────────────
        for (path, result) in normalize(staged.paths().to_vec()).await? {
            match result {
                Ok(Rotation::None) => {}
                Ok(rotation) => debug!("{}: applied {:?}", path.display(), rotation),
                Err(e) => tracker.degrade(ScanStage::Normalized, format!("{}: {}", path.display(), e)),
            }
        }
        tracker.reach(ScanStage::Normalized);

        // ── Step 3: Compression ──────────────────────────────────────────────
        let target = CompressionTarget::from(&self.config);
        let mut undecodable = None;
        for (path, result) in compress(staged.paths().to_vec(), target).await? {
            match result {
                Ok(c) if !c.within_target => debug!(
                    "{}: still {} bytes at quality floor {}",
                    path.display(),
                    c.bytes.len(),
                    c.quality
                ),
                Ok(_) => {}
                Err(e) => {
                    tracker.degrade(ScanStage::Compressed, format!("{}: {}", path.display(), e));
                    if undecodable.is_none() && matches!(e, ScanError::ImageDecode { .. }) {
                        undecodable = Some(e);
                    }
                }
            }
        }
        tracker.reach(ScanStage::Compressed);

        // Assembly decodes with the same decoder: an image the compressor
        // could not read is rejected here, before OCR and extraction.
        if let Some(e) = undecodable {
            return Err(e);
        }

        // ── Step 4: OCR on the front ─────────────────────────────────────────
        let front = &staged.paths()[0];
        let front_bytes = tokio::fs::read(front)
            .await
            .map_err(|e| ScanError::io(front, e))?;
        let text = self
            .ocr
            .recognize(&front_bytes, mime_type(&front_bytes))
            .await?;
        info!("OCR read {} chars from the front", text.len());
        tracker.reach(ScanStage::Recognized);

        // ── Step 5: Field extraction ─────────────────────────────────────────
        let fields = extract_fields(self.completer.as_ref(), &text).await?;
        tracker.reach(ScanStage::Extracted);

        // ── Step 6: Assemble PDF ─────────────────────────────────────────────
        let file_name = format!("{}.pdf", uuid::Uuid::new_v4());
        let pdf = assemble(&staged, &file_name, self.config.pdf_jpeg_quality).await?;
        tracker.reach(ScanStage::Assembled);

        // ── Step 7: Store ────────────────────────────────────────────────────
        let link = self.sink.store(&pdf.path, &file_name).await?;
        tracker.reach(ScanStage::Uploaded);

        // ── Step 8: Persist ──────────────────────────────────────────────────
        let mut persisted = false;
        if let Some(ref records) = self.records {
            match insurance_id {
                Some(id) => {
                    records.attach_card(id, insurance_type, &link).await?;
                    persisted = true;
                    tracker.reach(ScanStage::Persisted);
                }
                None => {
                    if let Err(e) = records.record_interaction(&link, insurance_type).await {
                        warn!("Could not record interaction for {}: {}", link, e);
                    }
                }
            }
        }

        tracker.reach(ScanStage::Completed);
        info!(
            "Scan complete for {} in {}ms",
            fields.full_name(),
            start.elapsed().as_millis()
        );

        Ok(ScanOutcome {
            link,
            full_name: fields.full_name(),
            fields,
            insurance_id,
            insurance_type,
            persisted,
            page_count: pdf.page_count,
        })
    }
}

type PerImage<T> = Vec<(PathBuf, Result<T, ScanError>)>;

async fn normalize(paths: Vec<PathBuf>) -> Result<PerImage<Rotation>, ScanError> {
    tokio::task::spawn_blocking(move || {
        paths
            .into_iter()
            .map(|p| {
                let r = orient_file(&p);
                (p, r)
            })
            .collect()
    })
    .await
    .map_err(|e| ScanError::Internal(format!("orientation task: {e}")))
}

async fn compress(
    paths: Vec<PathBuf>,
    target: CompressionTarget,
) -> Result<PerImage<crate::pipeline::compress::Compressed>, ScanError> {
    tokio::task::spawn_blocking(move || {
        paths
            .into_iter()
            .map(|p| {
                let r = compress_file(&p, &target);
                (p, r)
            })
            .collect()
    })
    .await
    .map_err(|e| ScanError::Internal(format!("compression task: {e}")))
}

async fn assemble(
    staged: &StagedUploads,
    file_name: &str,
    quality: u8,
) -> Result<AssembledPdf, ScanError> {
    let inputs = staged.paths().to_vec();
    let out = staged.dir().join(file_name);
    tokio::task::spawn_blocking(move || assemble_pdf(&inputs, &out, quality))
        .await
        .map_err(|e| ScanError::Internal(format!("assembly task: {e}")))?
}
