//! # insurance-cardscan
//!
//! Turn two photos of a health-insurance card (front and back) into a
//! stored two-page PDF plus the patient fields printed on the card.
//!
//! ## Why this crate?
//!
//! Phone photos of insurance cards arrive sideways, 10 MB apiece, and with
//! every field in a different place per insurer. Template-based OCR breaks
//! on the next insurer's layout. Instead this crate normalises the images,
//! reads the front with a general OCR engine, and lets an LLM pick out the
//! five fields from the raw text, falling back to fixed defaults for
//! anything it cannot find.
//!
//! ## Pipeline Overview
//!
//! ```text
//! front.jpg, back.jpg
//!  │
//!  ├─ 1. Stage     validate count/extensions, save to a scratch dir
//!  ├─ 2. Orient    apply EXIF rotation to the pixels
//!  ├─ 3. Compress  ≤ 2000 px, step JPEG quality down to ≤ 2 MB
//!  ├─ 4. OCR       front image → text (Document AI)
//!  ├─ 5. Extract   text → 5 fields via LLM, defaults for the rest
//!  ├─ 6. Assemble  front + back → 2-page PDF
//!  ├─ 7. Store     PDF → S3 or Drive, returns a link
//!  └─ 8. Persist   link → insurance record (optional)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardscan::{CardScanner, InsuranceType, PipelineConfig, ServiceConfig, UploadedImage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let services = ServiceConfig::from_env()?;
//!     let scanner = CardScanner::from_service_config(&services, PipelineConfig::default())?;
//!     let uploads = vec![
//!         UploadedImage::new("front.jpg", std::fs::read("front.jpg")?),
//!         UploadedImage::new("back.jpg", std::fs::read("back.jpg")?),
//!     ];
//!     let outcome = scanner.process(uploads, None, InsuranceType::Primary).await?;
//!     println!("{} → {}", outcome.full_name, outcome.link);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum upload endpoint in [`server`] |
//! | `cli`    | on      | The `cardscan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! insurance-cardscan = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scan;
#[cfg(feature = "server")]
pub mod server;
pub mod services;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    DatabaseSettings, DbCredentials, DriveSettings, LlmSettings, OcrSettings, PipelineConfig,
    PipelineConfigBuilder, S3Settings, ServiceConfig, SinkSettings,
};
pub use error::{ErrorClass, ScanError};
pub use output::{CardFields, InsuranceType, ScanOutcome};
pub use pipeline::input::UploadedImage;
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback, ScanStage};
pub use scan::CardScanner;
pub use services::{ArtifactSink, OcrService, RecordSink, TextCompleter};
