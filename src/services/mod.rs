//! External collaborators behind traits.
//!
//! The scan pipeline never talks to a cloud API directly. It holds one
//! `Arc<dyn ...>` per collaborator, built once at startup from
//! [`ServiceConfig`](crate::config::ServiceConfig) and shared read-only by
//! every run. Tests substitute in-memory implementations.
//!
//! | Trait | Production adapter |
//! |-------|--------------------|
//! | [`OcrService`]    | [`documentai::DocumentAiOcr`] |
//! | [`TextCompleter`] | [`llm::ProviderCompleter`] |
//! | [`ArtifactSink`]  | [`s3::S3Sink`], [`drive::DriveSink`] |
//! | [`RecordSink`]    | [`postgres::PgRecordSink`] |

pub mod documentai;
pub mod drive;
pub mod llm;
pub mod postgres;
pub mod s3;

use crate::error::ScanError;
use crate::output::InsuranceType;
use async_trait::async_trait;
use std::path::Path;

/// Reads text off an image.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Full text detected in `bytes`. An image without text yields `""`.
    async fn recognize(&self, bytes: &[u8], mime_type: &str) -> Result<String, ScanError>;
}

/// Single-turn chat completion.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ScanError>;
}

/// Durable storage for the assembled PDF.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Store the file at `path` under `file_name` and return a URL for it.
    async fn store(&self, path: &Path, file_name: &str) -> Result<String, ScanError>;
}

/// Customer-record persistence.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Attach the card URL to an existing insurance record. All-or-nothing.
    async fn attach_card(
        &self,
        insurance_id: i64,
        insurance_type: InsuranceType,
        url: &str,
    ) -> Result<(), ScanError>;

    /// Log an upload that arrived without an insurance id.
    async fn record_interaction(
        &self,
        url: &str,
        insurance_type: InsuranceType,
    ) -> Result<(), ScanError>;
}
