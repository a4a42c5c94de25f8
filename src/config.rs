//! Configuration types.
//!
//! Two structs, two lifetimes:
//!
//! * [`PipelineConfig`] holds the knobs of the image/extraction pipeline
//!   (size ceilings, JPEG qualities, LLM sampling). Built via
//!   [`PipelineConfigBuilder`].
//! * [`ServiceConfig`] holds credentials and resource names for the external
//!   collaborators. It is read once at process start, from the environment
//!   and an optional `.env` file, and never mutated afterwards.

use crate::error::ScanError;
use crate::progress::ProgressCallback;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Pipeline behaviour for one scan.
///
/// # Example
/// ```rust
/// use cardscan::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_bytes(1024 * 1024)
///     .max_dimension(1600)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_dimension, 1600);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Target ceiling for each compressed image, in bytes. Default: 2 MiB.
    ///
    /// Best effort: when the quality floor is reached the image is kept even
    /// if it is still larger.
    pub max_bytes: u64,

    /// Longest allowed side of a compressed image, in pixels. Default: 2000.
    pub max_dimension: u32,

    /// JPEG quality of the first compression attempt. Default: 85.
    pub jpeg_quality: u8,

    /// Compression stops stepping down once quality is at or below this. Default: 30.
    pub min_quality: u8,

    /// Quality decrement per compression retry. Default: 10.
    pub quality_step: u8,

    /// JPEG quality of each page embedded in the PDF. Default: 90.
    pub pdf_jpeg_quality: u8,

    /// Maximum accepted request body at the upload boundary. Default: 15 MiB.
    pub max_upload_bytes: usize,

    /// Directory under which per-run scratch directories are created.
    /// `None` uses the system temp dir.
    pub scratch_root: Option<PathBuf>,

    /// Sampling temperature for field extraction. Default: 0.0.
    pub temperature: f32,

    /// Completion budget for field extraction. Default: 500.
    pub max_tokens: usize,

    /// Optional stage-by-stage progress reporting.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            max_dimension: 2000,
            jpeg_quality: 85,
            min_quality: 30,
            quality_step: 10,
            pdf_jpeg_quality: 90,
            max_upload_bytes: 15 * 1024 * 1024,
            scratch_root: None,
            temperature: 0.0,
            max_tokens: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_bytes", &self.max_bytes)
            .field("max_dimension", &self.max_dimension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("min_quality", &self.min_quality)
            .field("quality_step", &self.quality_step)
            .field("pdf_jpeg_quality", &self.pdf_jpeg_quality)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("scratch_root", &self.scratch_root)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ScanProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.config.max_bytes = bytes.max(1);
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(16);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn min_quality(mut self, q: u8) -> Self {
        self.config.min_quality = q.clamp(1, 100);
        self
    }

    pub fn quality_step(mut self, step: u8) -> Self {
        self.config.quality_step = step.max(1);
        self
    }

    pub fn pdf_jpeg_quality(mut self, q: u8) -> Self {
        self.config.pdf_jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = Some(dir.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ScanError> {
        let c = &self.config;
        if c.min_quality > c.jpeg_quality {
            return Err(ScanError::InvalidConfig(format!(
                "min_quality ({}) must not exceed jpeg_quality ({})",
                c.min_quality, c.jpeg_quality
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(ScanError::InvalidConfig(
                "max_upload_bytes must be > 0".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Service configuration ────────────────────────────────────────────────

/// Credentials and resource names for every external collaborator.
#[derive(Clone)]
pub struct ServiceConfig {
    pub llm: LlmSettings,
    pub ocr: OcrSettings,
    pub sink: SinkSettings,
    /// `None` disables persistence entirely.
    pub database: Option<DatabaseSettings>,
    /// `from_id` written on interaction records. Default: 417223.
    pub interaction_from_id: i64,
}

/// Which LLM provider/model performs field extraction.
#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    /// Provider name, e.g. "openai". `None` auto-detects.
    pub provider_name: Option<String>,
    /// Model id. `None` uses the provider default.
    pub model: Option<String>,
}

/// Google Document AI settings.
#[derive(Clone)]
pub struct OcrSettings {
    pub project_id: String,
    /// Processing location. Default: "us".
    pub location: String,
    /// Display name of the OCR processor to reuse or create. Default: "fax_automation".
    pub processor_display_name: String,
    /// OAuth bearer token.
    pub access_token: Option<String>,
    /// Override the API base URL (tests, proxies).
    pub endpoint: Option<String>,
}

impl OcrSettings {
    /// Base URL of the regional Document AI API.
    pub fn base_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}-documentai.googleapis.com", self.location))
    }
}

/// Where assembled PDFs go.
#[derive(Clone)]
pub enum SinkSettings {
    S3(S3Settings),
    Drive(DriveSettings),
}

#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// S3-compatible endpoint (MinIO, R2). `None` means AWS.
    pub endpoint: Option<String>,
}

#[derive(Clone)]
pub struct DriveSettings {
    pub access_token: String,
    /// Parent folder for uploaded files.
    pub folder_id: Option<String>,
    /// Override the API base URL (tests, proxies).
    pub endpoint: Option<String>,
}

/// How to reach the Postgres database.
#[derive(Clone)]
pub enum DatabaseSettings {
    Url(String),
    Credentials(DbCredentials),
}

/// Contents of the database credentials JSON file.
#[derive(Clone, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub database: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
}

fn default_pg_port() -> u16 {
    5432
}

impl DbCredentials {
    /// Load credentials from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| {
            ScanError::InvalidConfig(format!(
                "Malformed database credentials in '{}': {e}",
                path.display()
            ))
        })
    }
}

impl ServiceConfig {
    /// Load from the process environment, after applying `.env` if present.
    pub fn from_env() -> Result<Self, ScanError> {
        // A missing .env is normal in containers.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                ScanError::InvalidConfig(format!("Missing required setting {key}"))
            })
        };

        let llm = LlmSettings {
            provider_name: get("CARDSCAN_LLM_PROVIDER"),
            model: get("CARDSCAN_MODEL"),
        };

        let ocr = OcrSettings {
            project_id: require("GOOGLE_PROJECT_ID")?,
            location: get("GOOGLE_LOCATION").unwrap_or_else(|| "us".to_string()),
            processor_display_name: get("DOCUMENTAI_PROCESSOR_NAME")
                .unwrap_or_else(|| "fax_automation".to_string()),
            access_token: get("GOOGLE_ACCESS_TOKEN"),
            endpoint: get("DOCUMENTAI_ENDPOINT"),
        };

        let sink_kind = get("CARDSCAN_SINK").unwrap_or_else(|| "s3".to_string());
        let sink = match sink_kind.to_lowercase().as_str() {
            "s3" => SinkSettings::S3(S3Settings {
                bucket: require("S3_BUCKET")?,
                region: require("AWS_REGION")?,
                access_key_id: require("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require("AWS_SECRET_ACCESS_KEY")?,
                endpoint: get("S3_ENDPOINT"),
            }),
            "drive" => SinkSettings::Drive(DriveSettings {
                access_token: require("GOOGLE_ACCESS_TOKEN")?,
                folder_id: get("DRIVE_FOLDER_ID"),
                endpoint: get("DRIVE_ENDPOINT"),
            }),
            other => {
                return Err(ScanError::InvalidConfig(format!(
                    "CARDSCAN_SINK must be 's3' or 'drive', got '{other}'"
                )))
            }
        };

        let database = if let Some(url) = get("DATABASE_URL") {
            Some(DatabaseSettings::Url(url))
        } else if let Some(path) = get("DB_CREDENTIALS_FILE") {
            Some(DatabaseSettings::Credentials(DbCredentials::from_file(
                Path::new(&path),
            )?))
        } else {
            None
        };

        let interaction_from_id = match get("INTERACTION_FROM_ID") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ScanError::InvalidConfig(format!("INTERACTION_FROM_ID is not an integer: '{raw}'"))
            })?,
            None => 417_223,
        };

        Ok(Self {
            llm,
            ocr,
            sink,
            database,
            interaction_from_id,
        })
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sink = match &self.sink {
            SinkSettings::S3(s) => format!("s3://{}", s.bucket),
            SinkSettings::Drive(d) => format!(
                "drive:{}",
                d.folder_id.as_deref().unwrap_or("<root>")
            ),
        };
        f.debug_struct("ServiceConfig")
            .field("llm", &self.llm)
            .field("ocr_project", &self.ocr.project_id)
            .field("ocr_location", &self.ocr.location)
            .field("ocr_processor", &self.ocr.processor_display_name)
            .field("sink", &sink)
            .field("database", &self.database.as_ref().map(|_| "<configured>"))
            .field("interaction_from_id", &self.interaction_from_id)
            .finish()
    }
}
