//! Google Drive artifact storage with an "anyone with the link" share.
//!
//! Upload is the Drive v3 `multipart` upload type: one `multipart/related`
//! body carrying the JSON metadata and the PDF bytes. The file is then made
//! readable by anyone and its viewer URL returned.

use crate::config::DriveSettings;
use crate::error::ScanError;
use crate::services::ArtifactSink;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com";

/// [`ArtifactSink`] writing to Google Drive.
pub struct DriveSink {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveSink {
    pub fn new(settings: &DriveSettings) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ScanError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            access_token: settings.access_token.clone(),
            folder_id: settings.folder_id.clone(),
        })
    }

    /// Viewer URL for a Drive file id.
    pub fn view_url(file_id: &str) -> String {
        format!("https://drive.google.com/file/d/{file_id}/view")
    }

    async fn upload(&self, file_name: &str, pdf: Vec<u8>) -> Result<String, ScanError> {
        let mut metadata = json!({ "name": file_name, "mimeType": "application/pdf" });
        if let Some(ref folder) = self.folder_id {
            metadata["parents"] = json!([folder]);
        }
        let boundary = format!("cardscan-{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata.to_string(), &pdf);

        let response = self
            .client
            .post(format!("{}/upload/drive/v3/files", self.base_url))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .bearer_auth(&self.access_token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| ScanError::Storage(format!("drive upload: {e}")))?;
        let created: CreatedFile = check(response, "drive upload").await?.json().await.map_err(
            |e| ScanError::Storage(format!("drive upload: unexpected response: {e}")),
        )?;
        debug!("Drive file id {}", created.id);
        Ok(created.id)
    }

    async fn share_with_anyone(&self, file_id: &str) -> Result<(), ScanError> {
        let response = self
            .client
            .post(format!("{}/drive/v3/files/{}/permissions", self.base_url, file_id))
            .bearer_auth(&self.access_token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await
            .map_err(|e| ScanError::Storage(format!("drive share: {e}")))?;
        check(response, "drive share").await?;
        Ok(())
    }
}

/// Build a two-part `multipart/related` body: JSON metadata, then the PDF.
fn multipart_related(boundary: &str, metadata: &str, pdf: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(pdf.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{boundary}\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(pdf);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, ScanError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ScanError::Storage(format!("{what}: HTTP {status}: {body}")))
}

#[async_trait]
impl ArtifactSink for DriveSink {
    async fn store(&self, path: &Path, file_name: &str) -> Result<String, ScanError> {
        let pdf = tokio::fs::read(path)
            .await
            .map_err(|e| ScanError::io(path, e))?;
        let file_id = self.upload(file_name, pdf).await?;
        self.share_with_anyone(&file_id).await?;

        let url = Self::view_url(&file_id);
        info!("Shared {} → {}", file_name, url);
        Ok(url)
    }
}
