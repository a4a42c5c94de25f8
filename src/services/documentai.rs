//! Google Document AI OCR over its REST API.
//!
//! The processor is addressed by display name. On first use the project's
//! processors are listed and the one with a matching display name is reused;
//! if none exists an `OCR_PROCESSOR` is created. The resolved resource name
//! is cached for the lifetime of the adapter.

use crate::config::OcrSettings;
use crate::error::ScanError;
use crate::pipeline::encode::encode_image;
use crate::services::OcrService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const PROCESSOR_TYPE: &str = "OCR_PROCESSOR";

/// [`OcrService`] backed by a Document AI OCR processor.
pub struct DocumentAiOcr {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    location: String,
    display_name: String,
    access_token: Option<String>,
    processor: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Processor {
    name: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListProcessorsResponse {
    #[serde(default)]
    processors: Vec<Processor>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProcessorRequest<'a> {
    #[serde(rename = "type")]
    processor_type: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest {
    raw_document: RawDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    content: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResponse {
    document: Option<DocumentBody>,
}

#[derive(Debug, Deserialize)]
struct DocumentBody {
    #[serde(default)]
    text: String,
}

impl DocumentAiOcr {
    pub fn new(settings: &OcrSettings) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ScanError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url().trim_end_matches('/').to_string(),
            project_id: settings.project_id.clone(),
            location: settings.location.clone(),
            display_name: settings.processor_display_name.clone(),
            access_token: settings.access_token.clone(),
            processor: OnceCell::new(),
        })
    }

    /// Use a known processor resource name and skip the lookup.
    pub fn with_processor_name(self, name: impl Into<String>) -> Self {
        Self {
            processor: OnceCell::new_with(Some(name.into())),
            ..self
        }
    }

    fn processors_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/processors",
            self.base_url, self.project_id, self.location
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Resource name of the processor, resolving it on first call.
    pub async fn processor_name(&self) -> Result<&str, ScanError> {
        self.processor
            .get_or_try_init(|| self.find_or_create_processor())
            .await
            .map(String::as_str)
    }

    async fn find_or_create_processor(&self) -> Result<String, ScanError> {
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self.client.get(self.processors_url());
            if let Some(ref token) = page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: ListProcessorsResponse = send_json(self.authorize(req), "list processors").await?;

            if let Some(found) = page
                .processors
                .into_iter()
                .find(|p| p.display_name == self.display_name)
            {
                debug!("Using existing processor {}", found.name);
                return Ok(found.name);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        info!("Creating {} '{}'", PROCESSOR_TYPE, self.display_name);
        let body = CreateProcessorRequest {
            processor_type: PROCESSOR_TYPE,
            display_name: &self.display_name,
        };
        let req = self.client.post(self.processors_url()).json(&body);
        let created: Processor = send_json(self.authorize(req), "create processor").await?;
        Ok(created.name)
    }
}

async fn send_json<T: serde::de::DeserializeOwned>(
    req: reqwest::RequestBuilder,
    what: &str,
) -> Result<T, ScanError> {
    let response = req
        .send()
        .await
        .map_err(|e| ScanError::Ocr(format!("{what}: {e}")))?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ScanError::Ocr(format!("{what}: HTTP {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| ScanError::Ocr(format!("{what}: unexpected response: {e}")))
}

#[async_trait]
impl OcrService for DocumentAiOcr {
    async fn recognize(&self, bytes: &[u8], mime_type: &str) -> Result<String, ScanError> {
        let processor = self.processor_name().await?;
        let encoded = encode_image(bytes);
        let body = ProcessRequest {
            raw_document: RawDocument {
                content: encoded.data,
                mime_type: mime_type.to_string(),
            },
        };
        let url = format!("{}/v1/{}:process", self.base_url, processor);
        let req = self.client.post(url).json(&body);
        let response: ProcessResponse = send_json(self.authorize(req), "process document").await?;

        let text = response.document.map(|d| d.text).unwrap_or_default();
        debug!("OCR returned {} chars", text.len());
        Ok(text)
    }
}
