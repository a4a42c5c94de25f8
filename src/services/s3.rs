//! S3 artifact storage.
//!
//! PDFs go to `uploads/<file name>` with content type `application/pdf`.
//! Against AWS the returned link is the virtual-hosted object URL; with a
//! custom endpoint (MinIO, R2) it is the path-style URL on that endpoint.

use crate::config::S3Settings;
use crate::error::ScanError;
use crate::services::ArtifactSink;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use tracing::info;

/// Key prefix for uploaded card PDFs.
pub const KEY_PREFIX: &str = "uploads";

/// [`ArtifactSink`] writing to an S3 bucket.
#[derive(Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

impl S3Sink {
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "cardscan",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if let Some(ref endpoint) = settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
            region: settings.region.clone(),
            endpoint: settings
                .endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
        }
    }

    /// Object key for a file name.
    pub fn key_for(file_name: &str) -> String {
        format!("{KEY_PREFIX}/{file_name}")
    }

    /// Public URL of an object key.
    pub fn object_url(&self, key: &str) -> String {
        match self.endpoint {
            Some(ref endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

#[async_trait]
impl ArtifactSink for S3Sink {
    async fn store(&self, path: &Path, file_name: &str) -> Result<String, ScanError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| ScanError::io(path, e))?;
        let size = body.len();
        let key = Self::key_for(file_name);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/pdf")
            .send()
            .await
            .map_err(|e| {
                ScanError::Storage(format!(
                    "put s3://{}/{}: {}",
                    self.bucket,
                    key,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        let url = self.object_url(&key);
        info!("Uploaded {} bytes → {}", size, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(endpoint: Option<String>) -> S3Settings {
        S3Settings {
            bucket: "cards".into(),
            region: "us-east-2".into(),
            access_key_id: "AKIATEST".into(),
            secret_access_key: "secret".into(),
            endpoint,
        }
    }

    #[test]
    fn aws_url_is_virtual_hosted() {
        let sink = S3Sink::new(&settings(None));
        let key = S3Sink::key_for("abc.pdf");
        assert_eq!(key, "uploads/abc.pdf");
        assert_eq!(
            sink.object_url(&key),
            "https://cards.s3.us-east-2.amazonaws.com/uploads/abc.pdf"
        );
    }

    #[test]
    fn custom_endpoint_url_is_path_style() {
        let sink = S3Sink::new(&settings(Some("http://minio:9000/".into())));
        assert_eq!(
            sink.object_url("uploads/abc.pdf"),
            "http://minio:9000/cards/uploads/abc.pdf"
        );
    }

    #[tokio::test]
    async fn store_puts_pdf_under_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/cards/uploads/card.pdf"))
            .and(header("content-type", "application/pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("out.pdf");
        std::fs::write(&pdf, b"%PDF-1.5 test").unwrap();

        let sink = S3Sink::new(&settings(Some(server.uri())));
        let url = sink.store(&pdf, "card.pdf").await.unwrap();
        assert_eq!(url, format!("{}/cards/uploads/card.pdf", server.uri()));
    }

    #[tokio::test]
    async fn store_missing_file_is_io_error() {
        let sink = S3Sink::new(&settings(Some("http://127.0.0.1:9".into())));
        let err = sink
            .store(Path::new("/definitely/not/here.pdf"), "x.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}
