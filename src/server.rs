//! HTTP upload boundary.
//!
//! Endpoints:
//! - `GET /` - upload form
//! - `POST /` - scan two images; responds `{link, full_name}`
//! - `POST /:insurance_id` - scan and attach the PDF link to that record;
//!   responds `{link, message, insurance_id, insurance_type}`
//!
//! Both POST routes take multipart field `images` twice (front, then back)
//! and an optional `insurance_type` of `primary` (default) or `secondary`,
//! as a form field or a `?type=` query parameter. Failures respond
//! `{error}` with 400, 413 or 500.

use crate::error::{ErrorClass, ScanError};
use crate::output::{InsuranceType, ScanOutcome};
use crate::pipeline::input::UploadedImage;
use crate::scan::CardScanner;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Multipart field carrying each image.
pub const IMAGES_FIELD: &str = "images";

/// Multipart field / query key selecting the insurance slot.
pub const TYPE_FIELD: &str = "insurance_type";

/// Minimal upload page served on `GET /`.
pub const UPLOAD_FORM: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Upload insurance card</title></head>
<body>
  <h1>Upload insurance card</h1>
  <form method="post" enctype="multipart/form-data">
    <p><label>Front <input type="file" name="images" accept=".jpg,.jpeg,.png" required></label></p>
    <p><label>Back <input type="file" name="images" accept=".jpg,.jpeg,.png" required></label></p>
    <p>
      <select name="insurance_type">
        <option value="primary">Primary</option>
        <option value="secondary">Secondary</option>
      </select>
    </p>
    <p><button type="submit">Upload</button></p>
  </form>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    scanner: Arc<CardScanner>,
}

#[derive(Debug, Default, Deserialize)]
struct TypeQuery {
    #[serde(rename = "type")]
    insurance_type: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct ScanResponse {
    link: String,
    full_name: String,
}

#[derive(Serialize)]
struct RecordResponse {
    link: String,
    message: String,
    insurance_id: i64,
    insurance_type: InsuranceType,
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Error returned by the handlers.
#[derive(Debug)]
enum ApiError {
    Scan(ScanError),
    /// Malformed request that never reached the pipeline.
    BadRequest(String),
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        ApiError::Scan(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => {
                warn!("Rejected upload: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Scan(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                match e.class() {
                    ErrorClass::Processing => error!("Scan failed: {}", e),
                    _ => warn!("Rejected upload: {}", e),
                }
                (status, e.client_message())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn multipart_error(e: MultipartError, limit_bytes: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::Scan(ScanError::PayloadTooLarge { limit_bytes })
    } else {
        ApiError::BadRequest(format!("Malformed upload: {}", e.body_text()))
    }
}

// ── Router ───────────────────────────────────────────────────────────────

/// Build the upload router around a scanner.
pub fn router(scanner: CardScanner) -> Router {
    let limit = scanner.config().max_upload_bytes;
    let state = AppState {
        scanner: Arc::new(scanner),
    };
    Router::new()
        .route("/", get(upload_form).post(upload_card))
        .route("/:insurance_id", post(upload_card_for_record))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router until the process is stopped.
pub async fn serve(addr: SocketAddr, scanner: CardScanner) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(scanner)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

/// POST /
async fn upload_card(
    State(state): State<AppState>,
    Query(query): Query<TypeQuery>,
    multipart: Multipart,
) -> Result<Json<ScanResponse>, ApiError> {
    let outcome = scan(&state, None, query, multipart).await?;
    Ok(Json(ScanResponse {
        link: outcome.link,
        full_name: outcome.full_name,
    }))
}

/// POST /:insurance_id
async fn upload_card_for_record(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Query(query): Query<TypeQuery>,
    multipart: Multipart,
) -> Result<Json<RecordResponse>, ApiError> {
    let insurance_id: i64 = raw_id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid insurance id '{raw_id}'")))?;

    let outcome = scan(&state, Some(insurance_id), query, multipart).await?;
    let message = if outcome.persisted {
        format!("Insurance card saved to {} insurance", outcome.insurance_type)
    } else {
        "Insurance card uploaded; no database configured".to_string()
    };
    Ok(Json(RecordResponse {
        link: outcome.link,
        message,
        insurance_id,
        insurance_type: outcome.insurance_type,
    }))
}

async fn scan(
    state: &AppState,
    insurance_id: Option<i64>,
    query: TypeQuery,
    mut multipart: Multipart,
) -> Result<ScanOutcome, ApiError> {
    let limit = state.scanner.config().max_upload_bytes;
    let mut uploads = Vec::new();
    let mut form_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGES_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                uploads.push(UploadedImage::new(filename, bytes.to_vec()));
            }
            Some(TYPE_FIELD) => {
                form_type = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let insurance_type = match form_type.or(query.insurance_type) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.parse::<InsuranceType>().map_err(ApiError::BadRequest)?
        }
        _ => InsuranceType::default(),
    };

    info!(
        "Upload: {} file(s), insurance_id={:?}, type={}",
        uploads.len(),
        insurance_id,
        insurance_type
    );
    Ok(state
        .scanner
        .process(uploads, insurance_id, insurance_type)
        .await?)
}
