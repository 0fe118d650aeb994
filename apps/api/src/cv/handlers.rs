//! Upload and structured-extraction endpoints.

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::cv::error::{CvParseError, CvParseErrorCode};
use crate::cv::ocr::locale_to_tesseract_lang;
use crate::cv::pipeline::ParseMethod;
use crate::embeddings::queue::QueueStats;
use crate::errors::AppError;
use crate::models::cv;
use crate::models::profile::ParsedProfile;
use crate::state::AppState;
use crate::storage;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub cv_id: Uuid,
    pub raw_text: String,
    pub extracted_length: usize,
    pub parse_method: ParseMethod,
    pub confidence: f32,
    pub trace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CvParseErrorCode>,
}

struct UploadParts {
    buffer: Bytes,
    filename: String,
    mime_type: String,
    locale: Option<String>,
}

/// POST /api/v1/cv/upload
///
/// Multipart with a `file` part and an optional `locale` part. Gate first,
/// then blob store, then the extraction cascade; the extracted text is
/// persisted so structured extraction can run against it later.
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let parts = read_multipart(multipart).await?;

    state
        .gate
        .verify(&parts.buffer, &parts.mime_type, parts.buffer.len())
        .await?;

    storage::store_upload(&state.s3, &state.config.s3_bucket, &parts.buffer, &parts.mime_type)
        .await?;

    let lang = locale_to_tesseract_lang(parts.locale.as_deref());
    let result = state
        .cascade
        .extract(parts.buffer, &parts.mime_type, lang, state.ocr.as_ref())
        .await?;

    let cv_id = cv::insert_document(&state.db, &result, parts.locale.as_deref())
        .await
        .map_err(AppError::Internal)?;

    info!(
        %cv_id,
        trace_id = %result.trace_id,
        filename = parts.filename,
        method = result.method.as_str(),
        "CV upload processed"
    );

    Ok(Json(UploadResponse {
        cv_id,
        extracted_length: result.extracted_length,
        parse_method: result.method,
        confidence: result.confidence,
        trace_id: result.trace_id,
        warning: result.warning,
        raw_text: result.text,
    }))
}

async fn read_multipart(mut multipart: Multipart) -> Result<UploadParts, AppError> {
    let mut buffer: Option<Bytes> = None;
    let mut filename = String::from("upload");
    let mut mime_type = String::new();
    let mut locale: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().unwrap_or("upload").to_string();
                mime_type = field.content_type().unwrap_or_default().to_string();
                buffer = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("failed to read file part: {e}"))
                })?);
            }
            Some("locale") => {
                locale = field.text().await.ok().filter(|l| !l.is_empty());
            }
            _ => {}
        }
    }

    let buffer =
        buffer.ok_or_else(|| AppError::Validation("missing 'file' part".to_string()))?;
    if mime_type.is_empty() {
        return Err(CvParseError::invalid_type("unknown", &[]).into());
    }

    Ok(UploadParts {
        buffer,
        filename,
        mime_type,
        locale,
    })
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub raw_text: String,
    pub locale: Option<String>,
    /// Attach the profile to an uploaded document; a new record is created
    /// for text that arrived without an upload.
    pub cv_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub cv_id: Uuid,
    pub profile: ParsedProfile,
}

/// POST /api/v1/cv/extract
///
/// Runs the structured profile extractor, persists the profile and its
/// sections, and enqueues embedding jobs for every section whose vector is
/// missing or invalidated.
pub async fn handle_extract(
    State(state): State<AppState>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    if req.raw_text.trim().is_empty() {
        return Err(CvParseError::empty_file().into());
    }

    let profile = state
        .extractor
        .extract_profile(&state.llm, &req.raw_text, req.locale.as_deref())
        .await?;

    let cv_id = match req.cv_id {
        Some(id) => id,
        None => cv::insert_raw_document(&state.db, &req.raw_text, req.locale.as_deref())
            .await
            .map_err(AppError::Internal)?,
    };

    cv::upsert_profile(&state.db, cv_id, &profile)
        .await
        .map_err(AppError::Internal)?;
    let rows = cv::upsert_sections(&state.db, cv_id, &profile.sections())
        .await
        .map_err(AppError::Internal)?;

    let pending: Vec<Uuid> = rows
        .iter()
        .filter(|r| r.embedding.is_none())
        .map(|r| r.id)
        .collect();
    state.queue.enqueue_sections(cv_id, &pending).await?;

    info!(
        %cv_id,
        sections = rows.len(),
        pending_embeddings = pending.len(),
        "structured profile stored"
    );

    Ok(Json(ExtractResponse { cv_id, profile }))
}

#[derive(Debug, Deserialize)]
pub struct CvQuery {
    /// Redact PII from the returned profile (employer-facing views).
    #[serde(default)]
    pub anonymize: bool,
}

#[derive(Debug, Serialize)]
pub struct CvDetailResponse {
    pub cv_id: Uuid,
    pub extracted_length: i32,
    pub parse_method: String,
    pub confidence: f64,
    pub trace_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub profile: Option<ParsedProfile>,
}

/// GET /api/v1/cv/:id
pub async fn handle_get_cv(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Query(query): Query<CvQuery>,
) -> Result<Json<CvDetailResponse>, AppError> {
    let document = cv::fetch_document(&state.db, cv_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("CV {cv_id} not found")))?;

    let profile = cv::fetch_profile(&state.db, cv_id)
        .await
        .map_err(AppError::Internal)?
        .map(|p| if query.anonymize { p.anonymized() } else { p });

    Ok(Json(CvDetailResponse {
        cv_id: document.id,
        extracted_length: document.extracted_length,
        parse_method: document.parse_method,
        confidence: document.confidence,
        trace_id: document.trace_id,
        warning: document.warning,
        profile,
    }))
}

/// GET /api/v1/queue/stats
pub async fn handle_queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, AppError> {
    let stats = state
        .queue
        .stats()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("queue stats failed: {e}")))?;
    Ok(Json(stats))
}
