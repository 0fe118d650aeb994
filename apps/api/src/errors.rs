#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cv::error::CvParseError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Typed pipeline failure; serialized with its wire code and details so
    /// callers can branch on `code` and honor `recoverable`.
    #[error(transparent)]
    CvParse(#[from] CvParseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(msg) => error_response(StatusCode::NOT_FOUND, "NOT_FOUND", &msg),
            AppError::Validation(msg) => {
                error_response(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", &msg)
            }
            AppError::CvParse(err) => {
                let body = Json(json!({
                    "error": err.message,
                    "code": err.code.as_str(),
                    "details": err.details,
                    "recoverable": err.recoverable,
                }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred",
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred",
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                )
            }
        }
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message
        }
    }));
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_cv_parse_error_maps_to_400_with_wire_code() {
        let err = AppError::from(CvParseError::no_text(10, "ocr"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "file_no_text_after_ocr");
        assert_eq!(body["details"]["extracted_length"], 10);
        assert_eq!(body["recoverable"], false);
    }

    #[tokio::test]
    async fn test_validation_error_maps_to_400() {
        let response = AppError::Validation("missing file".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
