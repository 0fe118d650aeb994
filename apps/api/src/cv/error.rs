//! CV parsing error taxonomy.
//!
//! Every failure that crosses the pipeline boundary is one of these codes.
//! The Security Gate and Extraction Cascade never surface raw engine errors
//! to callers; everything is translated into a `CvParseError` first.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Closed set of wire-level error codes for the CV pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CvParseErrorCode {
    // File validation
    #[serde(rename = "file_too_large")]
    FileTooLarge,
    #[serde(rename = "file_invalid_type")]
    FileInvalidType,
    #[serde(rename = "mime_type_mismatch")]
    MimeMismatch,

    // Security
    #[serde(rename = "file_malware_detected")]
    FileMalware,
    #[serde(rename = "file_has_macros")]
    FileHasMacros,

    // Content
    #[serde(rename = "file_encrypted")]
    FileEncrypted,
    #[serde(rename = "file_corrupted")]
    FileCorrupted,
    #[serde(rename = "file_no_text_after_ocr")]
    FileNoText,
    #[serde(rename = "file_empty")]
    FileEmpty,

    // Processing
    #[serde(rename = "parse_timeout")]
    ParseTimeout,
    #[serde(rename = "ocr_failed")]
    OcrFailed,
    #[serde(rename = "ai_provider_failed")]
    AiProviderFailed,

    // System
    #[serde(rename = "antivirus_unavailable")]
    AntivirusUnavailable,
    #[serde(rename = "storage_failed")]
    StorageFailed,
    #[serde(rename = "queue_failed")]
    QueueFailed,
}

impl CvParseErrorCode {
    /// Wire representation, e.g. `file_no_text_after_ocr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileTooLarge => "file_too_large",
            Self::FileInvalidType => "file_invalid_type",
            Self::MimeMismatch => "mime_type_mismatch",
            Self::FileMalware => "file_malware_detected",
            Self::FileHasMacros => "file_has_macros",
            Self::FileEncrypted => "file_encrypted",
            Self::FileCorrupted => "file_corrupted",
            Self::FileNoText => "file_no_text_after_ocr",
            Self::FileEmpty => "file_empty",
            Self::ParseTimeout => "parse_timeout",
            Self::OcrFailed => "ocr_failed",
            Self::AiProviderFailed => "ai_provider_failed",
            Self::AntivirusUnavailable => "antivirus_unavailable",
            Self::StorageFailed => "storage_failed",
            Self::QueueFailed => "queue_failed",
        }
    }
}

/// Typed pipeline error. `recoverable = true` means the caller may retry the
/// same input later; `false` means the input itself must change.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CvParseError {
    pub code: CvParseErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub recoverable: bool,
}

impl CvParseError {
    pub fn file_too_large(size: usize, max_size: usize) -> Self {
        Self {
            code: CvParseErrorCode::FileTooLarge,
            message: format!("File size {size} bytes exceeds maximum {max_size} bytes"),
            details: Some(json!({ "size": size, "max_size": max_size })),
            recoverable: false,
        }
    }

    pub fn invalid_type(declared: &str, allowed: &[String]) -> Self {
        Self {
            code: CvParseErrorCode::FileInvalidType,
            message: format!("File type {declared} not allowed"),
            details: Some(json!({ "type": declared, "allowed": allowed })),
            recoverable: false,
        }
    }

    pub fn mime_mismatch(declared: &str, actual: &str) -> Self {
        Self {
            code: CvParseErrorCode::MimeMismatch,
            message: format!("File MIME type mismatch: declared {declared}, actual {actual}"),
            details: Some(json!({ "declared": declared, "actual": actual })),
            recoverable: false,
        }
    }

    pub fn malware_detected(signature: Option<&str>) -> Self {
        Self {
            code: CvParseErrorCode::FileMalware,
            message: format!(
                "Malware detected: {}",
                signature.unwrap_or("unknown threat")
            ),
            details: Some(json!({ "signature": signature })),
            recoverable: false,
        }
    }

    pub fn has_macros() -> Self {
        Self {
            code: CvParseErrorCode::FileHasMacros,
            message: "Document contains macros (VBA code) which are not allowed".to_string(),
            details: None,
            recoverable: false,
        }
    }

    pub fn encrypted() -> Self {
        Self {
            code: CvParseErrorCode::FileEncrypted,
            message: "File is password-protected or encrypted".to_string(),
            details: None,
            recoverable: false,
        }
    }

    pub fn corrupted(reason: &str) -> Self {
        Self {
            code: CvParseErrorCode::FileCorrupted,
            message: format!("File is corrupted or invalid: {reason}"),
            details: Some(json!({ "reason": reason })),
            recoverable: false,
        }
    }

    pub fn no_text(extracted_length: usize, method: &str) -> Self {
        Self {
            code: CvParseErrorCode::FileNoText,
            message: format!(
                "No text extracted after {method} (extracted: {extracted_length} chars)"
            ),
            details: Some(json!({ "extracted_length": extracted_length, "method": method })),
            recoverable: false,
        }
    }

    pub fn empty_file() -> Self {
        Self {
            code: CvParseErrorCode::FileEmpty,
            message: "Uploaded file is empty".to_string(),
            details: None,
            recoverable: false,
        }
    }

    pub fn parse_timeout(stage: &str, max_ms: u64) -> Self {
        Self {
            code: CvParseErrorCode::ParseTimeout,
            message: format!("Parse timeout: {stage} exceeded {max_ms}ms budget"),
            details: Some(json!({ "stage": stage, "max_ms": max_ms })),
            recoverable: true,
        }
    }

    pub fn ocr_failed(reason: &str) -> Self {
        Self {
            code: CvParseErrorCode::OcrFailed,
            message: format!("OCR processing failed: {reason}"),
            details: Some(json!({ "reason": reason })),
            recoverable: true,
        }
    }

    pub fn ai_provider_failed(errors: &[String]) -> Self {
        Self {
            code: CvParseErrorCode::AiProviderFailed,
            message: format!("All AI providers failed: {}", errors.join(", ")),
            details: Some(json!({ "errors": errors })),
            recoverable: true,
        }
    }

    pub fn antivirus_unavailable(reason: &str) -> Self {
        Self {
            code: CvParseErrorCode::AntivirusUnavailable,
            message: format!("Antivirus scanner unavailable: {reason}"),
            details: Some(json!({ "reason": reason })),
            recoverable: true,
        }
    }

    pub fn storage_failed(reason: &str) -> Self {
        Self {
            code: CvParseErrorCode::StorageFailed,
            message: format!("Failed to store uploaded file: {reason}"),
            details: Some(json!({ "reason": reason })),
            recoverable: true,
        }
    }

    pub fn queue_failed(reason: &str) -> Self {
        Self {
            code: CvParseErrorCode::QueueFailed,
            message: format!("Failed to enqueue background job: {reason}"),
            details: Some(json!({ "reason": reason })),
            recoverable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_round_trip() {
        let codes = [
            CvParseErrorCode::FileTooLarge,
            CvParseErrorCode::FileInvalidType,
            CvParseErrorCode::MimeMismatch,
            CvParseErrorCode::FileMalware,
            CvParseErrorCode::FileHasMacros,
            CvParseErrorCode::FileEncrypted,
            CvParseErrorCode::FileCorrupted,
            CvParseErrorCode::FileNoText,
            CvParseErrorCode::FileEmpty,
            CvParseErrorCode::ParseTimeout,
            CvParseErrorCode::OcrFailed,
            CvParseErrorCode::AiProviderFailed,
            CvParseErrorCode::AntivirusUnavailable,
            CvParseErrorCode::StorageFailed,
            CvParseErrorCode::QueueFailed,
        ];
        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: CvParseErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn test_no_text_carries_extracted_length() {
        let err = CvParseError::no_text(10, "ocr");
        assert_eq!(err.code, CvParseErrorCode::FileNoText);
        assert!(!err.recoverable);
        let details = err.details.unwrap();
        assert_eq!(details["extracted_length"], 10);
        assert_eq!(details["method"], "ocr");
    }

    #[test]
    fn test_recoverable_split_matches_taxonomy() {
        assert!(!CvParseError::file_too_large(1, 0).recoverable);
        assert!(!CvParseError::malware_detected(None).recoverable);
        assert!(!CvParseError::encrypted().recoverable);
        assert!(!CvParseError::corrupted("x").recoverable);
        assert!(CvParseError::parse_timeout("native", 30_000).recoverable);
        assert!(CvParseError::ocr_failed("down").recoverable);
        assert!(CvParseError::ai_provider_failed(&[]).recoverable);
        assert!(CvParseError::antivirus_unavailable("refused").recoverable);
    }
}
