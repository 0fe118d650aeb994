//! Security Gate — validates a raw upload before any extraction work.
//!
//! Checks run in order and short-circuit on the first failure: declared size,
//! MIME allow-list, magic-byte sniff vs declared type, malware scan, macro
//! probe. The gate never persists the buffer; every rejection means the
//! caller must re-upload.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cv::clamav::{MalwareScanner, ScanOutcome};
use crate::cv::docx;
use crate::cv::error::CvParseError;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";

/// What the buffer actually looks like, from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedType {
    Pdf,
    /// Zip container — a well-formed DOCX among others.
    Zip,
    /// OLE compound file — legacy Office or an encrypted OOXML document.
    OleCfb,
    Text,
    Unknown,
}

/// Sniffs the leading bytes of a buffer. Covers exactly the formats the
/// allow-list admits; anything else is `Unknown`.
pub fn sniff_content_type(buffer: &[u8]) -> SniffedType {
    if buffer.starts_with(b"%PDF-") {
        return SniffedType::Pdf;
    }
    if buffer.starts_with(b"PK\x03\x04") {
        return SniffedType::Zip;
    }
    if buffer.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return SniffedType::OleCfb;
    }
    let probe = &buffer[..buffer.len().min(512)];
    if std::str::from_utf8(probe).is_ok() && !probe.contains(&0) {
        return SniffedType::Text;
    }
    SniffedType::Unknown
}

fn declared_matches_sniffed(declared: &str, sniffed: SniffedType) -> bool {
    match declared {
        MIME_PDF => sniffed == SniffedType::Pdf,
        // Encrypted OOXML ships as an OLE wrapper; let it through here so
        // the cascade can report FILE_ENCRYPTED instead of a spoofing error.
        MIME_DOCX => matches!(sniffed, SniffedType::Zip | SniffedType::OleCfb),
        MIME_TEXT => matches!(sniffed, SniffedType::Text),
        _ => false,
    }
}

fn sniffed_label(sniffed: SniffedType) -> &'static str {
    match sniffed {
        SniffedType::Pdf => "application/pdf",
        SniffedType::Zip => "application/zip",
        SniffedType::OleCfb => "application/x-ole-storage",
        SniffedType::Text => "text/plain",
        SniffedType::Unknown => "unknown",
    }
}

pub struct SecurityGate {
    max_file_size: usize,
    allowed_types: Vec<String>,
    scanner: Arc<dyn MalwareScanner>,
    /// When the scanner itself is unreachable: `true` lets the file through
    /// with a warning, `false` rejects with `ANTIVIRUS_UNAVAILABLE`.
    antivirus_fail_open: bool,
}

impl SecurityGate {
    pub fn new(
        max_file_size: usize,
        allowed_types: Vec<String>,
        scanner: Arc<dyn MalwareScanner>,
        antivirus_fail_open: bool,
    ) -> Self {
        Self {
            max_file_size,
            allowed_types,
            scanner,
            antivirus_fail_open,
        }
    }

    /// Runs every check against the upload. `Ok(())` means extraction may
    /// proceed; any `Err` is final for this buffer.
    pub async fn verify(
        &self,
        buffer: &[u8],
        declared_mime: &str,
        declared_size: usize,
    ) -> Result<(), CvParseError> {
        if buffer.is_empty() {
            return Err(CvParseError::empty_file());
        }

        if declared_size > self.max_file_size || buffer.len() > self.max_file_size {
            return Err(CvParseError::file_too_large(
                declared_size.max(buffer.len()),
                self.max_file_size,
            ));
        }

        if !self.allowed_types.iter().any(|t| t == declared_mime) {
            return Err(CvParseError::invalid_type(declared_mime, &self.allowed_types));
        }

        let sniffed = sniff_content_type(buffer);
        if !declared_matches_sniffed(declared_mime, sniffed) {
            return Err(CvParseError::mime_mismatch(
                declared_mime,
                sniffed_label(sniffed),
            ));
        }

        match self.scanner.scan(buffer).await {
            Ok(ScanOutcome::Clean) => {}
            Ok(ScanOutcome::Infected { signature }) => {
                warn!(signature, "malware detected in upload");
                return Err(CvParseError::malware_detected(Some(&signature)));
            }
            Err(e) if self.antivirus_fail_open => {
                warn!(error = %e, "antivirus unreachable, failing open");
            }
            Err(e) => {
                return Err(CvParseError::antivirus_unavailable(&e.to_string()));
            }
        }

        if declared_mime == MIME_DOCX && docx::has_vba_macros(buffer) {
            warn!("DOCX upload contains VBA macros, rejected");
            return Err(CvParseError::has_macros());
        }

        info!(
            declared_mime,
            size = buffer.len(),
            "security checks passed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::clamav::{DisabledScanner, ScanError};
    use crate::cv::error::CvParseErrorCode;
    use async_trait::async_trait;

    struct InfectedScanner;

    #[async_trait]
    impl MalwareScanner for InfectedScanner {
        async fn scan(&self, _buffer: &[u8]) -> Result<ScanOutcome, ScanError> {
            Ok(ScanOutcome::Infected {
                signature: "Eicar-Test-Signature".to_string(),
            })
        }
    }

    struct DownScanner;

    #[async_trait]
    impl MalwareScanner for DownScanner {
        async fn scan(&self, _buffer: &[u8]) -> Result<ScanOutcome, ScanError> {
            Err(ScanError::Protocol("connection refused".to_string()))
        }
    }

    fn gate_with(scanner: Arc<dyn MalwareScanner>, fail_open: bool) -> SecurityGate {
        SecurityGate::new(
            10 * 1024 * 1024,
            vec![
                MIME_PDF.to_string(),
                MIME_DOCX.to_string(),
                MIME_TEXT.to_string(),
            ],
            scanner,
            fail_open,
        )
    }

    fn default_gate() -> SecurityGate {
        gate_with(Arc::new(DisabledScanner), false)
    }

    #[tokio::test]
    async fn test_empty_buffer_rejected() {
        let err = default_gate().verify(b"", MIME_PDF, 0).await.unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::FileEmpty);
    }

    #[tokio::test]
    async fn test_oversize_rejected_with_details() {
        let gate = SecurityGate::new(
            4,
            vec![MIME_TEXT.to_string()],
            Arc::new(DisabledScanner),
            false,
        );
        let err = gate.verify(b"hello", MIME_TEXT, 5).await.unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::FileTooLarge);
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn test_disallowed_type_rejected() {
        let err = default_gate()
            .verify(b"GIF89a", "image/gif", 6)
            .await
            .unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::FileInvalidType);
    }

    #[tokio::test]
    async fn test_pdf_declared_but_zip_bytes_is_mismatch() {
        let err = default_gate()
            .verify(b"PK\x03\x04rest-of-zip", MIME_PDF, 16)
            .await
            .unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::MimeMismatch);
        let details = err.details.unwrap();
        assert_eq!(details["actual"], "application/zip");
    }

    #[tokio::test]
    async fn test_valid_pdf_passes() {
        let buffer = b"%PDF-1.7 rest of file";
        assert!(default_gate()
            .verify(buffer, MIME_PDF, buffer.len())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_plain_text_passes() {
        let buffer = b"Jane Doe\nSenior Engineer";
        assert!(default_gate()
            .verify(buffer, MIME_TEXT, buffer.len())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_malware_rejected_with_signature() {
        let gate = gate_with(Arc::new(InfectedScanner), false);
        let err = gate
            .verify(b"%PDF-1.4 x", MIME_PDF, 10)
            .await
            .unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::FileMalware);
        assert!(err.message.contains("Eicar-Test-Signature"));
    }

    #[tokio::test]
    async fn test_scanner_down_fail_closed() {
        let gate = gate_with(Arc::new(DownScanner), false);
        let err = gate
            .verify(b"%PDF-1.4 x", MIME_PDF, 10)
            .await
            .unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::AntivirusUnavailable);
        assert!(err.recoverable);
    }

    #[tokio::test]
    async fn test_scanner_down_fail_open_allows() {
        let gate = gate_with(Arc::new(DownScanner), true);
        assert!(gate.verify(b"%PDF-1.4 x", MIME_PDF, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_docx_with_macros_rejected_before_extraction() {
        use std::io::{Cursor, Write};
        use zip::write::FileOptions;
        use zip::ZipWriter;

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ZipWriter::new(&mut cursor);
            writer
                .start_file("word/document.xml", FileOptions::default())
                .unwrap();
            writer.write_all(b"<w:document/>").unwrap();
            writer
                .start_file("word/vbaProject.bin", FileOptions::default())
                .unwrap();
            writer.write_all(b"vba").unwrap();
            writer.finish().unwrap();
        }
        let buffer = cursor.into_inner();

        let err = default_gate()
            .verify(&buffer, MIME_DOCX, buffer.len())
            .await
            .unwrap_err();
        assert_eq!(err.code, CvParseErrorCode::FileHasMacros);
        assert!(!err.recoverable);
    }

    #[test]
    fn test_sniffer_recognizes_known_magics() {
        assert_eq!(sniff_content_type(b"%PDF-1.4"), SniffedType::Pdf);
        assert_eq!(sniff_content_type(b"PK\x03\x04"), SniffedType::Zip);
        assert_eq!(
            sniff_content_type(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0x00]),
            SniffedType::OleCfb
        );
        assert_eq!(sniff_content_type(b"plain resume text"), SniffedType::Text);
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0x00]), SniffedType::Unknown);
    }

    #[test]
    fn test_ole_wrapper_accepted_for_docx_declaration() {
        // The cascade reports encryption; the gate must not call it spoofing.
        assert!(declared_matches_sniffed(MIME_DOCX, SniffedType::OleCfb));
        assert!(!declared_matches_sniffed(MIME_PDF, SniffedType::OleCfb));
    }
}
