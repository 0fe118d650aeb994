//! OCR sidecar client.
//!
//! Rasterization and recognition run in a separate Tesseract-backed service;
//! this client ships the raw document over HTTP and gets text back. The
//! `OcrEngine` trait is the seam the cascade depends on, so tests can run
//! without the sidecar.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::cv::error::CvParseError;

/// Output of one OCR pass over a whole document.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    /// Mean engine confidence in [0,1], when the engine reports one.
    pub confidence: Option<f32>,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        buffer: &[u8],
        mime_type: &str,
        lang: &str,
    ) -> Result<OcrOutput, CvParseError>;
}

/// Maps a BCP-47 locale to the Tesseract language pack name.
pub fn locale_to_tesseract_lang(locale: Option<&str>) -> &'static str {
    let code = locale
        .and_then(|l| l.split('-').next())
        .unwrap_or("en")
        .to_ascii_lowercase();
    match code.as_str() {
        "sk" => "slk",
        "cs" => "ces",
        "de" => "deu",
        "pl" => "pol",
        _ => "eng",
    }
}

/// HTTP client for the OCR sidecar. `POST {base_url}/ocr?lang=` with the raw
/// document body; the sidecar answers with `OcrOutput` JSON.
pub struct OcrClient {
    client: Client,
    base_url: String,
}

impl OcrClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build OCR HTTP client"),
            base_url,
        }
    }
}

#[async_trait]
impl OcrEngine for OcrClient {
    async fn recognize(
        &self,
        buffer: &[u8],
        mime_type: &str,
        lang: &str,
    ) -> Result<OcrOutput, CvParseError> {
        debug!(lang, size = buffer.len(), "sending document to OCR sidecar");

        let response = self
            .client
            .post(format!("{}/ocr", self.base_url.trim_end_matches('/')))
            .query(&[("lang", lang)])
            .header("content-type", mime_type)
            .body(buffer.to_vec())
            .send()
            .await
            .map_err(|e| CvParseError::ocr_failed(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CvParseError::ocr_failed(&format!(
                "sidecar returned {status}: {body}"
            )));
        }

        let output: OcrOutput = response
            .json()
            .await
            .map_err(|e| CvParseError::ocr_failed(&format!("unparseable response: {e}")))?;

        info!(
            length = output.text.len(),
            confidence = output.confidence,
            "OCR pass complete"
        );
        Ok(output)
    }
}

/// Used when OCR is disabled by configuration. The cascade then fails with
/// a recoverable `ocr_failed` whenever native extraction comes up short.
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn recognize(
        &self,
        _buffer: &[u8],
        _mime_type: &str,
        _lang: &str,
    ) -> Result<OcrOutput, CvParseError> {
        Err(CvParseError::ocr_failed("OCR is disabled"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_mapping_known_languages() {
        assert_eq!(locale_to_tesseract_lang(Some("en")), "eng");
        assert_eq!(locale_to_tesseract_lang(Some("sk-SK")), "slk");
        assert_eq!(locale_to_tesseract_lang(Some("cs")), "ces");
        assert_eq!(locale_to_tesseract_lang(Some("de-AT")), "deu");
        assert_eq!(locale_to_tesseract_lang(Some("pl")), "pol");
    }

    #[test]
    fn test_locale_mapping_falls_back_to_english() {
        assert_eq!(locale_to_tesseract_lang(None), "eng");
        assert_eq!(locale_to_tesseract_lang(Some("fr")), "eng");
        assert_eq!(locale_to_tesseract_lang(Some("")), "eng");
    }
}
