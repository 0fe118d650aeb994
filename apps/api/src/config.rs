use anyhow::{Context, Result};

use crate::cv::security::{MIME_DOCX, MIME_PDF, MIME_TEXT};
use crate::matching::scorer::{BucketThresholds, FusionWeights};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub port: u16,
    pub rust_log: String,

    /// LLM provider priority list, primary first.
    pub llm_models: Vec<String>,

    // Upload gate
    pub max_file_size: usize,
    pub allowed_mime_types: Vec<String>,
    pub enable_antivirus: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    /// Scanner unreachable: true lets uploads through, false rejects.
    pub antivirus_fail_open: bool,

    // Extraction cascade
    pub min_extract_chars: usize,
    pub extraction_timeout_secs: u64,
    pub structured_timeout_secs: u64,
    pub enable_ocr: bool,
    pub ocr_url: String,

    // Embeddings
    pub openai_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_max_batch: usize,
    pub embedding_max_chars: usize,
    pub worker_concurrency: usize,
    pub embedding_max_attempts: u32,

    // Matching
    pub match_concurrency: usize,
    pub fusion_weights: FusionWeights,
    pub bucket_thresholds: BucketThresholds,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            port: env_parse("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info"),

            llm_models: env_or("LLM_MODELS", "")
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect(),

            max_file_size: env_parse("MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            allowed_mime_types: vec![
                MIME_PDF.to_string(),
                MIME_DOCX.to_string(),
                MIME_TEXT.to_string(),
            ],
            enable_antivirus: env_parse("ENABLE_ANTIVIRUS", true)?,
            clamav_host: env_or("CLAMAV_HOST", "localhost"),
            clamav_port: env_parse("CLAMAV_PORT", 3310)?,
            antivirus_fail_open: env_parse("ANTIVIRUS_FAIL_OPEN", false)?,

            min_extract_chars: env_parse("MIN_EXTRACT_CHARS", 50)?,
            extraction_timeout_secs: env_parse("EXTRACTION_TIMEOUT_SECS", 30)?,
            structured_timeout_secs: env_parse("STRUCTURED_TIMEOUT_SECS", 60)?,
            enable_ocr: env_parse("ENABLE_OCR", true)?,
            ocr_url: env_or("OCR_URL", "http://localhost:8200"),

            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            embedding_model: env_or("OPENAI_EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: env_parse("OPENAI_EMBEDDING_DIMENSIONS", 1536)?,
            embedding_max_batch: env_parse("EMBEDDING_MAX_BATCH", 100)?,
            embedding_max_chars: env_parse("EMBEDDING_MAX_CHARS", 32_000)?,
            worker_concurrency: env_parse("WORKER_CONCURRENCY", 3)?,
            embedding_max_attempts: env_parse("EMBEDDING_MAX_ATTEMPTS", 3)?,

            match_concurrency: env_parse("MATCH_CONCURRENCY", 3)?,
            fusion_weights: FusionWeights {
                bm25: env_parse("MATCH_WEIGHT_BM25", 0.25)?,
                vector: env_parse("MATCH_WEIGHT_VECTOR", 0.35)?,
                llm: env_parse("MATCH_WEIGHT_LLM", 0.40)?,
            },
            bucket_thresholds: BucketThresholds {
                excellent: env_parse("MATCH_BUCKET_EXCELLENT", 80)?,
                good: env_parse("MATCH_BUCKET_GOOD", 60)?,
                potential: env_parse("MATCH_BUCKET_POTENTIAL", 40)?,
            },
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("'{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
