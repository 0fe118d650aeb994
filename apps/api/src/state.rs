use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::cv::extractor::ProfileExtractor;
use crate::cv::ocr::OcrEngine;
use crate::cv::pipeline::ExtractionCascade;
use crate::cv::security::SecurityGate;
use crate::embeddings::queue::EmbeddingQueue;
use crate::embeddings::EmbeddingProvider;
use crate::llm_client::LlmClient;
use crate::matching::judge::MatchJudge;
use crate::matching::scorer::HybridScorer;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Every pipeline stage is constructed once at startup and injected here;
/// no stage reaches for a global client.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub gate: Arc<SecurityGate>,
    pub cascade: Arc<ExtractionCascade>,
    pub ocr: Arc<dyn OcrEngine>,
    pub extractor: Arc<ProfileExtractor>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub queue: EmbeddingQueue,
    pub judge: Arc<dyn MatchJudge>,
    pub scorer: Arc<HybridScorer>,
    pub config: Config,
}
