mod config;
mod cv;
mod db;
mod embeddings;
mod errors;
mod llm_client;
mod matching;
mod models;
mod routes;
mod state;
mod storage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::cv::clamav::{ClamAvScanner, DisabledScanner, MalwareScanner};
use crate::cv::extractor::ProfileExtractor;
use crate::cv::ocr::{DisabledOcr, OcrClient, OcrEngine};
use crate::cv::pipeline::ExtractionCascade;
use crate::cv::security::SecurityGate;
use crate::db::create_pool;
use crate::embeddings::queue::EmbeddingQueue;
use crate::embeddings::worker::EmbeddingWorkerPool;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbedder};
use crate::llm_client::LlmClient;
use crate::matching::judge::LlmMatchJudge;
use crate::matching::scorer::HybridScorer;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting HireLens API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis-backed embedding queue
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = EmbeddingQueue::new(redis);
    info!("Embedding queue initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client with its provider priority list
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.llm_models.clone());
    info!("LLM client initialized (primary model: {})", llm.primary_model());

    // Security gate: malware scanner per config, fail-closed by default
    let scanner: Arc<dyn MalwareScanner> = if config.enable_antivirus {
        Arc::new(ClamAvScanner::new(
            config.clamav_host.clone(),
            config.clamav_port,
            Duration::from_secs(20),
        ))
    } else {
        Arc::new(DisabledScanner)
    };
    let gate = Arc::new(SecurityGate::new(
        config.max_file_size,
        config.allowed_mime_types.clone(),
        scanner,
        config.antivirus_fail_open,
    ));

    // Extraction cascade + OCR sidecar
    let cascade = Arc::new(ExtractionCascade::new(
        config.min_extract_chars,
        Duration::from_secs(config.extraction_timeout_secs),
    ));
    let ocr: Arc<dyn OcrEngine> = if config.enable_ocr {
        Arc::new(OcrClient::new(
            config.ocr_url.clone(),
            Duration::from_secs(config.extraction_timeout_secs),
        ))
    } else {
        Arc::new(DisabledOcr)
    };

    // Structured profile extractor
    let extractor = Arc::new(ProfileExtractor::new(Duration::from_secs(
        config.structured_timeout_secs,
    )));

    // Embedding provider + background workers
    let embedder = Arc::new(OpenAiEmbedder::new(
        config.openai_api_key.clone(),
        config.openai_base_url.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
        config.embedding_max_batch,
        config.embedding_max_chars,
        Duration::from_secs(30),
    ));
    info!(
        "Embedding provider ready ({} dims, model {})",
        embedder.dimensions(),
        config.embedding_model
    );
    EmbeddingWorkerPool::new(
        queue.clone(),
        embedder.clone(),
        db.clone(),
        config.worker_concurrency,
        config.embedding_max_attempts,
    )
    .spawn();

    // Hybrid match scorer
    let judge = Arc::new(LlmMatchJudge::new(llm.clone()));
    let scorer = Arc::new(HybridScorer::new(
        config.fusion_weights,
        config.bucket_thresholds,
    ));

    // Build app state
    let state = AppState {
        db,
        s3,
        llm,
        gate,
        cascade,
        ocr,
        extractor,
        embedder,
        queue,
        judge,
        scorer,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "hirelens-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
