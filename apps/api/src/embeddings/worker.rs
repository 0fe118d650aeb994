//! Background worker pool for section embeddings.
//!
//! Decoupled from the upload request: the handler enqueues and returns, the
//! pool drains. Concurrency stays low (provider rate limits); batching is
//! the throughput lever: after a blocking claim, each worker drains more
//! pending jobs into a single provider batch.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::embeddings::queue::{backoff_delay, EmbeddingJob, EmbeddingQueue};
use crate::embeddings::EmbeddingProvider;
use crate::models::cv;
use crate::models::cv::CvSectionRow;

const CLAIM_POLL_WINDOW: Duration = Duration::from_secs(5);
/// Jobs drained into one provider batch per worker round.
const JOBS_PER_BATCH: usize = 16;

pub struct EmbeddingWorkerPool {
    queue: EmbeddingQueue,
    provider: Arc<dyn EmbeddingProvider>,
    db: PgPool,
    concurrency: usize,
    max_attempts: u32,
}

impl EmbeddingWorkerPool {
    pub fn new(
        queue: EmbeddingQueue,
        provider: Arc<dyn EmbeddingProvider>,
        db: PgPool,
        concurrency: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            queue,
            provider,
            db,
            concurrency,
            max_attempts,
        }
    }

    /// Spawns the worker tasks. Each worker claims jobs independently, so a
    /// stuck section never blocks siblings from the same résumé.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let pool = Arc::new(self);
        info!(concurrency = pool.concurrency, "embedding workers starting");
        (0..pool.concurrency)
            .map(|worker_id| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.run_worker(worker_id).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_id: usize) {
        loop {
            let first = match self.queue.claim(CLAIM_POLL_WINDOW).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id, error = %e, "queue claim failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            let mut jobs = vec![first];
            while jobs.len() < JOBS_PER_BATCH {
                match self.queue.try_claim().await {
                    Ok(Some(job)) => jobs.push(job),
                    _ => break,
                }
            }

            self.process_batch(worker_id, jobs).await;
        }
    }

    async fn process_batch(&self, worker_id: usize, jobs: Vec<EmbeddingJob>) {
        let mut pending: Vec<(EmbeddingJob, CvSectionRow)> = Vec::with_capacity(jobs.len());

        for job in jobs {
            match cv::fetch_section(&self.db, job.section_id).await {
                Ok(Some(section)) => {
                    // Re-extraction may already have landed a vector for this text.
                    if section.embedding.is_none() {
                        pending.push((job, section));
                    }
                }
                Ok(None) => {
                    // Profile was re-extracted and this section no longer exists.
                    warn!(worker_id, section_id = %job.section_id, "section gone, dropping job");
                }
                Err(e) => {
                    error!(worker_id, section_id = %job.section_id, error = %e, "section load failed");
                    self.requeue(vec![job]).await;
                }
            }
        }

        if pending.is_empty() {
            return;
        }

        let texts: Vec<String> = pending.iter().map(|(_, s)| s.text.clone()).collect();
        match self.provider.embed_batch(&texts).await {
            Ok(embedded) => {
                for ((job, section), item) in pending.into_iter().zip(embedded) {
                    if item.truncated {
                        warn!(
                            worker_id,
                            section_id = %section.id,
                            "section text exceeded embedding budget, vector covers the head only"
                        );
                    }
                    match cv::store_section_embedding(
                        &self.db,
                        section.id,
                        &section.text_hash,
                        &item.vector,
                    )
                    .await
                    {
                        Ok(()) => {
                            info!(
                                worker_id,
                                cv_id = %job.cv_id,
                                section_id = %section.id,
                                attempt = job.attempt,
                                "section embedded"
                            );
                            let _ = self.queue.mark_processed().await;
                        }
                        Err(e) => {
                            error!(worker_id, section_id = %section.id, error = %e, "embedding store failed");
                            self.requeue(vec![job]).await;
                        }
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                // One discipline: a failing chunk fails the whole batch, and
                // every member retries with its own attempt counter.
                warn!(worker_id, batch = pending.len(), error = %e, "transient batch failure");
                self.requeue(pending.into_iter().map(|(job, _)| job).collect())
                    .await;
            }
            Err(e) => {
                // Validation errors never heal on retry.
                error!(worker_id, batch = pending.len(), error = %e, "embedding batch rejected");
                for _ in &pending {
                    let _ = self.queue.mark_failed().await;
                }
            }
        }
    }

    /// Re-enqueues jobs that have attempts left, after one backoff delay
    /// sized to the youngest attempt in the set.
    async fn requeue(&self, jobs: Vec<EmbeddingJob>) {
        let (retryable, exhausted): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .partition(|job| job.attempt < self.max_attempts);

        for job in &exhausted {
            error!(
                section_id = %job.section_id,
                attempts = job.attempt,
                "embedding job exhausted retries"
            );
            let _ = self.queue.mark_failed().await;
        }

        if retryable.is_empty() {
            return;
        }

        let min_attempt = retryable.iter().map(|j| j.attempt).min().unwrap_or(1);
        tokio::time::sleep(backoff_delay(min_attempt)).await;

        for job in retryable {
            if let Err(e) = self.queue.enqueue(&job.next_attempt()).await {
                error!(section_id = %job.section_id, error = %e, "re-enqueue failed");
                let _ = self.queue.mark_failed().await;
            }
        }
    }
}
