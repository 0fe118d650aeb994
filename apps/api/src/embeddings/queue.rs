//! Redis-backed work queue for embedding generation.
//!
//! One job per résumé section. Jobs are pushed to a list and claimed with a
//! blocking pop; a transient failure re-enqueues the job with its attempt
//! counter bumped, so a section's retries never block its siblings.

use std::time::Duration;

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cv::error::CvParseError;

const QUEUE_KEY: &str = "hirelens:embeddings:jobs";
const PROCESSED_KEY: &str = "hirelens:embeddings:processed";
const FAILED_KEY: &str = "hirelens:embeddings:failed";

/// Base delay for retry backoff; doubles per attempt (2s, 4s, 8s, ...).
const BACKOFF_BASE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub cv_id: Uuid,
    pub section_id: Uuid,
    /// 1-based attempt number of the *next* execution.
    pub attempt: u32,
}

impl EmbeddingJob {
    pub fn new(cv_id: Uuid, section_id: Uuid) -> Self {
        Self {
            cv_id,
            section_id,
            attempt: 1,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..*self
        }
    }
}

/// Exponential backoff before re-running a failed attempt.
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(attempt.saturating_sub(1).min(8))
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queued: u64,
    pub processed: u64,
    pub failed: u64,
}

#[derive(Clone)]
pub struct EmbeddingQueue {
    client: redis::Client,
}

impl EmbeddingQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Enqueues one job per section. Failure here is `queue_failed`: the
    /// profile is already persisted, embeddings just will not materialize.
    pub async fn enqueue_sections(
        &self,
        cv_id: Uuid,
        section_ids: &[Uuid],
    ) -> Result<(), CvParseError> {
        for &section_id in section_ids {
            self.enqueue(&EmbeddingJob::new(cv_id, section_id)).await?;
        }
        info!(%cv_id, count = section_ids.len(), "embedding jobs enqueued");
        Ok(())
    }

    pub async fn enqueue(&self, job: &EmbeddingJob) -> Result<(), CvParseError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| CvParseError::queue_failed(&e.to_string()))?;
        let mut con = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CvParseError::queue_failed(&e.to_string()))?;
        con.lpush::<_, _, ()>(QUEUE_KEY, payload)
            .await
            .map_err(|e| CvParseError::queue_failed(&e.to_string()))?;
        debug!(section_id = %job.section_id, attempt = job.attempt, "job enqueued");
        Ok(())
    }

    /// Blocking claim; returns `None` when the poll window elapses with an
    /// empty queue so workers can observe shutdown.
    pub async fn claim(&self, poll_window: Duration) -> redis::RedisResult<Option<EmbeddingJob>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> =
            con.brpop(QUEUE_KEY, poll_window.as_secs_f64()).await?;
        match popped {
            Some((_, payload)) => Ok(serde_json::from_str(&payload).ok()),
            None => Ok(None),
        }
    }

    /// Non-blocking claim, used to drain additional jobs into one provider
    /// batch after a blocking claim landed the first.
    pub async fn try_claim(&self) -> redis::RedisResult<Option<EmbeddingJob>> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<String> = con.rpop(QUEUE_KEY, None).await?;
        Ok(popped.and_then(|payload| serde_json::from_str(&payload).ok()))
    }

    pub async fn mark_processed(&self) -> redis::RedisResult<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.incr::<_, _, ()>(PROCESSED_KEY, 1).await
    }

    pub async fn mark_failed(&self) -> redis::RedisResult<()> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        con.incr::<_, _, ()>(FAILED_KEY, 1).await
    }

    pub async fn stats(&self) -> redis::RedisResult<QueueStats> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let queued: u64 = con.llen(QUEUE_KEY).await?;
        let processed: u64 = con.get::<_, Option<u64>>(PROCESSED_KEY).await?.unwrap_or(0);
        let failed: u64 = con.get::<_, Option<u64>>(FAILED_KEY).await?.unwrap_or(0);
        Ok(QueueStats {
            queued,
            processed,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(100), BACKOFF_BASE * 256);
    }

    #[test]
    fn test_next_attempt_increments_only_counter() {
        let job = EmbeddingJob::new(Uuid::new_v4(), Uuid::new_v4());
        let retry = job.next_attempt();
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.cv_id, job.cv_id);
        assert_eq!(retry.section_id, job.section_id);
    }

    #[test]
    fn test_job_payload_round_trip() {
        let job = EmbeddingJob::new(Uuid::new_v4(), Uuid::new_v4());
        let payload = serde_json::to_string(&job).unwrap();
        let back: EmbeddingJob = serde_json::from_str(&payload).unwrap();
        assert_eq!(back.section_id, job.section_id);
        assert_eq!(back.attempt, 1);
    }
}
