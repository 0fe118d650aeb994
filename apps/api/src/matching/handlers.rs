//! Match endpoint: embeds the job once, fans out per-candidate scoring under
//! a concurrency bound (LLM rate limits), and returns a deterministically
//! ordered ranking.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::{JobRequirements, MatchScore};
use crate::models::cv;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 10;
/// Upper bound on candidates pulled for one fan-out.
const MAX_CANDIDATES: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub job: JobRequirements,
    /// Score one specific candidate instead of the whole pool.
    pub candidate_id: Option<Uuid>,
    pub limit: Option<i64>,
    /// Drop candidates whose vector signal falls below this value.
    pub min_similarity: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub matches: Vec<MatchScore>,
    pub evaluated: usize,
}

/// POST /api/v1/match
pub async fn handle_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_CANDIDATES);

    let candidate_ids = match req.candidate_id {
        Some(id) => vec![id],
        None => cv::list_candidate_ids(&state.db, MAX_CANDIDATES)
            .await
            .map_err(AppError::Internal)?,
    };

    if candidate_ids.is_empty() {
        return Ok(Json(MatchResponse {
            matches: vec![],
            evaluated: 0,
        }));
    }

    // One job embedding for the whole fan-out. If the provider is down the
    // vector signal is absent everywhere; matching still proceeds.
    let job_vector = match state.embedder.embed(&req.job.full_text()).await {
        Ok(embedded) => Some(embedded.vector),
        Err(e) => {
            warn!(error = %e, "job embedding unavailable, vector signal disabled");
            None
        }
    };

    let evaluated = candidate_ids.len();
    let semaphore = Arc::new(Semaphore::new(state.config.match_concurrency));
    let job = Arc::new(req.job);
    let job_vector = Arc::new(job_vector);

    let mut handles = Vec::with_capacity(candidate_ids.len());
    for candidate_id in candidate_ids {
        let state = state.clone();
        let semaphore = Arc::clone(&semaphore);
        let job = Arc::clone(&job);
        let job_vector = Arc::clone(&job_vector);

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            score_candidate(&state, &job, job_vector.as_deref(), candidate_id).await
        }));
    }

    let mut matches = Vec::new();
    for handle in handles {
        if let Ok(Some(score)) = handle.await {
            matches.push(score);
        }
    }

    if let Some(min_similarity) = req.min_similarity {
        matches.retain(|m| m.signals.vector.map_or(false, |v| v >= min_similarity));
    }

    // Descending overall, ties by vector signal, then candidate id so a
    // re-run of the same inputs ranks identically.
    matches.sort_by(|a, b| {
        b.overall_score
            .cmp(&a.overall_score)
            .then_with(|| {
                b.signals
                    .vector
                    .unwrap_or(-1.0)
                    .total_cmp(&a.signals.vector.unwrap_or(-1.0))
            })
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
    matches.truncate(limit as usize);

    info!(
        evaluated,
        returned = matches.len(),
        "match fan-out complete"
    );

    Ok(Json(MatchResponse { matches, evaluated }))
}

/// Loads one candidate and scores them. Any per-candidate failure is logged
/// and skipped; a bulk match never hard-fails on one bad candidate.
async fn score_candidate(
    state: &AppState,
    job: &JobRequirements,
    job_vector: Option<&[f32]>,
    candidate_id: Uuid,
) -> Option<MatchScore> {
    let profile = match cv::fetch_profile(&state.db, candidate_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            warn!(%candidate_id, "candidate has no parsed profile, skipping");
            return None;
        }
        Err(e) => {
            warn!(%candidate_id, error = %e, "profile load failed, skipping");
            return None;
        }
    };

    let sections = match cv::fetch_sections(&state.db, candidate_id).await {
        Ok(sections) => sections,
        Err(e) => {
            warn!(%candidate_id, error = %e, "section load failed, skipping");
            return None;
        }
    };

    match state
        .scorer
        .score(
            state.judge.as_ref(),
            job,
            job_vector,
            candidate_id,
            &profile,
            &sections,
        )
        .await
    {
        Ok(score) => Some(score),
        Err(e) => {
            warn!(%candidate_id, error = %e, "candidate unscorable, skipping");
            None
        }
    }
}
