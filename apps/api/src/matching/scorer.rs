//! Signal fusion for the hybrid match score.
//!
//! `overall = round(100 * weighted_mean(present signals))`, with weights
//! renormalized over whichever signals exist so a missing signal never
//! silently zeroes the score. The scorer only errors when *all* signals are
//! unavailable; "could not compute" must stay distinct from a zero score.

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::embeddings::cosine_similarity;
use crate::matching::bm25::normalized_bm25;
use crate::matching::evidence;
use crate::matching::judge::MatchJudge;
use crate::matching::{JobRequirements, MatchEvidence, MatchScore, MatchSignals};
use crate::models::cv::CvSectionRow;
use crate::models::profile::ParsedProfile;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no signal available for candidate {0}")]
    NoSignals(Uuid),
}

/// Fusion weights; product decisions, so configurable rather than baked in.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FusionWeights {
    pub bm25: f32,
    pub vector: f32,
    pub llm: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            bm25: 0.25,
            vector: 0.35,
            llm: 0.40,
        }
    }
}

/// Score-bucket cut-offs other components depend on, not display trivia.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BucketThresholds {
    pub excellent: u8,
    pub good: u8,
    pub potential: u8,
}

impl Default for BucketThresholds {
    fn default() -> Self {
        Self {
            excellent: 80,
            good: 60,
            potential: 40,
        }
    }
}

pub fn bucket_label(score: u8, thresholds: BucketThresholds) -> &'static str {
    if score >= thresholds.excellent {
        "excellent"
    } else if score >= thresholds.good {
        "good"
    } else if score >= thresholds.potential {
        "potential"
    } else {
        "weak"
    }
}

/// Weighted mean over present signals, weights renormalized to sum to 1.
/// `None` when no signal is present.
pub fn fuse(signals: &MatchSignals, weights: FusionWeights) -> Option<u8> {
    let mut weighted_sum = 0.0f32;
    let mut weight_total = 0.0f32;

    for (signal, weight) in [
        (signals.bm25, weights.bm25),
        (signals.vector, weights.vector),
        (signals.llm, weights.llm),
    ] {
        if let Some(value) = signal {
            weighted_sum += value.clamp(0.0, 1.0) * weight;
            weight_total += weight;
        }
    }

    if weight_total == 0.0 {
        return None;
    }
    Some((100.0 * weighted_sum / weight_total).round() as u8)
}

pub struct HybridScorer {
    weights: FusionWeights,
    thresholds: BucketThresholds,
}

impl HybridScorer {
    pub fn new(weights: FusionWeights, thresholds: BucketThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    /// Scores one candidate against one job. The LLM signal may fail; the
    /// result then carries `degraded = true` and keyword-derived evidence.
    pub async fn score(
        &self,
        judge: &dyn MatchJudge,
        job: &JobRequirements,
        job_vector: Option<&[f32]>,
        candidate_id: Uuid,
        profile: &ParsedProfile,
        sections: &[CvSectionRow],
    ) -> Result<MatchScore, MatchError> {
        let section_texts: Vec<String> = sections.iter().map(|s| s.text.clone()).collect();

        let bm25 = if section_texts.is_empty() {
            None
        } else {
            Some(normalized_bm25(&job.full_text(), &section_texts))
        };

        let vector = job_vector.and_then(|jv| best_section_similarity(jv, sections));

        let (llm, judgement) = match judge.judge(job, profile).await {
            Ok(j) => (Some(j.score), Some(j)),
            Err(e) => {
                warn!(%candidate_id, error = %e, "LLM judgement unavailable, degrading");
                (None, None)
            }
        };

        let signals = MatchSignals { bm25, vector, llm };
        let overall_score =
            fuse(&signals, self.weights).ok_or(MatchError::NoSignals(candidate_id))?;

        let years = evidence::years_of_experience(&profile.experiences);
        let evidence = match &judgement {
            Some(j) => MatchEvidence {
                matching_skills: j.matching_skills.clone(),
                missing_skills: j.missing_skills.clone(),
                relevant_experience: j.relevant_experience.clone(),
                education_match: j.education_match,
                location_match: j.location_match,
                salary_match: j.salary_match,
                years_of_experience: years,
                reasoning: j.reasoning.clone(),
            },
            None => {
                let (matching_skills, missing_skills) = evidence::skills_overlap(profile, job);
                MatchEvidence {
                    matching_skills,
                    missing_skills,
                    relevant_experience: evidence::experience_titles(profile, 3),
                    education_match: evidence::education_matches(
                        &profile.education,
                        job.required_education_level.as_deref(),
                    ),
                    location_match: evidence::location_matches(
                        profile.personal.location.as_deref(),
                        job.location.as_deref(),
                    ),
                    salary_match: job.salary_min.is_some() && job.salary_max.is_some(),
                    years_of_experience: years,
                    reasoning: "LLM judgement unavailable; score computed from keyword and vector signals.".to_string(),
                }
            }
        };

        Ok(MatchScore {
            candidate_id,
            overall_score,
            bucket: bucket_label(overall_score, self.thresholds).to_string(),
            signals,
            evidence,
            degraded: judgement.is_none(),
        })
    }
}

/// Cosine similarity against the most relevant embedded section: summary
/// preferred, then skills, then the best of the rest. Clamped to [0,1].
fn best_section_similarity(job_vector: &[f32], sections: &[CvSectionRow]) -> Option<f32> {
    let pick = |kind: &str| {
        sections
            .iter()
            .find(|s| s.kind == kind)
            .and_then(|s| s.vector())
    };

    let similarity = if let Some(v) = pick("summary").or_else(|| pick("skills")) {
        cosine_similarity(job_vector, &v)
    } else {
        sections
            .iter()
            .filter_map(|s| s.vector())
            .map(|v| cosine_similarity(job_vector, &v))
            .fold(None, |best: Option<f32>, sim| {
                Some(best.map_or(sim, |b| b.max(sim)))
            })?
    };

    Some(similarity.clamp(0.0, 1.0))
}
