//! LLM reasoning signal for the hybrid scorer.
//!
//! The only signal that produces human-readable reasoning and the skill-gap
//! evidence. Failures here never fail a match request; the scorer degrades
//! to the numeric signals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm_client::{LlmClient, LlmError};
use crate::matching::prompts::{MATCH_JUDGE_PROMPT_TEMPLATE, MATCH_JUDGE_SYSTEM};
use crate::matching::JobRequirements;
use crate::models::profile::ParsedProfile;

/// Judgement returned by the model. `score` is clamped to [0,1] after parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmJudgement {
    pub score: f32,
    pub reasoning: String,
    #[serde(default)]
    pub matching_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub relevant_experience: Vec<String>,
    #[serde(default)]
    pub education_match: bool,
    #[serde(default)]
    pub location_match: bool,
    #[serde(default)]
    pub salary_match: bool,
}

/// Seam so scorer tests can run without a provider.
#[async_trait]
pub trait MatchJudge: Send + Sync {
    async fn judge(
        &self,
        job: &JobRequirements,
        profile: &ParsedProfile,
    ) -> Result<LlmJudgement, LlmError>;
}

pub struct LlmMatchJudge {
    llm: LlmClient,
}

impl LlmMatchJudge {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl MatchJudge for LlmMatchJudge {
    async fn judge(
        &self,
        job: &JobRequirements,
        profile: &ParsedProfile,
    ) -> Result<LlmJudgement, LlmError> {
        // A compact CV view: the model needs signal, not the whole document.
        let cv_view = serde_json::json!({
            "summary": profile.summary,
            "experiences": profile.experiences.iter().take(5).collect::<Vec<_>>(),
            "education": profile.education.iter().take(3).collect::<Vec<_>>(),
            "skills": profile.skills.iter().take(20).collect::<Vec<_>>(),
        });

        let prompt = MATCH_JUDGE_PROMPT_TEMPLATE
            .replace("{job_json}", &serde_json::to_string_pretty(job)?)
            .replace("{cv_json}", &serde_json::to_string_pretty(&cv_view)?);

        let mut judgement: LlmJudgement =
            self.llm.call_json(&prompt, MATCH_JUDGE_SYSTEM).await?;
        judgement.score = judgement.score.clamp(0.0, 1.0);
        Ok(judgement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judgement_deserializes_with_defaults() {
        let json = r#"{"score": 0.72, "reasoning": "Solid overlap."}"#;
        let j: LlmJudgement = serde_json::from_str(json).unwrap();
        assert!((j.score - 0.72).abs() < f32::EPSILON);
        assert!(j.matching_skills.is_empty());
        assert!(!j.education_match);
    }

    #[test]
    fn test_judgement_full_payload() {
        let json = r#"{
            "score": 0.9,
            "reasoning": "Strong React background.",
            "matching_skills": ["React"],
            "missing_skills": ["GraphQL"],
            "relevant_experience": ["Senior FE at Acme"],
            "education_match": true,
            "location_match": false,
            "salary_match": true
        }"#;
        let j: LlmJudgement = serde_json::from_str(json).unwrap();
        assert_eq!(j.matching_skills, vec!["React"]);
        assert!(j.education_match);
        assert!(!j.location_match);
    }
}
