//! Hybrid candidate-job matching: keyword, vector, and LLM signals fused
//! into one explainable 0-100 score.

pub mod bm25;
pub mod evidence;
pub mod handlers;
pub mod judge;
pub mod prompts;
pub mod scorer;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job opening as the matching entrypoint receives it. Owned by the job
/// service; only the fields the scorer reads are modeled here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub nice_to_have_skills: Vec<String>,
    #[serde(default)]
    pub minimum_years_of_experience: Option<u32>,
    #[serde(default)]
    pub required_education_level: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary_min: Option<u32>,
    #[serde(default)]
    pub salary_max: Option<u32>,
}

impl JobRequirements {
    /// Text used for the keyword signal and the job embedding.
    pub fn full_text(&self) -> String {
        let mut text = format!("{}\n{}", self.title, self.description);
        if !self.required_skills.is_empty() {
            text.push('\n');
            text.push_str(&self.required_skills.join(", "));
        }
        if !self.nice_to_have_skills.is_empty() {
            text.push('\n');
            text.push_str(&self.nice_to_have_skills.join(", "));
        }
        text
    }
}

/// Per-signal values actually used in fusion. A missing signal is `None`,
/// never zero; zero is a meaningful ranking value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchSignals {
    pub bm25: Option<f32>,
    pub vector: Option<f32>,
    pub llm: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchEvidence {
    pub matching_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub relevant_experience: Vec<String>,
    pub education_match: bool,
    pub location_match: bool,
    pub salary_match: bool,
    pub years_of_experience: Option<u32>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScore {
    pub candidate_id: Uuid,
    pub overall_score: u8,
    /// Contractual label: excellent / good / potential / weak.
    pub bucket: String,
    pub signals: MatchSignals,
    pub evidence: MatchEvidence,
    /// True when the LLM signal failed and fusion fell back to the numeric
    /// signals with reweighting.
    pub degraded: bool,
}
