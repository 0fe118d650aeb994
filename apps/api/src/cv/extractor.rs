//! Structured Profile Extractor — raw CV text to a validated `ParsedProfile`.
//!
//! One prompt, a fixed JSON schema, and a strict validation step. A response
//! that parses but fails validation is a provider failure, never coerced.
//! The provider priority list is walked in order: each model gets one normal
//! attempt plus one strict "return ONLY JSON" reprompt on malformed output.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::cv::error::CvParseError;
use crate::cv::prompts::{CV_EXTRACTION_PROMPT_TEMPLATE, CV_EXTRACTION_SYSTEM};
use crate::llm_client::prompts::STRICT_JSON_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::profile::ParsedProfile;

const LANGUAGE_LEVELS: &[&str] = &["BASIC", "CONVERSATIONAL", "FLUENT", "NATIVE"];

pub struct ProfileExtractor {
    stage_timeout: Duration,
}

impl ProfileExtractor {
    pub fn new(stage_timeout: Duration) -> Self {
        Self { stage_timeout }
    }

    /// Extracts a structured profile from raw text. Fails with
    /// `ai_provider_failed` only after every provider entry is exhausted.
    pub async fn extract_profile(
        &self,
        llm: &LlmClient,
        raw_text: &str,
        locale: Option<&str>,
    ) -> Result<ParsedProfile, CvParseError> {
        let prompt = CV_EXTRACTION_PROMPT_TEMPLATE
            .replace("{locale}", locale.unwrap_or("en"))
            .replace("{raw_text}", raw_text);

        let mut provider_errors: Vec<String> = Vec::new();

        for model in llm.models() {
            match self.try_model(llm, model, &prompt).await {
                Ok(profile) => {
                    info!(
                        model,
                        experiences = profile.experiences.len(),
                        education = profile.education.len(),
                        skills = profile.skills.len(),
                        "structured profile extracted"
                    );
                    return Ok(profile);
                }
                Err(reason) => {
                    warn!(model, reason, "profile extraction attempt failed");
                    provider_errors.push(format!("{model}: {reason}"));
                }
            }
        }

        Err(CvParseError::ai_provider_failed(&provider_errors))
    }

    /// One model, up to two attempts: the normal system prompt, then the
    /// strict reprompt when the first response was not valid JSON.
    async fn try_model(
        &self,
        llm: &LlmClient,
        model: &str,
        prompt: &str,
    ) -> Result<ParsedProfile, String> {
        let value = match self.call_json(llm, model, prompt, CV_EXTRACTION_SYSTEM).await {
            Ok(value) => value,
            Err(LlmError::Parse(first)) => {
                warn!(model, error = %first, "malformed JSON, retrying with strict prompt");
                self.call_json(llm, model, prompt, STRICT_JSON_SYSTEM)
                    .await
                    .map_err(|e| e.to_string())?
            }
            Err(e) => return Err(e.to_string()),
        };

        validate_profile(&value)
    }

    async fn call_json(
        &self,
        llm: &LlmClient,
        model: &str,
        prompt: &str,
        system: &str,
    ) -> Result<Value, LlmError> {
        tokio::time::timeout(
            self.stage_timeout,
            llm.call_json_with_model::<Value>(model, prompt, system),
        )
        .await
        .map_err(|_| LlmError::Api {
            status: 408,
            message: format!(
                "structured extraction exceeded {}ms budget",
                self.stage_timeout.as_millis()
            ),
        })?
    }
}

/// Validates a model response against the profile schema. Returns the typed
/// profile or the first reason it is structurally unusable.
pub fn validate_profile(value: &Value) -> Result<ParsedProfile, String> {
    if !value.is_object() {
        return Err("response is not a JSON object".to_string());
    }

    let mut profile: ParsedProfile = serde_json::from_value(value.clone())
        .map_err(|e| format!("schema mismatch: {e}"))?;

    for (i, exp) in profile.experiences.iter_mut().enumerate() {
        if exp.title.trim().is_empty() {
            return Err(format!("experience[{i}] has an empty title"));
        }
        if exp.company.trim().is_empty() {
            return Err(format!("experience[{i}] has an empty company"));
        }
        if let Some(start) = exp.start_date.as_deref() {
            if !is_valid_date_token(start) {
                return Err(format!("experience[{i}] start_date '{start}' is unparseable"));
            }
        }
        // "present" marks an open-ended role; normalize it into the flag.
        if let Some(end) = exp.end_date.as_deref() {
            if end.eq_ignore_ascii_case("present") {
                exp.current = true;
                exp.end_date = None;
            } else if !is_valid_date_token(end) {
                return Err(format!("experience[{i}] end_date '{end}' is unparseable"));
            }
        }
    }

    for (i, edu) in profile.education.iter().enumerate() {
        if edu.degree.trim().is_empty() {
            return Err(format!("education[{i}] has an empty degree"));
        }
        if edu.institution.trim().is_empty() {
            return Err(format!("education[{i}] has an empty institution"));
        }
        if let Some(year) = edu.year.as_deref() {
            if !is_valid_date_token(year) {
                return Err(format!("education[{i}] year '{year}' is unparseable"));
            }
        }
    }

    profile.skills.retain(|s| !s.trim().is_empty());

    for (i, lang) in profile.languages.iter().enumerate() {
        if !LANGUAGE_LEVELS.contains(&lang.level.as_str()) {
            return Err(format!(
                "languages[{i}] level '{}' is not one of {LANGUAGE_LEVELS:?}",
                lang.level
            ));
        }
    }

    Ok(profile)
}

/// Accepts `YYYY` or `YYYY-MM` with a month in 01..=12.
fn is_valid_date_token(token: &str) -> bool {
    let bytes = token.as_bytes();
    match bytes.len() {
        4 => bytes.iter().all(u8::is_ascii_digit),
        7 => {
            bytes[..4].iter().all(u8::is_ascii_digit)
                && bytes[4] == b'-'
                && bytes[5..].iter().all(u8::is_ascii_digit)
                && (1..=12).contains(&token[5..7].parse::<u8>().unwrap_or(0))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_response() -> Value {
        json!({
            "personal": {
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": null,
                "location": "Bratislava",
                "linked_in": null,
                "github": null
            },
            "summary": "Backend engineer.",
            "experiences": [
                {
                    "title": "Senior Engineer",
                    "company": "Acme",
                    "location": null,
                    "start_date": "2021-03",
                    "end_date": "present",
                    "current": false,
                    "description": "Built things."
                }
            ],
            "education": [
                {"degree": "BSc", "institution": "Comenius University", "year": "2017", "description": null}
            ],
            "skills": ["Rust", "  ", "PostgreSQL"],
            "languages": [{"name": "English", "level": "FLUENT"}],
            "certifications": [],
            "projects": []
        })
    }

    #[test]
    fn test_valid_response_passes_validation() {
        let profile = validate_profile(&valid_response()).unwrap();
        assert_eq!(profile.personal.full_name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.experiences.len(), 1);
        assert_eq!(profile.education.len(), 1);
    }

    #[test]
    fn test_present_end_date_normalizes_to_current() {
        let profile = validate_profile(&valid_response()).unwrap();
        assert!(profile.experiences[0].current);
        assert!(profile.experiences[0].end_date.is_none());
    }

    #[test]
    fn test_blank_skills_are_dropped() {
        let profile = validate_profile(&valid_response()).unwrap();
        assert_eq!(profile.skills, vec!["Rust", "PostgreSQL"]);
    }

    #[test]
    fn test_empty_summary_is_valid() {
        let mut value = valid_response();
        value["summary"] = Value::Null;
        let profile = validate_profile(&value).unwrap();
        assert!(profile.summary.is_none());
    }

    #[test]
    fn test_empty_company_is_rejected() {
        let mut value = valid_response();
        value["experiences"][0]["company"] = json!("  ");
        let err = validate_profile(&value).unwrap_err();
        assert!(err.contains("empty company"));
    }

    #[test]
    fn test_unparseable_date_is_rejected() {
        let mut value = valid_response();
        value["experiences"][0]["start_date"] = json!("March 2021");
        let err = validate_profile(&value).unwrap_err();
        assert!(err.contains("unparseable"));
    }

    #[test]
    fn test_unknown_language_level_is_rejected() {
        let mut value = valid_response();
        value["languages"][0]["level"] = json!("OK-ISH");
        assert!(validate_profile(&value).is_err());
    }

    #[test]
    fn test_array_response_is_rejected() {
        let err = validate_profile(&json!([1, 2, 3])).unwrap_err();
        assert!(err.contains("not a JSON object"));
    }

    #[test]
    fn test_date_token_rules() {
        assert!(is_valid_date_token("2021"));
        assert!(is_valid_date_token("2021-03"));
        assert!(is_valid_date_token("2021-12"));
        assert!(!is_valid_date_token("2021-13"));
        assert!(!is_valid_date_token("2021-3"));
        assert!(!is_valid_date_token("21-03"));
        assert!(!is_valid_date_token("present"));
    }
}
