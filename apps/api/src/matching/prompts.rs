// LLM prompt constants for the matching module.

/// System prompt for the match judgement — enforces JSON-only output.
pub const MATCH_JUDGE_SYSTEM: &str = "You are an expert technical recruiter \
    evaluating how well a candidate matches a job opening. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Base every claim on the provided CV; never invent skills or experience.";

/// Match judgement prompt template.
/// Replace `{job_json}` and `{cv_json}` before sending.
pub const MATCH_JUDGE_PROMPT_TEMPLATE: &str = r#"Analyze how well this candidate matches the job requirements.

Job Requirements:
{job_json}

Candidate CV:
{cv_json}

Consider:
- Skill overlap (required vs nice-to-have)
- Years of experience
- Education level
- Relevant industry experience
- Career progression

Return a JSON object with this EXACT schema:
{
  "score": 0.0 to 1.0 (0 = no match, 1 = perfect match),
  "reasoning": "2-3 sentence explanation of the score",
  "matching_skills": ["required or nice-to-have skills the candidate has"],
  "missing_skills": ["required skills the candidate lacks"],
  "relevant_experience": ["short excerpts of the most relevant roles, most relevant first"],
  "education_match": boolean,
  "location_match": boolean,
  "salary_match": boolean
}"#;
