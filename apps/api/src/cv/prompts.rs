// All LLM prompt constants for the CV module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for structured CV extraction — enforces JSON-only output.
pub const CV_EXTRACTION_SYSTEM: &str = "You are an expert CV/Resume parser. \
    Extract structured information from raw resume text. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT invent data that is not present in the text.";

/// CV extraction prompt template. Replace `{locale}` and `{raw_text}` before sending.
pub const CV_EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract structured information from the following CV text.

Return a JSON object with this EXACT schema (no extra fields):
{
  "personal": {
    "full_name": "string or null",
    "email": "string or null",
    "phone": "string or null",
    "location": "string or null",
    "linked_in": "string or null",
    "github": "string or null"
  },
  "summary": "string or null - professional summary or objective",
  "experiences": [
    {
      "title": "string",
      "company": "string",
      "location": "string or null",
      "start_date": "YYYY-MM or YYYY or null",
      "end_date": "YYYY-MM or YYYY or 'present' or null",
      "current": boolean,
      "description": "string or null"
    }
  ],
  "education": [
    {
      "degree": "string",
      "institution": "string",
      "year": "YYYY or null",
      "description": "string or null"
    }
  ],
  "skills": ["string - technical and soft skills"],
  "languages": [
    {"name": "string", "level": "BASIC|CONVERSATIONAL|FLUENT|NATIVE"}
  ],
  "certifications": [
    {"name": "string", "issuer": "string or null", "date": "YYYY-MM or null"}
  ],
  "projects": [
    {"name": "string", "description": "string or null", "technologies": ["string"]}
  ]
}

Rules:
- Extract ALL information present in the CV
- Use null for missing fields; an empty summary is valid
- Keep experiences and education in the ORDER they appear in the text — do not re-sort
- Normalize dates to YYYY-MM where a month is given, YYYY otherwise
- Extract skills from experience descriptions too
- NEVER invent an employer, institution, date, or skill not present in the text

CV Text (Language: {locale}):

{raw_text}"#;
