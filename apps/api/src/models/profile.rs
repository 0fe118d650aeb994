//! Structured professional profile extracted from a CV.
//!
//! Field shapes mirror the extraction prompt schema exactly; the extractor
//! validates a model response against these types before anything downstream
//! sees it. Experience and education order is preserved from the source text
//! (chronological as written, never re-sorted).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    /// `YYYY-MM` or `YYYY`.
    #[serde(default)]
    pub start_date: Option<String>,
    /// `YYYY-MM`, `YYYY`, or absent for a current role.
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageSkill {
    pub name: String,
    /// BASIC | CONVERSATIONAL | FLUENT | NATIVE
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedProfile {
    #[serde(default)]
    pub personal: PersonalInfo,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<LanguageSkill>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<Certification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,
}

/// Kind tag for a profile section. Stored alongside the section text so
/// matching can prefer summary/skills embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Personal,
    Summary,
    Experience,
    Education,
    Skills,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Summary => "summary",
            Self::Experience => "experience",
            Self::Education => "education",
            Self::Skills => "skills",
        }
    }
}

/// One embeddable slice of a profile. `index` is the deterministic section
/// order: personal = 0, summary = 1 when present, experiences sequential,
/// education after experiences, skills last. Consumers rely on this ordering
/// for display and chunked embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSection {
    pub index: i32,
    pub kind: SectionKind,
    pub text: String,
}

impl ParsedProfile {
    /// Splits the profile into ordered sections. Empty sections are skipped
    /// but never re-ordered; indices stay contiguous.
    pub fn sections(&self) -> Vec<ProfileSection> {
        let mut sections = Vec::new();
        let mut index = 0;

        let personal = [
            self.personal.full_name.as_deref(),
            self.personal.email.as_deref(),
            self.personal.phone.as_deref(),
            self.personal.location.as_deref(),
        ]
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
        if !personal.trim().is_empty() {
            sections.push(ProfileSection {
                index,
                kind: SectionKind::Personal,
                text: personal,
            });
            index += 1;
        }

        if let Some(summary) = self.summary.as_deref() {
            if !summary.trim().is_empty() {
                sections.push(ProfileSection {
                    index,
                    kind: SectionKind::Summary,
                    text: summary.to_string(),
                });
                index += 1;
            }
        }

        for exp in &self.experiences {
            let mut text = format!("{} at {}", exp.title, exp.company);
            if let (Some(start), end) = (exp.start_date.as_deref(), exp.end_date.as_deref()) {
                text.push_str(&format!(" ({start} - {})", end.unwrap_or("present")));
            }
            if let Some(desc) = exp.description.as_deref() {
                if !desc.trim().is_empty() {
                    text.push('\n');
                    text.push_str(desc);
                }
            }
            sections.push(ProfileSection {
                index,
                kind: SectionKind::Experience,
                text,
            });
            index += 1;
        }

        for edu in &self.education {
            let mut text = format!("{}, {}", edu.degree, edu.institution);
            if let Some(year) = edu.year.as_deref() {
                text.push_str(&format!(" ({year})"));
            }
            sections.push(ProfileSection {
                index,
                kind: SectionKind::Education,
                text,
            });
            index += 1;
        }

        if !self.skills.is_empty() {
            sections.push(ProfileSection {
                index,
                kind: SectionKind::Skills,
                text: self.skills.join(", "),
            });
        }

        sections
    }

    /// All section text concatenated, for keyword scoring.
    pub fn full_text(&self) -> String {
        self.sections()
            .into_iter()
            .map(|s| s.text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Redacts direct PII. Location, employers and institutions stay;
    /// they carry matching signal without identifying the candidate.
    pub fn anonymized(&self) -> ParsedProfile {
        let mut profile = self.clone();
        let redact = |field: &mut Option<String>| {
            if field.is_some() {
                *field = Some("REDACTED".to_string());
            }
        };
        redact(&mut profile.personal.full_name);
        redact(&mut profile.personal.email);
        redact(&mut profile.personal.phone);
        profile.personal.linked_in = None;
        profile.personal.github = None;
        profile
    }
}
