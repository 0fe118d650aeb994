//! Deterministic match evidence: skill overlap, experience years, education
//! and location checks. These back the keyword signal's explanation and fill
//! in when the LLM judgement is unavailable.

use chrono::{Datelike, NaiveDate, Utc};

use crate::matching::JobRequirements;
use crate::models::profile::{Education, Experience, ParsedProfile};

/// Education levels orderable from lowest to highest.
const EDUCATION_LADDER: &[&str] = &["high school", "associate", "bachelor", "master", "phd"];

/// Splits required skills into those present in the candidate's text and
/// those absent. Substring match on lowercased text, same as the reference
/// keyword matcher.
pub fn skills_overlap(profile: &ParsedProfile, job: &JobRequirements) -> (Vec<String>, Vec<String>) {
    let text = profile.full_text().to_lowercase();
    let mut matching = Vec::new();
    let mut missing = Vec::new();
    for skill in &job.required_skills {
        if text.contains(&skill.to_lowercase()) {
            matching.push(skill.clone());
        } else {
            missing.push(skill.clone());
        }
    }
    (matching, missing)
}

/// Titles of the most recent experiences, used as the relevant-experience
/// excerpt when no LLM judgement is available.
pub fn experience_titles(profile: &ParsedProfile, limit: usize) -> Vec<String> {
    profile
        .experiences
        .iter()
        .take(limit)
        .map(|e| format!("{} at {}", e.title, e.company))
        .collect()
}

/// Total years across experience ranges, rounded to whole years. Open-ended
/// roles (current, or no end date) run until today. Entries without a start
/// date contribute nothing.
pub fn years_of_experience(experiences: &[Experience]) -> Option<u32> {
    let today = Utc::now().date_naive();
    let mut total_months = 0i64;

    for exp in experiences {
        let Some(start) = exp.start_date.as_deref().and_then(parse_month) else {
            continue;
        };
        let end = if exp.current {
            today
        } else {
            exp.end_date
                .as_deref()
                .and_then(parse_month)
                .unwrap_or(today)
        };
        let months = (end.year() as i64 - start.year() as i64) * 12
            + (end.month() as i64 - start.month() as i64);
        total_months += months.max(0);
    }

    if total_months == 0 {
        None
    } else {
        Some(((total_months as f64) / 12.0).round() as u32)
    }
}

fn parse_month(token: &str) -> Option<NaiveDate> {
    let mut parts = token.splitn(2, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Whether any degree meets the required level on the education ladder.
/// No requirement means every candidate passes.
pub fn education_matches(education: &[Education], required_level: Option<&str>) -> bool {
    let Some(required) = required_level else {
        return true;
    };
    let Some(required_rank) = ladder_rank(required) else {
        return false;
    };
    education
        .iter()
        .filter_map(|e| ladder_rank(&e.degree))
        .any(|rank| rank >= required_rank)
}

fn ladder_rank(degree: &str) -> Option<usize> {
    let degree = degree.to_lowercase();
    EDUCATION_LADDER
        .iter()
        .position(|level| degree.contains(level))
        // Common abbreviations the ladder words miss.
        .or_else(|| {
            if degree.contains("bsc") || degree.contains("b.s") || degree.contains("ba ") {
                Some(2)
            } else if degree.contains("msc") || degree.contains("m.s") || degree.contains("mba") {
                Some(3)
            } else if degree.contains("doctor") {
                Some(4)
            } else {
                None
            }
        })
}

/// Case-insensitive containment either way covers "Bratislava" vs
/// "Bratislava, Slovakia". A job without a location constrains nothing.
pub fn location_matches(candidate: Option<&str>, job: Option<&str>) -> bool {
    match (candidate, job) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(c), Some(j)) => {
            let c = c.trim().to_lowercase();
            let j = j.trim().to_lowercase();
            !c.is_empty() && (c.contains(&j) || j.contains(&c))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::profile::PersonalInfo;

    fn exp(start: Option<&str>, end: Option<&str>, current: bool) -> Experience {
        Experience {
            title: "Engineer".to_string(),
            company: "Acme".to_string(),
            location: None,
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            current,
            description: None,
        }
    }

    fn edu(degree: &str) -> Education {
        Education {
            degree: degree.to_string(),
            institution: "University".to_string(),
            year: None,
            description: None,
        }
    }

    #[test]
    fn test_skills_overlap_splits_matching_and_missing() {
        let profile = ParsedProfile {
            personal: PersonalInfo::default(),
            skills: vec!["React".to_string(), "TypeScript".to_string()],
            ..Default::default()
        };
        let job = JobRequirements {
            title: "Senior React Developer".to_string(),
            description: "5 years".to_string(),
            required_skills: vec!["React".to_string(), "GraphQL".to_string()],
            ..Default::default()
        };
        let (matching, missing) = skills_overlap(&profile, &job);
        assert_eq!(matching, vec!["React"]);
        assert_eq!(missing, vec!["GraphQL"]);
    }

    #[test]
    fn test_years_sums_closed_ranges() {
        let exps = vec![
            exp(Some("2018-01"), Some("2020-01"), false), // 24 months
            exp(Some("2020-01"), Some("2021-07"), false), // 18 months
        ];
        assert_eq!(years_of_experience(&exps), Some(4)); // 42 months -> 3.5 -> 4
    }

    #[test]
    fn test_years_ignores_entries_without_start() {
        let exps = vec![exp(None, Some("2020-01"), false)];
        assert_eq!(years_of_experience(&exps), None);
    }

    #[test]
    fn test_years_open_range_counts_to_today() {
        let exps = vec![exp(Some("2018-01"), None, true)];
        let years = years_of_experience(&exps).unwrap();
        assert!(years >= 7); // written in 2026; grows monotonically
    }

    #[test]
    fn test_year_only_dates_parse_as_january() {
        let exps = vec![exp(Some("2019"), Some("2021"), false)];
        assert_eq!(years_of_experience(&exps), Some(2));
    }

    #[test]
    fn test_education_ladder_orders_degrees() {
        assert!(education_matches(&[edu("Master of Science")], Some("bachelor")));
        assert!(!education_matches(&[edu("Bachelor of Arts")], Some("master")));
        assert!(education_matches(&[edu("PhD in CS")], Some("phd")));
    }

    #[test]
    fn test_education_no_requirement_always_passes() {
        assert!(education_matches(&[], None));
    }

    #[test]
    fn test_education_abbreviations_rank() {
        assert!(education_matches(&[edu("BSc Computer Science")], Some("bachelor")));
        assert!(education_matches(&[edu("MSc Software Engineering")], Some("master")));
    }

    #[test]
    fn test_education_unknown_requirement_fails_closed() {
        assert!(!education_matches(&[edu("Bachelor")], Some("wizard")));
    }

    #[test]
    fn test_location_containment_both_ways() {
        assert!(location_matches(Some("Bratislava, Slovakia"), Some("Bratislava")));
        assert!(location_matches(Some("Berlin"), Some("Berlin, Germany")));
        assert!(!location_matches(Some("Prague"), Some("Berlin")));
        assert!(location_matches(Some("Anywhere"), None));
        assert!(!location_matches(None, Some("Berlin")));
    }
}
