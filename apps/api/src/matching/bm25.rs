//! Keyword relevance signal: Okapi BM25 of the job description against a
//! candidate's profile sections.
//!
//! The candidate's sections form the document collection; the final signal
//! is the summed per-section score pushed through a fixed saturation curve,
//! so the [0,1] value is reproducible regardless of how many candidates have
//! been scored before.

use std::collections::HashMap;

pub const BM25_K1: f32 = 1.2;
pub const BM25_B: f32 = 0.75;

/// Raw-score saturation point: s / (s + SATURATION). A fixed constant keeps
/// the normalization stable across corpus-size changes, unlike dividing by
/// the maximum score seen so far.
const SATURATION: f32 = 5.0;

/// Lowercased alphanumeric tokens; `+` and `#` stay attached so "c++" and
/// "c#" survive tokenization.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| t.len() >= 2)
        .map(str::to_string)
        .collect()
}

/// Raw BM25 score of `query` against the section collection.
pub fn bm25_score(query: &str, sections: &[String]) -> f32 {
    let query_terms = tokenize(query);
    if query_terms.is_empty() || sections.is_empty() {
        return 0.0;
    }

    let docs: Vec<Vec<String>> = sections.iter().map(|s| tokenize(s)).collect();
    let n_docs = docs.len() as f32;
    let avg_len = docs.iter().map(|d| d.len()).sum::<usize>() as f32 / n_docs;
    if avg_len == 0.0 {
        return 0.0;
    }

    // Document frequency per query term, over the candidate's sections.
    let mut doc_freq: HashMap<&str, f32> = HashMap::new();
    for term in &query_terms {
        let df = docs
            .iter()
            .filter(|d| d.iter().any(|t| t == term))
            .count() as f32;
        doc_freq.insert(term.as_str(), df);
    }

    let mut score = 0.0;
    for doc in &docs {
        let doc_len = doc.len() as f32;
        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in doc {
            *tf.entry(token.as_str()).or_default() += 1.0;
        }

        for term in &query_terms {
            let f = match tf.get(term.as_str()) {
                Some(&f) => f,
                None => continue,
            };
            let df = doc_freq[term.as_str()];
            let idf = ((n_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
            let norm = f * (BM25_K1 + 1.0)
                / (f + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len));
            score += idf * norm;
        }
    }

    score
}

/// BM25 signal normalized to [0,1] with the fixed saturation curve.
pub fn normalized_bm25(query: &str, sections: &[String]) -> f32 {
    let raw = bm25_score(query, sections);
    raw / (raw + SATURATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sections(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_tokenize_keeps_symbols_used_in_skill_names() {
        assert_eq!(tokenize("C++ and C# devs"), vec!["c++", "and", "c#", "devs"]);
    }

    #[test]
    fn test_tokenize_drops_single_chars_and_punctuation() {
        assert_eq!(tokenize("a R, rust!"), vec!["rust"]);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let score = bm25_score(
            "Senior React Developer",
            &sections(&["Accountant with Excel experience"]),
        );
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_matching_terms_score_positive() {
        let score = bm25_score(
            "Senior React Developer, 5 years React",
            &sections(&["React and TypeScript engineer", "React component library work"]),
        );
        assert!(score > 0.0);
    }

    #[test]
    fn test_more_matching_terms_score_higher() {
        let query = "Rust engineer with Kafka and PostgreSQL";
        let weak = bm25_score(query, &sections(&["Java developer"]));
        let partial = bm25_score(query, &sections(&["Rust developer"]));
        let strong = bm25_score(query, &sections(&["Rust developer with Kafka and PostgreSQL"]));
        assert!(weak < partial);
        assert!(partial < strong);
    }

    #[test]
    fn test_normalized_score_in_unit_interval() {
        let query = "Rust Rust Rust engineer";
        let s = normalized_bm25(query, &sections(&["Rust Rust Rust Rust engineer here"]));
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_normalization_is_stable_not_corpus_relative() {
        // Same candidate, same query: same signal no matter what else was scored.
        let query = "Rust engineer";
        let candidate = sections(&["Rust engineer at Acme"]);
        let first = normalized_bm25(query, &candidate);
        let _other = normalized_bm25(query, &sections(&["Rust Rust Rust Rust Rust"]));
        let second = normalized_bm25(query, &candidate);
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(bm25_score("", &sections(&["anything"])), 0.0);
        assert_eq!(bm25_score("query", &[]), 0.0);
        assert_eq!(normalized_bm25("", &[]), 0.0);
    }
}
