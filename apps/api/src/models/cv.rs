//! CV persistence rows and repository functions.
//!
//! Embeddings are keyed by a blake3 content hash; the upsert keeps a stored
//! vector only while the section text hash is unchanged, so a text edit
//! invalidates the embedding in the same statement that writes the new text.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::cv::pipeline::ExtractionResult;
use crate::models::profile::{ParsedProfile, ProfileSection};

#[derive(Debug, Clone, FromRow)]
pub struct CvDocumentRow {
    pub id: Uuid,
    pub raw_text: String,
    pub extracted_length: i32,
    pub parse_method: String,
    pub confidence: f64,
    pub trace_id: Uuid,
    pub warning: Option<String>,
    pub locale: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CvSectionRow {
    pub id: Uuid,
    pub cv_id: Uuid,
    pub section_index: i32,
    pub kind: String,
    pub text: String,
    pub text_hash: String,
    pub embedding: Option<Value>,
    pub embedded_at: Option<DateTime<Utc>>,
}

impl CvSectionRow {
    /// Stored vector, if one exists and deserializes.
    pub fn vector(&self) -> Option<Vec<f32>> {
        self.embedding
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub async fn insert_document(
    pool: &PgPool,
    result: &ExtractionResult,
    locale: Option<&str>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO cv_documents
            (id, raw_text, extracted_length, parse_method, confidence, trace_id, warning, locale)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(&result.text)
    .bind(result.extracted_length as i32)
    .bind(result.method.as_str())
    .bind(result.confidence as f64)
    .bind(result.trace_id)
    .bind(result.warning.map(|w| w.as_str()))
    .bind(locale)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn insert_raw_document(pool: &PgPool, raw_text: &str, locale: Option<&str>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO cv_documents
            (id, raw_text, extracted_length, parse_method, confidence, trace_id, warning, locale)
        VALUES ($1, $2, $3, 'native_text', 1.0, $4, NULL, $5)
        "#,
    )
    .bind(id)
    .bind(raw_text)
    .bind(raw_text.len() as i32)
    .bind(Uuid::new_v4())
    .bind(locale)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn upsert_profile(pool: &PgPool, cv_id: Uuid, profile: &ParsedProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cv_profiles (cv_id, profile)
        VALUES ($1, $2)
        ON CONFLICT (cv_id) DO UPDATE SET profile = EXCLUDED.profile
        "#,
    )
    .bind(cv_id)
    .bind(serde_json::to_value(profile)?)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the profile's sections. A section whose text hash is unchanged
/// keeps its embedding; a changed hash nulls it so the worker regenerates.
/// Stale trailing sections from a previous, longer profile are removed.
pub async fn upsert_sections(
    pool: &PgPool,
    cv_id: Uuid,
    sections: &[ProfileSection],
) -> Result<Vec<CvSectionRow>> {
    let mut tx = pool.begin().await?;

    for section in sections {
        sqlx::query(
            r#"
            INSERT INTO cv_sections (id, cv_id, section_index, kind, text, text_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cv_id, section_index) DO UPDATE SET
                kind = EXCLUDED.kind,
                text = EXCLUDED.text,
                text_hash = EXCLUDED.text_hash,
                embedding = CASE
                    WHEN cv_sections.text_hash = EXCLUDED.text_hash THEN cv_sections.embedding
                    ELSE NULL
                END,
                embedded_at = CASE
                    WHEN cv_sections.text_hash = EXCLUDED.text_hash THEN cv_sections.embedded_at
                    ELSE NULL
                END
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cv_id)
        .bind(section.index)
        .bind(section.kind.as_str())
        .bind(&section.text)
        .bind(content_hash(&section.text))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM cv_sections WHERE cv_id = $1 AND section_index >= $2")
        .bind(cv_id)
        .bind(sections.len() as i32)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    fetch_sections(pool, cv_id).await
}

pub async fn fetch_sections(pool: &PgPool, cv_id: Uuid) -> Result<Vec<CvSectionRow>> {
    let rows: Vec<CvSectionRow> = sqlx::query_as(
        r#"
        SELECT id, cv_id, section_index, kind, text, text_hash, embedding, embedded_at
        FROM cv_sections WHERE cv_id = $1 ORDER BY section_index
        "#,
    )
    .bind(cv_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn fetch_section(pool: &PgPool, section_id: Uuid) -> Result<Option<CvSectionRow>> {
    let row: Option<CvSectionRow> = sqlx::query_as(
        r#"
        SELECT id, cv_id, section_index, kind, text, text_hash, embedding, embedded_at
        FROM cv_sections WHERE id = $1
        "#,
    )
    .bind(section_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn store_section_embedding(
    pool: &PgPool,
    section_id: Uuid,
    text_hash: &str,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE cv_sections
        SET embedding = $1, embedded_at = now()
        WHERE id = $2 AND text_hash = $3
        "#,
    )
    .bind(serde_json::to_value(vector)?)
    .bind(section_id)
    .bind(text_hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_document(pool: &PgPool, cv_id: Uuid) -> Result<Option<CvDocumentRow>> {
    let row: Option<CvDocumentRow> = sqlx::query_as(
        r#"
        SELECT id, raw_text, extracted_length, parse_method, confidence, trace_id,
               warning, locale, created_at
        FROM cv_documents WHERE id = $1
        "#,
    )
    .bind(cv_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn fetch_profile(pool: &PgPool, cv_id: Uuid) -> Result<Option<ParsedProfile>> {
    let row: Option<(Value,)> = sqlx::query_as("SELECT profile FROM cv_profiles WHERE cv_id = $1")
        .bind(cv_id)
        .fetch_optional(pool)
        .await?;
    match row {
        Some((value,)) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Candidate ids for the match fan-out, oldest first for stable paging.
pub async fn list_candidate_ids(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT cv_id FROM cv_profiles ORDER BY created_at, cv_id LIMIT $1")
            .bind(limit)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_and_text_sensitive() {
        let a = content_hash("Rust, PostgreSQL");
        let b = content_hash("Rust, PostgreSQL");
        let c = content_hash("Rust, PostgreSQL, Kafka");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_section_row_vector_round_trip() {
        let row = CvSectionRow {
            id: Uuid::new_v4(),
            cv_id: Uuid::new_v4(),
            section_index: 0,
            kind: "summary".to_string(),
            text: "x".to_string(),
            text_hash: content_hash("x"),
            embedding: Some(serde_json::json!([0.25, -0.5, 1.0])),
            embedded_at: None,
        };
        assert_eq!(row.vector().unwrap(), vec![0.25, -0.5, 1.0]);

        let empty = CvSectionRow {
            embedding: None,
            ..row
        };
        assert!(empty.vector().is_none());
    }
}
