//! Chunk types: chunker output and persisted chunk metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of a stored chunk. Help articles are currently the only source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// A markdown help article from an allowlisted repository.
    Article,
}

/// A chunk produced by the markdown chunker, before persistence.
///
/// Ordinals are 0-based, dense, and strictly increasing within one
/// article. The title is the article's first level-1 heading, attached to
/// every chunk; the section heading is the nearest level-1–3 heading
/// covering the chunk's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleChunk {
    /// Chunk text.
    pub content: String,
    /// 0-based position within the article.
    pub ordinal: usize,
    /// Nearest covering heading, if the span falls under one.
    pub section_heading: Option<String>,
    /// Article title (first level-1 heading in the document).
    pub title: Option<String>,
    /// Repo-relative file path (owner/repo prefix stripped).
    pub path: String,
}

/// Metadata persisted with every chunk row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin of the chunk.
    pub source_type: SourceType,
    /// Owning repository slug (`owner/name`).
    pub repo_slug: String,
    /// Repo-relative file path.
    pub path: String,
    /// Article title, when the document has a level-1 heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Section heading covering this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_heading: Option<String>,
    /// Revision the article was fetched at.
    pub commit_sha: String,
    /// When the chunk was written.
    pub indexed_at: DateTime<Utc>,
    /// Indexing run that wrote the chunk (bulk-purge key).
    pub index_run_id: String,
    /// Retrieval program version active when the chunk was written.
    pub retrieval_program_version: String,
}

/// One row returned by the store's `match_docs` similarity search.
#[derive(Debug, Clone)]
pub struct DocMatch {
    /// Chunk row id.
    pub id: i64,
    /// Chunk text.
    pub content: String,
    /// Persisted chunk metadata.
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query vector (`1 − distance`).
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_serialization() {
        let json = serde_json::to_string(&SourceType::Article).unwrap_or_default();
        assert_eq!(json, "\"article\"");
    }

    #[test]
    fn test_chunk_metadata_round_trip() {
        let meta = ChunkMetadata {
            source_type: SourceType::Article,
            repo_slug: "light-platform/help-center".to_string(),
            path: "docs/currency.md".to_string(),
            title: Some("Multi-currency".to_string()),
            section_heading: None,
            commit_sha: "abc123".to_string(),
            indexed_at: Utc::now(),
            index_run_id: "run-1".to_string(),
            retrieval_program_version: "retrieval.v1.0".to_string(),
        };
        let json = serde_json::to_string(&meta).unwrap_or_default();
        assert!(json.contains("docs/currency.md"));
        // section_heading is None and must be omitted
        assert!(!json.contains("section_heading"));

        let back: ChunkMetadata = serde_json::from_str(&json).unwrap_or_else(|_| meta.clone());
        assert_eq!(back.repo_slug, meta.repo_slug);
        assert_eq!(back.index_run_id, meta.index_run_id);
    }
}
