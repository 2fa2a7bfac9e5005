//! Per-request retrieval evidence types.
//!
//! An [`EvidencePack`] lives only for the duration of one request but is
//! logged in full for replay.

use serde::{Deserialize, Serialize};

use super::chunk::ChunkMetadata;

/// Retrieval metadata recorded with every request for replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMeta {
    /// Retrieval program version.
    pub version: String,
    /// Queries actually executed (original question first).
    pub queries: Vec<String>,
    /// Total candidates examined before filtering.
    pub candidates_examined: usize,
    /// Vector RPCs that exceeded their per-call budget.
    pub timed_out: usize,
    /// Vector RPCs that failed outright.
    pub failed: usize,
    /// Whether the pack was produced in keyword-only degraded mode.
    pub degraded: bool,
}

/// One ranked evidence candidate.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    /// Chunk row id.
    pub id: i64,
    /// Chunk text.
    pub content: String,
    /// Persisted chunk metadata.
    pub metadata: ChunkMetadata,
    /// Best vector similarity across all queries (0 when keyword-only).
    pub vector_score: f64,
    /// Normalized keyword score (0 when vector-only).
    pub keyword_score: f64,
    /// Weighted vector/keyword combination, possibly keyword-boosted.
    pub combined_score: f64,
    /// Reranker relevance on a 1–10 scale, when reranking ran.
    pub rerank_score: Option<f64>,
    /// Final ordering score.
    pub final_score: f64,
}

/// The evidence a single request's synthesis may draw from.
#[derive(Debug, Clone)]
pub struct EvidencePack {
    /// Ranked candidates, best first.
    pub chunks: Vec<RankedChunk>,
    /// Retrieval metadata for the request log.
    pub meta: RetrievalMeta,
    /// Abstracted text from user-uploaded files.
    pub attachment_summaries: Vec<String>,
    /// Whether the pack clears the confidence thresholds.
    pub confident: bool,
}

impl EvidencePack {
    /// An empty, non-confident pack (retrieval never fails; it degrades
    /// to this).
    #[must_use]
    pub fn empty(version: &str, queries: Vec<String>) -> Self {
        Self {
            chunks: Vec::new(),
            meta: RetrievalMeta {
                version: version.to_string(),
                queries,
                candidates_examined: 0,
                timed_out: 0,
                failed: 0,
                degraded: false,
            },
            attachment_summaries: Vec::new(),
            confident: false,
        }
    }
}

/// An article returned by `fetch_articles` or `search_articles` during the
/// agentic loop. Only fetched articles may be cited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedArticle {
    /// Canonical article URL (or repo-relative path for store-backed hits).
    pub url: String,
    /// Article title, falling back to the path when untitled.
    pub title: String,
    /// Full article content.
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pack() {
        let pack = EvidencePack::empty("retrieval.v1.0", vec!["q".to_string()]);
        assert!(pack.chunks.is_empty());
        assert!(!pack.confident);
        assert_eq!(pack.meta.queries, vec!["q".to_string()]);
        assert_eq!(pack.meta.candidates_examined, 0);
    }

    #[test]
    fn test_fetched_article_serialization() {
        let article = FetchedArticle {
            url: "docs/currency.md".to_string(),
            title: "Multi-currency".to_string(),
            content: "Light supports…".to_string(),
        };
        let json = serde_json::to_string(&article).unwrap_or_default();
        assert!(json.contains("docs/currency.md"));
    }
}
