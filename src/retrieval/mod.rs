//! Hybrid retrieval engine.
//!
//! Multi-query expansion, parallel vector and keyword search under per-RPC
//! timeouts, weighted merge, a keyword-only degraded mode, and an LLM
//! rerank. Retrieval never fails: any combination of upstream failures
//! degrades to a smaller (possibly empty) non-confident pack.

mod expansion;
mod rerank;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::provider::LlmProvider;
use crate::core::{DocMatch, EvidencePack, RankedChunk, RetrievalMeta};
use crate::embedding::Embedder;
use crate::error::StoreError;
use crate::router::RouteDecision;
use crate::store::{ArticleStore, STORE_RPC_TIMEOUT_MS, SharedStore};

/// Retrieval program version, recorded on every request and chunk.
pub const RETRIEVAL_VERSION: &str = "retrieval.v1.0";

/// Maximum queries per request (original question included).
pub const MAX_QUERIES: usize = 7;

/// Minimum combined score a candidate must reach to survive.
pub const MIN_SIMILARITY: f64 = 0.42;

/// Top-k per vector RPC.
const K_VEC: usize = 8;
/// Top-k per keyword search.
const K_KW: usize = 8;
/// Evidence chunks kept after the final sort.
const MAX_EVIDENCE_CHUNKS: usize = 8;
/// Weight of the vector score in the combined score.
const VECTOR_WEIGHT: f64 = 0.7;
/// Weight of the keyword score in the combined score.
const KEYWORD_WEIGHT: f64 = 0.3;
/// Flat boost for candidates containing enough question terms.
const KEYWORD_BOOST: f64 = 0.05;
/// Question terms a chunk must contain to earn the boost.
const KEYWORD_BOOST_MIN_TERMS: usize = 2;
/// Weight of the rerank score in the final score.
const RERANK_WEIGHT: f64 = 0.4;
/// Candidates handed to the reranker.
const RERANK_CANDIDATES: usize = 10;
/// Minimum average rerank score for a confident pack.
const MIN_RERANK_SCORE: f64 = 4.0;
/// Minimum total evidence tokens for a confident pack.
const MIN_EVIDENCE_TOKENS: usize = 100;

/// Per-RPC budget for store calls.
const RPC_TIMEOUT: Duration = Duration::from_millis(STORE_RPC_TIMEOUT_MS);

/// The hybrid retrieval engine.
pub struct RetrievalEngine {
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    provider: Arc<dyn LlmProvider>,
}

impl RetrievalEngine {
    /// Creates a retrieval engine over shared clients.
    #[must_use]
    pub fn new(
        store: SharedStore,
        embedder: Arc<dyn Embedder>,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            provider,
        }
    }

    /// Retrieves evidence for a routed question.
    ///
    /// Never returns an error; failures degrade the pack and are counted
    /// in its metadata.
    pub async fn retrieve(
        &self,
        question: &str,
        route: &RouteDecision,
        attachment_summaries: Vec<String>,
        cancel: &CancellationToken,
    ) -> EvidencePack {
        // Step 1: query expansion (original question always first).
        let queries = if cancel.is_cancelled() {
            vec![question.to_string()]
        } else {
            self.build_queries(question, route).await
        };

        if cancel.is_cancelled() {
            return EvidencePack::empty(RETRIEVAL_VERSION, queries);
        }

        // Step 2: embed every query in one batch.
        let embeddings = match self.embedder.embed_batch(&queries).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                warn!(error = %e, "query embedding failed; vector path degraded");
                Vec::new()
            }
        };

        // Steps 2–3: parallel vector and keyword fanout.
        let vector_futures = embeddings
            .into_iter()
            .map(|embedding| vector_rpc(Arc::clone(&self.store), embedding));
        let keyword_futures = queries
            .iter()
            .map(|query| keyword_rpc(Arc::clone(&self.store), query.clone()));
        let (vector_results, keyword_results) =
            tokio::join!(join_all(vector_futures), join_all(keyword_futures));

        let mut timed_out = 0_usize;
        let mut failed = 0_usize;
        let mut vector_hits: Vec<DocMatch> = Vec::new();
        let vector_attempts = vector_results.len();
        for result in vector_results {
            match result {
                Ok(hits) => vector_hits.extend(hits),
                Err(StoreError::Timeout { .. }) => timed_out += 1,
                Err(e) => {
                    warn!(error = %e, "vector RPC failed");
                    failed += 1;
                }
            }
        }
        // An embedding failure degrades every query's vector path.
        if vector_attempts == 0 {
            failed += queries.len();
        }

        let mut keyword_hits: Vec<DocMatch> = Vec::new();
        for result in keyword_results {
            match result {
                Ok(hits) => keyword_hits.extend(hits),
                Err(e) => warn!(error = %e, "keyword search failed"),
            }
        }

        // Step 5: degraded mode when the whole vector path was lost.
        let degraded = vector_hits.is_empty() && (timed_out + failed) >= queries.len().max(1);

        // Step 4: merge by chunk id, best scores win.
        let mut candidates = merge(vector_hits, keyword_hits, degraded);
        let candidates_examined = candidates.len();

        // Step 6: minimum-similarity filter.
        candidates.retain(|c| c.combined_score >= MIN_SIMILARITY);

        // Step 7: keyword boost, bounded so the total stays ≤ 1.0.
        let question_terms = significant_terms(question);
        for candidate in &mut candidates {
            let content = candidate.content.to_lowercase();
            let present = question_terms
                .iter()
                .filter(|t| content.contains(*t))
                .count();
            if present >= KEYWORD_BOOST_MIN_TERMS {
                candidate.combined_score = (candidate.combined_score + KEYWORD_BOOST).min(1.0);
            }
        }

        candidates.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Step 8: LLM rerank over the top candidates; failure skips it.
        if !candidates.is_empty() && !cancel.is_cancelled() {
            let top: Vec<(i64, &str)> = candidates
                .iter()
                .take(RERANK_CANDIDATES)
                .map(|c| (c.id, c.content.as_str()))
                .collect();
            if let Some(scores) = rerank::rerank(self.provider.as_ref(), question, &top).await {
                for candidate in &mut candidates {
                    if let Some(&score) = scores.get(&candidate.id) {
                        candidate.rerank_score = Some(score);
                        candidate.final_score = candidate
                            .combined_score
                            .mul_add(1.0 - RERANK_WEIGHT, (score / 10.0) * RERANK_WEIGHT);
                    }
                }
                candidates.sort_by(|a, b| {
                    b.final_score
                        .partial_cmp(&a.final_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }

        candidates.truncate(MAX_EVIDENCE_CHUNKS);

        // Step 9: pack confidence.
        let confident = pack_confident(&candidates);
        debug!(
            candidates = candidates.len(),
            examined = candidates_examined,
            timed_out,
            failed,
            degraded,
            confident,
            "retrieval complete"
        );

        EvidencePack {
            chunks: candidates,
            meta: RetrievalMeta {
                version: RETRIEVAL_VERSION.to_string(),
                queries,
                candidates_examined,
                timed_out,
                failed,
                degraded,
            },
            attachment_summaries,
            confident,
        }
    }

    /// Builds the query list: the question, model expansions, then hints,
    /// deduplicated and capped at [`MAX_QUERIES`].
    async fn build_queries(&self, question: &str, route: &RouteDecision) -> Vec<String> {
        let mut queries = vec![question.to_string()];

        let expansions = expansion::expand(
            self.provider.as_ref(),
            question,
            &route.query_hints,
            route.followup_context.as_deref(),
        )
        .await;
        for query in expansions {
            push_unique(&mut queries, query);
        }
        for hint in &route.query_hints {
            push_unique(&mut queries, hint.clone());
        }

        queries.truncate(MAX_QUERIES);
        queries
    }
}

/// One vector RPC with its own timeout budget.
async fn vector_rpc(store: SharedStore, embedding: Vec<f64>) -> Result<Vec<DocMatch>, StoreError> {
    let handle = tokio::task::spawn_blocking(move || {
        let guard = store
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))?;
        guard.match_docs(&embedding, K_VEC)
    });

    match tokio::time::timeout(RPC_TIMEOUT, handle).await {
        Err(_) => Err(StoreError::Timeout {
            budget_ms: STORE_RPC_TIMEOUT_MS,
        }),
        Ok(Err(join)) => Err(StoreError::Database(join.to_string())),
        Ok(Ok(result)) => result,
    }
}

/// One keyword RPC with its own timeout budget.
async fn keyword_rpc(store: SharedStore, query: String) -> Result<Vec<DocMatch>, StoreError> {
    let handle = tokio::task::spawn_blocking(move || {
        let guard = store
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))?;
        guard.keyword_search(&query, K_KW)
    });

    match tokio::time::timeout(RPC_TIMEOUT, handle).await {
        Err(_) => Err(StoreError::Timeout {
            budget_ms: STORE_RPC_TIMEOUT_MS,
        }),
        Ok(Err(join)) => Err(StoreError::Database(join.to_string())),
        Ok(Ok(result)) => result,
    }
}

/// Unions vector and keyword hits by chunk id, keeping the best score
/// from each path, and computes the combined score.
fn merge(vector_hits: Vec<DocMatch>, keyword_hits: Vec<DocMatch>, degraded: bool) -> Vec<RankedChunk> {
    let mut by_id: HashMap<i64, RankedChunk> = HashMap::new();

    for hit in vector_hits {
        let entry = by_id.entry(hit.id).or_insert_with(|| RankedChunk {
            id: hit.id,
            content: hit.content.clone(),
            metadata: hit.metadata.clone(),
            vector_score: 0.0,
            keyword_score: 0.0,
            combined_score: 0.0,
            rerank_score: None,
            final_score: 0.0,
        });
        entry.vector_score = entry.vector_score.max(hit.similarity);
    }

    for hit in keyword_hits {
        let entry = by_id.entry(hit.id).or_insert_with(|| RankedChunk {
            id: hit.id,
            content: hit.content.clone(),
            metadata: hit.metadata.clone(),
            vector_score: 0.0,
            keyword_score: 0.0,
            combined_score: 0.0,
            rerank_score: None,
            final_score: 0.0,
        });
        entry.keyword_score = entry.keyword_score.max(hit.similarity);
    }

    let mut merged: Vec<RankedChunk> = by_id.into_values().collect();
    for candidate in &mut merged {
        candidate.combined_score = if degraded {
            // Promote keyword-only results above the similarity floor so
            // the downstream filter keeps them, preserving their order.
            (1.0 - MIN_SIMILARITY).mul_add(candidate.keyword_score.clamp(0.0, 1.0), MIN_SIMILARITY)
        } else {
            VECTOR_WEIGHT.mul_add(
                candidate.vector_score,
                KEYWORD_WEIGHT * candidate.keyword_score,
            )
        };
        candidate.final_score = candidate.combined_score;
    }
    merged
}

/// Lowercased question terms significant enough to count for the boost.
fn significant_terms(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 4)
        .map(ToString::to_string)
        .collect()
}

/// Rough token estimate for confidence thresholds (~4 chars per token).
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// A pack is confident iff it has chunks, enough total text, a high
/// enough average combined score, and (when reranking ran) a high enough
/// average rerank score.
fn pack_confident(chunks: &[RankedChunk]) -> bool {
    if chunks.is_empty() {
        return false;
    }

    let total_tokens: usize = chunks.iter().map(|c| estimate_tokens(&c.content)).sum();
    if total_tokens < MIN_EVIDENCE_TOKENS {
        return false;
    }

    let count = chunks.len() as f64;
    let avg_combined: f64 = chunks.iter().map(|c| c.combined_score).sum::<f64>() / count;
    if avg_combined < MIN_SIMILARITY {
        return false;
    }

    let rerank_scores: Vec<f64> = chunks.iter().filter_map(|c| c.rerank_score).collect();
    if !rerank_scores.is_empty() {
        let avg_rerank = rerank_scores.iter().sum::<f64>() / rerank_scores.len() as f64;
        if avg_rerank < MIN_RERANK_SCORE {
            return false;
        }
    }

    true
}

/// Appends a query if it is non-empty and not already present.
fn push_unique(queries: &mut Vec<String>, query: String) {
    let trimmed = query.trim().to_string();
    if !trimmed.is_empty() && !queries.iter().any(|q| q.eq_ignore_ascii_case(&trimmed)) {
        queries.push(trimmed);
    }
}
