//! LLM reranking of retrieval candidates.
//!
//! Scores each top candidate's relevance to the question on a 1–10 scale.
//! A reranker failure is not an error; the caller keeps the
//! vector+keyword ordering.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::provider::LlmProvider;
use crate::config::FAST_MODEL;

/// Characters of each candidate shown to the reranker.
const SNIPPET_CHARS: usize = 300;

/// Maximum tokens for the rerank response.
const RERANK_MAX_TOKENS: u32 = 300;

/// System prompt for the reranker.
const RERANK_SYSTEM_PROMPT: &str = r#"You rank help-article excerpts by how well they answer a question about the Light finance platform.

Score every numbered excerpt from 1 (irrelevant) to 10 (directly answers the question).

Respond with ONLY a JSON object: {"scores": [{"n": 1, "score": 7}, ...]} with one entry per excerpt. Do not answer the question."#;

#[derive(Deserialize)]
struct RerankOutput {
    scores: Vec<RerankEntry>,
}

#[derive(Deserialize)]
struct RerankEntry {
    n: usize,
    score: f64,
}

/// Scores candidates against the question.
///
/// `candidates` pairs chunk ids with their content. Returns a map of
/// chunk id → clamped 1–10 score, or `None` on any failure (the caller
/// skips reranking).
pub async fn rerank(
    provider: &dyn LlmProvider,
    question: &str,
    candidates: &[(i64, &str)],
) -> Option<HashMap<i64, f64>> {
    if candidates.is_empty() {
        return None;
    }

    let mut user = format!("Question: {question}\n\nExcerpts:\n");
    for (position, (_, content)) in candidates.iter().enumerate() {
        let snippet: String = content.chars().take(SNIPPET_CHARS).collect();
        user.push_str(&format!("[{}] {snippet}\n\n", position + 1));
    }

    let request = ChatRequest {
        model: FAST_MODEL.to_string(),
        messages: vec![system_message(RERANK_SYSTEM_PROMPT), user_message(&user)],
        temperature: Some(0.0),
        max_tokens: Some(RERANK_MAX_TOKENS),
        json_mode: true,
        tools: Vec::new(),
    };

    let response = match provider.chat(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "rerank call failed; keeping hybrid ordering");
            return None;
        }
    };

    let output: RerankOutput = match serde_json::from_str(response.content.trim()) {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "rerank returned malformed JSON; keeping hybrid ordering");
            return None;
        }
    };

    let mut scores = HashMap::new();
    for entry in output.scores {
        if entry.n == 0 {
            continue;
        }
        if let Some(&(id, _)) = candidates.get(entry.n - 1) {
            scores.insert(id, entry.score.clamp(1.0, 10.0));
        }
    }

    if scores.is_empty() { None } else { Some(scores) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatResponse, TokenUsage};
    use crate::error::LlmError;
    use async_trait::async_trait;

    struct ScriptedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                usage: TokenUsage::default(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_rerank_maps_positions_to_ids() {
        let provider =
            ScriptedProvider(r#"{"scores": [{"n": 1, "score": 9}, {"n": 2, "score": 3}]}"#);
        let scores = rerank(&provider, "q", &[(42, "currency content"), (7, "other")])
            .await
            .unwrap_or_default();
        assert!((scores.get(&42).copied().unwrap_or(0.0) - 9.0).abs() < 1e-9);
        assert!((scores.get(&7).copied().unwrap_or(0.0) - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerank_clamps_scores() {
        let provider = ScriptedProvider(r#"{"scores": [{"n": 1, "score": 99}]}"#);
        let scores = rerank(&provider, "q", &[(1, "x")]).await.unwrap_or_default();
        assert!((scores.get(&1).copied().unwrap_or(0.0) - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rerank_out_of_range_positions_ignored() {
        let provider = ScriptedProvider(r#"{"scores": [{"n": 0, "score": 5}, {"n": 9, "score": 5}]}"#);
        let scores = rerank(&provider, "q", &[(1, "x")]).await;
        assert!(scores.is_none());
    }

    #[tokio::test]
    async fn test_rerank_malformed_is_none() {
        let provider = ScriptedProvider("not json");
        assert!(rerank(&provider, "q", &[(1, "x")]).await.is_none());
    }

    #[tokio::test]
    async fn test_rerank_empty_candidates() {
        let provider = ScriptedProvider("{}");
        assert!(rerank(&provider, "q", &[]).await.is_none());
    }
}
