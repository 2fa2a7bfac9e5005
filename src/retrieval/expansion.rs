//! LLM query expansion.
//!
//! Asks the fast model tier for a handful of short keyword queries using
//! Light's domain synonyms, so retrieval covers the vocabulary gap between
//! how users ask and how the docs are written. Failures yield no
//! expansions rather than an error.

use serde::Deserialize;
use tracing::warn;

use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::provider::LlmProvider;
use crate::config::FAST_MODEL;

/// Expansions requested per question.
const EXPANSION_COUNT: usize = 3;

/// Maximum tokens for the expansion response.
const EXPANSION_MAX_TOKENS: u32 = 150;

/// System prompt for query expansion.
const EXPANSION_SYSTEM_PROMPT: &str = r#"You expand search queries for Lightopedia, the help-article search of the Light finance platform. Given a question, produce 3 additional short keyword queries that surface relevant help articles.

Use Light's domain vocabulary and synonyms: contracts are also called bills; invoices are also receivables; payouts are also disbursements; customers are also accounts.

Respond with ONLY a JSON object: {"queries": ["...", "...", "..."]}

Each query must be 2-6 words. Do not answer the question."#;

#[derive(Deserialize)]
struct ExpansionOutput {
    queries: Vec<String>,
}

/// Expands a question into additional keyword queries.
///
/// Returns at most [`EXPANSION_COUNT`] queries; an empty vec on any
/// upstream or parse failure.
pub async fn expand(
    provider: &dyn LlmProvider,
    question: &str,
    hints: &[String],
    followup_context: Option<&str>,
) -> Vec<String> {
    let mut user = format!("Question: {question}");
    if !hints.is_empty() {
        user.push_str(&format!("\nHints: {}", hints.join(", ")));
    }
    if let Some(context) = followup_context {
        user.push_str(&format!("\nEarlier thread context:\n{context}"));
    }

    let request = ChatRequest {
        model: FAST_MODEL.to_string(),
        messages: vec![system_message(EXPANSION_SYSTEM_PROMPT), user_message(&user)],
        temperature: Some(0.3),
        max_tokens: Some(EXPANSION_MAX_TOKENS),
        json_mode: true,
        tools: Vec::new(),
    };

    let response = match provider.chat(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "query expansion failed");
            return Vec::new();
        }
    };

    match serde_json::from_str::<ExpansionOutput>(response.content.trim()) {
        Ok(output) => output
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(EXPANSION_COUNT)
            .collect(),
        Err(e) => {
            warn!(error = %e, "query expansion returned malformed JSON");
            Vec::new()
        }
    }
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

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            assert_eq!(request.model, FAST_MODEL);
            Ok(ChatResponse {
                content: self.0.to_string(),
                usage: TokenUsage::default(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn test_expansion_parsed() {
        let provider =
            ScriptedProvider(r#"{"queries": ["billing cycles", "invoice schedule", "contracts"]}"#);
        let queries = expand(&provider, "How does billing work?", &[], None).await;
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "billing cycles");
    }

    #[tokio::test]
    async fn test_expansion_capped() {
        let provider = ScriptedProvider(r#"{"queries": ["a b", "c d", "e f", "g h", "i j"]}"#);
        let queries = expand(&provider, "q", &[], None).await;
        assert_eq!(queries.len(), EXPANSION_COUNT);
    }

    #[tokio::test]
    async fn test_expansion_malformed_yields_empty() {
        let provider = ScriptedProvider("billing cycles, invoice schedule");
        let queries = expand(&provider, "q", &[], None).await;
        assert!(queries.is_empty());
    }
}
