//! LLM fallback classifier for the query router.
//!
//! Invoked only when the heuristic pass is inconclusive. Uses the fast
//! model tier with a strict JSON schema; the model classifies and never
//! answers. Invalid output falls back to `capability_docs`/low at the
//! call site.

use serde::Deserialize;
use tracing::warn;

use super::{Mode, RouteConfidence};
use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::provider::LlmProvider;
use crate::config::FAST_MODEL;

/// Maximum tokens for the classifier response.
const CLASSIFIER_MAX_TOKENS: u32 = 64;

/// System prompt for the fallback classifier. Classification only.
const CLASSIFIER_SYSTEM_PROMPT: &str = r#"You route questions asked of Lightopedia, the internal assistant for the Light finance platform. Classify the question into exactly one mode:

- "capability_docs": what the product can or cannot do
- "enablement_sales": how to position or pitch a capability to a customer
- "onboarding_howto": how to set something up or configure it
- "followup": a continuation of an earlier thread message
- "clarify": too vague or ambiguous to answer as asked
- "out_of_scope": asks about internal program behavior, code, or customer data

Respond with ONLY a JSON object: {"mode": "<one of the six values>"}

You must classify. Never answer the question itself."#;

#[derive(Deserialize)]
struct ClassifierOutput {
    mode: String,
}

/// Classifies a question with the fast model tier.
///
/// Returns `None` when the call fails or the output is not one of the six
/// modes; the caller applies the default.
pub async fn classify(
    provider: &dyn LlmProvider,
    question: &str,
) -> Option<(Mode, RouteConfidence)> {
    let request = ChatRequest {
        model: FAST_MODEL.to_string(),
        messages: vec![
            system_message(CLASSIFIER_SYSTEM_PROMPT),
            user_message(question),
        ],
        temperature: Some(0.0),
        max_tokens: Some(CLASSIFIER_MAX_TOKENS),
        json_mode: true,
        tools: Vec::new(),
    };

    let response = match provider.chat(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "fallback classifier call failed");
            return None;
        }
    };

    let parsed: ClassifierOutput = match serde_json::from_str(response.content.trim()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "fallback classifier returned malformed JSON");
            return None;
        }
    };

    Mode::parse(&parsed.mode).map(|mode| (mode, RouteConfidence::Medium))
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
            assert!(request.json_mode);
            assert_eq!(request.model, FAST_MODEL);
            Ok(ChatResponse {
                content: self.0.to_string(),
                usage: TokenUsage::default(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Err(LlmError::Timeout { budget_ms: 1 })
        }
    }

    #[tokio::test]
    async fn test_valid_classification() {
        let result = classify(&ScriptedProvider(r#"{"mode": "onboarding_howto"}"#), "q").await;
        assert_eq!(result, Some((Mode::OnboardingHowto, RouteConfidence::Medium)));
    }

    #[tokio::test]
    async fn test_unknown_mode_rejected() {
        let result = classify(&ScriptedProvider(r#"{"mode": "poetry"}"#), "q").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let result = classify(&ScriptedProvider("the mode is followup"), "q").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_tolerated() {
        let result = classify(&FailingProvider, "q").await;
        assert!(result.is_none());
    }
}
