//! Two-phase agentic loop.
//!
//! Phase one drives the model ↔ tool round-trip to gather evidence; phase
//! two requests a clean synthesis over a fresh message sequence so the
//! model answers from the fetched articles, not from its tool-call
//! history. This also bounds token cost.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor::{LoopState, ToolExecutor};
use super::message::{ChatRequest, assistant_tool_calls_message, system_message, tool_message, user_message};
use super::prompt;
use super::provider::LlmProvider;
use super::tool::evidence_tools;
use crate::config::COMPLETION_MODEL;
use crate::core::{Attachment, ThreadMessage};
use crate::error::Error;

/// Hard cap on model ↔ tool round-trips.
pub const MAX_TOOL_ITERATIONS: usize = 5;

/// Sampling temperature for both phases.
pub const LOOP_TEMPERATURE: f32 = 0.3;

/// Token budget per completion.
const LOOP_MAX_TOKENS: u32 = 1_600;

/// The loop's inputs beyond the question itself.
#[derive(Debug, Default)]
pub struct LoopInput<'a> {
    /// Prior thread messages, oldest first.
    pub thread_history: &'a [ThreadMessage],
    /// Uploaded files, abstracted to text.
    pub attachments: &'a [Attachment],
    /// Optional asker context for the system prompt.
    pub user_context: Option<&'a str>,
}

/// What the loop produced.
#[derive(Debug)]
pub struct LoopOutcome {
    /// Draft answer text (pre-guardrail).
    pub draft: String,
    /// Final loop state: fetched articles and any escalation.
    pub state: LoopState,
    /// Tool iterations actually used.
    pub iterations: usize,
}

/// Runs the two-phase loop.
///
/// Exhausting the iteration cap is normal termination, not an error. Tool
/// failures are rendered as tool-message content so the model can react.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] when the caller cancels, or an
/// [`Error::Llm`] when a completion call itself fails.
pub async fn run(
    provider: &dyn LlmProvider,
    executor: &ToolExecutor,
    question: &str,
    input: &LoopInput<'_>,
    cancel: &CancellationToken,
) -> Result<LoopOutcome, Error> {
    let mut state = LoopState::new();
    let mut messages = vec![
        system_message(&prompt::tool_system_prompt(
            input.user_context,
            input.thread_history,
        )),
        user_message(&prompt::tool_user_message(question, input.attachments)),
    ];

    let mut last_assistant_text = String::new();
    let mut iterations = 0_usize;

    // Phase 1: evidence-gathering tool loop.
    loop {
        if iterations == MAX_TOOL_ITERATIONS {
            debug!(iterations, "tool loop reached iteration cap");
            break;
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let request = ChatRequest {
            model: COMPLETION_MODEL.to_string(),
            messages: messages.clone(),
            temperature: Some(LOOP_TEMPERATURE),
            max_tokens: Some(LOOP_MAX_TOKENS),
            json_mode: false,
            tools: evidence_tools(),
        };
        let response = provider.chat(&request).await.map_err(Error::Llm)?;
        iterations += 1;

        if response.tool_calls.is_empty() {
            last_assistant_text = response.content;
            debug!(iterations, "tool loop ended with a text response");
            break;
        }

        debug!(
            iterations,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );
        messages.push(assistant_tool_calls_message(response.tool_calls.clone()));
        for call in &response.tool_calls {
            let result = executor.execute(call, &mut state).await;
            messages.push(tool_message(&result.tool_call_id, &result.content));
        }
    }

    // Phase 2: clean synthesis.
    let draft = if !state.fetched_articles.is_empty() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let synthesis = prompt::synthesis_messages(
            question,
            input.thread_history,
            &state.fetched_articles,
        );
        let request = ChatRequest {
            model: COMPLETION_MODEL.to_string(),
            messages: synthesis,
            temperature: Some(LOOP_TEMPERATURE),
            max_tokens: Some(LOOP_MAX_TOKENS),
            json_mode: false,
            tools: Vec::new(),
        };
        provider.chat(&request).await.map_err(Error::Llm)?.content
    } else if state.escalation.is_some() {
        // An escalation was drafted but nothing was fetched: the last
        // assistant message stands as the answer.
        last_assistant_text
    } else {
        // No evidence and no escalation: always re-ask without tools.
        // Text produced while the tool catalog was still attached may
        // hedge or offer tool calls, so it never stands as the answer.
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        final_completion(provider, &messages).await?
    };

    Ok(LoopOutcome {
        draft,
        state,
        iterations,
    })
}

/// One final no-tools completion over the phase-one messages as-is, for
/// loops that fetched no evidence and drafted no escalation.
async fn final_completion(
    provider: &dyn LlmProvider,
    messages: &[super::message::ChatMessage],
) -> Result<String, Error> {
    let request = ChatRequest {
        model: COMPLETION_MODEL.to_string(),
        messages: messages.to_vec(),
        temperature: Some(LOOP_TEMPERATURE),
        max_tokens: Some(LOOP_MAX_TOKENS),
        json_mode: false,
        tools: Vec::new(),
    };
    Ok(provider.chat(&request).await.map_err(Error::Llm)?.content)
}
