//! Query router: classifies a question into an answering mode and
//! extracts retrieval hints.
//!
//! Routing is heuristic-first with an LLM fallback classifier; it never
//! fails. Every request logs [`ROUTER_VERSION`]; changing routing behavior
//! requires a version bump, new golden-case coverage, and a canary
//! rollout.

mod classifier;
mod heuristics;
mod hints;

pub use hints::extract_hints;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::provider::LlmProvider;
use crate::core::{ChannelKind, ThreadMessage, ThreadRole};

/// Router program version, recorded on every request.
pub const ROUTER_VERSION: &str = "router.v1.0";

/// Questions shorter than this with thread history are follow-up
/// candidates.
pub const SHORT_FOLLOWUP_MAX_CHARS: usize = 30;

/// Questions shorter than this are sent to clarification outright.
pub const CLARIFY_MIN_CHARS: usize = 15;

/// Answering mode for a routed question. Fixed and exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// What the product can or cannot do, answered from docs.
    CapabilityDocs,
    /// Sales-enablement phrasing of a capability answer.
    EnablementSales,
    /// Step-by-step setup and configuration guidance.
    OnboardingHowto,
    /// Continuation of an existing thread.
    Followup,
    /// The question needs refining before it can be answered.
    Clarify,
    /// Deep program-behavior questions the docs cannot ground.
    OutOfScope,
}

impl Mode {
    /// Parses a mode from its wire string; `None` for anything outside
    /// the fixed set.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "capability_docs" => Some(Self::CapabilityDocs),
            "enablement_sales" => Some(Self::EnablementSales),
            "onboarding_howto" => Some(Self::OnboardingHowto),
            "followup" => Some(Self::Followup),
            "clarify" => Some(Self::Clarify),
            "out_of_scope" => Some(Self::OutOfScope),
            _ => None,
        }
    }

    /// Wire string for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CapabilityDocs => "capability_docs",
            Self::EnablementSales => "enablement_sales",
            Self::OnboardingHowto => "onboarding_howto",
            Self::Followup => "followup",
            Self::Clarify => "clarify",
            Self::OutOfScope => "out_of_scope",
        }
    }
}

/// How sure the router is about its mode choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteConfidence {
    /// Weak or tied heuristic signal.
    Low,
    /// Clear winner with a small margin.
    Medium,
    /// Dominant signal.
    High,
}

/// The routing decision for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Chosen answering mode.
    pub mode: Mode,
    /// Confidence in the choice.
    pub confidence: RouteConfidence,
    /// Retrieval hints extracted from the question.
    pub query_hints: Vec<String>,
    /// What is missing when the mode is [`Mode::Clarify`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_info: Vec<String>,
    /// Prior thread context carried into retrieval for follow-ups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followup_context: Option<String>,
    /// Whether the LLM fallback classifier decided the mode.
    #[serde(default)]
    pub fallback_used: bool,
}

/// Everything the router looks at for one question.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    /// Question text, mention prefix stripped.
    pub question: &'a str,
    /// Kind of channel the question arrived in.
    pub channel_kind: ChannelKind,
    /// Prior thread messages, oldest first.
    pub thread_history: &'a [ThreadMessage],
    /// Hint terms derived from attachments by the caller.
    pub attachment_hints: &'a [String],
}

/// The query router.
pub struct Router {
    provider: Arc<dyn LlmProvider>,
}

impl Router {
    /// Creates a router using the given provider for the fallback
    /// classifier.
    #[must_use]
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Routes a question. Never fails; uncertain inputs fall back to the
    /// model classifier and ultimately to `capability_docs` with low
    /// confidence.
    pub async fn route(&self, request: &RouteRequest<'_>) -> RouteDecision {
        let question = request.question.trim();
        let query_hints = hints::extract_hints(question, request.attachment_hints);

        // Out-of-scope signals override everything else.
        if heuristics::out_of_scope_signals(question) >= 2 {
            debug!(mode = "out_of_scope", "router: behavior question detected");
            return RouteDecision {
                mode: Mode::OutOfScope,
                confidence: RouteConfidence::High,
                query_hints,
                missing_info: Vec::new(),
                followup_context: None,
                fallback_used: false,
            };
        }

        debug!(
            channel = ?request.channel_kind,
            history = request.thread_history.len(),
            "routing question"
        );

        // Short continuation of an existing conversation.
        if question.chars().count() < SHORT_FOLLOWUP_MAX_CHARS
            && !request.thread_history.is_empty()
            && heuristics::is_short_followup(question)
        {
            return RouteDecision {
                mode: Mode::Followup,
                confidence: RouteConfidence::High,
                query_hints,
                missing_info: Vec::new(),
                followup_context: followup_context(request.thread_history),
                fallback_used: false,
            };
        }

        // Ambiguity gate.
        if let Some(missing) = heuristics::ambiguity(question) {
            return RouteDecision {
                mode: Mode::Clarify,
                confidence: RouteConfidence::High,
                query_hints,
                missing_info: missing,
                followup_context: None,
                fallback_used: false,
            };
        }

        // Pronouns are detected here; resolution happens in the agentic
        // loop via carried thread context.
        let needs_context = hints::has_unresolved_pronoun(question)
            && !request.thread_history.is_empty();

        // Scored pattern tables.
        if let Some((mode, confidence)) = heuristics::best_mode(question) {
            if confidence > RouteConfidence::Low {
                let followup_context = (mode == Mode::Followup || needs_context)
                    .then(|| followup_context(request.thread_history))
                    .flatten();
                return RouteDecision {
                    mode,
                    confidence,
                    query_hints,
                    missing_info: Vec::new(),
                    followup_context,
                    fallback_used: false,
                };
            }
        }

        // Heuristics were inconclusive: ask the fast classifier.
        let (mode, confidence) = classifier::classify(self.provider.as_ref(), question)
            .await
            .unwrap_or((Mode::CapabilityDocs, RouteConfidence::Low));
        debug!(mode = mode.as_str(), "router: fallback classifier used");

        RouteDecision {
            mode,
            confidence,
            query_hints,
            missing_info: Vec::new(),
            followup_context: (mode == Mode::Followup || needs_context)
                .then(|| followup_context(request.thread_history))
                .flatten(),
            fallback_used: true,
        }
    }
}

/// Builds follow-up context from the tail of the thread: the last
/// assistant reply and the last user question.
fn followup_context(history: &[ThreadMessage]) -> Option<String> {
    let last_user = history
        .iter()
        .rev()
        .find(|m| m.role == ThreadRole::User)
        .map(|m| m.text.as_str());
    let last_assistant = history
        .iter()
        .rev()
        .find(|m| m.role == ThreadRole::Assistant)
        .map(|m| m.text.as_str());

    match (last_user, last_assistant) {
        (None, None) => None,
        (user, assistant) => Some(
            [user, assistant]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join("\n"),
        ),
    }
}
