//! Replay and telemetry types.
//!
//! Every request persists a [`QaLog`] row sufficient to reproduce its
//! routing and retrieval; synthesis may differ on replay because the
//! external models are not deterministic. The replay entry point itself
//! lives on the pipeline, which owns the router and retrieval engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Confidence, Escalation, RetrievalMeta, ThreadMessage};
use crate::guardrail::Finding;
use crate::router::RouteDecision;

/// The persistent per-request log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaLog {
    /// Opaque request id.
    pub request_id: String,
    /// Workspace/team the question came from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Channel the question came from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Thread parent timestamp, when asked inside a thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// The question text.
    pub question: String,
    /// Thread history as received, for replaying routing.
    #[serde(default)]
    pub thread_history: Vec<ThreadMessage>,
    /// The routing decision (carries mode, confidence, hints, and whether
    /// the fallback classifier ran).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteDecision>,
    /// Router program version at request time.
    pub router_version: String,
    /// Retrieval metadata (version, queries, counts, degradation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalMeta>,
    /// Top candidate similarities, best first.
    #[serde(default)]
    pub top_similarities: Vec<f64>,
    /// URLs fetched by the agentic loop.
    #[serde(default)]
    pub fetched_urls: Vec<String>,
    /// Synthesised text before the guardrail pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_text: Option<String>,
    /// Final text after the guardrail pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,
    /// Final answer confidence.
    pub confidence: Confidence,
    /// Escalation draft, if the loop filed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    /// Guardrail findings.
    #[serde(default)]
    pub guardrail_findings: Vec<Finding>,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Pipeline version at request time.
    pub pipeline_version: String,
    /// When the request ran.
    pub created_at: DateTime<Utc>,
}

impl QaLog {
    /// Creates a log row with only the identifying fields set; the
    /// pipeline fills in the rest as stages complete.
    #[must_use]
    pub fn new(request_id: &str, question: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            team_id: None,
            channel_id: None,
            thread_ts: None,
            question: question.to_string(),
            thread_history: Vec::new(),
            route: None,
            router_version: crate::router::ROUTER_VERSION.to_string(),
            retrieval: None,
            top_similarities: Vec::new(),
            fetched_urls: Vec::new(),
            draft_text: None,
            final_text: None,
            confidence: Confidence::NeedsClarification,
            escalation: None,
            guardrail_findings: Vec::new(),
            latency_ms: 0,
            pipeline_version: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// One retrieval candidate surfaced by a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayCandidate {
    /// Chunk row id.
    pub id: i64,
    /// Owning article path.
    pub path: String,
    /// Final retrieval score.
    pub score: f64,
    /// Leading content snippet.
    pub snippet: String,
}

/// The outcome of replaying a past request: routing and retrieval only,
/// no synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// The request that was replayed.
    pub request_id: String,
    /// The re-computed routing decision.
    pub route: RouteDecision,
    /// The re-computed top retrieval candidates.
    pub candidates: Vec<ReplayCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_log_defaults() {
        let log = QaLog::new("req-1", "How does billing work?");
        assert_eq!(log.request_id, "req-1");
        assert_eq!(log.confidence, Confidence::NeedsClarification);
        assert_eq!(log.router_version, crate::router::ROUTER_VERSION);
        assert!(log.route.is_none());
        assert_eq!(log.latency_ms, 0);
    }

    #[test]
    fn test_log_round_trip() {
        let mut log = QaLog::new("req-1", "q");
        log.fetched_urls = vec!["docs/a.md".to_string()];
        log.latency_ms = 1234;

        let json = serde_json::to_string(&log).unwrap_or_default();
        // Unset optionals are omitted from the payload.
        assert!(!json.contains("draft_text"));
        let back: QaLog = serde_json::from_str(&json).unwrap_or_else(|_| QaLog::new("x", "y"));
        assert_eq!(back.request_id, "req-1");
        assert_eq!(back.latency_ms, 1234);
        assert_eq!(back.fetched_urls, vec!["docs/a.md".to_string()]);
    }
}
