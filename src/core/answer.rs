//! Answer, escalation, and feedback types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How sure the pipeline is about an answer.
///
/// `Confirmed` requires at least one fetched article and a clean guardrail
/// pass; anything else is `NeedsClarification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Grounded in fetched evidence with valid citations.
    Confirmed,
    /// Evidence missing, citations invalid, or the question needs refining.
    NeedsClarification,
}

/// A cited source, numbered by first appearance in the answer text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// 1-based citation number.
    pub id: usize,
    /// Article title.
    pub title: String,
    /// Article URL or repo-relative path.
    pub url: String,
}

/// One bullet claim from the answer body with its citation references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletClaim {
    /// Claim text with citation markers removed.
    pub text: String,
    /// Citation numbers referenced by the claim.
    pub citations: Vec<usize>,
}

/// The synthesised response returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The full answer text (trimmed).
    pub summary: String,
    /// Bullet claims extracted from the text, in order.
    pub bullets: Vec<BulletClaim>,
    /// Sources in citation order.
    pub sources: Vec<Source>,
    /// Confidence after the guardrail pass.
    pub confidence: Confidence,
    /// Internal notes for operators (never shown to end users).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    /// Opaque request id, present in every user-visible failure mode.
    pub request_id: String,
    /// Escalation draft recorded during the agentic loop, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
}

/// Category of a human escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    /// A capability the platform lacks.
    FeatureRequest,
    /// Something appears broken.
    BugReport,
    /// The asker needs hands-on help.
    SupportNeeded,
    /// The docs do not cover the topic.
    DocumentationGap,
}

impl EscalationKind {
    /// Parses a kind from the model's string, defaulting to
    /// `SupportNeeded` on anything unrecognized.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "feature_request" => Self::FeatureRequest,
            "bug_report" => Self::BugReport,
            "documentation_gap" => Self::DocumentationGap,
            _ => Self::SupportNeeded,
        }
    }
}

/// A drafted escalation to a human owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    /// Short escalation title.
    pub title: String,
    /// Escalation category.
    pub request_type: EscalationKind,
    /// What the asker needs and why the bot could not resolve it.
    pub problem_statement: String,
}

/// User feedback on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLabel {
    /// The answer helped.
    Helpful,
    /// The answer did not help.
    NotHelpful,
    /// The answer needed more context to be useful.
    NeedsContext,
}

/// How the feedback arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    /// An interactive button under the answer.
    Button,
    /// An emoji reaction on the message.
    Reaction,
}

/// A feedback record tied to a past request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// Request the feedback refers to.
    pub request_id: String,
    /// The feedback label.
    pub label: FeedbackLabel,
    /// Who gave the feedback.
    pub user_id: String,
    /// When the feedback was recorded.
    pub created_at: DateTime<Utc>,
    /// Delivery channel.
    pub source: FeedbackSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_serialization() {
        let json = serde_json::to_string(&Confidence::NeedsClarification).unwrap_or_default();
        assert_eq!(json, "\"needs_clarification\"");
        let json = serde_json::to_string(&Confidence::Confirmed).unwrap_or_default();
        assert_eq!(json, "\"confirmed\"");
    }

    #[test]
    fn test_escalation_kind_parse() {
        assert_eq!(
            EscalationKind::parse("feature_request"),
            EscalationKind::FeatureRequest
        );
        assert_eq!(EscalationKind::parse("bug_report"), EscalationKind::BugReport);
        assert_eq!(
            EscalationKind::parse("documentation_gap"),
            EscalationKind::DocumentationGap
        );
        assert_eq!(
            EscalationKind::parse("anything else"),
            EscalationKind::SupportNeeded
        );
    }

    #[test]
    fn test_answer_serialization_omits_empty_options() {
        let answer = Answer {
            summary: "Light supports per-customer currencies.".to_string(),
            bullets: vec![BulletClaim {
                text: "Configurable base currencies".to_string(),
                citations: vec![1],
            }],
            sources: vec![Source {
                id: 1,
                title: "Multi-currency".to_string(),
                url: "docs/currency.md".to_string(),
            }],
            confidence: Confidence::Confirmed,
            internal_notes: None,
            request_id: "req-1".to_string(),
            escalation: None,
        };
        let json = serde_json::to_string(&answer).unwrap_or_default();
        assert!(!json.contains("internal_notes"));
        assert!(!json.contains("escalation"));
        assert!(json.contains("\"confirmed\""));
    }

    #[test]
    fn test_feedback_serialization() {
        let feedback = Feedback {
            request_id: "req-1".to_string(),
            label: FeedbackLabel::NeedsContext,
            user_id: "U123".to_string(),
            created_at: Utc::now(),
            source: FeedbackSource::Reaction,
        };
        let json = serde_json::to_string(&feedback).unwrap_or_default();
        assert!(json.contains("needs_context"));
        assert!(json.contains("reaction"));
    }
}
