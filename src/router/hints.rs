//! Query-hint extraction.
//!
//! Pulls retrieval hints out of a question: quoted phrases,
//! identifier-case tokens, and known domain terms. Pronouns are detected
//! but resolved later, in the agentic loop's thread-history context.

use std::sync::LazyLock;

use regex::Regex;

/// Domain terms that are strong retrieval signals on their own.
const DOMAIN_TERMS: &[&str] = &[
    "invoice",
    "invoicing",
    "contract",
    "bill",
    "billing",
    "salesforce",
    "stripe",
    "netsuite",
    "quickbooks",
    "xero",
    "payout",
    "reconciliation",
    "currency",
    "vat",
    "tax",
    "ledger",
    "statement",
    "expense",
    "vendor",
    "purchase order",
    "accounting",
    "erp",
    "audit",
    "approval",
];

/// Unresolved pronouns that suggest missing thread context.
const PRONOUNS: &[&str] = &["it", "that", "this", "they", "those", "these"];

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).unwrap_or_else(|_| unreachable!()));

static CAMEL_CASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]+)+\b").unwrap_or_else(|_| unreachable!())
});

static SNAKE_CASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-z0-9]+(?:_[a-z0-9]+)+\b").unwrap_or_else(|_| unreachable!())
});

/// Extracts retrieval hints from a question, deduplicated in first-seen
/// order, with caller-supplied attachment hints appended.
#[must_use]
pub fn extract_hints(question: &str, attachment_hints: &[String]) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    let mut push = |hint: String| {
        if !hint.is_empty() && !hints.contains(&hint) {
            hints.push(hint);
        }
    };

    for caps in QUOTED_RE.captures_iter(question) {
        if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            push(m.as_str().trim().to_string());
        }
    }

    for m in CAMEL_CASE_RE.find_iter(question) {
        push(m.as_str().to_string());
    }
    for m in SNAKE_CASE_RE.find_iter(question) {
        push(m.as_str().to_string());
    }

    let lower = question.to_lowercase();
    for term in DOMAIN_TERMS {
        if lower.contains(term) {
            push((*term).to_string());
        }
    }

    for hint in attachment_hints {
        push(hint.trim().to_string());
    }

    hints
}

/// Returns `true` when the question leans on an unresolved pronoun.
#[must_use]
pub fn has_unresolved_pronoun(question: &str) -> bool {
    let lower = question.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| PRONOUNS.contains(&word))
}
