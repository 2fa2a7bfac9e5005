//! Guardrail pass: markdown normalisation, forbidden-phrase scrubbing,
//! and the citation gate.
//!
//! Three sequential scrubs over the synthesised draft, each producing a
//! possibly-modified text and a log of findings. Guardrails never fail;
//! at worst they downgrade confidence.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Over-promising phrases and their safer canonical substitutes.
/// Matching is case-insensitive exact substring.
pub const FORBIDDEN_PHRASES: &[(&str, &str)] = &[
    ("out of the box", "with standard setup"),
    ("zero configuration", "minimal configuration"),
    ("always works", "works in supported setups"),
    ("supports all", "supports many"),
    ("automatically", "once configured"),
    ("seamlessly", "with minimal setup"),
    ("guaranteed", "designed to"),
];

/// Inline citation shape: `[[n]](url)`.
static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[(\d+)\]\]\(([^)]+)\)").unwrap_or_else(|_| unreachable!()));

/// Double-asterisk bold, normalised to the chat surface's single-asterisk
/// form.
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap_or_else(|_| unreachable!()));

/// What a guardrail scrub found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// An over-promising phrase was substituted.
    ForbiddenPhrase,
    /// A citation referenced a URL outside the fetched set.
    InvalidCitation,
}

/// One guardrail finding, logged with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Kind of finding.
    pub kind: FindingKind,
    /// The offending phrase or citation target.
    pub detail: String,
}

/// The outcome of the guardrail pass.
#[derive(Debug, Clone)]
pub struct GuardrailReport {
    /// Scrubbed answer text.
    pub text: String,
    /// Everything the scrubs changed or flagged.
    pub findings: Vec<Finding>,
    /// Whether an invalid citation downgrades confidence.
    pub downgraded: bool,
}

/// Runs the three scrubs in order: bold normalisation, forbidden-phrase
/// substitution, citation validation.
#[must_use]
pub fn apply(text: &str, fetched_urls: &BTreeSet<String>) -> GuardrailReport {
    let mut findings: Vec<Finding> = Vec::new();

    // 1. Markdown normalisation.
    let text = BOLD_RE.replace_all(text, "*$1*").into_owned();

    // 2. Forbidden-phrase substitution.
    let mut scrubbed = text;
    for (phrase, substitute) in FORBIDDEN_PHRASES {
        let pattern = format!("(?i){}", regex::escape(phrase));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let occurrences = re.find_iter(&scrubbed).count();
        if occurrences > 0 {
            for _ in 0..occurrences {
                findings.push(Finding {
                    kind: FindingKind::ForbiddenPhrase,
                    detail: (*phrase).to_string(),
                });
            }
            scrubbed = re.replace_all(&scrubbed, *substitute).into_owned();
        }
    }

    // 3. Citation validation. Any invalid citation downgrades; the answer
    // itself is preserved.
    let mut downgraded = false;
    for (_, url) in extract_citations(&scrubbed) {
        if !fetched_urls.contains(url.trim()) {
            findings.push(Finding {
                kind: FindingKind::InvalidCitation,
                detail: url,
            });
            downgraded = true;
        }
    }

    debug!(
        findings = findings.len(),
        downgraded, "guardrail pass complete"
    );
    GuardrailReport {
        text: scrubbed,
        findings,
        downgraded,
    }
}

/// Extracts every `[[n]](url)` occurrence in order of appearance.
#[must_use]
pub fn extract_citations(text: &str) -> Vec<(usize, String)> {
    CITATION_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().parse().ok()?;
            let url = caps.get(2)?.as_str().to_string();
            Some((number, url))
        })
        .collect()
}
