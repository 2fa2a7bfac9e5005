//! Pattern-table heuristics for the query router.
//!
//! Cheap, deterministic tests run before any model call: scored keyword
//! tables per mode, short-follow-up detection, out-of-scope signals, and
//! the ambiguity gate.

use std::sync::LazyLock;

use regex::Regex;

use super::{CLARIFY_MIN_CHARS, Mode, RouteConfidence};

/// Keyword tables per mode. Matches are counted per mode; the winner and
/// its margin over the runner-up set the confidence.
const MODE_PATTERNS: &[(Mode, &[&str])] = &[
    (
        Mode::CapabilityDocs,
        &[
            "can light",
            "does light",
            "is it possible",
            "support",
            "handle",
            "feature",
            "capab",
            "integration",
            "api",
            "export",
            "import",
            "currency",
            "limit",
            "available",
        ],
    ),
    (
        Mode::EnablementSales,
        &[
            "pitch",
            "sell",
            "prospect",
            "customer asks",
            "competitor",
            "objection",
            "positioning",
            "talk track",
            "demo",
            "deal",
            "sales call",
        ],
    ),
    (
        Mode::OnboardingHowto,
        &[
            "how do i",
            "how to",
            "set up",
            "setup",
            "configure",
            "getting started",
            "onboard",
            "invite",
            "connect",
            "enable",
            "step by step",
            "where do i",
        ],
    ),
    (
        Mode::Followup,
        &["what about", "how about", "same for", "as discussed", "from before"],
    ),
];

/// Out-of-scope signals: deep behavior questions the docs cannot ground.
const OUT_OF_SCOPE_PATTERNS: &[&str] = &[
    "what happens when",
    "what happens if",
    "retry logic",
    "why did this",
    "stack trace",
    "traceback",
    "under the hood",
    "source code",
    "internally",
    "race condition",
    "which query runs",
];

/// Pronoun-led openings that mark a short follow-up.
const FOLLOWUP_PREFIXES: &[&str] = &[
    "what about",
    "how about",
    "and ",
    "also ",
    "same for",
    "what else",
    "does it",
    "is it",
    "can it",
    "do they",
    "it ",
    "that ",
    "this ",
    "they ",
];

/// Bare question words that stand alone as follow-ups ("why?", "how?").
const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "does", "do", "is", "are",
    "should", "could", "will", "would",
];

/// Method-call shapes (`Invoice.markPaid()`) flag behavior questions.
static METHOD_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+\.\w+\(").unwrap_or_else(|_| unreachable!()));

/// Counts out-of-scope signals in a question.
#[must_use]
pub fn out_of_scope_signals(question: &str) -> usize {
    let lower = question.to_lowercase();
    let mut signals = OUT_OF_SCOPE_PATTERNS
        .iter()
        .filter(|p| lower.contains(*p))
        .count();
    if METHOD_CALL_RE.is_match(question) {
        signals += 1;
    }
    signals
}

/// Returns `true` when a short question reads as a thread continuation:
/// pronoun-led, prefix-matched, or a bare question word.
#[must_use]
pub fn is_short_followup(question: &str) -> bool {
    let lower = question.trim().to_lowercase();
    if FOLLOWUP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    let bare = lower.trim_end_matches(['?', '!', '.']);
    QUESTION_WORDS.contains(&bare)
}

/// The ambiguity gate: returns what is missing when the question cannot
/// be routed as-is.
#[must_use]
pub fn ambiguity(question: &str) -> Option<Vec<String>> {
    let trimmed = question.trim();
    if trimmed.chars().count() < CLARIFY_MIN_CHARS {
        return Some(vec![
            "the question is very short; say what you want to know about Light".to_string(),
        ]);
    }

    let lower = trimmed.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or_default();
    let has_interrogative = trimmed.contains('?') || QUESTION_WORDS.contains(&first_word);
    if !has_interrogative {
        return Some(vec![
            "no question was asked; phrase what you want to know".to_string(),
        ]);
    }

    // Bare either/or questions with no surrounding context.
    let word_count = lower.split_whitespace().count();
    if word_count <= 6 && lower.contains(" or ") {
        return Some(vec![
            "the question offers alternatives without context; say which area of Light you mean"
                .to_string(),
        ]);
    }

    None
}

/// Scores the mode tables and picks the best match with a margin-derived
/// confidence. Returns `None` when nothing matches.
#[must_use]
pub fn best_mode(question: &str) -> Option<(Mode, RouteConfidence)> {
    let lower = question.to_lowercase();

    let mut scores: Vec<(Mode, usize)> = MODE_PATTERNS
        .iter()
        .map(|(mode, patterns)| {
            let count = patterns.iter().filter(|p| lower.contains(*p)).count();
            (*mode, count)
        })
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (best_mode, best) = scores.first().copied()?;
    if best == 0 {
        return None;
    }
    let runner_up = scores.get(1).map_or(0, |s| s.1);
    let margin = best - runner_up;

    let confidence = if best >= 2 && margin >= 2 {
        RouteConfidence::High
    } else if margin >= 1 {
        RouteConfidence::Medium
    } else {
        RouteConfidence::Low
    };
    Some((best_mode, confidence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("What happens when Invoice.markPaid() is called?", 2; "behavior plus method call")]
    #[test_case("Tell me about the retry logic under the hood", 2; "two substrings")]
    #[test_case("Can Light export invoices?", 0; "capability question")]
    fn test_out_of_scope_signals(question: &str, expected: usize) {
        assert_eq!(out_of_scope_signals(question), expected);
    }

    #[test_case("what about that?", true; "what about")]
    #[test_case("does it work for credit notes?", true; "pronoun led")]
    #[test_case("why?", true; "bare question word")]
    #[test_case("and for contracts?", true; "and prefix")]
    #[test_case("Can Light export invoices?", false; "full question")]
    fn test_is_short_followup(question: &str, expected: bool) {
        assert_eq!(is_short_followup(question), expected);
    }

    #[test]
    fn test_ambiguity_short() {
        assert!(ambiguity("invoices?").is_some());
    }

    #[test]
    fn test_ambiguity_no_interrogative() {
        assert!(ambiguity("light invoicing thing please").is_some());
    }

    #[test]
    fn test_ambiguity_bare_or() {
        assert!(ambiguity("invoices or contracts?").is_some());
    }

    #[test]
    fn test_ambiguity_passes_real_question() {
        assert!(ambiguity("Can Light handle multi-currency invoicing?").is_none());
        assert!(ambiguity("Does Light support exporting contracts or invoices to Salesforce today?").is_none());
    }

    #[test]
    fn test_best_mode_capability_high() {
        let (mode, confidence) =
            best_mode("Can Light handle multi-currency invoicing, and does Light support VAT?")
                .unwrap_or((Mode::Clarify, RouteConfidence::Low));
        assert_eq!(mode, Mode::CapabilityDocs);
        assert_eq!(confidence, RouteConfidence::High);
    }

    #[test]
    fn test_best_mode_onboarding() {
        let (mode, _) = best_mode("How do I set up the Stripe connection?")
            .unwrap_or((Mode::Clarify, RouteConfidence::Low));
        assert_eq!(mode, Mode::OnboardingHowto);
    }

    #[test]
    fn test_best_mode_none() {
        assert!(best_mode("zebra umbrella concert").is_none());
    }
}
