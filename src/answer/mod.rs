//! Answer assembly.
//!
//! Builds the final [`Answer`] from the scrubbed synthesis text and the
//! loop state: sources numbered by first citation appearance, bullet
//! claims with their citation references, the confidence rule, and the
//! canned responses for the two non-answer failure modes.

use tracing::debug;

use crate::agent::LoopState;
use crate::core::{Answer, BulletClaim, Confidence, Source};
use crate::guardrail::{GuardrailReport, extract_citations};

/// Assembles the final answer.
///
/// Confidence is `confirmed` iff at least one article was fetched and the
/// guardrail pass did not downgrade. Guardrail findings, when present,
/// land in the internal notes.
#[must_use]
pub fn assemble(report: &GuardrailReport, state: &LoopState, request_id: &str) -> Answer {
    let text = report.text.trim().to_string();
    let sources = number_sources(&text, state);
    let bullets = extract_bullets(&text);

    let confidence = if !state.fetched_articles.is_empty() && !report.downgraded {
        Confidence::Confirmed
    } else {
        Confidence::NeedsClarification
    };

    let internal_notes = if report.findings.is_empty() {
        None
    } else {
        Some(
            report
                .findings
                .iter()
                .map(|f| format!("{:?}: {}", f.kind, f.detail))
                .collect::<Vec<_>>()
                .join("; "),
        )
    };

    debug!(
        sources = sources.len(),
        bullets = bullets.len(),
        confidence = ?confidence,
        "answer assembled"
    );

    Answer {
        summary: text,
        bullets,
        sources,
        confidence,
        internal_notes,
        request_id: request_id.to_string(),
        escalation: state.escalation.clone(),
    }
}

/// The canned response when no evidence grounded an answer. Names the
/// request id and points the asker toward a documented feature request.
#[must_use]
pub fn missing_context_answer(request_id: &str) -> Answer {
    Answer {
        summary: format!(
            "I couldn't find enough documented context to answer that. If this capability \
             matters to a customer conversation, file a feature request with the Light team \
             so it gets documented. (request {request_id})"
        ),
        bullets: Vec::new(),
        sources: Vec::new(),
        confidence: Confidence::NeedsClarification,
        internal_notes: None,
        request_id: request_id.to_string(),
        escalation: None,
    }
}

/// The response for a question the router sent to clarification: names
/// what is missing and carries the request id.
#[must_use]
pub fn clarification_answer(request_id: &str, missing_info: &[String]) -> Answer {
    let mut summary = String::from("I need a bit more detail to answer that well.");
    for missing in missing_info {
        summary.push_str(&format!("\n- {missing}"));
    }
    summary.push_str(&format!("\n(request {request_id})"));

    Answer {
        summary,
        bullets: Vec::new(),
        sources: Vec::new(),
        confidence: Confidence::NeedsClarification,
        internal_notes: None,
        request_id: request_id.to_string(),
        escalation: None,
    }
}

/// The canned response for an uncaught pipeline error. Internal details
/// stay in the logs.
#[must_use]
pub fn generic_error_answer(request_id: &str) -> Answer {
    Answer {
        summary: format!(
            "Something went wrong while answering. Try again, and mention request \
             {request_id} if it keeps happening."
        ),
        bullets: Vec::new(),
        sources: Vec::new(),
        confidence: Confidence::NeedsClarification,
        internal_notes: None,
        request_id: request_id.to_string(),
        escalation: None,
    }
}

/// Numbers sources by first appearance in the text's citation order;
/// fetched-but-uncited articles follow in fetch order.
fn number_sources(text: &str, state: &LoopState) -> Vec<Source> {
    let mut ordered_urls: Vec<String> = Vec::new();
    for (_, url) in extract_citations(text) {
        let url = url.trim().to_string();
        if state.fetched_urls.contains(&url) && !ordered_urls.contains(&url) {
            ordered_urls.push(url);
        }
    }
    for article in &state.fetched_articles {
        if !ordered_urls.contains(&article.url) {
            ordered_urls.push(article.url.clone());
        }
    }

    ordered_urls
        .into_iter()
        .enumerate()
        .map(|(index, url)| {
            let title = state
                .fetched_articles
                .iter()
                .find(|a| a.url == url)
                .map_or_else(|| url.clone(), |a| a.title.clone());
            Source {
                id: index + 1,
                title,
                url,
            }
        })
        .collect()
}

/// Extracts bullet claims and their citation numbers from the text.
fn extract_bullets(text: &str) -> Vec<BulletClaim> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            let body = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .or_else(|| trimmed.strip_prefix("• "))?;

            let citations: Vec<usize> = extract_citations(body).into_iter().map(|(n, _)| n).collect();
            let mut clean = body.to_string();
            for (n, url) in extract_citations(body) {
                clean = clean.replace(&format!("[[{n}]]({url})"), "");
            }
            Some(BulletClaim {
                text: clean.trim().to_string(),
                citations,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FetchedArticle;
    use crate::guardrail;
    use std::collections::BTreeSet;

    fn state_with(urls: &[(&str, &str)]) -> LoopState {
        let mut state = LoopState::new();
        state.record(
            urls.iter()
                .map(|(url, title)| FetchedArticle {
                    url: (*url).to_string(),
                    title: (*title).to_string(),
                    content: "content".to_string(),
                })
                .collect(),
        );
        state
    }

    fn report_for(text: &str, state: &LoopState) -> guardrail::GuardrailReport {
        let fetched: BTreeSet<String> = state.fetched_urls.clone();
        guardrail::apply(text, &fetched)
    }

    #[test]
    fn test_confirmed_answer_with_sources() {
        let state = state_with(&[("docs/currency.md", "Multi-currency")]);
        let text = "Yes, Light can.\n- Configurable base currencies [[1]](docs/currency.md)";
        let report = report_for(text, &state);
        let answer = assemble(&report, &state, "req-1");

        assert_eq!(answer.confidence, Confidence::Confirmed);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].id, 1);
        assert_eq!(answer.sources[0].title, "Multi-currency");
        assert_eq!(answer.request_id, "req-1");
        assert_eq!(answer.bullets.len(), 1);
        assert_eq!(answer.bullets[0].citations, vec![1]);
        assert!(!answer.bullets[0].text.contains("[[1]]"));
    }

    #[test]
    fn test_citation_order_numbers_sources() {
        let state = state_with(&[
            ("docs/a.md", "A"),
            ("docs/b.md", "B"),
            ("docs/c.md", "C"),
        ]);
        // b is cited first, then a; c is fetched but uncited.
        let text = "See [[2]](docs/b.md) then [[1]](docs/a.md).";
        let report = report_for(text, &state);
        let answer = assemble(&report, &state, "req-1");

        let urls: Vec<&str> = answer.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["docs/b.md", "docs/a.md", "docs/c.md"]);
        assert_eq!(answer.sources[0].id, 1);
        assert_eq!(answer.sources[2].id, 3);
    }

    #[test]
    fn test_downgrade_on_invalid_citation() {
        let state = state_with(&[("docs/a.md", "A")]);
        let text = "Claim [[1]](docs/ghost.md).";
        let report = report_for(text, &state);
        let answer = assemble(&report, &state, "req-1");

        assert_eq!(answer.confidence, Confidence::NeedsClarification);
        // The answer is still emitted.
        assert!(answer.summary.contains("Claim"));
        assert!(answer.internal_notes.is_some());
    }

    #[test]
    fn test_no_fetched_articles_needs_clarification() {
        let state = LoopState::new();
        let report = report_for("Best effort answer.", &state);
        let answer = assemble(&report, &state, "req-1");
        assert_eq!(answer.confidence, Confidence::NeedsClarification);
        assert!(answer.sources.is_empty());
    }

    #[test]
    fn test_missing_context_answer_names_request() {
        let answer = missing_context_answer("req-42");
        assert!(answer.summary.contains("req-42"));
        assert!(answer.summary.contains("feature request"));
        assert_eq!(answer.confidence, Confidence::NeedsClarification);
    }

    #[test]
    fn test_generic_error_answer_names_request() {
        let answer = generic_error_answer("req-42");
        assert!(answer.summary.contains("req-42"));
        assert_eq!(answer.confidence, Confidence::NeedsClarification);
    }
}
