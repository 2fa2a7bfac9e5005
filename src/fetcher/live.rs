//! Live article fetcher for the agentic loop.
//!
//! Fetches a rendered help article by URL. HTML responses are reduced to
//! text content; markdown and plain-text responses pass through unchanged.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use super::ArticleFetcher;
use crate::error::FetchError;

/// Per-call HTTP timeout for live article fetches.
const LIVE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Elements whose text is collected from an HTML article body.
const TEXT_SELECTOR: &str = "h1, h2, h3, h4, p, li, pre, td, blockquote";

/// HTTP-based [`ArticleFetcher`] with optional bearer auth.
pub struct LiveFetcher {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl LiveFetcher {
    /// Creates a live fetcher, optionally authenticating with a bearer
    /// token (private help-center hosts).
    #[must_use]
    pub fn new(bearer_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LIVE_FETCH_TIMEOUT)
            .user_agent("lightopedia-bot")
            .build()
            .unwrap_or_default();
        Self {
            client,
            bearer_token,
        }
    }
}

impl std::fmt::Debug for LiveFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFetcher")
            .field("authenticated", &self.bearer_token.is_some())
            .finish()
    }
}

/// Reduces an HTML document to readable text, one block element per line.
fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(TEXT_SELECTOR) else {
        return String::new();
    };

    let mut lines: Vec<String> = Vec::new();
    for element in document.select(&selector) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            lines.push(text);
        }
    }
    lines.join("\n")
}

/// Returns `true` when the response should be treated as HTML.
fn is_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        return ct.contains("text/html");
    }
    body.trim_start().starts_with("<!") || body.trim_start().starts_with("<html")
}

#[async_trait]
impl ArticleFetcher for LiveFetcher {
    async fn fetch_article(&self, url: &str) -> Result<String, FetchError> {
        let mut request = self.client.get(url);
        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: format!("live fetch of {url} failed"),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let text = if is_html(content_type.as_deref(), &body) {
            html_to_text(&body)
        } else {
            body
        };

        if text.trim().is_empty() {
            return Err(FetchError::Decode(format!("no text content at {url}")));
        }
        debug!(url, chars = text.len(), "live article fetched");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_extracts_blocks() {
        let html = r"<html><head><script>ignored()</script></head>
            <body><h1>Multi-currency</h1>
            <p>Light supports   configurable currencies.</p>
            <ul><li>Per-customer base currency</li></ul>
            </body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Multi-currency"));
        assert!(text.contains("Light supports configurable currencies."));
        assert!(text.contains("Per-customer base currency"));
        assert!(!text.contains("ignored"));
    }

    #[test]
    fn test_is_html_detection() {
        assert!(is_html(Some("text/html; charset=utf-8"), ""));
        assert!(!is_html(Some("text/markdown"), "<html>"));
        assert!(is_html(None, "<!DOCTYPE html><html>"));
        assert!(!is_html(None, "# Markdown heading"));
    }
}
