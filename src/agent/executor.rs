//! Tool executor for the evidence-gathering loop.
//!
//! Dispatches tool calls to internal functions over the article store,
//! the embedder, and the live article fetcher. Arguments arrive as
//! arbitrary JSON from the model and are parsed defensively: malformed
//! payloads are logged and treated as an empty object.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::tool::{MAX_FETCH_URLS, MAX_SEARCH_HITS, ToolCall, ToolResult};
use crate::core::{Escalation, EscalationKind, FetchedArticle};
use crate::embedding::Embedder;
use crate::error::{AgentError, StoreError};
use crate::fetcher::ArticleFetcher;
use crate::store::{ArticleStore, SharedStore};

/// Maximum raw byte length of tool argument JSON from the model.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Mutable per-request loop state.
///
/// Only articles recorded here may be cited by the final answer.
#[derive(Debug, Default)]
pub struct LoopState {
    /// URLs fetched so far (dedupe key across tool calls).
    pub fetched_urls: BTreeSet<String>,
    /// Fetched articles in fetch order.
    pub fetched_articles: Vec<FetchedArticle>,
    /// Escalation draft, when the model filed one.
    pub escalation: Option<Escalation>,
}

impl LoopState {
    /// Creates empty loop state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records fetched articles, skipping URLs already in the set.
    pub fn record(&mut self, articles: Vec<FetchedArticle>) {
        for article in articles {
            if self.fetched_urls.insert(article.url.clone()) {
                self.fetched_articles.push(article);
            }
        }
    }
}

/// Executes tool calls against the store, embedder, and fetchers.
pub struct ToolExecutor {
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    live_fetcher: Option<Arc<dyn ArticleFetcher>>,
}

impl ToolExecutor {
    /// Creates an executor over shared clients. The live fetcher is
    /// optional; without it `fetch_articles` serves from the store only.
    #[must_use]
    pub fn new(
        store: SharedStore,
        embedder: Arc<dyn Embedder>,
        live_fetcher: Option<Arc<dyn ArticleFetcher>>,
    ) -> Self {
        Self {
            store,
            embedder,
            live_fetcher,
        }
    }

    /// Runs a store closure on the blocking pool.
    async fn with_store<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ArticleStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| StoreError::Database("store lock poisoned".to_string()))?;
            f(&*guard)
        })
        .await
        .map_err(|e| AgentError::ToolExecution {
            name: "store".to_string(),
            message: e.to_string(),
        })?
        .map_err(|e| AgentError::ToolExecution {
            name: "store".to_string(),
            message: e.to_string(),
        })
    }

    /// Dispatches one tool call, mutating loop state through the result.
    ///
    /// Errors never propagate: they are rendered into the result content
    /// so the model can observe and react.
    pub async fn execute(&self, call: &ToolCall, state: &mut LoopState) -> ToolResult {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return ToolResult::error(
                &call.id,
                format!(
                    "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            );
        }

        let args: Value = serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
            warn!(tool = call.name, error = %e, "malformed tool arguments; using empty object");
            Value::Object(serde_json::Map::new())
        });

        let result = match call.name.as_str() {
            "knowledge_base" => self.tool_knowledge_base(&call.id).await,
            "fetch_articles" => self.tool_fetch_articles(&call.id, &args, state).await,
            "search_articles" => self.tool_search_articles(&call.id, &args).await,
            "escalate_to_human" => Ok(Self::tool_escalate(&call.id, &args)),
            other => Err(AgentError::ToolExecution {
                name: other.to_string(),
                message: "unknown tool".to_string(),
            }),
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => ToolResult::error(&call.id, e.to_string()),
        };

        state.record(result.fetched.clone());
        if let Some(ref escalation) = result.escalation {
            state.escalation = Some(escalation.clone());
        }
        debug!(
            tool = call.name,
            is_error = result.is_error,
            fetched = result.fetched.len(),
            "tool executed"
        );
        result
    }

    // -----------------------------------------------------------------------
    // Tool implementations
    // -----------------------------------------------------------------------

    /// Builds the curated table of contents of all indexed articles.
    /// Idempotent.
    async fn tool_knowledge_base(&self, call_id: &str) -> Result<ToolResult, AgentError> {
        let articles = self.with_store(|store| store.list_articles()).await?;
        if articles.is_empty() {
            return Ok(ToolResult::text(
                call_id,
                "The knowledge base is empty; no articles have been indexed yet.".to_string(),
            ));
        }

        let mut manifest = String::from("# Light knowledge base\n");
        let mut current_repo = String::new();
        for article in articles {
            if article.repo_slug != current_repo {
                manifest.push_str(&format!("\n## {}\n", article.repo_slug));
                current_repo.clone_from(&article.repo_slug);
            }
            match article.title {
                Some(title) => manifest.push_str(&format!("- {} — {title}\n", article.path)),
                None => manifest.push_str(&format!("- {}\n", article.path)),
            }
        }
        Ok(ToolResult::text(call_id, manifest))
    }

    /// Fetches up to [`MAX_FETCH_URLS`] articles by URL: the live fetcher
    /// first, the stored revision as fallback. URLs already fetched this
    /// request are skipped.
    async fn tool_fetch_articles(
        &self,
        call_id: &str,
        args: &Value,
        state: &LoopState,
    ) -> Result<ToolResult, AgentError> {
        let urls: Vec<String> = args
            .get("urls")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if urls.is_empty() {
            return Err(AgentError::ToolExecution {
                name: "fetch_articles".to_string(),
                message: "no urls provided".to_string(),
            });
        }
        if urls.len() > MAX_FETCH_URLS {
            return Err(AgentError::ToolExecution {
                name: "fetch_articles".to_string(),
                message: format!("too many urls ({}, max {MAX_FETCH_URLS})", urls.len()),
            });
        }

        let mut sections: Vec<String> = Vec::new();
        let mut fetched: Vec<FetchedArticle> = Vec::new();

        let to_fetch: Vec<String> = urls
            .iter()
            .filter(|url| {
                if state.fetched_urls.contains(*url) {
                    sections.push(format!("{url}: already fetched earlier in this request"));
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        let results = join_all(to_fetch.iter().map(|url| self.fetch_one(url.clone()))).await;
        for (url, result) in to_fetch.into_iter().zip(results) {
            match result {
                Some(article) => {
                    sections.push(format!(
                        "### {} ({url})\n{}",
                        article.title, article.content
                    ));
                    fetched.push(article);
                }
                None => sections.push(format!("{url}: could not be fetched")),
            }
        }

        let mut result = ToolResult::text(call_id, sections.join("\n\n"));
        result.fetched = fetched;
        Ok(result)
    }

    /// Fetches a single article: live first, stored revision second.
    async fn fetch_one(&self, url: String) -> Option<FetchedArticle> {
        if let Some(ref live) = self.live_fetcher {
            match live.fetch_article(&url).await {
                Ok(content) => {
                    return Some(FetchedArticle {
                        title: title_from_url(&url),
                        url,
                        content,
                    });
                }
                Err(e) => {
                    debug!(url, error = %e, "live fetch failed; trying stored revision");
                }
            }
        }

        let path = path_from_url(&url);
        if path.is_empty() {
            return None;
        }
        let stored = self
            .with_store(move |store| store.find_article_by_path(&path))
            .await
            .ok()
            .flatten()?;
        Some(FetchedArticle {
            title: stored
                .title
                .unwrap_or_else(|| title_from_url(&url)),
            url,
            content: stored.content,
        })
    }

    /// Semantic article search: embeds the query, matches chunks, and
    /// returns the owning articles in full.
    async fn tool_search_articles(
        &self,
        call_id: &str,
        args: &Value,
    ) -> Result<ToolResult, AgentError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if query.is_empty() {
            return Err(AgentError::ToolExecution {
                name: "search_articles".to_string(),
                message: "empty query".to_string(),
            });
        }

        let embedding =
            self.embedder
                .embed(&query)
                .await
                .map_err(|e| AgentError::ToolExecution {
                    name: "search_articles".to_string(),
                    message: format!("embedding failed: {e}"),
                })?;

        let matches = self
            .with_store(move |store| store.match_docs(&embedding, MAX_SEARCH_HITS))
            .await?;

        // Distinct owning articles, best match first.
        let mut keys: Vec<(String, String)> = Vec::new();
        for hit in &matches {
            let key = (hit.metadata.repo_slug.clone(), hit.metadata.path.clone());
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.truncate(MAX_SEARCH_HITS);

        let mut sections: Vec<String> = Vec::new();
        let mut fetched: Vec<FetchedArticle> = Vec::new();
        for (repo, path) in keys {
            let lookup_repo = repo.clone();
            let lookup_path = path.clone();
            let stored = self
                .with_store(move |store| store.article_content(&lookup_repo, &lookup_path))
                .await?;
            if let Some(article) = stored {
                let title = article
                    .title
                    .clone()
                    .unwrap_or_else(|| article.path.clone());
                sections.push(format!("### {title} ({})\n{}", article.path, article.content));
                fetched.push(FetchedArticle {
                    url: article.path,
                    title,
                    content: article.content,
                });
            }
        }

        if sections.is_empty() {
            return Ok(ToolResult::text(
                call_id,
                format!("No articles matched \"{query}\"."),
            ));
        }

        let mut result = ToolResult::text(call_id, sections.join("\n\n"));
        result.fetched = fetched;
        Ok(result)
    }

    /// Drafts an escalation. Missing or malformed fields get defaults
    /// rather than failing. Does not terminate the loop.
    fn tool_escalate(call_id: &str, args: &Value) -> ToolResult {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Escalation from Lightopedia")
            .to_string();
        let request_type = EscalationKind::parse(
            args.get("request_type")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );
        let problem_statement = args
            .get("problem_statement")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let escalation = Escalation {
            title: title.clone(),
            request_type,
            problem_statement,
        };

        let mut result = ToolResult::text(
            call_id,
            format!(
                "Escalation drafted: \"{title}\" ({}). The Light team will follow up; you can \
                 still answer from any evidence you have.",
                serde_json::to_value(request_type)
                    .ok()
                    .and_then(|v| v.as_str().map(ToString::to_string))
                    .unwrap_or_default()
            ),
        );
        result.escalation = Some(escalation);
        result
    }
}

/// Derives a readable title from a URL or path.
fn title_from_url(url: &str) -> String {
    url.rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".md")
        .trim_end_matches(".mdx")
        .replace(['-', '_'], " ")
}

/// Reduces a URL to a repo-relative path for store lookups.
fn path_from_url(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .map_or(url, |rest| rest.split_once('/').map_or("", |(_, path)| path));
    without_scheme.trim_start_matches('/').to_string()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::core::ArticleChunk;
    use crate::embedding::EMBEDDING_DIMENSIONS;
    use crate::error::LlmError;
    use crate::store::{ArticleStore, ArticleUpsert, SqliteStore, shared};
    use async_trait::async_trait;

    /// Deterministic embedder: hashes words onto axes.
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSIONS
        }

        fn model(&self) -> &str {
            "hash-test"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, LlmError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
                    for word in text.to_lowercase().split_whitespace() {
                        let axis = word
                            .bytes()
                            .fold(0_usize, |acc, b| (acc * 31 + b as usize) % EMBEDDING_DIMENSIONS);
                        v[axis] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    async fn seeded_store() -> SharedStore {
        let mut store = SqliteStore::in_memory().unwrap_or_else(|e| panic!("open: {e}"));
        store.init().unwrap_or_else(|e| panic!("init: {e}"));

        let content = "Light supports configurable per-customer base currencies for invoicing.";
        let chunks = vec![ArticleChunk {
            content: content.to_string(),
            ordinal: 0,
            section_heading: Some("Currencies".to_string()),
            title: Some("Multi-currency".to_string()),
            path: "docs/currency.md".to_string(),
        }];
        let embeddings = HashEmbedder
            .embed_batch(&[content.to_string()])
            .await
            .unwrap_or_default();
        store
            .upsert_chunks(&ArticleUpsert {
                repo_slug: "light-platform/help-center",
                path: "docs/currency.md",
                title: Some("Multi-currency"),
                commit_sha: "sha1",
                content,
                index_run_id: "run-1",
                retrieval_program_version: "retrieval.v1.0",
                chunks: &chunks,
                embeddings: &embeddings,
            })
            .unwrap_or_else(|e| panic!("upsert: {e}"));
        shared(store)
    }

    fn executor(store: SharedStore) -> ToolExecutor {
        ToolExecutor::new(store, Arc::new(HashEmbedder), None)
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn test_knowledge_base_manifest() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let result = executor
            .execute(&call("knowledge_base", "{}"), &mut state)
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("docs/currency.md"));
        assert!(result.content.contains("Multi-currency"));
        // Browsing the manifest fetches nothing.
        assert!(state.fetched_articles.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_articles_from_store() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let result = executor
            .execute(
                &call("fetch_articles", r#"{"urls": ["docs/currency.md"]}"#),
                &mut state,
            )
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("per-customer base currencies"));
        assert_eq!(state.fetched_articles.len(), 1);
        assert!(state.fetched_urls.contains("docs/currency.md"));
    }

    #[tokio::test]
    async fn test_fetch_articles_dedupes_across_calls() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let args = r#"{"urls": ["docs/currency.md"]}"#;
        executor.execute(&call("fetch_articles", args), &mut state).await;
        let second = executor.execute(&call("fetch_articles", args), &mut state).await;
        assert!(second.content.contains("already fetched"));
        assert_eq!(state.fetched_articles.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_articles_too_many_urls() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let urls: Vec<String> = (0..16).map(|i| format!("\"docs/{i}.md\"")).collect();
        let args = format!(r#"{{"urls": [{}]}}"#, urls.join(","));
        let result = executor.execute(&call("fetch_articles", &args), &mut state).await;
        assert!(result.is_error);
        assert!(result.content.contains("too many urls"));
    }

    #[tokio::test]
    async fn test_search_articles_records_fetched() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let result = executor
            .execute(
                &call(
                    "search_articles",
                    r#"{"query": "configurable per-customer base currencies invoicing"}"#,
                ),
                &mut state,
            )
            .await;
        assert!(!result.is_error, "unexpected error: {}", result.content);
        assert!(result.content.contains("currencies"));
        assert_eq!(state.fetched_articles.len(), 1);
        assert!(state.fetched_urls.contains("docs/currency.md"));
    }

    #[tokio::test]
    async fn test_escalate_records_draft() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let result = executor
            .execute(
                &call(
                    "escalate_to_human",
                    r#"{"title": "Missing VAT docs", "request_type": "documentation_gap",
                        "problem_statement": "No article covers VAT rounding."}"#,
                ),
                &mut state,
            )
            .await;
        assert!(!result.is_error);
        let escalation = state.escalation.unwrap_or_else(|| panic!("no escalation"));
        assert_eq!(escalation.title, "Missing VAT docs");
        assert_eq!(escalation.request_type, EscalationKind::DocumentationGap);
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_empty_object() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        // Malformed JSON → empty object → escalation with defaults.
        let result = executor
            .execute(&call("escalate_to_human", "not json at all"), &mut state)
            .await;
        assert!(!result.is_error);
        let escalation = state.escalation.unwrap_or_else(|| panic!("no escalation"));
        assert_eq!(escalation.request_type, EscalationKind::SupportNeeded);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let executor = executor(seeded_store().await);
        let mut state = LoopState::new();
        let result = executor.execute(&call("rm_rf", "{}"), &mut state).await;
        assert!(result.is_error);
        assert!(result.content.contains("unknown tool"));
    }

    #[test]
    fn test_title_from_url() {
        assert_eq!(title_from_url("docs/multi-currency.md"), "multi currency");
        assert_eq!(
            title_from_url("https://help.light.inc/articles/payout_timing.mdx"),
            "payout timing"
        );
    }

    #[test]
    fn test_path_from_url() {
        assert_eq!(path_from_url("docs/currency.md"), "docs/currency.md");
        assert_eq!(
            path_from_url("https://help.light.inc/docs/currency.md"),
            "docs/currency.md"
        );
        assert_eq!(path_from_url("/docs/currency.md"), "docs/currency.md");
    }
}
