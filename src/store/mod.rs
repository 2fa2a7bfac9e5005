//! Durable, vector-capable article store.
//!
//! Defines the [`ArticleStore`] trait and its SQLite implementation:
//! atomic per-`(repo, path)` replacement, bulk purge by indexing run,
//! cosine top-k similarity search, and BM25 keyword search, plus the
//! feedback and replay-log tables.

mod schema;
mod sqlite;

pub use schema::CURRENT_SCHEMA_VERSION;
pub use sqlite::SqliteStore;

use std::sync::{Arc, Mutex};

use crate::core::{ArticleChunk, DocMatch, Feedback};
use crate::error::StoreError;
use crate::telemetry::QaLog;

/// Default per-RPC timeout applied by async callers wrapping store calls.
pub const STORE_RPC_TIMEOUT_MS: u64 = 5_000;

/// One atomic article replacement: the document row plus its chunk batch
/// and paired embeddings.
#[derive(Debug)]
pub struct ArticleUpsert<'a> {
    /// Owning repository slug.
    pub repo_slug: &'a str,
    /// Repo-relative file path.
    pub path: &'a str,
    /// Article title, when present.
    pub title: Option<&'a str>,
    /// Revision the content was fetched at.
    pub commit_sha: &'a str,
    /// Raw article content (kept for article-level fetches).
    pub content: &'a str,
    /// Indexing run writing this batch.
    pub index_run_id: &'a str,
    /// Retrieval program version active at write time.
    pub retrieval_program_version: &'a str,
    /// Chunks to insert, ordinal order.
    pub chunks: &'a [ArticleChunk],
    /// One embedding per chunk, same order.
    pub embeddings: &'a [Vec<f64>],
}

/// File-level article metadata, with full content.
#[derive(Debug, Clone)]
pub struct StoredArticle {
    /// Owning repository slug.
    pub repo_slug: String,
    /// Repo-relative file path.
    pub path: String,
    /// Article title, when present.
    pub title: Option<String>,
    /// Revision the content was fetched at.
    pub commit_sha: String,
    /// Raw article content.
    pub content: String,
}

/// Article listing entry for the knowledge-base manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInfo {
    /// Owning repository slug.
    pub repo_slug: String,
    /// Repo-relative file path.
    pub path: String,
    /// Article title, when present.
    pub title: Option<String>,
}

/// Trait for the durable article store.
///
/// The store is the only mutable shared resource in the system. Writers
/// replace atomically per `(repo, path)`; readers never observe an empty
/// chunk set for an article that exists.
pub trait ArticleStore: Send {
    /// Initializes the store (creates schema). Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    fn init(&mut self) -> Result<(), StoreError>;

    /// Atomically replaces all chunks for `(repo, path)`: prior chunks for
    /// that key are deleted in the same transaction that inserts the new
    /// batch. Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// Fails fast with [`StoreError::EmbeddingCountMismatch`] or
    /// [`StoreError::DimensionMismatch`] on a malformed batch, or a
    /// database error; indexing halts that one file and continues.
    fn upsert_chunks(&mut self, upsert: &ArticleUpsert<'_>) -> Result<usize, StoreError>;

    /// Deletes an article and (by cascade) its chunks and embeddings.
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_article(&mut self, repo_slug: &str, path: &str) -> Result<usize, StoreError>;

    /// Deletes every chunk written by the given indexing run and nothing
    /// else. Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_by_run(&mut self, index_run_id: &str) -> Result<usize, StoreError>;

    /// Returns the top-`k` chunks by cosine similarity to the query
    /// vector, in decreasing similarity (`similarity = 1 − cosine
    /// distance`). The query carries no filter predicates.
    ///
    /// # Errors
    ///
    /// Returns an error on a malformed query vector or database failure.
    fn match_docs(&self, query_embedding: &[f64], k: usize) -> Result<Vec<DocMatch>, StoreError>;

    /// BM25 keyword search over chunk content. The returned `similarity`
    /// field holds a keyword score normalized into `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the FTS query fails.
    fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<DocMatch>, StoreError>;

    /// Returns `true` if `(repo, path)` is already indexed at the given
    /// revision.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn has_revision(
        &self,
        repo_slug: &str,
        path: &str,
        commit_sha: &str,
    ) -> Result<bool, StoreError>;

    /// Returns the stored article for `(repo, path)`, if indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn article_content(
        &self,
        repo_slug: &str,
        path: &str,
    ) -> Result<Option<StoredArticle>, StoreError>;

    /// Finds an article whose path matches the given path (exact or
    /// suffix), for URL-based lookups during the agentic loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn find_article_by_path(&self, path: &str) -> Result<Option<StoredArticle>, StoreError>;

    /// Lists all indexed articles for the knowledge-base manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_articles(&self) -> Result<Vec<ArticleInfo>, StoreError>;

    /// Returns the number of stored chunks for `(repo, path)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn chunk_count(&self, repo_slug: &str, path: &str) -> Result<usize, StoreError>;

    /// Records user feedback on a past answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn record_feedback(&mut self, feedback: &Feedback) -> Result<(), StoreError>;

    /// Persists the replay log for one request (overwrites on the same
    /// request id).
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn log_request(&mut self, log: &QaLog) -> Result<(), StoreError>;

    /// Loads a persisted request log.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_log(&self, request_id: &str) -> Result<Option<QaLog>, StoreError>;
}

/// Store handle shared across concurrent requests.
///
/// The SQLite connection is `Send` but not `Sync`; async callers lock it
/// inside `spawn_blocking` closures so in-flight calls never hold the lock
/// across an await point.
pub type SharedStore = Arc<Mutex<dyn ArticleStore>>;

/// Wraps a store implementation into a [`SharedStore`].
pub fn shared<S: ArticleStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Runs a store closure on the blocking pool, so async callers never hold
/// the store lock across an await point.
///
/// # Errors
///
/// Returns the closure's error, or a database error if the lock is
/// poisoned or the blocking task fails to join.
pub async fn call_blocking<T, F>(store: &SharedStore, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn ArticleStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let mut guard = store
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))?;
        f(&mut *guard)
    })
    .await
    .map_err(|e| StoreError::Database(e.to_string()))?
}
