//! Indexing pipeline orchestration.
//!
//! Ties the path policy, chunker, embedder, and store together for three
//! entry points: one file, one repository, and a webhook-triggered delta.
//! Per-file errors are caught and counted; the run continues. A repo-level
//! policy violation aborts the run.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::chunking::MarkdownChunker;
use crate::core::ArticleChunk;
use crate::embedding::Embedder;
use crate::error::{Error, IndexError};
use crate::fetcher::SourceFetcher;
use crate::policy;
use crate::retrieval::RETRIEVAL_VERSION;
use crate::store::{ArticleStore, ArticleUpsert, SharedStore, call_blocking};

/// One file's content handed to the indexer.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Repo-relative path.
    pub path: String,
    /// Raw markdown content.
    pub content: String,
}

/// Outcome of indexing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The file was chunked and upserted; carries the chunk count.
    Indexed(usize),
    /// The file was skipped, with the reason.
    Skipped(String),
}

/// Aggregate result of an indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    /// Files chunked and upserted.
    pub documents_processed: usize,
    /// Chunks written across all files.
    pub chunks_created: usize,
    /// Files skipped (already indexed at this revision).
    pub skipped: usize,
    /// Articles deleted (webhook removals).
    pub deleted: usize,
    /// Per-file errors, as `path: message` strings.
    pub errors: Vec<String>,
    /// The run id stamped on every chunk written.
    pub run_id: String,
}

/// A push event from the VCS host, already shorn of webhook envelope and
/// signature concerns (those belong to the shell).
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Repository slug.
    pub repo: String,
    /// Branch the push landed on.
    pub branch: String,
    /// Head revision after the push.
    pub revision: String,
    /// Paths added by the push.
    pub added: Vec<String>,
    /// Paths modified by the push.
    pub modified: Vec<String>,
    /// Paths removed by the push.
    pub removed: Vec<String>,
}

/// The indexing pipeline.
pub struct Indexer {
    store: SharedStore,
    embedder: Arc<dyn Embedder>,
    chunker: MarkdownChunker,
}

impl Indexer {
    /// Creates an indexer over shared clients.
    #[must_use]
    pub fn new(store: SharedStore, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            chunker: MarkdownChunker::new(),
        }
    }

    /// Indexes one file: validate, chunk, embed, upsert.
    ///
    /// Without `force`, a file already indexed at this revision is
    /// skipped, which makes the nightly backfill a no-op when nothing
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Validation`] for a disallowed `(repo, path)`
    /// and [`IndexError::FileFailed`] when embedding or the upsert fails.
    pub async fn index_file(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        revision: &str,
        run_id: &str,
        force: bool,
    ) -> Result<FileOutcome, Error> {
        let decision = policy::validate_index(repo, path);
        if !decision.allowed {
            return Err(IndexError::Validation {
                reason: decision.reason,
            }
            .into());
        }

        if !force {
            let (repo_owned, path_owned, revision_owned) =
                (repo.to_string(), path.to_string(), revision.to_string());
            let exists = call_blocking(&self.store, move |store| {
                store.has_revision(&repo_owned, &path_owned, &revision_owned)
            })
            .await
            .map_err(|e| file_failed(path, &e.to_string()))?;
            if exists {
                return Ok(FileOutcome::Skipped(
                    "already indexed at this revision".to_string(),
                ));
            }
        }

        let chunks = self.chunker.chunk(content, &format!("{repo}/{path}"));
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| file_failed(path, &format!("embedding failed: {e}")))?;

        let title = chunks.first().and_then(|c| c.title.clone());
        let written = {
            let (repo_owned, path_owned, revision_owned, run_owned, content_owned) = (
                repo.to_string(),
                path.to_string(),
                revision.to_string(),
                run_id.to_string(),
                content.to_string(),
            );
            let chunks_owned: Vec<ArticleChunk> = chunks;
            call_blocking(&self.store, move |store| {
                store.upsert_chunks(&ArticleUpsert {
                    repo_slug: &repo_owned,
                    path: &path_owned,
                    title: title.as_deref(),
                    commit_sha: &revision_owned,
                    content: &content_owned,
                    index_run_id: &run_owned,
                    retrieval_program_version: RETRIEVAL_VERSION,
                    chunks: &chunks_owned,
                    embeddings: &embeddings,
                })
            })
            .await
            .map_err(|e| file_failed(path, &e.to_string()))?
        };

        Ok(FileOutcome::Indexed(written))
    }

    /// Indexes a batch of files sequentially, continuing past per-file
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Validation`] only when the repository itself
    /// is not allowlisted; that aborts the run.
    pub async fn index_repo(
        &self,
        repo: &str,
        files: &[SourceFile],
        revision: &str,
        force: bool,
    ) -> Result<IndexSummary, Error> {
        if !policy::is_allowed_repo(repo) {
            return Err(IndexError::Validation {
                reason: format!("repository not in allowlist: {repo}"),
            }
            .into());
        }

        let run_id = new_run_id();
        let mut summary = IndexSummary {
            run_id: run_id.clone(),
            ..IndexSummary::default()
        };

        for file in files {
            match self
                .index_file(repo, &file.path, &file.content, revision, &run_id, force)
                .await
            {
                Ok(FileOutcome::Indexed(chunks)) => {
                    summary.documents_processed += 1;
                    summary.chunks_created += chunks;
                }
                Ok(FileOutcome::Skipped(reason)) => {
                    summary.skipped += 1;
                    info!(path = file.path, reason, "file skipped");
                }
                Err(e) => {
                    warn!(path = file.path, error = %e, "file failed; run continues");
                    summary.errors.push(format!("{}: {e}", file.path));
                }
            }
        }

        info!(
            repo,
            revision,
            processed = summary.documents_processed,
            chunks = summary.chunks_created,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            run_id = summary.run_id,
            "repository indexing complete"
        );
        Ok(summary)
    }

    /// Indexes a repository straight from the VCS host: resolves the
    /// branch, lists the tree, filters through the path policy, fetches
    /// the allowed blobs, and runs [`Indexer::index_repo`].
    ///
    /// # Errors
    ///
    /// Returns fetch errors (auth failures are fatal for the invocation)
    /// and repo-level validation errors.
    pub async fn index_repo_from_host(
        &self,
        fetcher: &dyn SourceFetcher,
        repo: &str,
        branch: &str,
        force: bool,
    ) -> Result<IndexSummary, Error> {
        if !policy::is_allowed_repo(repo) {
            return Err(IndexError::Validation {
                reason: format!("repository not in allowlist: {repo}"),
            }
            .into());
        }

        let revision = fetcher.resolve_ref(repo, branch).await.map_err(Error::Fetch)?;
        let tree = fetcher.list_tree(repo, &revision).await.map_err(Error::Fetch)?;

        let mut files: Vec<SourceFile> = Vec::new();
        for entry in tree {
            if !policy::should_index(&entry.path) {
                continue;
            }
            let bytes = fetcher
                .fetch_blob(repo, &entry.blob_id)
                .await
                .map_err(Error::Fetch)?;
            files.push(SourceFile {
                path: entry.path,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        self.index_repo(repo, &files, &revision, force).await
    }

    /// Applies a push-event delta: re-indexes added/modified paths that
    /// pass the policy, purges removed ones. Pushes off the default
    /// branch are ignored.
    ///
    /// # Errors
    ///
    /// Returns repo-level validation errors and fetch errors for the
    /// tree listing.
    pub async fn handle_webhook_push(
        &self,
        fetcher: &dyn SourceFetcher,
        event: &PushEvent,
    ) -> Result<IndexSummary, Error> {
        if event.branch != policy::DEFAULT_BRANCH {
            info!(branch = event.branch, "push ignored: not the default branch");
            return Ok(IndexSummary::default());
        }
        if !policy::is_allowed_repo(&event.repo) {
            return Err(IndexError::Validation {
                reason: format!("repository not in allowlist: {}", event.repo),
            }
            .into());
        }

        let run_id = new_run_id();
        let mut summary = IndexSummary {
            run_id: run_id.clone(),
            ..IndexSummary::default()
        };

        // Purge removed articles first so a rename never leaves stale
        // chunks behind.
        for path in &event.removed {
            if !policy::should_index(path) {
                continue;
            }
            let (repo_owned, path_owned) = (event.repo.clone(), path.clone());
            match call_blocking(&self.store, move |store| {
                store.delete_article(&repo_owned, &path_owned)
            })
            .await
            {
                Ok(_) => summary.deleted += 1,
                Err(e) => summary.errors.push(format!("{path}: {e}")),
            }
        }

        let changed: Vec<&String> = event
            .added
            .iter()
            .chain(event.modified.iter())
            .filter(|path| policy::should_index(path))
            .collect();
        if changed.is_empty() {
            return Ok(summary);
        }

        let tree = fetcher
            .list_tree(&event.repo, &event.revision)
            .await
            .map_err(Error::Fetch)?;

        for path in changed {
            let Some(entry) = tree.iter().find(|e| &e.path == path) else {
                summary
                    .errors
                    .push(format!("{path}: not present in tree at {}", event.revision));
                continue;
            };
            let content = match fetcher.fetch_blob(&event.repo, &entry.blob_id).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    summary.errors.push(format!("{path}: {e}"));
                    continue;
                }
            };
            match self
                .index_file(&event.repo, path, &content, &event.revision, &run_id, true)
                .await
            {
                Ok(FileOutcome::Indexed(chunks)) => {
                    summary.documents_processed += 1;
                    summary.chunks_created += chunks;
                }
                Ok(FileOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => summary.errors.push(format!("{path}: {e}")),
            }
        }

        Ok(summary)
    }
}

/// Generates an opaque indexing-run id.
fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wraps a per-file failure.
fn file_failed(path: &str, message: &str) -> Error {
    IndexError::FileFailed {
        path: path.to_string(),
        message: message.to_string(),
    }
    .into()
}
