//! Source fetching from the upstream VCS host.
//!
//! [`SourceFetcher`] enumerates and fetches raw article bytes at a given
//! revision; [`ArticleFetcher`] is the live HTTP fetcher the agentic loop
//! tries first when the model asks for an article by URL.

mod github;
mod live;

pub use github::{GithubAuth, GithubFetcher};
pub use live::LiveFetcher;

use async_trait::async_trait;

use crate::error::FetchError;

/// One blob entry from a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repo-relative path.
    pub path: String,
    /// Host-assigned blob id.
    pub blob_id: String,
}

/// Trait for the upstream VCS host.
///
/// Authorization errors are fatal for the indexing invocation; callers do
/// not retry them.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Recursively lists repository contents at a revision.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Auth`] on credential rejection,
    /// [`FetchError::NotFound`] for unknown repos or refs, and transport
    /// errors otherwise.
    async fn list_tree(&self, repo: &str, revision: &str) -> Result<Vec<TreeEntry>, FetchError>;

    /// Fetches raw blob bytes.
    ///
    /// # Errors
    ///
    /// Same classes as [`SourceFetcher::list_tree`].
    async fn fetch_blob(&self, repo: &str, blob_id: &str) -> Result<Vec<u8>, FetchError>;

    /// Resolves a branch or ref name to a commit sha.
    ///
    /// # Errors
    ///
    /// Same classes as [`SourceFetcher::list_tree`].
    async fn resolve_ref(&self, repo: &str, reference: &str) -> Result<String, FetchError>;
}

/// Trait for fetching a rendered article by URL (the agentic loop's
/// primary fetcher).
#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Fetches an article's text content from a live URL.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on any HTTP or decoding failure; callers
    /// fall back to the stored revision.
    async fn fetch_article(&self, url: &str) -> Result<String, FetchError>;
}
