//! GitHub REST client for listing and fetching help articles.
//!
//! Authenticates with either a personal access token or an
//! installation-scoped token minted from a GitHub App credential. The
//! installation token is selected per target repository and cached until
//! shortly before expiry.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{SourceFetcher, TreeEntry};
use crate::config::ServiceConfig;
use crate::error::FetchError;

/// Public GitHub REST endpoint.
const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Per-call HTTP timeout for host requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// App JWT validity window in seconds (GitHub caps at 10 minutes).
const APP_JWT_TTL_SECS: i64 = 540;
/// Refresh the cached installation token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 120;

/// Credential used against the VCS host.
#[derive(Debug, Clone)]
pub enum GithubAuth {
    /// Personal access token.
    Token(String),
    /// GitHub App credential; installation tokens are minted on demand.
    App {
        /// App identifier (the JWT issuer).
        app_id: String,
        /// PEM-encoded RS256 private key.
        private_key: String,
    },
    /// No credential; public repositories only.
    Anonymous,
}

impl GithubAuth {
    /// Selects a credential from service configuration: a personal token
    /// wins over an App credential.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        if let Some(ref token) = config.github_token {
            return Self::Token(token.clone());
        }
        if let (Some(app_id), Some(key)) = (
            config.github_app_id.as_ref(),
            config.github_app_private_key.as_ref(),
        ) {
            return Self::App {
                app_id: app_id.clone(),
                private_key: key.clone(),
            };
        }
        Self::Anonymous
    }
}

/// A minted installation token with its expiry.
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// GitHub-backed [`SourceFetcher`].
pub struct GithubFetcher {
    client: reqwest::Client,
    base_url: String,
    auth: GithubAuth,
    installation_token: Mutex<Option<CachedToken>>,
}

#[derive(Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationResponse {
    id: u64,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

impl GithubFetcher {
    /// Creates a fetcher against the public GitHub API.
    #[must_use]
    pub fn new(auth: GithubAuth) -> Self {
        Self::with_base_url(auth, DEFAULT_API_BASE)
    }

    /// Creates a fetcher against a custom API base (enterprise hosts,
    /// tests).
    #[must_use]
    pub fn with_base_url(auth: GithubAuth, base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("lightopedia-indexer")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            installation_token: Mutex::new(None),
        }
    }

    /// Signs a short-lived App JWT for the installations API.
    fn mint_app_jwt(app_id: &str, private_key: &str) -> Result<String, FetchError> {
        let now = Utc::now().timestamp();
        let claims = AppJwtClaims {
            iat: now - 60,
            exp: now + APP_JWT_TTL_SECS,
            iss: app_id.to_string(),
        };
        let key = EncodingKey::from_rsa_pem(private_key.as_bytes()).map_err(|e| {
            FetchError::Auth {
                message: format!("invalid app private key: {e}"),
            }
        })?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| {
            FetchError::Auth {
                message: format!("app jwt signing failed: {e}"),
            }
        })
    }

    /// Mints an installation token for the installation owning `repo`.
    async fn mint_installation_token(
        &self,
        app_id: &str,
        private_key: &str,
        repo: &str,
    ) -> Result<CachedToken, FetchError> {
        let jwt = Self::mint_app_jwt(app_id, private_key)?;

        // The host resolves the installation for the repo's owning account.
        let url = format!("{}/repos/{repo}/installation", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let installation: InstallationResponse =
            Self::check(response).await?.json().await.map_err(|e| {
                FetchError::Decode(e.to_string())
            })?;

        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.base_url, installation.id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&jwt)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let minted: AccessTokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        debug!(repo, installation = installation.id, "installation token minted");
        Ok(CachedToken {
            token: minted.token,
            expires_at: minted.expires_at,
        })
    }

    /// Returns the bearer token for a request against `repo`, minting and
    /// caching an installation token when running as an App.
    async fn bearer_for(&self, repo: &str) -> Result<Option<String>, FetchError> {
        match &self.auth {
            GithubAuth::Token(token) => Ok(Some(token.clone())),
            GithubAuth::Anonymous => Ok(None),
            GithubAuth::App {
                app_id,
                private_key,
            } => {
                let mut cache = self.installation_token.lock().await;
                let fresh_until = Utc::now()
                    + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
                if let Some(cached) = cache.as_ref()
                    && cached.expires_at > fresh_until
                {
                    return Ok(Some(cached.token.clone()));
                }
                let minted = self
                    .mint_installation_token(app_id, private_key, repo)
                    .await?;
                let token = minted.token.clone();
                *cache = Some(minted);
                Ok(Some(token))
            }
        }
    }

    /// Maps a non-success response to a [`FetchError`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let rate_limited = status == StatusCode::FORBIDDEN
            && response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        Err(map_status(status.as_u16(), rate_limited, &url, &body))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        repo: &str,
        url: &str,
    ) -> Result<T, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = self.bearer_for(repo).await? {
            request = request.bearer_auth(token);
        }
        let response = Self::check(request.send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

/// Classifies a non-success status into an error kind.
fn map_status(status: u16, rate_limited: bool, resource: &str, body: &str) -> FetchError {
    match status {
        401 => FetchError::Auth {
            message: format!("credentials rejected: {body}"),
        },
        403 if rate_limited => FetchError::RateLimited,
        403 => FetchError::Auth {
            message: format!("access forbidden: {body}"),
        },
        404 => FetchError::NotFound {
            resource: resource.to_string(),
        },
        _ => FetchError::Http {
            status,
            message: body.chars().take(200).collect(),
        },
    }
}

/// Decodes GitHub's newline-wrapped base64 blob content.
fn decode_blob(content: &str, encoding: &str) -> Result<Vec<u8>, FetchError> {
    match encoding {
        "base64" => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            BASE64
                .decode(compact)
                .map_err(|e| FetchError::Decode(e.to_string()))
        }
        "utf-8" => Ok(content.as_bytes().to_vec()),
        other => Err(FetchError::Decode(format!("unknown blob encoding: {other}"))),
    }
}

#[async_trait]
impl SourceFetcher for GithubFetcher {
    async fn list_tree(&self, repo: &str, revision: &str) -> Result<Vec<TreeEntry>, FetchError> {
        let url = format!(
            "{}/repos/{repo}/git/trees/{revision}?recursive=1",
            self.base_url
        );
        let tree: TreeResponse = self.get_json(repo, &url).await?;
        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                blob_id: item.sha,
            })
            .collect())
    }

    async fn fetch_blob(&self, repo: &str, blob_id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/repos/{repo}/git/blobs/{blob_id}", self.base_url);
        let blob: BlobResponse = self.get_json(repo, &url).await?;
        decode_blob(&blob.content, &blob.encoding)
    }

    async fn resolve_ref(&self, repo: &str, reference: &str) -> Result<String, FetchError> {
        let url = format!("{}/repos/{repo}/commits/{reference}", self.base_url);
        let commit: CommitResponse = self.get_json(repo, &url).await?;
        Ok(commit.sha)
    }
}

impl std::fmt::Debug for GithubFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubFetcher")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_selection_prefers_token() {
        let config = ServiceConfig::builder()
            .api_key("sk")
            .github_token("ghp_x")
            .github_app("1", "pem")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(GithubAuth::from_config(&config), GithubAuth::Token(_)));
    }

    #[test]
    fn test_auth_selection_app_then_anonymous() {
        let config = ServiceConfig::builder()
            .api_key("sk")
            .github_app("1", "pem")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(GithubAuth::from_config(&config), GithubAuth::App { .. }));

        let config = ServiceConfig::builder()
            .api_key("sk")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            GithubAuth::from_config(&config),
            GithubAuth::Anonymous
        ));
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(401, false, "r", "bad creds"),
            FetchError::Auth { .. }
        ));
        assert!(matches!(
            map_status(403, true, "r", ""),
            FetchError::RateLimited
        ));
        assert!(matches!(
            map_status(403, false, "r", ""),
            FetchError::Auth { .. }
        ));
        assert!(matches!(
            map_status(404, false, "r", ""),
            FetchError::NotFound { .. }
        ));
        assert!(matches!(
            map_status(502, false, "r", ""),
            FetchError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_decode_blob_base64_with_newlines() {
        // "hello" base64 is aGVsbG8=, wrapped as the host does.
        let decoded = decode_blob("aGVs\nbG8=\n", "base64").unwrap_or_default();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_blob_unknown_encoding() {
        assert!(matches!(
            decode_blob("x", "rot13"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_invalid_app_key_is_auth_error() {
        let result = GithubFetcher::mint_app_jwt("1", "not a pem");
        assert!(matches!(result, Err(FetchError::Auth { .. })));
    }
}
