//! Error types for Lightopedia operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! subsystems: the article store, the source fetcher, LLM transport,
//! indexing, and the agentic loop.

use thiserror::Error;

/// Result type alias for Lightopedia operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for Lightopedia operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Article store errors (database operations).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Source fetcher errors (VCS host operations).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// LLM transport errors (embeddings and completions).
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Indexing pipeline errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Agentic loop errors.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// The caller cancelled the request before completion.
    #[error("request cancelled")]
    Cancelled,
}

/// Article-store errors for database operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Embedding dimension does not match the pinned model dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// A chunk batch and its embedding batch differ in length.
    #[error("chunk/embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    EmbeddingCountMismatch {
        /// Number of chunks in the batch.
        chunks: usize,
        /// Number of embeddings in the batch.
        embeddings: usize,
    },

    /// Store RPC exceeded its per-call budget.
    #[error("store call timed out after {budget_ms}ms")]
    Timeout {
        /// Per-call budget that was exceeded, in milliseconds.
        budget_ms: u64,
    },

    /// No replay log exists for the requested id.
    #[error("no request log for {request_id}")]
    LogNotFound {
        /// The request id that was looked up.
        request_id: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Source-fetcher errors for VCS host operations.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Upstream rejected the configured credentials.
    #[error("authorization failed: {message}")]
    Auth {
        /// Upstream rejection detail.
        message: String,
    },

    /// Repository, ref, or blob not found upstream.
    #[error("not found: {resource}")]
    NotFound {
        /// The missing resource (repo, ref, or blob id).
        resource: String,
    },

    /// Upstream rate limit exceeded.
    #[error("rate limited by upstream host")]
    RateLimited,

    /// Non-success HTTP response from the upstream host.
    #[error("upstream returned {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response detail.
        message: String,
    },

    /// Transport-level failure (connection, TLS, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// Blob content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// LLM transport errors for embedding and completion calls.
#[derive(Error, Debug)]
pub enum LlmError {
    /// External call exceeded its budget.
    #[error("llm call timed out after {budget_ms}ms")]
    Timeout {
        /// Per-call budget that was exceeded, in milliseconds.
        budget_ms: u64,
    },

    /// Non-success response from the provider.
    #[error("upstream failure: {message}")]
    Upstream {
        /// Provider error detail.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// Provider returned malformed output (JSON expected).
    #[error("parse error: {message}")]
    Parse {
        /// What failed to parse.
        message: String,
    },

    /// The provider returned a batch of unexpected shape.
    #[error("embedding batch mismatch: sent {sent} texts, received {received} vectors")]
    BatchMismatch {
        /// Number of texts in the request.
        sent: usize,
        /// Number of vectors in the response.
        received: usize,
    },

    /// Unknown provider name in configuration.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },
}

/// Indexing pipeline errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Path or repository rejected by the indexing policy.
    #[error("validation failed: {reason}")]
    Validation {
        /// Human-readable denial reason from the policy module.
        reason: String,
    },

    /// A file failed partway through the chunk/embed/upsert pipeline.
    #[error("indexing {path} failed: {message}")]
    FileFailed {
        /// Path of the failing file.
        path: String,
        /// Underlying failure detail.
        message: String,
    },
}

/// Agentic-loop errors.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool execution failed. Rendered back to the model as tool-message
    /// content rather than propagating.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure detail.
        message: String,
    },
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Transport("request timed out".to_string());
        }
        err.status().map_or_else(
            || Self::Transport(err.to_string()),
            |status| Self::Http {
                status: status.as_u16(),
                message: err.to_string(),
            },
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config {
            message: "missing db path".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: missing db path");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::LogNotFound {
            request_id: "req-1".to_string(),
        };
        assert_eq!(err.to_string(), "no request log for req-1");

        let err = StoreError::DimensionMismatch {
            expected: 1536,
            actual: 1024,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: expected 1536, got 1024"
        );
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::NotFound {
            resource: "light-platform/help-center@deadbeef".to_string(),
        };
        assert!(err.to_string().contains("help-center"));

        let err = FetchError::Http {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Timeout { budget_ms: 5000 };
        assert_eq!(err.to_string(), "llm call timed out after 5000ms");

        let err = LlmError::BatchMismatch {
            sent: 3,
            received: 2,
        };
        assert!(err.to_string().contains("3 texts"));
    }

    #[test]
    fn test_index_error_display() {
        let err = IndexError::Validation {
            reason: "path matches deny pattern: node_modules/**".to_string(),
        };
        assert!(err.to_string().contains("deny pattern"));
    }

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::ToolExecution {
            name: "fetch_articles".to_string(),
            message: "too many urls".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "tool 'fetch_articles' failed: too many urls"
        );
    }

    #[test]
    fn test_error_from_store() {
        let err: Error = StoreError::Database("locked".to_string()).into();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_error_from_fetch() {
        let err: Error = FetchError::RateLimited.into();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[test]
    fn test_error_from_llm() {
        let err: Error = LlmError::Timeout { budget_ms: 5000 }.into();
        assert!(matches!(err, Error::Llm(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::Store(StoreError::Database(_))));
    }

    #[test]
    fn test_from_serde_json_error_to_store() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("x").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_from_serde_json_error_to_llm() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("x").unwrap_err();
        let err: LlmError = json_err.into();
        assert!(matches!(err, LlmError::Parse { .. }));
    }
}
