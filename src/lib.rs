//! # Lightopedia
//!
//! Internal question-answering assistant for the Light finance platform.
//!
//! Lightopedia indexes markdown help articles from allowlisted
//! repositories into a vector-capable store, then answers natural-language
//! questions with grounded, sales-safe, cited responses.
//!
//! ## Subsystems
//!
//! - **Indexing**: path policy → markdown chunking → embeddings → atomic
//!   per-article upserts ([`policy`], [`chunking`], [`embedding`],
//!   [`store`], [`fetcher`], [`indexer`])
//! - **Answering**: query routing → hybrid retrieval → a two-phase
//!   tool-calling loop → guardrails → answer assembly ([`router`],
//!   [`retrieval`], [`agent`], [`guardrail`], [`answer`])
//! - **Shells**: a thin HTTP surface and CLI; replay logs for every
//!   request ([`http`], [`cli`], [`telemetry`], [`pipeline`])

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod agent;
pub mod answer;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod fetcher;
pub mod guardrail;
pub mod http;
pub mod indexer;
pub mod pipeline;
pub mod policy;
pub mod retrieval;
pub mod router;
pub mod store;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    Answer, ArticleChunk, ChunkMetadata, Confidence, EvidencePack, Feedback, FetchedArticle,
    QuestionInput, ThreadMessage,
};

// Re-export the pipeline entry points
pub use pipeline::{Lightopedia, PIPELINE_VERSION, QuestionOutcome};

// Re-export indexing entry points
pub use indexer::{IndexSummary, Indexer, PushEvent, SourceFile};

// Re-export version constants
pub use retrieval::RETRIEVAL_VERSION;
pub use router::ROUTER_VERSION;

// Re-export store types
pub use store::{ArticleStore, SharedStore, SqliteStore, shared};
