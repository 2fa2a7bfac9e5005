//! Core domain types shared across the pipeline.
//!
//! Chunks and their persisted metadata, retrieval evidence, answers,
//! questions, and feedback. These are plain data types; behavior lives in
//! the subsystem modules.

mod answer;
mod chunk;
mod evidence;
mod question;

pub use answer::{
    Answer, BulletClaim, Confidence, Escalation, EscalationKind, Feedback, FeedbackLabel,
    FeedbackSource, Source,
};
pub use chunk::{ArticleChunk, ChunkMetadata, DocMatch, SourceType};
pub use evidence::{EvidencePack, FetchedArticle, RankedChunk, RetrievalMeta};
pub use question::{Attachment, ChannelKind, QuestionInput, ThreadMessage, ThreadRole};
