//! Markdown chunking for the indexing pipeline.
//!
//! Splits help articles into semantically bounded, size-bounded chunks with
//! preserved section headings. Sizes are measured in characters, not bytes.

mod markdown;

pub use markdown::{MarkdownChunker, extract_file_path};

/// Minimum chunk length; shorter chunks are dropped after trimming.
pub const MIN_CHUNK_CHARS: usize = 20;

/// Target (soft ceiling) chunk length for paragraph packing.
pub const TARGET_CHUNK_CHARS: usize = 500;

/// Overlap seeded between consecutive chunks of one article.
pub const CHUNK_OVERLAP: usize = 50;

/// Hard ceiling: no chunk may exceed this under any circumstance
/// (1.5 × the target size).
pub const MAX_CHUNK_CHARS: usize = TARGET_CHUNK_CHARS + TARGET_CHUNK_CHARS / 2;
