//! Markdown chunker: heading-bounded sections, paragraph packing, and
//! size-bounded fallback splitting.

use std::sync::LazyLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::{CHUNK_OVERLAP, MAX_CHUNK_CHARS, MIN_CHUNK_CHARS, TARGET_CHUNK_CHARS};
use crate::core::ArticleChunk;

/// Recognizes a level-1–3 heading line: 1–3 hashes, whitespace, remainder.
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,3})\s+(.+)$").unwrap_or_else(|_| unreachable!()));

/// A heading-bounded span of the article, before packing.
struct Section {
    heading: Option<String>,
    lines: Vec<String>,
}

/// Splits markdown articles into bounded chunks.
///
/// Every produced chunk satisfies `MIN_CHUNK_CHARS ≤ len ≤ MAX_CHUNK_CHARS`
/// with ordinals that are 0-based, dense, and strictly increasing.
/// Chunking cannot fail: empty or whitespace-only content yields an empty
/// list.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    target_size: usize,
    overlap: usize,
    min_size: usize,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownChunker {
    /// Creates a chunker with the pinned production thresholds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target_size: TARGET_CHUNK_CHARS,
            overlap: CHUNK_OVERLAP,
            min_size: MIN_CHUNK_CHARS,
        }
    }

    /// Chunks an article.
    ///
    /// `source` identifies the article as `owner/repo/path…`; the owner and
    /// repo segments are stripped to produce the chunk's file path. The
    /// article title (first level-1 heading) is attached to every chunk,
    /// and each chunk carries the nearest covering section heading.
    #[must_use]
    pub fn chunk(&self, content: &str, source: &str) -> Vec<ArticleChunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let title = extract_title(content);
        let path = extract_file_path(source);

        let mut chunks: Vec<ArticleChunk> = Vec::new();
        for section in split_sections(content) {
            let heading = section.heading.clone();
            for text in self.pack_section(&section) {
                let trimmed = text.trim();
                if trimmed.chars().count() < self.min_size {
                    continue;
                }
                chunks.push(ArticleChunk {
                    content: trimmed.to_string(),
                    ordinal: 0, // assigned below once the set is final
                    section_heading: heading.clone(),
                    title: title.clone(),
                    path: path.clone(),
                });
            }
        }

        // Final sweep: anything still over the hard ceiling is cut at
        // target-size character boundaries.
        let mut swept: Vec<ArticleChunk> = Vec::new();
        for chunk in chunks {
            if chunk.content.chars().count() > MAX_CHUNK_CHARS {
                for piece in hard_cut(&chunk.content, self.target_size) {
                    if piece.trim().chars().count() < self.min_size {
                        continue;
                    }
                    let mut resplit = chunk.clone();
                    resplit.content = piece.trim().to_string();
                    swept.push(resplit);
                }
            } else {
                swept.push(chunk);
            }
        }

        for (ordinal, chunk) in swept.iter_mut().enumerate() {
            chunk.ordinal = ordinal;
        }
        swept
    }

    /// Packs one section's paragraphs into chunks of at most
    /// `target_size` + overlap characters, seeding the configured overlap
    /// between consecutive chunks.
    fn pack_section(&self, section: &Section) -> Vec<String> {
        let paragraphs = split_paragraphs(&section.lines);

        let mut out: Vec<String> = Vec::new();
        let mut buffer = String::new();
        for paragraph in &paragraphs {
            let pieces = if char_len(paragraph) > self.target_size {
                split_oversized(paragraph, self.target_size)
            } else {
                vec![paragraph.clone()]
            };

            for piece in pieces {
                if !buffer.is_empty()
                    && char_len(&buffer) + 2 + char_len(&piece) > self.target_size
                {
                    out.push(buffer.clone());
                    let tail = last_chars(&buffer, self.overlap);
                    buffer = format!("{tail}\n\n{piece}");
                } else if buffer.is_empty() {
                    buffer = piece;
                } else {
                    buffer.push_str("\n\n");
                    buffer.push_str(&piece);
                }
            }
        }
        if !buffer.trim().is_empty() {
            out.push(buffer);
        }
        out
    }
}

/// Splits the article into heading-bounded sections. The heading line
/// itself stays in its section's content; text before the first heading
/// forms a heading-less preamble section.
fn split_sections(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section {
        heading: None,
        lines: Vec::new(),
    };

    for line in content.lines() {
        if let Some(caps) = HEADING_RE.captures(line) {
            if !current.lines.is_empty() {
                sections.push(current);
            }
            let heading_text = caps.get(2).map(|m| m.as_str().trim().to_string());
            current = Section {
                heading: heading_text,
                lines: vec![line.to_string()],
            };
        } else {
            current.lines.push(line.to_string());
        }
    }
    if !current.lines.is_empty() {
        sections.push(current);
    }
    sections
}

/// Groups a section's lines into blank-line-separated paragraphs.
fn split_paragraphs(lines: &[String]) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}

/// Splits an oversized paragraph into pieces no longer than `limit`:
/// first at sentence boundaries, then at line boundaries, finally at hard
/// character boundaries.
fn split_oversized(text: &str, limit: usize) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    for sentence in text.split_sentence_bounds() {
        if char_len(sentence) <= limit {
            pieces.push(sentence.to_string());
        } else {
            for line in sentence.lines() {
                if char_len(line) <= limit {
                    pieces.push(line.to_string());
                } else {
                    pieces.extend(hard_cut(line, limit));
                }
            }
        }
    }
    pieces
}

/// Cuts text at exactly `limit` character boundaries.
fn hard_cut(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|window| window.iter().collect())
        .collect()
}

/// Returns the last `n` characters of a string.
fn last_chars(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Extracts the article title: the text of the first level-1 heading.
fn extract_title(content: &str) -> Option<String> {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("# ") {
            let title = rest.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

/// Strips the first two segments (owner/repo) from a source identifier.
///
/// Inputs with fewer than three segments are returned unchanged.
#[must_use]
pub fn extract_file_path(source: &str) -> String {
    let segments: Vec<&str> = source.split('/').collect();
    if segments.len() < 3 {
        return source.to_string();
    }
    segments[2..].join("/")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const SOURCE: &str = "light-platform/help-center/docs/currency.md";

    fn chunker() -> MarkdownChunker {
        MarkdownChunker::new()
    }

    #[test]
    fn test_empty_content() {
        assert!(chunker().chunk("", SOURCE).is_empty());
        assert!(chunker().chunk("   \n\n  ", SOURCE).is_empty());
    }

    #[test]
    fn test_single_short_article() {
        let content = "# Multi-currency\n\nLight supports configurable per-customer base currencies for invoicing.";
        let chunks = chunker().chunk(content, SOURCE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].title.as_deref(), Some("Multi-currency"));
        assert_eq!(chunks[0].section_heading.as_deref(), Some("Multi-currency"));
        assert_eq!(chunks[0].path, "docs/currency.md");
    }

    #[test]
    fn test_ordinals_dense_and_increasing() {
        let paragraph = "This paragraph talks about invoicing rules in detail. ".repeat(8);
        let content = format!("# Title\n\n{paragraph}\n\n## Section two\n\n{paragraph}");
        let chunks = chunker().chunk(&content, SOURCE);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn test_size_bounds() {
        let paragraph = "Invoices can be issued in any configured currency. ".repeat(40);
        let content = format!("# Title\n\n{paragraph}");
        let chunks = chunker().chunk(&content, SOURCE);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            let len = chunk.content.chars().count();
            assert!(len >= MIN_CHUNK_CHARS, "chunk too small: {len}");
            assert!(len <= MAX_CHUNK_CHARS, "chunk too large: {len}");
        }
    }

    #[test]
    fn test_oversized_single_line_hard_split() {
        // No sentence or line boundaries: must cut at target-size
        // character boundaries.
        let content = format!("# T\n\n{}", "a".repeat(1200));
        let chunks = chunker().chunk(&content, SOURCE);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= MAX_CHUNK_CHARS);
        }
    }

    #[test]
    fn test_overlap_between_consecutive_chunks() {
        let paragraph = "Billing cycles renew monthly and can be prorated per seat. ".repeat(20);
        let content = format!("# Title\n\n{paragraph}");
        let chunks = chunker().chunk(&content, SOURCE);
        assert!(chunks.len() >= 2);
        // The seed is the previous chunk's last CHUNK_OVERLAP characters;
        // trimming can shave boundary whitespace, so compare on a shorter
        // interior suffix.
        let tail = last_chars(&chunks[0].content, CHUNK_OVERLAP / 2);
        assert!(chunks[1].content.contains(&tail));
    }

    #[test]
    fn test_section_headings_tracked() {
        let body = "Light validates bank details before the first payout is released to the customer account.";
        let content = format!("# Guide\n\nIntro paragraph goes here with enough characters.\n\n## Payouts\n\n{body}\n\n### Timing\n\n{body}");
        let chunks = chunker().chunk(&content, SOURCE);
        let headings: Vec<Option<&str>> = chunks
            .iter()
            .map(|c| c.section_heading.as_deref())
            .collect();
        assert!(headings.contains(&Some("Guide")));
        assert!(headings.contains(&Some("Payouts")));
        assert!(headings.contains(&Some("Timing")));
    }

    #[test]
    fn test_heading_less_preamble() {
        let content = "Just a plain document without any headings, long enough to keep.";
        let chunks = chunker().chunk(content, SOURCE);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].section_heading.is_none());
        assert!(chunks[0].title.is_none());
    }

    #[test]
    fn test_level_four_heading_not_a_boundary() {
        let content = "# Title\n\n#### Not a section\n\nBody text that follows the deep heading and is long enough.";
        let chunks = chunker().chunk(content, SOURCE);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_heading.as_deref(), Some("Title"));
    }

    #[test]
    fn test_trailing_newline_idempotence() {
        let content = "# Title\n\nSome body text that is comfortably past the minimum length.";
        let with_newline = format!("{content}\n");
        let a = chunker().chunk(content, SOURCE);
        let b = chunker().chunk(&with_newline, SOURCE);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.content.trim_end(), y.content.trim_end());
        }
    }

    #[test]
    fn test_tiny_chunks_dropped() {
        let content = "# T\n\nok\n\nThis paragraph is long enough to survive the minimum length filter.";
        let chunks = chunker().chunk(content, SOURCE);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() >= MIN_CHUNK_CHARS);
        }
    }

    #[test_case("a/b/c/d.md", "c/d.md"; "four segments")]
    #[test_case("light-platform/help-center/docs/currency.md", "docs/currency.md"; "repo path")]
    #[test_case("a/b/c.md", "c.md"; "three segments")]
    #[test_case("a/b", "a/b"; "two segments unchanged")]
    #[test_case("README.md", "README.md"; "one segment unchanged")]
    fn test_extract_file_path(input: &str, expected: &str) {
        assert_eq!(extract_file_path(input), expected);
    }

    #[test]
    fn test_title_from_first_h1_only() {
        let content = "## Sub first\n\n# Real Title\n\nBody text long enough for the minimum filter here.";
        let chunks = chunker().chunk(content, SOURCE);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert_eq!(chunk.title.as_deref(), Some("Real Title"));
        }
    }

    #[test]
    fn test_hard_cut_exact_boundaries() {
        let pieces = hard_cut(&"x".repeat(1050), 500);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].chars().count(), 500);
        assert_eq!(pieces[1].chars().count(), 500);
        assert_eq!(pieces[2].chars().count(), 50);
    }

    #[test]
    fn test_hard_cut_multibyte() {
        let pieces = hard_cut(&"é".repeat(600), 500);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].chars().count(), 500);
    }

    proptest! {
        #[test]
        fn prop_chunks_within_bounds(content in "\\PC{0,4000}") {
            let chunks = chunker().chunk(&content, SOURCE);
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.ordinal, i);
                let len = chunk.content.chars().count();
                prop_assert!(len >= MIN_CHUNK_CHARS);
                prop_assert!(len <= MAX_CHUNK_CHARS);
            }
        }
    }
}
