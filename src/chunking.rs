//! Splitting loaded documents into retrieval-sized passages.
//!
//! Each document is cleaned (newlines removed) and then split with a
//! recursive boundary-preference splitter: the text is cut at the first
//! separator in [`SEPARATORS`] that occurs in it, pieces that still exceed
//! the chunk size are split again with the next separator, and the final
//! empty separator falls back to single characters. Adjacent small pieces
//! are merged back together up to the chunk size.
//!
//! Separators stay attached to the piece they end, so joining a document's
//! chunks reproduces its cleaned text up to whitespace at chunk edges.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    document::Document,
    error::{Error, Result},
};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between chunks in characters (0 to minimize chunk count).
pub const DEFAULT_CHUNK_OVERLAP: usize = 0;

/// Boundaries tried in order: paragraph, line, sentence, word, character.
pub const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunking configuration.
///
/// # Examples
///
/// ```
/// use docrag::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Reject sizes the splitter cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Split("chunk size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Split(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Where a chunk sits inside the document it came from.
///
/// Offsets are character positions in the cleaned document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLocation {
    /// 1-based position of the source document in the load order.
    pub page: usize,
    pub start: usize,
    pub end: usize,
}

/// A passage of text from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Which document the chunk came from, e.g. `"Page: 3"`.
    pub source_ref: String,
    /// Zero-based position in the global chunk sequence.
    pub index: usize,
    pub location: ChunkLocation,
}

/// Remove newline characters the way the ingestion pipeline expects.
pub fn clean_text(text: &str) -> String {
    text.replace(['\r', '\n'], "")
}

/// Split every document into chunks, in document order.
///
/// Chunks of document 1 come first, then document 2, and so on; each is
/// tagged `"Page: {n}"` with the 1-based document position. Documents that
/// clean to nothing yield no chunks.
///
/// # Examples
///
/// ```
/// use docrag::chunking::{chunk_documents, ChunkingConfig};
/// use docrag::document::Document;
///
/// let docs = vec![
///     Document::new("first page", "a.pdf#page=1"),
///     Document::new("second page", "a.pdf#page=2"),
/// ];
/// let chunks = chunk_documents(&docs, &ChunkingConfig::default()).unwrap();
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[1].source_ref, "Page: 2");
/// assert_eq!(chunks[1].index, 1);
/// ```
pub fn chunk_documents(
    documents: &[Document],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    let mut chunks = Vec::new();
    for (i, doc) in documents.iter().enumerate() {
        let page = i + 1;
        let cleaned = clean_text(&doc.content);

        for (start, text) in
            split_spans(&cleaned, config.chunk_size, config.overlap)
        {
            let end = start + char_len(&text);
            chunks.push(Chunk {
                index: chunks.len(),
                source_ref: format!("Page: {page}"),
                location: ChunkLocation { page, start, end },
                text,
            });
        }
    }

    tracing::debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        "split documents"
    );
    Ok(chunks)
}

/// Split a single text into trimmed, non-empty pieces of at most
/// `chunk_size` characters.
///
/// # Examples
///
/// ```
/// use docrag::chunking::split_text;
///
/// let chunks = split_text("Hello, world!", 1000, 0);
/// assert_eq!(chunks, vec!["Hello, world!".to_string()]);
///
/// let text = "word ".repeat(500);
/// let chunks = split_text(&text, 100, 0);
/// assert!(chunks.iter().all(|c| c.chars().count() <= 100));
/// ```
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<String> {
    split_spans(text, chunk_size, overlap)
        .into_iter()
        .map(|(_, piece)| piece)
        .collect()
}

/// A slice of the text being split, with its character offset.
#[derive(Debug, Clone, Copy)]
struct Span<'a> {
    start: usize,
    text: &'a str,
}

/// Like [`split_text`], paired with each chunk's character offset in `text`.
fn split_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<(usize, String)> {
    if chunk_size == 0 {
        return Vec::new();
    }

    let whole = Span { start: 0, text };
    split_recursive(whole, SEPARATORS, chunk_size, overlap)
        .into_iter()
        .filter_map(|(start, piece)| {
            let trimmed = piece.trim_start();
            let leading = char_len(&piece[..piece.len() - trimmed.len()]);
            let trimmed = trimmed.trim_end();
            (!trimmed.is_empty())
                .then(|| (start + leading, trimmed.to_string()))
        })
        .collect()
}

fn split_recursive(
    span: Span<'_>,
    separators: &[&str],
    chunk_size: usize,
    overlap: usize,
) -> Vec<(usize, String)> {
    let text = span.text;
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let remaining = separators.get(position + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    };

    let mut output = Vec::new();
    let mut pending: Vec<Span<'_>> = Vec::new();
    let mut offset = span.start;

    for piece in pieces {
        let piece = Span {
            start: offset,
            text: piece,
        };
        offset += char_len(piece.text);

        if char_len(piece.text) <= chunk_size {
            pending.push(piece);
            continue;
        }

        // Only multi-character pieces get here, so a separator remains.
        output.extend(merge_pieces(&pending, chunk_size, overlap));
        pending.clear();
        output.extend(split_recursive(piece, remaining, chunk_size, overlap));
    }
    output.extend(merge_pieces(&pending, chunk_size, overlap));

    output
}

/// Greedily join consecutive pieces up to `chunk_size`, carrying up to
/// `overlap` characters of trailing pieces into the next chunk.
fn merge_pieces(
    pieces: &[Span<'_>],
    chunk_size: usize,
    overlap: usize,
) -> Vec<(usize, String)> {
    let mut merged = Vec::new();
    let mut window: VecDeque<Span<'_>> = VecDeque::new();
    let mut total = 0;

    for &piece in pieces {
        let len = char_len(piece.text);

        if total + len > chunk_size
            && let Some(first) = window.front()
        {
            merged.push((first.start, join(&window)));

            while total > overlap || (total + len > chunk_size && total > 0) {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front.text);
            }
        }

        window.push_back(piece);
        total += len;
    }

    if let Some(first) = window.front() {
        merged.push((first.start, join(&window)));
    }

    merged
}

fn join(window: &VecDeque<Span<'_>>) -> String {
    window.iter().map(|span| span.text).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn strip_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = split_text("Hello, world!", DEFAULT_CHUNK_SIZE, 0);
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(split_text("", 100, 0).is_empty());
        assert!(split_text("   ", 100, 0).is_empty());
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "First sentence here. Second sentence here. Third one.";
        let chunks = split_text(text, 25, 0);
        assert_eq!(
            chunks,
            vec![
                "First sentence here.",
                "Second sentence here.",
                "Third one."
            ]
        );
    }

    #[test]
    fn falls_back_to_words_then_characters() {
        let text = format!("tiny {} tail", "x".repeat(25));
        let chunks = split_text(&text, 10, 0);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.first().map(String::as_str), Some("tiny"));
        assert_eq!(chunks.last().map(String::as_str), Some("tail"));
        assert_eq!(strip_whitespace(&chunks.concat()), strip_whitespace(&text));
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let text = "one two three four five six seven eight";
        let chunks = split_text(text, 14, 6);
        assert!(chunks.len() >= 2);
        let first_last_word = chunks[0].split(' ').next_back().unwrap();
        assert!(chunks[1].starts_with(first_last_word));
    }

    #[test]
    fn handles_multibyte_chars() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(50);
        let chunks = split_text(&text, 30, 0);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[test]
    fn documents_tagged_with_page_numbers() {
        let docs = vec![
            Document::new("alpha beta", "a.pdf#page=1"),
            Document::new("", "a.pdf#page=2"),
            Document::new("gamma\ndelta", "a.pdf#page=3"),
        ];
        let chunks =
            chunk_documents(&docs, &ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_ref, "Page: 1");
        assert_eq!(chunks[1].source_ref, "Page: 3");
        assert_eq!(chunks[1].text, "gammadelta");
        assert_eq!(chunks[1].index, 1);
        assert_eq!(
            chunks[1].location,
            ChunkLocation {
                page: 3,
                start: 0,
                end: 10
            }
        );
    }

    #[test]
    fn locations_track_offsets() {
        let docs = vec![Document::new("aaaa bbbb cccc", "doc.txt")];
        let config = ChunkingConfig {
            chunk_size: 5,
            overlap: 0,
        };
        let chunks = chunk_documents(&docs, &config).unwrap();
        let starts: Vec<_> = chunks.iter().map(|c| c.location.start).collect();
        assert_eq!(starts, vec![0, 5, 10]);
    }

    #[test]
    fn repeated_text_gets_distinct_offsets() {
        let docs = vec![Document::new("aaa", "doc.txt")];
        let config = ChunkingConfig {
            chunk_size: 2,
            overlap: 0,
        };
        let chunks = chunk_documents(&docs, &config).unwrap();
        let spans: Vec<_> = chunks
            .iter()
            .map(|c| (c.text.as_str(), c.location.start, c.location.end))
            .collect();
        assert_eq!(spans, vec![("aa", 0, 2), ("a", 2, 3)]);
    }

    #[test]
    fn repeated_words_map_back_to_their_text() {
        let cleaned = "echo echo echo echo echo";
        let docs = vec![Document::new(cleaned, "doc.txt")];
        let config = ChunkingConfig {
            chunk_size: 10,
            overlap: 5,
        };
        let chunks = chunk_documents(&docs, &config).unwrap();
        let starts: Vec<_> = chunks.iter().map(|c| c.location.start).collect();
        assert_eq!(starts, vec![0, 5, 10, 15]);

        let chars: Vec<char> = cleaned.chars().collect();
        let mut previous = None;
        for chunk in &chunks {
            let ChunkLocation { start, end, .. } = chunk.location;
            let slice: String = chars[start..end].iter().collect();
            assert_eq!(slice, chunk.text);
            assert!(previous.is_none_or(|p| start > p));
            previous = Some(start);
        }
    }

    #[test]
    fn unbroken_run_is_cut_at_chunk_size() {
        let chunks = split_text(&"z".repeat(25), 10, 0);
        let lengths: Vec<_> =
            chunks.iter().map(|c| c.chars().count()).collect();
        assert_eq!(lengths, vec![10, 10, 5]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let docs = vec![Document::new("text", "doc.txt")];
        let zero = ChunkingConfig {
            chunk_size: 0,
            overlap: 0,
        };
        assert!(matches!(
            chunk_documents(&docs, &zero),
            Err(Error::Split(_))
        ));

        let wide = ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
        };
        assert!(matches!(
            chunk_documents(&docs, &wide),
            Err(Error::Split(_))
        ));
    }

    proptest! {
        #[test]
        fn chunks_respect_size_bound(
            text in "[a-z .\n]{0,400}",
            size in 1usize..80,
        ) {
            for chunk in split_text(&text, size, 0) {
                prop_assert!(chunk.chars().count() <= size);
                prop_assert!(!chunk.is_empty());
            }
        }

        #[test]
        fn chunks_cover_text(
            text in "[a-zé .]{0,400}",
            size in 1usize..80,
        ) {
            let chunks = split_text(&text, size, 0);
            prop_assert_eq!(
                strip_whitespace(&chunks.concat()),
                strip_whitespace(&text)
            );
        }
    }
}
