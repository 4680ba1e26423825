//! Word-window and paragraph-boundary chunking.
//!
//! Two building blocks live here, both free of any AI dependency:
//!
//! - [`chunk_fixed`] slides a window of `max_words` words over the article,
//!   advancing by `max_words - overlap_words` each step.
//! - [`split_natural_boundaries`] accumulates blank-line separated
//!   paragraphs into [`Segment`]s that stay within `max_words` where
//!   possible. A single paragraph larger than the budget becomes its own
//!   oversized segment; the app crate decides how to split it further.
//!
//! Every chunk records exact word offsets into the article's
//! whitespace-token sequence, a SHA-256 hash of its content, and a UUID.
//!
//! # Example
//!
//! ```rust
//! use saransh_core::chunk::chunk_text;
//!
//! let text = (0..650).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
//! let chunks = chunk_text(&text, 300, 50).unwrap();
//! let ends: Vec<usize> = chunks.iter().map(|c| c.end_position).collect();
//! assert_eq!(ends, vec![300, 550, 650]);
//! ```

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Paragraph separator used for natural-boundary splitting.
const PARAGRAPH_BREAK: &str = "\n\n";

/// Validated sliding-window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    max_words: usize,
    overlap_words: usize,
}

impl ChunkWindow {
    /// Create a window of `max_words` with `overlap_words` shared between
    /// consecutive windows.
    ///
    /// # Errors
    ///
    /// Fails when `max_words` is zero or `overlap_words >= max_words`
    /// (the window would never advance).
    pub fn new(max_words: usize, overlap_words: usize) -> Result<Self> {
        if max_words == 0 {
            bail!("chunk size must be > 0");
        }
        if overlap_words >= max_words {
            bail!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap_words,
                max_words
            );
        }
        Ok(Self {
            max_words,
            overlap_words,
        })
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap_words
    }

    /// Distance between consecutive window starts. Always > 0.
    pub fn step(&self) -> usize {
        self.max_words - self.overlap_words
    }

    /// Half-open word ranges covering `word_count` words.
    pub fn ranges(&self, word_count: usize) -> Vec<(usize, usize)> {
        (0..word_count)
            .step_by(self.step())
            .map(|start| (start, (start + self.max_words).min(word_count)))
            .collect()
    }
}

/// Split `text` into fixed-size overlapping chunks.
///
/// This is the exposed `chunk` operation. Returns an empty list for text
/// without any words.
///
/// # Errors
///
/// Fails only on invalid window parameters (see [`ChunkWindow::new`]).
pub fn chunk_text(text: &str, max_words: usize, overlap_words: usize) -> Result<Vec<Chunk>> {
    let window = ChunkWindow::new(max_words, overlap_words)?;
    Ok(chunk_fixed(text, &window))
}

/// Split `text` with an already validated window.
///
/// # Guarantees
///
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - `end_position - start_position == word_count` for every chunk.
/// - The ranges cover `[0, word_count)` with no gap.
pub fn chunk_fixed(text: &str, window: &ChunkWindow) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    window_chunks(&words, 0, window, 0)
}

/// Window a word slice that begins at article offset `base`, numbering the
/// produced chunks from `first_index`.
///
/// Used by the fixed chunker and by the semantic chunker when it falls back
/// on a single oversized segment.
pub fn window_chunks(
    words: &[&str],
    base: usize,
    window: &ChunkWindow,
    first_index: usize,
) -> Vec<Chunk> {
    window
        .ranges(words.len())
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| {
            make_chunk(
                first_index + i,
                &words[start..end].join(" "),
                base + start,
                base + end,
            )
        })
        .collect()
}

/// A run of whole paragraphs, located by word offset within the article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub start_word: usize,
    pub word_count: usize,
}

impl Segment {
    pub fn end_word(&self) -> usize {
        self.start_word + self.word_count
    }

    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// True when the segment alone is larger than the budget.
    pub fn is_oversized(&self, max_words: usize) -> bool {
        self.word_count > max_words
    }
}

/// Accumulate paragraphs into segments of at most `max_words` words.
///
/// A paragraph is appended to the current segment while the combined word
/// count stays within `max_words`; otherwise the current segment is flushed
/// and the paragraph starts a new one. Blank paragraphs are skipped.
/// Segments are joined with a blank line and trimmed.
pub fn split_natural_boundaries(text: &str, max_words: usize) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buf = String::new();
    let mut buf_words = 0usize;
    let mut buf_start = 0usize;
    let mut offset = 0usize;

    for para in text.split(PARAGRAPH_BREAK) {
        let trimmed = para.trim();
        let para_words = trimmed.split_whitespace().count();
        if para_words == 0 {
            continue;
        }

        if buf_words > 0 && buf_words + para_words > max_words {
            segments.push(Segment {
                text: std::mem::take(&mut buf),
                start_word: buf_start,
                word_count: buf_words,
            });
            buf_words = 0;
        }

        if buf_words == 0 {
            buf_start = offset;
        } else {
            buf.push_str(PARAGRAPH_BREAK);
        }
        buf.push_str(trimmed);
        buf_words += para_words;
        offset += para_words;
    }

    if buf_words > 0 {
        segments.push(Segment {
            text: buf,
            start_word: buf_start,
            word_count: buf_words,
        });
    }

    segments
}

/// Build a chunk with a fresh UUID and a SHA-256 content hash.
pub fn make_chunk(index: usize, content: &str, start_position: usize, end_position: usize) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        content: content.to_string(),
        word_count: content.split_whitespace().count(),
        start_position,
        end_position,
        hash,
    }
}
