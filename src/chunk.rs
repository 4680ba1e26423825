//! Natural-boundary chunking with AI-assisted splitting.
//!
//! Paragraphs are accumulated into segments of at most `max_words` words
//! (see [`split_natural_boundaries`]). Segments within budget become
//! chunks unchanged. A segment that is still too large is sent to the
//! completion API with a request for a JSON array of sub-chunks.
//!
//! The model's answer is accepted only when it is a JSON array of
//! non-empty strings, each within budget, whose words concatenate to
//! exactly the segment's words. Anything else (malformed JSON, dropped or
//! rewritten text, a request failure, or an expired deadline) windows that
//! one segment with the configured [`ChunkWindow`]; the rest of the article
//! is unaffected.

use anyhow::Result;
use saransh_core::chunk::{make_chunk, split_natural_boundaries, window_chunks, ChunkWindow, Segment};
use saransh_core::models::Chunk;
use saransh_core::parse::{parse_string_list, ParseFailure};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{RequestFailure, ResilientClient};
use crate::config::ChunkingConfig;
use crate::deadline::{expired, Deadline};

const SPLIT_SYSTEM_PROMPT: &str = "You are a text chunking expert. Return only a JSON array.";

/// Chunks plus a record of how they were produced.
#[derive(Debug, Clone, Default)]
pub struct ChunkOutcome {
    pub chunks: Vec<Chunk>,
    /// Oversized segments split by the model.
    pub ai_splits: usize,
    /// Oversized segments windowed because the model's split was unusable.
    pub window_fallbacks: usize,
    /// The deadline passed before every oversized segment was offered to
    /// the model.
    pub cancelled: bool,
}

#[derive(Debug, Error)]
enum SplitRejected {
    #[error(transparent)]
    Request(#[from] RequestFailure),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error("split does not preserve the segment text")]
    TextChanged,
    #[error("sub-chunk of {0} words exceeds the budget")]
    Oversized(usize),
}

pub struct SemanticChunker {
    client: ResilientClient,
    window: ChunkWindow,
}

impl SemanticChunker {
    pub fn new(client: ResilientClient, window: ChunkWindow) -> Self {
        Self { client, window }
    }

    pub fn from_config(client: ResilientClient, config: &ChunkingConfig) -> Result<Self> {
        let window = ChunkWindow::new(config.max_words, config.overlap_words)?;
        Ok(Self::new(client, window))
    }

    /// Chunk `text`. Never fails; chunk indices are contiguous from 0.
    pub async fn chunk(&self, text: &str, deadline: Option<Deadline>) -> ChunkOutcome {
        let max_words = self.window.max_words();
        let mut outcome = ChunkOutcome::default();
        let client = self.client.within(deadline);

        for segment in split_natural_boundaries(text, max_words) {
            let next_index = outcome.chunks.len();

            if !segment.is_oversized(max_words) {
                outcome.chunks.push(make_chunk(
                    next_index,
                    &segment.text,
                    segment.start_word,
                    segment.end_word(),
                ));
                continue;
            }

            if expired(deadline) {
                outcome.cancelled = true;
                outcome.window_fallbacks += 1;
                outcome.chunks.extend(self.window_segment(&segment, next_index));
                continue;
            }

            match self.split_with_ai(&client, &segment).await {
                Ok(pieces) => {
                    debug!(
                        start_word = segment.start_word,
                        pieces = pieces.len(),
                        "segment split by model"
                    );
                    outcome.ai_splits += 1;
                    outcome.chunks.extend(pieces_to_chunks(&pieces, &segment, next_index));
                }
                Err(e) => {
                    warn!(
                        start_word = segment.start_word,
                        words = segment.word_count,
                        error = %e,
                        "model split unusable, windowing segment"
                    );
                    outcome.window_fallbacks += 1;
                    outcome.chunks.extend(self.window_segment(&segment, next_index));
                }
            }
        }

        info!(
            chunks = outcome.chunks.len(),
            ai_splits = outcome.ai_splits,
            window_fallbacks = outcome.window_fallbacks,
            "article chunked"
        );
        outcome
    }

    fn window_segment(&self, segment: &Segment, first_index: usize) -> Vec<Chunk> {
        window_chunks(&segment.words(), segment.start_word, &self.window, first_index)
    }

    async fn split_with_ai(
        &self,
        client: &ResilientClient,
        segment: &Segment,
    ) -> Result<Vec<String>, SplitRejected> {
        let prompt = format!(
            "Split this text into smaller, coherent chunks of maximum {} words each.\n\
             Preserve meaning and context. Do not add, drop, or rewrite any words.\n\
             Return a JSON array of text chunks.\n\nText: {}",
            self.window.max_words(),
            segment.text
        );
        let raw = client.ask(SPLIT_SYSTEM_PROMPT, &prompt).await?;
        let pieces = parse_string_list(&raw, "chunks")?;
        validate_split(&segment.words(), pieces, self.window.max_words())
    }
}

/// Accept `pieces` only if they partition `words` exactly and each fits
/// within `max_words`.
fn validate_split(
    words: &[&str],
    pieces: Vec<String>,
    max_words: usize,
) -> Result<Vec<String>, SplitRejected> {
    let mut cursor = 0;
    for piece in &pieces {
        let piece_words: Vec<&str> = piece.split_whitespace().collect();
        if piece_words.len() > max_words {
            return Err(SplitRejected::Oversized(piece_words.len()));
        }
        let end = cursor + piece_words.len();
        if end > words.len() || words[cursor..end] != piece_words[..] {
            return Err(SplitRejected::TextChanged);
        }
        cursor = end;
    }
    if cursor != words.len() || pieces.is_empty() {
        return Err(SplitRejected::TextChanged);
    }
    Ok(pieces)
}

fn pieces_to_chunks(pieces: &[String], segment: &Segment, first_index: usize) -> Vec<Chunk> {
    let mut start = segment.start_word;
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let count = piece.split_whitespace().count();
            let chunk = make_chunk(first_index + i, piece.trim(), start, start + count);
            start += count;
            chunk
        })
        .collect()
}
