//! Sliding-window text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `max_chars` characters,
//! with `overlap_chars` characters shared between consecutive chunks so that
//! a sentence straddling a boundary still appears whole in one of them.
//!
//! # Algorithm
//!
//! 1. `step = max_chars - overlap_chars`.
//! 2. Windows start at `0, step, 2·step, …` for as long as the start lies
//!    inside the text.
//! 3. Each window covers `[start, min(start + max_chars, len))`.
//!
//! Budgets count Unicode scalar values, not bytes, so a window never ends
//! inside a multi-byte character. The output is fully deterministic: chunk
//! IDs are UUID v5 values derived from the document ID and chunk index, and
//! each chunk carries a SHA-256 hash of its text.
//!
//! # Example
//!
//! ```rust
//! use codegen_harness::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 100).unwrap();
//! let text = "x".repeat(10_000);
//! assert_eq!(chunker.split("doc-1", &text).count(), 12);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Chunk;

/// Chunking configuration. Stateless aside from its two budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(Error::Config("chunking.max_chars must be > 0".to_string()));
        }
        if overlap_chars >= max_chars {
            return Err(Error::Config(format!(
                "chunking.overlap_chars ({}) must be smaller than max_chars ({})",
                overlap_chars, max_chars
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    /// Lazily split `text` into chunks belonging to `document_id`.
    ///
    /// Calling `split` again on the same input restarts the sequence and
    /// yields identical chunks.
    pub fn split<'a>(&self, document_id: &'a str, text: &'a str) -> Chunks<'a> {
        Chunks {
            document_id,
            text,
            max_chars: self.max_chars,
            step: self.max_chars - self.overlap_chars,
            byte_pos: 0,
            index: 0,
        }
    }

    /// Number of chunks [`split`](Self::split) yields for a text of
    /// `char_len` characters.
    pub fn expected_chunks(&self, char_len: usize) -> usize {
        let step = self.max_chars - self.overlap_chars;
        char_len.div_ceil(step)
    }
}

/// Iterator returned by [`Chunker::split`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document_id: &'a str,
    text: &'a str,
    max_chars: usize,
    step: usize,
    byte_pos: usize,
    index: i64,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let rest = &self.text[self.byte_pos..];
        if rest.is_empty() {
            return None;
        }

        let end = byte_offset_of_char(rest, self.max_chars);
        let next_start = byte_offset_of_char(rest, self.step);

        let chunk = make_chunk(self.document_id, self.index, &rest[..end]);
        self.index += 1;
        self.byte_pos += next_start;
        Some(chunk)
    }
}

/// Byte offset of the `n`-th character of `s`, or `s.len()` past the end.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// Deterministic chunk ID: UUID v5 over `"{document_id}:{index}"`.
pub fn chunk_id(document_id: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, index).as_bytes(),
    )
    .to_string()
}

/// SHA-256 of `text`, hex-encoded.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: hash_text(text),
    }
}
