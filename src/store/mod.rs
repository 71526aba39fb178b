//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the storage seam of the harness: it persists
//! documents with their chunks and embeddings, and answers nearest-neighbour
//! queries. Two backends exist:
//!
//! - [`SqliteIndex`]: durable, the default for the CLI and server.
//! - [`InMemoryIndex`]: ephemeral, used by tests and embedded callers.
//!
//! # Contract
//!
//! | Method | Guarantee |
//! |--------|-----------|
//! | [`replace_document`](VectorIndex::replace_document) | All-or-nothing: the old chunks of a same-named document are gone and the new ones visible, or nothing changed |
//! | [`query`](VectorIndex::query) | At most `k` results, descending cosine similarity, ties by `(document_id, chunk_index)` |
//! | [`dimension`](VectorIndex::dimension) | Fixed by the first insert and never changes afterwards |
//!
//! A vector whose length disagrees with the recorded dimension is rejected
//! with [`Error::DimensionMismatch`](crate::error::Error::DimensionMismatch)
//! on both insert and query.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::models::{Chunk, Document, ScoredChunk};

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// Summary counters reported by [`VectorIndex::stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dims: Option<usize>,
    pub last_ingested_at: Option<i64>,
    pub by_format: Vec<FormatStats>,
}

/// Per-format breakdown, sorted by document count descending.
#[derive(Debug, Clone, Serialize)]
pub struct FormatStats {
    pub format: String,
    pub documents: usize,
    pub chunks: usize,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The embedding dimension recorded by the first insert, if any.
    async fn dimension(&self) -> Result<Option<usize>>;

    /// Look up a stored document by its name.
    async fn find_document(&self, name: &str) -> Result<Option<Document>>;

    /// Store `doc` with its chunks and their vectors, replacing any document
    /// of the same name atomically.
    ///
    /// `vectors[i]` is the embedding of `chunks[i]`.
    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Return up to `k` chunks most similar to `vector`.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Check a batch of vectors before insert: one per chunk, all the same
/// length, and matching the recorded dimension when there is one.
///
/// Returns the batch dimension, or `None` for an empty batch.
pub(crate) fn check_insert(
    recorded: Option<usize>,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> Result<Option<usize>> {
    if chunks.len() != vectors.len() {
        return Err(Error::Ingestion(format!(
            "{} chunks but {} vectors",
            chunks.len(),
            vectors.len()
        )));
    }
    let Some(first) = vectors.first() else {
        return Ok(None);
    };
    let expected = recorded.unwrap_or(first.len());
    if expected == 0 {
        return Err(Error::DimensionMismatch {
            expected: 1,
            actual: 0,
        });
    }
    for v in vectors {
        if v.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: v.len(),
            });
        }
    }
    Ok(Some(expected))
}

/// Sort scored chunks by descending score, breaking ties by
/// `(document_id, chunk_index)`, and keep the first `k`.
pub(crate) fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(doc: &str, index: i64, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: format!("{}-{}", doc, index),
                document_id: doc.to_string(),
                chunk_index: index,
                text: String::new(),
                hash: String::new(),
            },
            score,
        }
    }

    #[test]
    fn rank_orders_by_score_then_position() {
        let ranked = rank(
            vec![
                scored("b", 0, 0.5),
                scored("a", 1, 0.5),
                scored("a", 0, 0.5),
                scored("c", 0, 0.9),
            ],
            3,
        );
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c-0", "a-0", "a-1"]);
    }

    #[test]
    fn check_insert_rejects_ragged_batches() {
        let chunks = vec![scored("a", 0, 0.0).chunk, scored("a", 1, 0.0).chunk];
        let err = check_insert(None, &chunks, &[vec![0.0; 3], vec![0.0; 4]]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));
        let err = check_insert(Some(8), &chunks, &[vec![0.0; 3], vec![0.0; 3]]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, .. }));
        assert_eq!(
            check_insert(Some(3), &chunks, &[vec![0.0; 3], vec![0.0; 3]]).unwrap(),
            Some(3)
        );
    }
}
