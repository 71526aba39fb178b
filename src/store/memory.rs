//! In-memory [`VectorIndex`] for tests and ephemeral use.
//!
//! Documents, chunks and vectors live behind one `std::sync::RwLock`, so a
//! replace is atomic with respect to concurrent queries. Queries are
//! brute-force cosine similarity over every stored vector.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{check_insert, rank, FormatStats, IndexStats, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document, ScoredChunk};

#[derive(Default)]
struct State {
    dims: Option<usize>,
    /// Keyed by document name.
    docs: BTreeMap<String, StoredDoc>,
}

struct StoredDoc {
    doc: Document,
    chunks: Vec<(Chunk, Vec<f32>)>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Retrieval("in-memory index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.state.read().map_err(poisoned)?.dims)
    }

    async fn find_document(&self, name: &str) -> Result<Option<Document>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.docs.get(name).map(|s| s.doc.clone()))
    }

    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let dims = check_insert(state.dims, chunks, vectors)?;
        if state.dims.is_none() {
            state.dims = dims;
        }
        let stored = StoredDoc {
            doc: doc.clone(),
            chunks: chunks.iter().cloned().zip(vectors.iter().cloned()).collect(),
        };
        state.docs.insert(doc.name.clone(), stored);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let state = self.state.read().map_err(poisoned)?;
        let Some(dims) = state.dims else {
            return Ok(Vec::new());
        };
        if vector.len() != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: vector.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let scored: Vec<ScoredChunk> = state
            .docs
            .values()
            .flat_map(|s| s.chunks.iter())
            .map(|(chunk, v)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(vector, v),
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().map_err(poisoned)?;
        let mut by_format: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for s in state.docs.values() {
            let entry = by_format.entry(s.doc.format.as_str()).or_default();
            entry.0 += 1;
            entry.1 += s.chunks.len();
        }
        let mut by_format: Vec<FormatStats> = by_format
            .into_iter()
            .map(|(format, (documents, chunks))| FormatStats {
                format: format.to_string(),
                documents,
                chunks,
            })
            .collect();
        by_format.sort_by(|a, b| b.documents.cmp(&a.documents));

        Ok(IndexStats {
            documents: state.docs.len(),
            chunks: state.docs.values().map(|s| s.chunks.len()).sum(),
            dims: state.dims,
            last_ingested_at: state.docs.values().map(|s| s.doc.created_at).max(),
            by_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentFormat;

    fn doc(name: &str) -> Document {
        Document {
            id: format!("id-{}", name),
            name: name.to_string(),
            format: DocumentFormat::Text,
            content_hash: "h".to_string(),
            body: "body".to_string(),
            created_at: 1,
        }
    }

    fn chunk(doc_id: &str, index: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("{}:{}", doc_id, index),
            document_id: doc_id.to_string(),
            chunk_index: index,
            text: text.to_string(),
            hash: String::new(),
        }
    }

    #[tokio::test]
    async fn empty_index_returns_no_results() {
        let index = InMemoryIndex::new();
        assert!(index.query(&[1.0, 0.0], 5).await.unwrap().is_empty());
        assert_eq!(index.dimension().await.unwrap(), None);
    }

    #[tokio::test]
    async fn query_is_sorted_and_bounded() {
        let index = InMemoryIndex::new();
        let d = doc("a");
        let chunks = vec![
            chunk(&d.id, 0, "x"),
            chunk(&d.id, 1, "y"),
            chunk(&d.id, 2, "z"),
        ];
        let vectors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]];
        index.replace_document(&d, &chunks, &vectors).await.unwrap();

        let results = index.query(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "y");
        assert_eq!(results[1].chunk.text, "z");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn replace_overwrites_same_name() {
        let index = InMemoryIndex::new();
        let d = doc("a");
        index
            .replace_document(&d, &[chunk(&d.id, 0, "old"), chunk(&d.id, 1, "old")], &[vec![1.0], vec![1.0]])
            .await
            .unwrap();
        index
            .replace_document(&d, &[chunk(&d.id, 0, "new")], &[vec![1.0]])
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        let results = index.query(&[1.0], 10).await.unwrap();
        assert_eq!(results[0].chunk.text, "new");
    }

    #[tokio::test]
    async fn dimension_is_fixed_by_first_insert() {
        let index = InMemoryIndex::new();
        let a = doc("a");
        index
            .replace_document(&a, &[chunk(&a.id, 0, "x")], &[vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();
        let b = doc("b");
        let err = index
            .replace_document(&b, &[chunk(&b.id, 0, "y")], &[vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));

        let err = index.query(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert_eq!(index.dimension().await.unwrap(), Some(3));
    }
}
