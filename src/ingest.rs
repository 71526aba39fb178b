//! Ingestion pipeline orchestration.
//!
//! [`DocumentStore`] owns the index, the chunker and the embedder, and runs
//! the full flow for one document: extract → dedup check → chunk → embed →
//! persist. Ingestions are serialized by an async mutex; queries bypass it
//! and run concurrently against the index.
//!
//! Documents are keyed by name. Re-ingesting the same name with identical
//! extracted text is a no-op; with different text it atomically replaces
//! the previous chunks and vectors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::{hash_text, Chunker};
use crate::embedding::{embed_batch_checked, Embedder};
use crate::error::{Error, Result};
use crate::extract::extract_text;
use crate::models::{Document, DocumentInput, IngestionResult, ScoredChunk};
use crate::store::{IndexStats, VectorIndex};

pub struct DocumentStore {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
    embed_timeout: Duration,
    ingest_lock: Mutex<()>,
}

impl DocumentStore {
    /// Build a store over `index`, failing with
    /// [`Error::DimensionMismatch`] when the index already holds vectors of
    /// a different size than `embedder` produces.
    pub async fn new(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        batch_size: usize,
        embed_timeout: Duration,
    ) -> Result<Self> {
        if let Some(recorded) = index.dimension().await? {
            // A disabled embedder reports 0 and can never insert anyway.
            if embedder.dims() != 0 && embedder.dims() != recorded {
                return Err(Error::DimensionMismatch {
                    expected: recorded,
                    actual: embedder.dims(),
                });
            }
        }
        Ok(Self {
            index,
            embedder,
            chunker,
            batch_size: batch_size.max(1),
            embed_timeout,
            ingest_lock: Mutex::new(()),
        })
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    /// Ingest one document. On success every chunk and its vector is
    /// persisted before this returns.
    pub async fn ingest(&self, input: DocumentInput) -> Result<IngestionResult> {
        let DocumentInput {
            name: raw_name,
            format,
            content,
        } = input;
        let name = raw_name.trim();
        if name.is_empty() {
            return Err(Error::Ingestion("document name must not be empty".to_string()));
        }

        // PDF and DOCX parsing is CPU-bound; keep it off the async workers.
        let body = tokio::task::spawn_blocking(move || extract_text(&content, format))
            .await
            .map_err(|e| Error::Ingestion(format!("{}: extraction aborted: {}", name, e)))?
            .map_err(|e| Error::Ingestion(format!("{}: {}", name, e)))?;
        if body.trim().is_empty() {
            return Err(Error::Ingestion(format!("{}: document has no text content", name)));
        }
        let content_hash = hash_text(&body);

        let _guard = self.ingest_lock.lock().await;

        let existing = self.index.find_document(name).await?;
        if let Some(ref doc) = existing {
            if doc.content_hash == content_hash {
                debug!(name, document_id = %doc.id, "document unchanged, skipping");
                return Ok(IngestionResult {
                    document_id: doc.id.clone(),
                    chunks_indexed: 0,
                    unchanged: true,
                });
            }
        }

        let document = Document {
            id: existing
                .map(|d| d.id)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: name.to_string(),
            format,
            content_hash,
            body,
            created_at: chrono::Utc::now().timestamp(),
        };

        let chunks: Vec<_> = self.chunker.split(&document.id, &document.body).collect();
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded =
                embed_batch_checked(self.embedder.as_ref(), &texts, self.embed_timeout).await?;
            vectors.extend(embedded);
        }

        self.index
            .replace_document(&document, &chunks, &vectors)
            .await?;

        info!(
            name,
            document_id = %document.id,
            format = %document.format,
            chunks = chunks.len(),
            "ingested document"
        );

        Ok(IngestionResult {
            document_id: document.id,
            chunks_indexed: chunks.len(),
            unchanged: false,
        })
    }

    /// Up to `k` stored chunks most similar to `vector`. Never waits on an
    /// in-flight ingestion.
    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.index.query(vector, k).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::models::DocumentFormat;
    use crate::store::InMemoryIndex;

    async fn store(max_chars: usize, overlap: usize) -> DocumentStore {
        DocumentStore::new(
            Arc::new(InMemoryIndex::new()),
            Arc::new(HashEmbedder::new(32)),
            Chunker::new(max_chars, overlap).unwrap(),
            8,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn ingest_counts_chunks() {
        let store = store(1000, 100).await;
        let text = "word ".repeat(2000);
        let result = store
            .ingest(DocumentInput::new("big.txt", DocumentFormat::Text, text))
            .await
            .unwrap();
        assert_eq!(result.chunks_indexed, 12);
        assert!(!result.unchanged);
        assert_eq!(store.stats().await.unwrap().chunks, 12);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let store = store(100, 10).await;
        let err = store
            .ingest(DocumentInput::new("empty.md", DocumentFormat::Markdown, "  \n\t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
        assert_eq!(store.stats().await.unwrap().documents, 0);
    }

    #[tokio::test]
    async fn unparsable_content_is_rejected() {
        let store = store(100, 10).await;
        let err = store
            .ingest(DocumentInput::new("bad.pdf", DocumentFormat::Pdf, b"nope".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_extractions_name_the_document_and_leave_the_store_usable() {
        let store = Arc::new(store(100, 10).await);
        let pdf = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .ingest(DocumentInput::new("scan.pdf", DocumentFormat::Pdf, b"%PDF-1.4 garbage".to_vec()))
                    .await
            })
        };
        let docx = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .ingest(DocumentInput::new("spec.docx", DocumentFormat::Docx, b"PK\x03\x04 torn".to_vec()))
                    .await
            })
        };

        let err = pdf.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Ingestion(_)));
        assert!(err.to_string().contains("scan.pdf"), "{}", err);
        let err = docx.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("spec.docx"), "{}", err);

        let ok = store
            .ingest(DocumentInput::new("ok.md", DocumentFormat::Markdown, "# still works"))
            .await
            .unwrap();
        assert_eq!(ok.chunks_indexed, 1);
    }

    #[tokio::test]
    async fn reingest_same_content_is_a_noop() {
        let store = store(100, 10).await;
        let first = store
            .ingest(DocumentInput::new("a.txt", DocumentFormat::Text, "fn main() {}"))
            .await
            .unwrap();
        let second = store
            .ingest(DocumentInput::new("a.txt", DocumentFormat::Text, "fn main() {}"))
            .await
            .unwrap();
        assert!(second.unchanged);
        assert_eq!(second.document_id, first.document_id);
    }

    #[tokio::test]
    async fn reingest_new_content_overwrites() {
        let store = store(10, 2).await;
        let first = store
            .ingest(DocumentInput::new("a.txt", DocumentFormat::Text, "x".repeat(50)))
            .await
            .unwrap();
        let second = store
            .ingest(DocumentInput::new("a.txt", DocumentFormat::Text, "short text"))
            .await
            .unwrap();
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(second.chunks_indexed, 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
    }

    #[tokio::test]
    async fn opening_with_a_different_dimension_fails() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
        let first = DocumentStore::new(
            index.clone(),
            Arc::new(HashEmbedder::new(32)),
            Chunker::new(100, 10).unwrap(),
            8,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        first
            .ingest(DocumentInput::new("a.txt", DocumentFormat::Text, "hello"))
            .await
            .unwrap();

        let err = DocumentStore::new(
            index,
            Arc::new(HashEmbedder::new(64)),
            Chunker::new(100, 10).unwrap(),
            8,
            Duration::from_secs(5),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::DimensionMismatch { expected: 32, actual: 64 }));
    }
}
