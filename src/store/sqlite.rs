//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs in `chunk_vectors` and
//! scored by brute-force cosine similarity at query time. The index
//! dimension lives in `index_meta` under the key `dims`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use super::{check_insert, rank, FormatStats, IndexStats, VectorIndex};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{Chunk, Document, DocumentFormat, ScoredChunk};

const DIMS_KEY: &str = "dims";

/// SQLite implementation of the [`VectorIndex`] trait.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the database at `path`, creating it and its schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn parse_dims(value: Option<String>) -> Result<Option<usize>> {
    value
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| Error::Retrieval(format!("corrupt index dimension: {}", v)))
        })
        .transpose()
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn dimension(&self) -> Result<Option<usize>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&self.pool)
                .await?;
        parse_dims(value)
    }

    async fn find_document(&self, name: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, name, format, content_hash, body, created_at FROM documents WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let format_tag: String = row.get("format");
        let format = format_tag
            .parse::<DocumentFormat>()
            .map_err(|e| Error::Retrieval(format!("corrupt document row: {}", e)))?;
        Ok(Some(Document {
            id: row.get("id"),
            name: row.get("name"),
            format,
            content_hash: row.get("content_hash"),
            body: row.get("body"),
            created_at: row.get("created_at"),
        }))
    }

    async fn replace_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let recorded: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(DIMS_KEY)
                .fetch_optional(&mut *tx)
                .await?;
        let recorded = parse_dims(recorded)?;
        let dims = check_insert(recorded, chunks, vectors)?;
        if let (None, Some(d)) = (recorded, dims) {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(DIMS_KEY)
                .bind(d.to_string())
                .execute(&mut *tx)
                .await?;
        }

        // Drop whatever was stored under this name before.
        let previous: Option<String> = sqlx::query_scalar("SELECT id FROM documents WHERE name = ?")
            .bind(&doc.name)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(old_id) = previous {
            sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
                .bind(&old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(&old_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(&old_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, name, format, content_hash, body, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.name)
        .bind(doc.format.as_str())
        .bind(&doc.content_hash)
        .bind(&doc.body)
        .bind(doc.created_at)
        .execute(&mut *tx)
        .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, embedding)
                VALUES (?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let Some(dims) = self.dimension().await? else {
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

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.hash, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Retrieval(e.to_string()))?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    chunk: Chunk {
                        id: row.get("id"),
                        document_id: row.get("document_id"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        Ok(rank(scored, k))
    }

    async fn stats(&self) -> Result<IndexStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let last_ingested_at: Option<i64> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM documents")
                .fetch_one(&self.pool)
                .await?;

        let format_rows = sqlx::query(
            r#"
            SELECT
                d.format,
                COUNT(DISTINCT d.id) AS doc_count,
                COUNT(c.id) AS chunk_count
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            GROUP BY d.format
            ORDER BY doc_count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let by_format = format_rows
            .iter()
            .map(|row| FormatStats {
                format: row.get("format"),
                documents: row.get::<i64, _>("doc_count") as usize,
                chunks: row.get::<i64, _>("chunk_count") as usize,
            })
            .collect();

        Ok(IndexStats {
            documents: documents as usize,
            chunks: chunks as usize,
            dims: self.dimension().await?,
            last_ingested_at,
            by_format,
        })
    }
}
