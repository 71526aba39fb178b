//! Error taxonomy for the ingestion and generation pipeline.
//!
//! Library code returns [`Error`]; the CLI and config layers wrap it in
//! `anyhow` with added context. [`Error::Retrieval`] never reaches a caller
//! of [`crate::chain::GenerationChain::generate`]: the chain recovers from it
//! by falling back to plain-mode composition.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The generation request itself is malformed (empty task, creativity
    /// out of range).
    #[error("{0}")]
    InvalidRequest(String),

    /// The document could not be ingested (unsupported format, empty or
    /// unparsable content).
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The embedding call failed, timed out, or was given empty text.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// A vector's length disagrees with the index dimension.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The vector index could not be queried.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The language model call failed or timed out.
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl Error {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) | Error::Ingestion(_) => "bad_request",
            Error::Embedding(_) => "embedding_error",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::Retrieval(_) => "retrieval_error",
            Error::Invocation(_) => "invocation_error",
            Error::Config(_) => "config_error",
            Error::Storage(_) => "internal",
        }
    }
}
