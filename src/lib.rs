//! # codegen-harness
//!
//! A retrieval-augmented code generator. Reference documents are ingested
//! into a local vector index; a code-generation request can then be
//! answered either from the task alone (plain mode) or with the most
//! relevant document chunks prepended to the prompt (context mode).
//!
//! ## Architecture
//!
//! ```text
//!  ingest(document)                       generate(task, language, use_context, creativity)
//!        │                                              │
//!        ▼                                              ▼
//! ┌─────────────┐   ┌──────────┐            ┌──────────────────────┐
//! │ extract +   │──▶│ Embedder │            │   GenerationChain    │
//! │ Chunker     │   └────┬─────┘            │ retrieve → compose → │
//! └─────────────┘        ▼                  │ invoke → extract     │
//!                 ┌─────────────┐  query    └──────────┬───────────┘
//!                 │ VectorIndex │◀──────────────────────┤
//!                 │ SQLite/mem  │                       ▼
//!                 └─────────────┘               CompletionModel
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cgen init                     # create database
//! cgen ingest ./docs            # ingest reference material
//! cgen generate "Implement a stack data structure" --language rust
//! cgen generate "use the retry helper from the docs" --context
//! cgen serve                    # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | Text extraction for text, markdown, PDF, DOCX, CSV |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index trait and backends |
//! | [`ingest`] | Document store and ingestion pipeline |
//! | [`prompt`] | Prompt templates and composition |
//! | [`llm`] | Language model backends |
//! | [`chain`] | The generation state machine |
//! | [`harness`] | Public facade |
//! | [`server`] | HTTP server |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chain;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod harness;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod server;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use harness::Harness;
