//! The public entry point: [`Harness`].
//!
//! A `Harness` wires the configured index, embedder, model and prompt
//! template into a [`GenerationChain`] and exposes the two operations
//! callers need, `generate` and `ingest`. It is cheap to clone; the HTTP
//! server hands one copy to every handler.
//!
//! ```rust,no_run
//! use codegen_harness::config::load_config;
//! use codegen_harness::harness::Harness;
//! use codegen_harness::models::Language;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = load_config(std::path::Path::new("./config/cgen.toml"))?;
//! let harness = Harness::open(&config).await?;
//! let code = harness
//!     .generate("Implement a stack data structure", Language::Python, false, 0.7)
//!     .await;
//! println!("{}", code);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::chain::{ChainOptions, GenerationChain};
use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{Error, Result};
use crate::ingest::DocumentStore;
use crate::llm::{create_model, CompletionModel};
use crate::models::{DocumentInput, GenerationRequest, IngestionResult, Language};
use crate::prompt::{PromptComposer, PromptTemplate};
use crate::store::{IndexStats, SqliteIndex, VectorIndex};

#[derive(Clone)]
pub struct Harness {
    chain: Arc<GenerationChain>,
}

impl Harness {
    /// Open the SQLite index named in `config.db.path` and build every
    /// collaborator from the config. The config is validated first, so an
    /// invalid one never creates a database file.
    pub async fn open(config: &Config) -> Result<Self> {
        check_config(config)?;
        let index = SqliteIndex::open(&config.db.path).await?;
        Self::build(config, Arc::new(index)).await
    }

    /// Like [`open`](Self::open) but over a caller-supplied index.
    pub async fn with_index(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        check_config(config)?;
        Self::build(config, index).await
    }

    async fn build(config: &Config, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);
        let model: Arc<dyn CompletionModel> = Arc::from(create_model(&config.llm)?);
        let template = match &config.prompt.template_path {
            Some(path) => PromptTemplate::load(path)?,
            None => PromptTemplate::builtin(),
        };
        debug!(
            embedder = embedder.model_name(),
            model = model.model_name(),
            template = %template.version,
            "harness configured"
        );

        let chunker = Chunker::new(config.chunking.max_chars, config.chunking.overlap_chars)?;
        let store = DocumentStore::new(
            index,
            embedder,
            chunker,
            config.embedding.batch_size,
            Duration::from_secs(config.embedding.timeout_secs),
        )
        .await?;

        let chain = GenerationChain::new(
            Arc::new(store),
            model,
            PromptComposer::new(template, config.llm.max_prompt_chars),
            ChainOptions::from_config(config),
        );
        Ok(Self::new(chain))
    }

    pub fn new(chain: GenerationChain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    /// Generate code for `task`. Never fails: errors come back as
    /// `"Error: <cause>"` and off-topic tasks as the refusal message.
    pub async fn generate(
        &self,
        task: &str,
        language: Language,
        use_context: bool,
        creativity: f32,
    ) -> String {
        let request = GenerationRequest::new(task, language)
            .with_context(use_context)
            .with_creativity(creativity);
        self.chain.generate(&request).await
    }

    pub async fn generate_request(&self, request: &GenerationRequest) -> String {
        self.chain.generate(request).await
    }

    pub async fn ingest(&self, document: DocumentInput) -> Result<IngestionResult> {
        self.chain.store().ingest(document).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.chain.store().stats().await
    }
}

/// Run [`crate::config::validate`] for callers that built a [`Config`] without
/// going through [`crate::config::load_config`].
fn check_config(config: &Config) -> Result<()> {
    crate::config::validate(config).map_err(|e| Error::Config(e.to_string()))
}
