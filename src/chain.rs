//! The generation chain: request → (retrieve) → compose → invoke → reply.
//!
//! Each request walks a linear state machine:
//!
//! ```text
//! Received ──▶ Retrieving ──▶ Composing ──▶ Invoking ──▶ Completed
//!    │        (context only)                   │
//!    └──────────────────────────────────────────┴──▶ Failed
//! ```
//!
//! Retrieval is best effort. If embedding the task or querying the index
//! fails, the failure is logged and the request continues in plain mode
//! with no context. Invocation failures end the request; [`GenerationChain::generate`]
//! renders them as `"Error: <cause>"` so the caller always receives a string.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::embed_checked;
use crate::error::{Error, Result};
use crate::ingest::DocumentStore;
use crate::llm::{CompletionModel, CompletionParams};
use crate::models::{GenerationRequest, ScoredChunk};
use crate::prompt::{PromptComposer, REFUSAL_MESSAGE};

/// Per-request pipeline stage, as it appears in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Retrieving,
    Composing,
    Invoking,
    Completed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Retrieving => "retrieving",
            Stage::Composing => "composing",
            Stage::Invoking => "invoking",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tunables for [`GenerationChain`].
#[derive(Debug, Clone)]
pub struct ChainOptions {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub llm_timeout: Duration,
    pub max_tokens: u32,
}

impl ChainOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            max_tokens: config.llm.max_tokens,
        }
    }
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: None,
            llm_timeout: Duration::from_secs(60),
            max_tokens: 2048,
        }
    }
}

pub struct GenerationChain {
    store: Arc<DocumentStore>,
    model: Arc<dyn CompletionModel>,
    composer: PromptComposer,
    options: ChainOptions,
}

impl GenerationChain {
    pub fn new(
        store: Arc<DocumentStore>,
        model: Arc<dyn CompletionModel>,
        composer: PromptComposer,
        options: ChainOptions,
    ) -> Self {
        Self {
            store,
            model,
            composer,
            options,
        }
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Run the request and always return a string: the generated code, the
    /// refusal message, or `"Error: <cause>"`.
    pub async fn generate(&self, request: &GenerationRequest) -> String {
        match self.try_generate(request).await {
            Ok(output) => output,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Like [`generate`](Self::generate) but keeps the error typed.
    pub async fn try_generate(&self, request: &GenerationRequest) -> Result<String> {
        let request_id = Uuid::new_v4();
        enter(request_id, Stage::Received);
        debug!(
            %request_id,
            language = %request.language,
            use_context = request.use_context,
            creativity = request.creativity,
            "generation request"
        );

        let result = self.run(request_id, request).await;
        match &result {
            Ok(_) => enter(request_id, Stage::Completed),
            Err(e) => {
                enter(request_id, Stage::Failed);
                debug!(%request_id, error = %e, "generation failed");
            }
        }
        result
    }

    async fn run(&self, request_id: Uuid, request: &GenerationRequest) -> Result<String> {
        validate(request)?;
        let task = request.task.trim();

        let context = if request.use_context {
            enter(request_id, Stage::Retrieving);
            match self.retrieve(task).await {
                Ok(chunks) => {
                    debug!(%request_id, retrieved = chunks.len(), "retrieved context");
                    chunks
                }
                Err(e) => {
                    warn!(%request_id, error = %e, "retrieval failed, continuing without context");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        enter(request_id, Stage::Composing);
        let prompt = self.composer.compose(task, request.language, &context);
        debug!(
            %request_id,
            context_used = prompt.context_used,
            prompt_chars = prompt.char_len(),
            "composed prompt"
        );

        enter(request_id, Stage::Invoking);
        let params = CompletionParams {
            temperature: request.creativity,
            max_tokens: self.options.max_tokens,
        };
        let raw = tokio::time::timeout(self.options.llm_timeout, self.model.complete(&prompt, &params))
            .await
            .map_err(|_| {
                Error::Invocation(format!(
                    "model call timed out after {}s",
                    self.options.llm_timeout.as_secs()
                ))
            })??;

        extract_response(&raw)
    }

    async fn retrieve(&self, task: &str) -> Result<Vec<ScoredChunk>> {
        let embedder = self.store.embedder();
        let vector = embed_checked(embedder, task, self.store.embed_timeout()).await?;
        let mut chunks = self.store.query(&vector, self.options.top_k).await?;
        if let Some(min) = self.options.min_score {
            chunks.retain(|c| c.score >= min);
        }
        Ok(chunks)
    }
}

fn enter(request_id: Uuid, stage: Stage) {
    debug!(%request_id, %stage, "stage transition");
}

fn validate(request: &GenerationRequest) -> Result<()> {
    if request.task.trim().is_empty() {
        return Err(Error::InvalidRequest(
            "task description must not be empty".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&request.creativity) {
        return Err(Error::InvalidRequest(
            "creativity must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

/// Normalize a raw model reply.
///
/// - Surrounding whitespace is trimmed; an empty reply is an error.
/// - A reply containing the refusal sentence becomes exactly [`REFUSAL_MESSAGE`].
/// - A reply that is one fenced code block is unwrapped to its body.
pub fn extract_response(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Invocation("model returned an empty reply".to_string()));
    }
    if trimmed.contains(REFUSAL_MESSAGE) {
        return Ok(REFUSAL_MESSAGE.to_string());
    }
    Ok(unwrap_single_fence(trimmed).unwrap_or(trimmed).to_string())
}

fn unwrap_single_fence(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("```")?.strip_suffix("```")?;
    // Skip the info string (e.g. "python") on the opening line.
    let (_, body) = inner.split_once('\n')?;
    if body.contains("```") {
        return None;
    }
    let body = body.trim_end().trim_start_matches(['\r', '\n']);
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
