//! In-process fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use codegen_harness::chain::{ChainOptions, GenerationChain};
use codegen_harness::chunk::Chunker;
use codegen_harness::embedding::{Embedder, HashEmbedder};
use codegen_harness::error::{Error, Result};
use codegen_harness::ingest::DocumentStore;
use codegen_harness::llm::{CompletionModel, CompletionParams};
use codegen_harness::prompt::{ComposedPrompt, PromptComposer, PromptTemplate, REFUSAL_MESSAGE};
use codegen_harness::store::{InMemoryIndex, VectorIndex};
use codegen_harness::Harness;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ─── Fake models ────────────────────────────────────────────────────

/// Replies with the user message it was given, so tests can see the prompt.
#[derive(Default)]
pub struct EchoModel {
    pub seen: Mutex<Vec<(ComposedPrompt, CompletionParams)>>,
}

#[async_trait]
impl CompletionModel for EchoModel {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &ComposedPrompt, params: &CompletionParams) -> Result<String> {
        self.seen.lock().unwrap().push((prompt.clone(), *params));
        Ok(prompt.user.clone())
    }
}

/// Behaves like a well-prompted code model: refuses off-topic requests and
/// answers everything else with one fenced code block.
pub struct CoderModel;

#[async_trait]
impl CompletionModel for CoderModel {
    fn model_name(&self) -> &str {
        "coder"
    }

    async fn complete(&self, prompt: &ComposedPrompt, _params: &CompletionParams) -> Result<String> {
        if prompt.user.contains("favorite color") {
            return Ok(format!("\"{}\"", REFUSAL_MESSAGE));
        }
        if prompt.user.contains("stack") {
            return Ok("```python\nclass Stack:\n    def __init__(self):\n        self.items = []\n\n    def push(self, item):\n        self.items.append(item)\n\n    def pop(self):\n        return self.items.pop()\n```".to_string());
        }
        Ok("```\n// generated\n```".to_string())
    }
}

pub struct FailingModel;

#[async_trait]
impl CompletionModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &ComposedPrompt, _params: &CompletionParams) -> Result<String> {
        Err(Error::Invocation("upstream returned 503".to_string()))
    }
}

pub struct SlowModel(pub Duration);

#[async_trait]
impl CompletionModel for SlowModel {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _prompt: &ComposedPrompt, _params: &CompletionParams) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

// ─── Builders ───────────────────────────────────────────────────────

pub async fn store_with(embedder: Arc<dyn Embedder>) -> Arc<DocumentStore> {
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new());
    Arc::new(
        DocumentStore::new(
            index,
            embedder,
            Chunker::new(1000, 100).unwrap(),
            16,
            Duration::from_secs(5),
        )
        .await
        .unwrap(),
    )
}

pub async fn harness_with(model: Arc<dyn CompletionModel>) -> Harness {
    harness_with_options(model, ChainOptions::default()).await
}

pub async fn harness_with_options(
    model: Arc<dyn CompletionModel>,
    options: ChainOptions,
) -> Harness {
    let store = store_with(Arc::new(HashEmbedder::new(64))).await;
    Harness::new(GenerationChain::new(
        store,
        model,
        PromptComposer::new(PromptTemplate::builtin(), 24_000),
        options,
    ))
}
