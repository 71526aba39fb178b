//! Language model backends.
//!
//! A [`CompletionModel`] turns a [`ComposedPrompt`] into reply text. Backends:
//!
//! | Config Value | Model | Endpoint |
//! |-------------|-------|----------|
//! | `"openai"` | [`OpenAICompatibleModel`] | `POST {base_url}/chat/completions` (Groq by default) |
//! | `"ollama"` | [`OllamaModel`] | `POST {base_url}/api/chat` |
//! | `"disabled"` | [`DisabledModel`] | none |
//!
//! API keys are read from the environment when a call is made, so a missing
//! key only fails generation, not startup.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::prompt::ComposedPrompt;

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    /// Sampling temperature in `[0, 1]`; the request's creativity.
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send the prompt and return the raw reply text.
    async fn complete(&self, prompt: &ComposedPrompt, params: &CompletionParams)
        -> Result<String>;
}

// ============ Disabled ============

pub struct DisabledModel;

#[async_trait]
impl CompletionModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &ComposedPrompt, _params: &CompletionParams) -> Result<String> {
        Err(Error::Invocation("llm provider is disabled".to_string()))
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAICompatibleModel {
    model: String,
    base_url: String,
    api_key_env: String,
    client: reqwest::Client,
}

impl OpenAICompatibleModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            api_key_env: config.api_key_env.clone(),
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAICompatibleModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ComposedPrompt, params: &CompletionParams) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            Error::Invocation(format!("{} environment variable not set", self.api_key_env))
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Invocation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Invocation(format!(
                "chat completion API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Invocation(e.to_string()))?;
        parse_chat_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Invocation("invalid chat completion response: missing message content".into())
        })
}

// ============ Ollama ============

pub struct OllamaModel {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CompletionModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &ComposedPrompt, params: &CompletionParams) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "options": {
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Invocation(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::Invocation(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Invocation(e.to_string()))?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Invocation("invalid Ollama response: missing message".into()))
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Create the configured [`CompletionModel`].
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn CompletionModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAICompatibleModel::new(config)?)),
        "ollama" => Ok(Box::new(OllamaModel::new(config)?)),
        other => Err(Error::Config(format!("Unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_choice_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "print('hi')"}}]
        });
        assert_eq!(parse_chat_completion(&json).unwrap(), "print('hi')");
    }

    #[test]
    fn missing_choices_is_invocation_error() {
        let err = parse_chat_completion(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, Error::Invocation(_)));
    }

    #[tokio::test]
    async fn openai_model_without_key_fails_at_call_time() {
        let config = LlmConfig {
            api_key_env: "CGEN_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let model = create_model(&config).unwrap();
        let prompt = ComposedPrompt {
            system: "s".into(),
            user: "u".into(),
            context_used: 0,
        };
        let params = CompletionParams {
            temperature: 0.7,
            max_tokens: 16,
        };
        let err = model.complete(&prompt, &params).await.unwrap_err();
        assert!(err.to_string().contains("CGEN_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "magic".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(create_model(&config).err(), Some(Error::Config(_))));
    }
}
