//! Prompt templates and composition.
//!
//! A [`PromptTemplate`] is a versioned value owned by this crate: the
//! built-in `v1` template ships with the binary, and a replacement can be
//! loaded from a local TOML file. [`PromptComposer::compose`] is a pure
//! function of its inputs; it never touches the network or the index.
//!
//! # Layout
//!
//! ```text
//! system: <system_instruction>
//! user:   [context header + ranked chunks]   (only when context is kept)
//!         <user_template with {language} and {task} filled in>
//! ```
//!
//! The combined length of `system` and `user` never exceeds the composer's
//! character budget when context is present. Chunks are kept in rank order
//! and the lowest-ranked ones are dropped first. The task itself is never
//! truncated.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{Language, ScoredChunk};

/// The exact reply for requests that are not about writing code.
pub const REFUSAL_MESSAGE: &str = "I am a code generator assistant. Please ask me to write code for a specific task in a programming language.";

const CONTEXT_HEADER: &str =
    "Use the following reference material where it is relevant to the task.\n\n";

const SYSTEM_INSTRUCTION_V1: &str = "You are a dedicated code generator assistant, specialized in writing code in various programming languages. Your only job is to generate code for the language and task the user gives you. Follow these rules:
1. Only respond to requests that ask for code solving a specific task in a programming language.
2. Output the code itself with correct syntax and indentation, and nothing else: no explanations, no surrounding prose, no headers.
3. If the request is not about generating code (poems, recipes, advice, general knowledge and so on), respond with exactly:
\"I am a code generator assistant. Please ask me to write code for a specific task in a programming language.\"
4. If no programming language is specified, use Python.
5. Never perform non-coding tasks. If the task is ambiguous, respond with the message from rule 3.";

fn default_required_placeholders() -> Vec<String> {
    vec!["language".to_string(), "task".to_string()]
}

/// A versioned prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub version: String,
    pub system_instruction: String,
    /// Must contain every placeholder in `required_placeholders`, written
    /// as `{name}`.
    pub user_template: String,
    #[serde(default = "default_required_placeholders")]
    pub required_placeholders: Vec<String>,
}

impl PromptTemplate {
    /// The template compiled into the crate.
    pub fn builtin() -> Self {
        Self {
            version: "v1".to_string(),
            system_instruction: SYSTEM_INSTRUCTION_V1.to_string(),
            user_template: "Write code in {language} to {task}".to_string(),
            required_placeholders: default_required_placeholders(),
        }
    }

    /// Load and validate a template from a TOML file.
    ///
    /// ```toml
    /// version = "v2"
    /// system_instruction = "You only write code."
    /// user_template = "Language: {language}\nTask: {task}"
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "cannot read prompt template {}: {}",
                path.display(),
                e
            ))
        })?;
        let template: PromptTemplate = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "invalid prompt template {}: {}",
                path.display(),
                e
            ))
        })?;
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("prompt template version must not be empty".into()));
        }
        if self.system_instruction.trim().is_empty() {
            return Err(Error::Config(
                "prompt template system_instruction must not be empty".into(),
            ));
        }
        for required in ["language", "task"] {
            if !self.required_placeholders.iter().any(|p| p == required) {
                return Err(Error::Config(format!(
                    "prompt template must require the {{{}}} placeholder",
                    required
                )));
            }
        }
        for placeholder in &self.required_placeholders {
            if !self.user_template.contains(&format!("{{{}}}", placeholder)) {
                return Err(Error::Config(format!(
                    "prompt template {} is missing placeholder {{{}}} in user_template",
                    self.version, placeholder
                )));
            }
        }
        Ok(())
    }

    /// Fill in the task instruction. `{language}` is substituted before
    /// `{task}`, so braces inside the task text are left alone.
    pub fn render_instruction(&self, language: Language, task: &str) -> String {
        self.user_template
            .replace("{language}", language.display_name())
            .replace("{task}", task)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// A prompt ready for a chat-style model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: String,
    /// Number of context chunks that fit in the budget.
    pub context_used: usize,
}

impl ComposedPrompt {
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    template: PromptTemplate,
    budget_chars: usize,
}

impl PromptComposer {
    pub fn new(template: PromptTemplate, budget_chars: usize) -> Self {
        Self {
            template,
            budget_chars,
        }
    }

    /// Build the prompt for `task` in `language`, prepending as many of the
    /// ranked `context` chunks as fit in the budget.
    pub fn compose(&self, task: &str, language: Language, context: &[ScoredChunk]) -> ComposedPrompt {
        let instruction = self.template.render_instruction(language, task);
        let base_len =
            self.template.system_instruction.chars().count() + instruction.chars().count();

        let mut entries: Vec<String> = Vec::new();
        let mut used = base_len + CONTEXT_HEADER.chars().count();
        for scored in context {
            let text = scored.chunk.text.trim();
            if text.is_empty() {
                continue;
            }
            let entry = format!("[{}]\n{}\n\n", entries.len() + 1, text);
            let entry_len = entry.chars().count();
            if used + entry_len > self.budget_chars {
                break;
            }
            used += entry_len;
            entries.push(entry);
        }

        let user = if entries.is_empty() {
            instruction
        } else {
            let mut user = String::from(CONTEXT_HEADER);
            for entry in &entries {
                user.push_str(entry);
            }
            user.push_str(&instruction);
            user
        };

        ComposedPrompt {
            system: self.template.system_instruction.clone(),
            user,
            context_used: entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn ctx(texts: &[&str]) -> Vec<ScoredChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ScoredChunk {
                chunk: Chunk {
                    id: format!("c{}", i),
                    document_id: "d".to_string(),
                    chunk_index: i as i64,
                    text: t.to_string(),
                    hash: String::new(),
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn builtin_template_is_valid_and_carries_refusal() {
        let t = PromptTemplate::builtin();
        t.validate().unwrap();
        assert!(t.system_instruction.contains(REFUSAL_MESSAGE));
        assert!(t.system_instruction.contains("Python"));
    }

    #[test]
    fn plain_prompt_contains_task_and_language() {
        let composer = PromptComposer::new(PromptTemplate::builtin(), 24_000);
        for lang in Language::ALL {
            let p = composer.compose("Implement a stack data structure", lang, &[]);
            assert_eq!(
                p.user,
                format!("Write code in {} to Implement a stack data structure", lang.display_name())
            );
            assert_eq!(p.context_used, 0);
        }
    }

    #[test]
    fn context_precedes_instruction_in_rank_order() {
        let composer = PromptComposer::new(PromptTemplate::builtin(), 24_000);
        let p = composer.compose("sort a list", Language::Rust, &ctx(&["first", "second"]));
        assert_eq!(p.context_used, 2);
        let first = p.user.find("first").unwrap();
        let second = p.user.find("second").unwrap();
        let task = p.user.find("Write code in Rust to sort a list").unwrap();
        assert!(first < second && second < task);
        assert!(p.user.ends_with("Write code in Rust to sort a list"));
    }

    #[test]
    fn lowest_ranked_chunks_are_dropped_to_fit_budget() {
        let system_len = PromptTemplate::builtin().system_instruction.chars().count();
        let budget = system_len + 200;
        let composer = PromptComposer::new(PromptTemplate::builtin(), budget);
        let (a, b, c) = ("a".repeat(60), "b".repeat(60), "c".repeat(60));
        let chunks = ctx(&[a.as_str(), b.as_str(), c.as_str()]);
        let p = composer.compose("do it", Language::Go, &chunks);
        assert!(p.context_used >= 1 && p.context_used < 3);
        assert!(p.char_len() <= budget);
        assert!(p.user.contains(&a));
        assert!(!p.user.contains(&c));
    }

    #[test]
    fn oversized_task_is_never_truncated() {
        let composer = PromptComposer::new(PromptTemplate::builtin(), 10);
        let task = "x".repeat(500);
        let p = composer.compose(&task, Language::C, &ctx(&["ctx"]));
        assert_eq!(p.context_used, 0);
        assert!(p.user.contains(&task));
    }

    #[test]
    fn braces_in_task_are_not_substituted() {
        let composer = PromptComposer::new(PromptTemplate::builtin(), 24_000);
        let p = composer.compose("print {language}", Language::Java, &[]);
        assert_eq!(p.user, "Write code in Java to print {language}");
    }

    #[test]
    fn template_missing_placeholder_is_rejected() {
        let mut t = PromptTemplate::builtin();
        t.user_template = "Write code to {task}".to_string();
        assert!(matches!(t.validate(), Err(Error::Config(_))));

        let mut t = PromptTemplate::builtin();
        t.required_placeholders = vec!["task".to_string()];
        assert!(t.validate().is_err());
    }

    #[test]
    fn template_loads_from_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("prompt.toml");
        std::fs::write(
            &path,
            "version = \"v2\"\nsystem_instruction = \"Only code.\"\nuser_template = \"{language}: {task}\"\n",
        )
        .unwrap();
        let t = PromptTemplate::load(&path).unwrap();
        assert_eq!(t.version, "v2");
        assert_eq!(t.required_placeholders, vec!["language", "task"]);
        assert_eq!(t.render_instruction(Language::Cpp, "add"), "C++: add");
    }
}
