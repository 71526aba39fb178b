//! Core data models used throughout the harness.
//!
//! These types represent the documents, chunks, and generation requests that
//! flow through the ingestion and generation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default creativity (sampling temperature) when the caller gives none.
pub const DEFAULT_CREATIVITY: f32 = 0.7;

/// Target programming language for generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    C,
    #[default]
    Python,
    Java,
    JavaScript,
    #[serde(rename = "C++")]
    Cpp,
    Go,
    Rust,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::C,
        Language::Python,
        Language::Java,
        Language::JavaScript,
        Language::Cpp,
        Language::Go,
        Language::Rust,
    ];

    /// Human-facing name, as inserted into prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Python => "Python",
            Language::Java => "Java",
            Language::JavaScript => "JavaScript",
            Language::Cpp => "C++",
            Language::Go => "Go",
            Language::Rust => "Rust",
        }
    }

    /// Code-fence / syntax-highlighting tag.
    pub fn syntax(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Python => "python",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::Cpp => "cpp",
            Language::Go => "go",
            Language::Rust => "rust",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(Language::C),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "javascript" | "js" => Ok(Language::JavaScript),
            "c++" | "cpp" | "cxx" => Ok(Language::Cpp),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            other => Err(format!(
                "unsupported language '{}'. Use one of: C, Python, Java, JavaScript, C++, Go, Rust",
                other
            )),
        }
    }
}

/// Source format of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Markdown,
    Pdf,
    Docx,
    Csv,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Csv => "csv",
        }
    }

    /// Infer the format from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(DocumentFormat::Text),
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            "csv" => Some(DocumentFormat::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        match tag.as_str() {
            "text/plain" => return Ok(DocumentFormat::Text),
            "text/markdown" => return Ok(DocumentFormat::Markdown),
            "text/csv" => return Ok(DocumentFormat::Csv),
            "application/pdf" => return Ok(DocumentFormat::Pdf),
            crate::extract::MIME_DOCX => return Ok(DocumentFormat::Docx),
            _ => {}
        }
        DocumentFormat::from_extension(&tag).ok_or_else(|| format!("unsupported format: {}", s))
    }
}

/// A document as submitted by a caller, before extraction.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub name: String,
    pub format: DocumentFormat,
    pub content: Vec<u8>,
}

impl DocumentInput {
    pub fn new(name: impl Into<String>, format: DocumentFormat, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            format,
            content: content.into(),
        }
    }
}

/// Normalized document stored in the index.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub format: DocumentFormat,
    pub content_hash: String,
    pub body: String,
    pub created_at: i64,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from a similarity query, with its cosine score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub document_id: String,
    pub chunks_indexed: usize,
    /// True when the same name and content were already indexed.
    pub unchanged: bool,
}

/// A single code-generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub task: String,
    pub language: Language,
    pub use_context: bool,
    pub creativity: f32,
}

impl GenerationRequest {
    pub fn new(task: impl Into<String>, language: Language) -> Self {
        Self {
            task: task.into(),
            language,
            use_context: false,
            creativity: DEFAULT_CREATIVITY,
        }
    }

    pub fn with_context(mut self, use_context: bool) -> Self {
        self.use_context = use_context;
        self
    }

    pub fn with_creativity(mut self, creativity: f32) -> Self {
        self.creativity = creativity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_defaults_to_python() {
        assert_eq!(Language::default(), Language::Python);
    }

    #[test]
    fn language_parses_aliases() {
        assert_eq!("C++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("cpp".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("JS".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("golang".parse::<Language>().unwrap(), Language::Go);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn every_language_round_trips_through_display_name() {
        for lang in Language::ALL {
            assert_eq!(lang.display_name().parse::<Language>().unwrap(), lang);
        }
    }

    #[test]
    fn format_parses_tags_extensions_and_mime_types() {
        assert_eq!("md".parse::<DocumentFormat>().unwrap(), DocumentFormat::Markdown);
        assert_eq!("PDF".parse::<DocumentFormat>().unwrap(), DocumentFormat::Pdf);
        assert_eq!(
            "application/pdf".parse::<DocumentFormat>().unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!("csv".parse::<DocumentFormat>().unwrap(), DocumentFormat::Csv);
        assert!("xlsx".parse::<DocumentFormat>().is_err());
    }
}
