//! # cgen
//!
//! The `cgen` binary is the command-line interface to the harness: it
//! initializes the index, ingests reference documents, generates code, and
//! serves the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! cgen --config ./config/cgen.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cgen init` | Create the SQLite database and run schema migrations |
//! | `cgen ingest <path>` | Ingest a file, or every supported file under a directory |
//! | `cgen generate "<task>"` | Generate code for a task |
//! | `cgen stats` | Show what is indexed |
//! | `cgen serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! cgen init
//! cgen ingest ./docs
//! cgen generate "Implement a stack data structure" --language rust
//! cgen generate "parse the config format described in the docs" --context
//! RUST_LOG=codegen_harness=debug cgen generate "binary search" --language go
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use codegen_harness::config;
use codegen_harness::harness::Harness;
use codegen_harness::models::{DocumentFormat, DocumentInput, Language, DEFAULT_CREATIVITY};
use codegen_harness::server;
use codegen_harness::stats;
use codegen_harness::store::SqliteIndex;

/// cgen: a retrieval-augmented code generator.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cgen.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cgen",
    about = "Retrieval-augmented code generator: ingest reference documents, then generate code grounded in them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cgen.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running it
    /// more than once is safe.
    Init,

    /// Ingest a document, or every supported document under a directory.
    ///
    /// Supported formats: txt, md, pdf, docx, csv. Documents are keyed by
    /// their canonical path, so the same file keeps one entry whichever
    /// directory the ingest starts from. Re-ingesting unchanged content is a
    /// no-op.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Force a format instead of inferring it from each file extension.
        #[arg(long)]
        format: Option<DocumentFormat>,
    },

    /// Generate code for a task.
    Generate {
        /// What the code should do.
        task: String,

        /// Target language: C, Python, Java, JavaScript, C++, Go, Rust.
        #[arg(long, default_value = "python")]
        language: Language,

        /// Ground the prompt in ingested documents.
        #[arg(long)]
        context: bool,

        /// Sampling temperature in [0, 1].
        #[arg(long, default_value_t = DEFAULT_CREATIVITY)]
        creativity: f32,

        /// Wrap the output in a Markdown code fence.
        #[arg(long)]
        fenced: bool,
    },

    /// Show document, chunk, and dimension counts.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let index = SqliteIndex::open(&cfg.db.path).await?;
            index.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, format } => {
            run_ingest(&cfg, &path, format).await?;
        }
        Commands::Generate {
            task,
            language,
            context,
            creativity,
            fenced,
        } => {
            let harness = Harness::open(&cfg).await?;
            let output = harness.generate(&task, language, context, creativity).await;
            let is_error = output.starts_with("Error: ");
            if fenced && !is_error {
                println!("```{}\n{}\n```", language.syntax(), output);
            } else {
                println!("{}", output);
            }
            if is_error {
                std::io::stdout().flush()?;
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_ingest(
    cfg: &config::Config,
    path: &Path,
    format: Option<DocumentFormat>,
) -> anyhow::Result<()> {
    let files = collect_files(path, format)?;
    if files.is_empty() {
        bail!("no supported documents found at {}", path.display());
    }

    let harness = Harness::open(cfg).await?;
    let mut ingested = 0usize;
    let mut unchanged = 0usize;
    let mut chunks = 0usize;
    let mut failed = 0usize;

    for (file, name, fmt) in &files {
        let content =
            std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        match harness
            .ingest(DocumentInput::new(name.clone(), *fmt, content))
            .await
        {
            Ok(result) if result.unchanged => {
                unchanged += 1;
                println!("  {}: unchanged", name);
            }
            Ok(result) => {
                ingested += 1;
                chunks += result.chunks_indexed;
                println!("  {}: {} chunks", name, result.chunks_indexed);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {}: {}", name, e);
            }
        }
    }

    println!("ingest {}", path.display());
    println!("  documents ingested: {}", ingested);
    println!("  documents unchanged: {}", unchanged);
    println!("  chunks written: {}", chunks);
    if failed > 0 {
        bail!("{} of {} documents failed to ingest", failed, files.len());
    }
    println!("ok");
    Ok(())
}

/// Resolve `path` to `(file, document name, format)` triples, sorted by
/// name. Every document is named by its canonical path. Directory entries
/// with unsupported extensions are skipped unless a format is forced.
fn collect_files(
    path: &Path,
    forced: Option<DocumentFormat>,
) -> anyhow::Result<Vec<(PathBuf, String, DocumentFormat)>> {
    let detect = |p: &Path| {
        forced.or_else(|| {
            p.extension()
                .and_then(|e| e.to_str())
                .and_then(DocumentFormat::from_extension)
        })
    };

    if path.is_file() {
        let name = document_name(path)?;
        let Some(fmt) = detect(path) else {
            bail!(
                "cannot infer format of {}; pass --format",
                path.display()
            );
        };
        return Ok(vec![(path.to_path_buf(), name, fmt)]);
    }
    if !path.is_dir() {
        bail!("path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(fmt) = detect(entry.path()) else {
            continue;
        };
        let name = document_name(entry.path())?;
        files.push((entry.path().to_path_buf(), name, fmt));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

fn document_name(file: &Path) -> anyhow::Result<String> {
    let canonical = std::fs::canonicalize(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    Ok(canonical.to_string_lossy().into_owned())
}
