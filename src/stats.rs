//! Index statistics for `cgen stats`.
//!
//! Prints what is indexed: document and chunk counts, the recorded
//! embedding dimension, and a per-format breakdown. Opening the index does
//! not need an embedder or model, so this works with any provider config.

use anyhow::Result;

use crate::config::Config;
use crate::store::{IndexStats, SqliteIndex, VectorIndex};

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.db.path).await?;
    let stats = index.stats().await?;
    index.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    print!("{}", render(config, &stats, db_size));
    Ok(())
}

fn render(config: &Config, stats: &IndexStats, db_size: u64) -> String {
    let mut out = String::new();
    out.push_str("cgen index stats\n");
    out.push_str("================\n\n");
    out.push_str(&format!("  Database:    {}\n", config.db.path.display()));
    out.push_str(&format!("  Size:        {}\n\n", format_bytes(db_size)));
    out.push_str(&format!("  Documents:   {}\n", stats.documents));
    out.push_str(&format!("  Chunks:      {}\n", stats.chunks));
    out.push_str(&format!(
        "  Dimension:   {}\n",
        stats
            .dims
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unset".to_string())
    ));
    out.push_str(&format!(
        "  Embedder:    {}\n",
        config.embedding.provider
    ));
    out.push_str(&format!(
        "  Last ingest: {}\n",
        stats
            .last_ingested_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    ));

    if !stats.by_format.is_empty() {
        out.push_str("\n  By format:\n");
        out.push_str(&format!("  {:<12} {:>6} {:>8}\n", "FORMAT", "DOCS", "CHUNKS"));
        out.push_str(&format!("  {}\n", "-".repeat(28)));
        for f in &stats.by_format {
            out.push_str(&format!(
                "  {:<12} {:>6} {:>8}\n",
                f.format, f.documents, f.chunks
            ));
        }
    }
    out.push('\n');
    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
