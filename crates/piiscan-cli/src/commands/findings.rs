//! Findings command - query results stored by earlier scans.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;
use uuid::Uuid;

use piiscan_core::sink::{SinkStats, StoredDocument, DEFAULT_QUERY_LIMIT};
use piiscan_core::{DocumentQuery, JsonlSink, ResultSink};

use super::OutputFormat;

/// Arguments for the findings command.
#[derive(Args)]
pub struct FindingsArgs {
    /// JSON lines store written by scan or batch
    #[arg(long, env = "PIISCAN_STORE", required = true)]
    store: PathBuf,

    /// Only this document
    #[arg(long)]
    document_id: Option<Uuid>,

    /// Maximum number of documents, newest first
    #[arg(short = 'n', long, default_value_t = DEFAULT_QUERY_LIMIT)]
    limit: usize,

    /// Show aggregate statistics instead of documents
    #[arg(long)]
    stats: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,
}

pub async fn run(args: FindingsArgs) -> anyhow::Result<()> {
    let sink = JsonlSink::new(&args.store);

    if args.stats {
        let stats = sink.stats().await?;
        let output = match args.format {
            OutputFormat::Json => serde_json::to_string_pretty(&stats)?,
            OutputFormat::Text => format_stats_text(&stats),
        };
        println!("{}", output);
        return Ok(());
    }

    let query = match args.document_id {
        Some(id) => DocumentQuery::by_id(id),
        None => DocumentQuery::default(),
    }
    .with_limit(args.limit);

    let documents = sink.query(&query).await?;
    if let Some(id) = args.document_id.filter(|_| documents.is_empty()) {
        anyhow::bail!("No stored document with id {}", id);
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&documents)?,
        OutputFormat::Text => format_documents_text(&documents),
    };
    println!("{}", output);

    Ok(())
}

fn format_stats_text(stats: &SinkStats) -> String {
    format!(
        "documents: {}\nfindings: {}\navg processing time: {:.1}ms\ntotal size: {} bytes",
        stats.total_documents, stats.total_findings, stats.avg_processing_time_ms, stats.total_file_size_bytes
    )
}

fn format_documents_text(documents: &[StoredDocument]) -> String {
    let mut output = String::new();

    for stored in documents {
        let doc = &stored.document;
        let _ = writeln!(
            output,
            "{} {} [{}] {} pages, {} findings, {}",
            doc.id,
            doc.filename,
            doc.status,
            doc.total_pages,
            doc.findings_count,
            doc.processed_at.to_rfc3339()
        );
        if !doc.error_message.is_empty() {
            let _ = writeln!(output, "  error: {}", doc.error_message);
        }
        for finding in &stored.findings {
            let _ = writeln!(
                output,
                "  page {:<4} {:<6} {}",
                finding.page_number, finding.finding_type, finding.finding_value
            );
        }
    }

    output
}
