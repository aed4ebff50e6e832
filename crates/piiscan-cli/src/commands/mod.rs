//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod findings;
pub mod inspect;
pub mod redact;
pub mod scan;

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use piiscan_core::{
    Document, EmailMatcher, JsonlSink, MetricsHandle, ResultSink, ScanConfig, ScanCoordinator, ScanResult,
    SensitiveDataMatcher, SsnMatcher, WorkerPool,
};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

/// Read a file into a document named after it.
pub(crate) fn read_document(path: &Path) -> anyhow::Result<Document> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }
    let content = fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document.pdf")
        .to_string();
    Ok(Document::new(filename, content))
}

/// Build a pool over a coordinator configured from `config`.
pub(crate) fn build_pool(
    config: ScanConfig,
    strict_ssn: bool,
    store: Option<&PathBuf>,
    metrics: Option<&MetricsHandle>,
) -> WorkerPool {
    let mut coordinator = ScanCoordinator::new(config);
    if strict_ssn {
        coordinator = coordinator.with_matcher(SensitiveDataMatcher::with_matchers(vec![
            Box::new(EmailMatcher::new()),
            Box::new(SsnMatcher::new().with_area_validation(true)),
        ]));
    }
    if let Some(metrics) = metrics {
        coordinator = coordinator.with_metrics(metrics.clone());
    }

    let mut pool = WorkerPool::new(Arc::new(coordinator));
    if let Some(path) = store {
        let sink: Arc<dyn ResultSink> = Arc::new(JsonlSink::new(path));
        pool = pool.with_sink(sink);
    }
    if let Some(metrics) = metrics {
        pool = pool.with_metrics(metrics.clone());
    }
    pool
}

pub(crate) fn format_result(result: &ScanResult, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Text => format_result_text(result),
    })
}

fn format_result_text(result: &ScanResult) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{}: {}, {} pages, {} findings ({}ms)",
        result.filename, result.status, result.total_pages, result.findings_count, result.processing_time_ms
    );
    if let Some(error) = &result.error {
        let _ = writeln!(output, "  error: {}", error);
    }
    for finding in &result.findings {
        let _ = writeln!(
            output,
            "  page {:<4} {:<6} {}  [{}..{}]",
            finding.page,
            finding.kind.as_str(),
            finding.value,
            finding.start,
            finding.end
        );
    }

    output
}
