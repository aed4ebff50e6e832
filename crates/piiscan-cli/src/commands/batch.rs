//! Batch command - scan many PDFs through the worker pool.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use futures_util::stream::{FuturesUnordered, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use piiscan_core::{FindingKind, MetricsCollector, ScanConfig, ScanError, ScanResult, ScanStatus};

use super::{build_pool, read_document};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory for per-file JSON results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Append results to a JSON lines store
    #[arg(long, env = "PIISCAN_STORE")]
    store: Option<PathBuf>,

    /// Write Prometheus metrics to this file when done
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Exit successfully even when some files fail
    #[arg(long)]
    continue_on_error: bool,

    /// Reject SSNs with area numbers that are never issued
    #[arg(long)]
    strict_ssn: bool,
}

/// Outcome for one input file.
struct FileResult {
    path: PathBuf,
    result: Option<ScanResult>,
    error: Option<String>,
}

impl FileResult {
    fn status(&self) -> &'static str {
        match &self.result {
            Some(result) => result.status.as_str(),
            None => "error",
        }
    }

    fn is_failure(&self) -> bool {
        self.result.as_ref().is_none_or(|r| r.status == ScanStatus::Failed)
    }
}

pub async fn run(args: BatchArgs, config: ScanConfig) -> anyhow::Result<()> {
    let start = Instant::now();

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!("{} Found {} files to scan", style("ℹ").blue(), files.len());

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let collector = args.metrics.as_ref().map(|_| MetricsCollector::spawn()).transpose()?;
    let metrics = collector.as_ref().map(|(handle, _)| handle.clone());
    let pool = build_pool(config, args.strict_ssn, args.store.as_ref(), metrics.as_ref());

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut results = Vec::with_capacity(files.len());
    let mut pending = FuturesUnordered::new();

    for path in files {
        loop {
            // Keep submissions within capacity; a full pool means wait for a job.
            while pool.in_flight() >= pool.capacity() {
                match pending.next().await {
                    Some(done) => {
                        progress.inc(1);
                        results.push(done);
                    }
                    None => tokio::time::sleep(Duration::from_millis(5)).await,
                }
            }

            let document = match read_document(&path) {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    progress.inc(1);
                    results.push(FileResult {
                        path: path.clone(),
                        result: None,
                        error: Some(e.to_string()),
                    });
                    break;
                }
            };

            match pool.submit(document) {
                Ok(job) => {
                    let path = path.clone();
                    pending.push(async move {
                        let result = job.wait().await;
                        FileResult {
                            path,
                            result: Some(result),
                            error: None,
                        }
                    });
                    break;
                }
                Err(ScanError::PoolSaturated { .. }) => {
                    debug!("Pool saturated, retrying {}", path.display());
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    while let Some(done) = pending.next().await {
        progress.inc(1);
        results.push(done);
    }
    pool.shutdown().await;
    progress.finish_and_clear();

    results.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(ref output_dir) = args.output_dir {
        for file in &results {
            if let Some(result) = &file.result {
                let stem = file.path.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
                let output_path = output_dir.join(format!("{}.json", stem));
                fs::write(&output_path, serde_json::to_string_pretty(result)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        eprintln!("{} Summary written to {}", style("✓").green(), summary_path.display());
    }

    drop(pool);
    drop(metrics);
    if let (Some(path), Some((handle, task))) = (&args.metrics, collector) {
        drop(handle);
        let snapshot = task.await?;
        fs::write(path, snapshot.render_prometheus()?)?;
        eprintln!("{} Metrics written to {}", style("✓").green(), path.display());
    }

    let failed: Vec<&FileResult> = results.iter().filter(|r| r.is_failure()).collect();
    let partial = results.iter().filter(|r| r.status() == "partial").count();
    let findings: usize = results.iter().filter_map(|r| r.result.as_ref()).map(|r| r.findings_count).sum();

    println!();
    println!(
        "{} Scanned {} files in {:?}, {} findings",
        style("✓").green(),
        results.len(),
        start.elapsed(),
        findings
    );
    println!(
        "   {} successful, {} partial, {} failed",
        style(results.len() - failed.len() - partial).green(),
        style(partial).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for file in &failed {
            let error = file
                .error
                .as_deref()
                .or_else(|| file.result.as_ref().and_then(|r| r.error.as_deref()))
                .unwrap_or("unknown error");
            println!("  - {}: {}", file.path.display(), error);
        }

        if !args.continue_on_error {
            anyhow::bail!("{} of {} files failed", failed.len(), results.len());
        }
    }

    Ok(())
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "total_pages",
        "findings_count",
        "email_count",
        "ssn_count",
        "processing_time_ms",
        "error",
    ])?;

    for file in results {
        let filename = file.path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        match &file.result {
            Some(result) => {
                let counts = result.counts_by_kind();
                let count = |kind: FindingKind| counts.get(&kind).copied().unwrap_or(0).to_string();
                wtr.write_record([
                    filename,
                    result.status.as_str(),
                    &result.total_pages.to_string(),
                    &result.findings_count.to_string(),
                    &count(FindingKind::Email),
                    &count(FindingKind::Ssn),
                    &result.processing_time_ms.to_string(),
                    result.error.as_deref().unwrap_or(""),
                ])?;
            }
            None => {
                wtr.write_record([
                    filename,
                    "error",
                    "",
                    "",
                    "",
                    "",
                    "",
                    file.error.as_deref().unwrap_or(""),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
