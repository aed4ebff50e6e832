//! Redact command - scan a PDF and write a copy with findings blacked out.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use piiscan_core::{RedactionStatus, ScanConfig, ScanStatus};

use super::{build_pool, read_document};

/// Arguments for the redact command.
#[derive(Args)]
pub struct RedactArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output PDF (default: <input>_redacted.pdf next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append the scan result to a JSON lines store
    #[arg(long, env = "PIISCAN_STORE")]
    store: Option<PathBuf>,

    /// Reject SSNs with area numbers that are never issued
    #[arg(long)]
    strict_ssn: bool,
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("document");
    input.with_file_name(format!("{}_redacted.pdf", stem))
}

pub async fn run(args: RedactArgs, config: ScanConfig) -> anyhow::Result<()> {
    let document = read_document(&args.input)?;
    info!("Redacting file: {}", args.input.display());

    let pool = build_pool(config, args.strict_ssn, args.store.as_ref(), None);
    let outcome = pool.submit_redaction(document)?.wait().await;
    pool.shutdown().await;

    let result = outcome.result;
    if result.status == ScanStatus::Failed {
        anyhow::bail!("Scan failed: {}", result.error.as_deref().unwrap_or("unknown error"));
    }

    let report = match outcome.redaction {
        Some(report) => report?,
        None => anyhow::bail!("Redaction was not attempted"),
    };

    match report.status {
        RedactionStatus::NotNeeded => {
            println!("{} {}: nothing to redact", style("✓").green(), result.filename);
        }
        RedactionStatus::Redacted => {
            let output_path = args.output.unwrap_or_else(|| default_output(&args.input));
            fs::write(&output_path, &report.pdf)?;

            println!(
                "{} Redacted {} of {} findings, written to {}",
                style("✓").green(),
                report.redacted_count,
                result.findings_count,
                output_path.display()
            );
            for warning in &report.warnings {
                eprintln!(
                    "{} page {} {}: {}",
                    style("!").yellow(),
                    warning.page,
                    warning.kind.as_str(),
                    warning.reason
                );
            }
        }
    }

    if result.status == ScanStatus::Partial {
        eprintln!(
            "{} Text extraction degraded on pages {:?}; values there were not redacted",
            style("!").yellow(),
            result.degraded_pages
        );
    }

    Ok(())
}
