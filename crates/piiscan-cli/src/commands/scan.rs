//! Scan command - find sensitive data in a single PDF.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info};

use piiscan_core::{ScanConfig, ScanStatus};

use super::{build_pool, format_result, read_document, OutputFormat};

/// Arguments for the scan command.
#[derive(Args)]
pub struct ScanArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Append the result to a JSON lines store
    #[arg(long, env = "PIISCAN_STORE")]
    store: Option<PathBuf>,

    /// Reject SSNs with area numbers that are never issued
    #[arg(long)]
    strict_ssn: bool,
}

pub async fn run(args: ScanArgs, config: ScanConfig) -> anyhow::Result<()> {
    let start = Instant::now();

    let document = read_document(&args.input)?;
    info!("Scanning file: {}", args.input.display());

    let pool = build_pool(config, args.strict_ssn, args.store.as_ref(), None);
    let result = pool.scan(document).await?;
    pool.shutdown().await;

    let output = format_result(&result, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    match result.status {
        ScanStatus::Failed => anyhow::bail!(
            "Scan failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ),
        ScanStatus::Partial => {
            eprintln!(
                "{} Text extraction degraded on pages {:?}",
                style("!").yellow(),
                result.degraded_pages
            );
            Ok(())
        }
        ScanStatus::Success => Ok(()),
    }
}
