//! Inspect command - report basic facts about a PDF.

use std::fs;
use std::path::PathBuf;

use clap::Args;

use piiscan_core::{ExtractionLimits, PdfExtractor, ScanConfig};

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Input PDF file
    #[arg(required = true)]
    input: PathBuf,
}

pub fn run(args: InspectArgs, config: ScanConfig) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let data = fs::read(&args.input)?;
    let extractor = PdfExtractor::new(ExtractionLimits::from(&config.limits));
    let info = extractor.inspect(&data);

    println!("{}", serde_json::to_string_pretty(&info)?);

    if !info.is_valid {
        anyhow::bail!("Not a usable PDF: {}", info.error.as_deref().unwrap_or("unknown error"));
    }
    Ok(())
}
