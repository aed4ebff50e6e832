//! CLI application for scanning PDF documents for sensitive personal data.

mod commands;
mod settings;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, findings, inspect, redact, scan};
use settings::LimitArgs;

/// piiscan - Find emails and SSNs in PDF documents
#[derive(Parser)]
#[command(name = "piiscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true, env = "PIISCAN_CONFIG")]
    config: Option<String>,

    #[command(flatten)]
    limits: LimitArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a single PDF
    Scan(scan::ScanArgs),

    /// Scan many PDFs through the worker pool
    Batch(batch::BatchArgs),

    /// Scan a PDF and write a redacted copy
    Redact(redact::RedactArgs),

    /// Show size, page count and validity of a PDF
    Inspect(inspect::InspectArgs),

    /// Query stored scan results
    Findings(findings::FindingsArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Scan(args) => scan::run(args, settings::load(config_path, &cli.limits)?).await,
        Commands::Batch(args) => batch::run(args, settings::load(config_path, &cli.limits)?).await,
        Commands::Redact(args) => redact::run(args, settings::load(config_path, &cli.limits)?).await,
        Commands::Inspect(args) => inspect::run(args, settings::load(config_path, &cli.limits)?),
        Commands::Findings(args) => findings::run(args).await,
        Commands::Config(args) => config::run(args, config_path),
    }
}
