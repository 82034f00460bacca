//! CLI for mdlens
//!
//! Offline companion to the counter engine:
//! - report: re-aggregate a metric dump and print the summary table
//! - translate: check an extensible queue property list
//! - config: print the effective engine configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "mdlens")]
#[command(about = "mdlens - GPU performance counter tooling", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the engine's Prometheus counters after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a per-event metric dump
    Report(commands::report::ReportArgs),

    /// Translate a queue property list into the legacy bitfield
    Translate(commands::translate::TranslateArgs),

    /// Print the effective engine configuration as TOML
    Config(commands::config::ConfigArgs),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Report(args) => commands::report::run(args)?,
        Commands::Translate(args) => commands::translate::run(args)?,
        Commands::Config(args) => commands::config::run(args)?,
    }

    if cli.metrics {
        print!("{}", mdlens_gpu::telemetry::gather_text()?);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
