use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use aggregations::build_all_aggregations;
use cleaning::CleanPipeline;
use config::{CleanConfig, DataDirs};
use lookup::Vocabulary;

mod aggregations;
mod cleaning;
mod config;
mod lookup;

#[derive(Parser)]
#[command(name = "sales-pipeline", about = "Cleans raw e-commerce sales CSV exports and derives business aggregations")]
struct Cli {
    /// Root data directory (expects lookups/ inside, artefacts go to clean/,
    /// rejected/ and aggregations/).
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean a raw sales CSV into a parquet dataset plus rejected rows.
    Clean {
        /// Source CSV file.
        input: PathBuf,
        /// Destination parquet file; derived from the input name when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Optional TOML settings file.
        #[arg(long)]
        config: Option<String>,
        /// Override the configured chunk size.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Skip writing the rejected-rows sink.
        #[arg(long)]
        no_rejected: bool,
    },
    /// Build all aggregation tables from a cleaned parquet dataset.
    Aggregate {
        /// Cleaned parquet file produced by the clean command.
        input: PathBuf,
        /// Destination directory; defaults to <data-dir>/aggregations.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let dirs = DataDirs::new(&cli.data_dir);

    match cli.command {
        Command::Clean {
            input,
            output,
            config,
            chunk_size,
            no_rejected,
        } => run_clean(&dirs, &input, output, config, chunk_size, no_rejected),
        Command::Aggregate { input, output_dir } => {
            let output_dir = output_dir.unwrap_or_else(|| dirs.aggregations());
            info!("🚀 Building aggregations from {}", input.display());
            let artefacts = build_all_aggregations(&input, &output_dir)?;
            info!("🎉 Generated {} aggregation tables", artefacts.len());
            Ok(())
        }
    }
}

fn run_clean(
    dirs: &DataDirs,
    input: &Path,
    output: Option<PathBuf>,
    config_path: Option<String>,
    chunk_size: Option<usize>,
    no_rejected: bool,
) -> Result<()> {
    info!("🚀 Starting sales data cleaning pipeline");
    dirs.ensure()?;

    let mut config = match &config_path {
        Some(path) => CleanConfig::from_file(path)
            .with_context(|| format!("Failed to load settings from {path}"))?,
        None => CleanConfig::default(),
    };
    if let Some(chunk_size) = chunk_size {
        config.chunk_size = chunk_size;
    }
    if no_rejected {
        config.save_rejected_rows = false;
    }

    let vocabulary = Vocabulary::load(&dirs.lookups())
        .context("Failed to load lookup vocabulary - run the lookup build scripts first")?;

    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("sales");
    let clean_path = output.unwrap_or_else(|| dirs.clean().join(format!("{stem}_clean.parquet")));
    let rejected_path = dirs.rejected().join(format!("{stem}_rejected.csv"));

    let mut pipeline = CleanPipeline::new(config, vocabulary)?;
    let outcome = pipeline.run(input, &clean_path, &rejected_path)?;

    info!("\n=== Cleaning Summary ===");
    info!(
        "✅ {} of {} rows retained ({:.1}%)",
        outcome.stats.clean_rows,
        outcome.stats.input_rows,
        outcome.stats.retention_rate()
    );
    info!("📊 Clean dataset: {}", outcome.clean_path.display());
    match &outcome.rejected_path {
        Some(path) if outcome.stats.rejected_rows > 0 => {
            info!(
                "🗑️ {} rejected rows: {}",
                outcome.stats.rejected_rows,
                path.display()
            );
        }
        Some(_) => info!("🗑️ No rows were rejected"),
        None => {}
    }
    if outcome.stats.clean_rows == 0 {
        warn!("⚠️ No rows survived cleaning - check the input and lookup tables");
    } else {
        info!("🎉 Cleaning pipeline completed successfully!");
    }
    Ok(())
}
