//! psi-surface CLI
//!
//! Turns vendor tick CSVs into PINN training bundles (.mat).
//!
//! ```bash
//! # Options surface, spot from the equity file
//! psi-surface options --input OPT_RELIANCE_20250529.csv --equity EQT_RELIANCE_20250529.csv \
//!     --expiry 20250529 --output OPT_PINN_TRAIN_DATA_20250529.mat
//!
//! # Equity series
//! psi-surface equity --input EQT_RELIANCE_20250529.csv --expiry 20250529 \
//!     --output EQT_PINN_TRAIN_DATA_20250529.mat
//!
//! # Every expiry in a directory
//! psi-surface batch --expiry 20250529 --expiry 20250626 --data-dir data --out-dir mat
//!
//! # Look inside a bundle
//! psi-surface inspect --input OPT_PINN_TRAIN_DATA_20250529.mat --json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use psi_surface::data::{read_mat_file, MatData};
use psi_surface::pipeline::{create_equity_mat, create_options_mat, run_batch, BatchPlan, PipelineConfig};

/// Tick data to PINN training bundles
#[derive(Parser)]
#[command(name = "psi-surface")]
#[command(about = "Convert option / equity tick CSVs into PINN training .mat bundles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML file overriding the default pipeline settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Underlying symbol (overrides the config file)
    #[arg(long, global = true)]
    symbol: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an options bundle
    Options {
        /// Option tick CSV
        #[arg(long)]
        input: PathBuf,

        /// Expiry tag stored in the bundle
        #[arg(long)]
        expiry: String,

        /// Output .mat path
        #[arg(long)]
        output: PathBuf,

        /// Underlying tick CSV used as the spot reference
        #[arg(long)]
        equity: Option<PathBuf>,
    },

    /// Build an equity bundle
    Equity {
        /// Equity tick CSV
        #[arg(long)]
        input: PathBuf,

        /// Expiry tag stored in the bundle
        #[arg(long)]
        expiry: String,

        /// Output .mat path
        #[arg(long)]
        output: PathBuf,
    },

    /// Build both bundles for each expiry from conventionally named files
    Batch {
        /// Expiry tag (repeatable)
        #[arg(long = "expiry", required = true)]
        expiries: Vec<String>,

        /// Directory holding OPT_/EQT_ CSVs
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,

        /// Directory for the .mat files
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        #[arg(long)]
        skip_options: bool,

        #[arg(long)]
        skip_equity: bool,
    },

    /// List the entries of a .mat file
    Inspect {
        #[arg(long)]
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct EntrySummary {
    name: String,
    class: &'static str,
    dims: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(symbol) = &cli.symbol {
        config.symbol = symbol.clone();
    }
    config.validate()?;
    Ok(config)
}

fn inspect(input: &Path, json: bool) -> Result<()> {
    let vars = read_mat_file(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let entries: Vec<EntrySummary> = vars
        .into_iter()
        .map(|v| {
            let (class, text) = match v.data {
                MatData::F64(_) => ("double", None),
                MatData::F32(_) => ("single", None),
                MatData::ComplexF32 { .. } => ("complex single", None),
                MatData::Logical(_) => ("logical", None),
                MatData::Char(s) => ("char", Some(s)),
            };
            EntrySummary {
                name: v.name,
                class,
                dims: v.dims,
                text,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", input.display());
    for e in &entries {
        let dims: Vec<String> = e.dims.iter().map(|d| d.to_string()).collect();
        match &e.text {
            Some(text) => println!("  {:<10} {:<15} {:<12} '{}'", e.name, e.class, dims.join("x"), text),
            None => println!("  {:<10} {:<15} {}", e.name, e.class, dims.join("x")),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("psi_surface=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Options {
            input,
            expiry,
            output,
            equity,
        } => {
            let config = load_config(&cli)?;
            let report = create_options_mat(input, expiry, output, equity.as_deref(), &config)
                .with_context(|| format!("Options transform failed for {}", input.display()))?;
            println!(
                "Saved options bundle: {} ({} x {}, {} valid cells)",
                output.display(),
                report.nt,
                report.nx,
                report.valid_cells
            );
        }

        Commands::Equity { input, expiry, output } => {
            let config = load_config(&cli)?;
            let report = create_equity_mat(input, expiry, output, &config)
                .with_context(|| format!("Equity transform failed for {}", input.display()))?;
            println!("Saved equity bundle: {} ({} rows)", output.display(), report.nt);
        }

        Commands::Batch {
            expiries,
            data_dir,
            out_dir,
            skip_options,
            skip_equity,
        } => {
            let config = load_config(&cli)?;
            let plan = BatchPlan {
                data_dir: data_dir.clone(),
                out_dir: out_dir.clone(),
                expiries: expiries.clone(),
                run_options: !skip_options,
                run_equity: !skip_equity,
            };
            let summary = run_batch(&plan, &config).context("Batch run failed")?;
            for out in &summary.written {
                println!("Saved {}", out.path.display());
            }
            if !summary.skipped.is_empty() {
                println!("Skipped {} missing input(s)", summary.skipped.len());
            }
        }

        Commands::Inspect { input, json } => inspect(input, *json)?,
    }

    Ok(())
}
