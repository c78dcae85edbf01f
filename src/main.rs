use anyhow::{Context, Result};
use charity_ledger::outliers::{detect_outliers, observed_bounds};
use charity_ledger::profile::{describe_numeric, missing_values, numeric_columns};
use charity_ledger::{AnalysisReport, Pipeline, PipelineConfig, PipelineOutput};
use clap::{Args, Parser, Subcommand};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "charity-ledger")]
#[command(about = "Clean, reconcile and analyse charity registry and annual-report extracts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Sources {
    /// Charity registry extract
    #[arg(long)]
    registry: PathBuf,

    /// Annual-report filing extract
    #[arg(long)]
    filings: PathBuf,

    /// JSON configuration file (defaults are used for missing fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reporting year (overrides config and CHARITY_TARGET_YEAR)
    #[arg(long)]
    year: Option<i32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline and print the analysis report
    Run {
        #[command(flatten)]
        sources: Sources,

        /// Rows per ranking
        #[arg(long)]
        top: Option<usize>,

        /// Write the reconciled table to this CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Missing values and numeric summary of every stage
    Profile {
        #[command(flatten)]
        sources: Sources,
    },
    /// IQR bounds and outlier rows of one numeric column
    Outliers {
        #[command(flatten)]
        sources: Sources,

        /// Numeric column to inspect (defaults to the configured outlier column)
        #[arg(long)]
        column: Option<String>,
    },
}

fn load_config(sources: &Sources) -> Result<PipelineConfig> {
    let config = match &sources.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(year) = sources.year {
        config.target_year = year;
    }
    Ok(config)
}

fn run_pipeline(sources: &Sources, config: PipelineConfig) -> Result<(Pipeline, PipelineOutput)> {
    let pipeline = Pipeline::new(config)?;
    let output = pipeline
        .run_files(&sources.registry, &sources.filings)
        .with_context(|| {
            format!(
                "pipeline failed for {} and {}",
                sources.registry.display(),
                sources.filings.display()
            )
        })?;
    Ok((pipeline, output))
}

fn export_csv(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut df = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!(path = %path.display(), rows = df.height(), "reconciled table exported");
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { sources, top, export } => {
            let mut config = load_config(&sources)?;
            if let Some(top) = top {
                config.top_n = top;
            }
            let (pipeline, output) = run_pipeline(&sources, config)?;

            let report = AnalysisReport::from_output(&output, pipeline.config())?;
            println!("{}", report);

            if let Some(path) = export {
                export_csv(&output.reconciled, &path)?;
            }
        }
        Command::Profile { sources } => {
            let config = load_config(&sources)?;
            let (_, output) = run_pipeline(&sources, config)?;

            for (stage, df) in output.stages() {
                println!("\n=== {} ({} rows x {} columns) ===", stage, df.height(), df.width());
                for column in missing_values(df) {
                    println!(
                        "{:<60} {:<10} {:>8} missing ({:.1}%)",
                        column.column, column.data_type, column.null_count, column.null_percentage
                    );
                }
                let numeric = numeric_columns(df);
                if !numeric.is_empty() {
                    let names: Vec<&str> = numeric.iter().map(|s| s.as_str()).collect();
                    println!("{}", describe_numeric(df, &names)?);
                }
            }
        }
        Command::Outliers { sources, column } => {
            let config = load_config(&sources)?;
            let multiplier = config.iqr_multiplier;
            let column = column.unwrap_or_else(|| config.outlier_column.clone());
            let (_, output) = run_pipeline(&sources, config)?;

            if observed_bounds(&output.reconciled, &column, multiplier)?.is_none() {
                println!("{}: no values to compute outlier bounds from", column);
                return Ok(());
            }
            let (rows, bounds) = detect_outliers(&output.reconciled, &column, multiplier)?;
            println!(
                "{}: Q1 {:.2}, Q3 {:.2}, IQR {:.2}, bounds [{:.2}, {:.2}], {} outlier(s)",
                column,
                bounds.q1,
                bounds.q3,
                bounds.iqr,
                bounds.lower,
                bounds.upper,
                rows.height()
            );
            println!("{}", rows);
        }
    }

    Ok(())
}
