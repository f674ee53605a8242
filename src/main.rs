use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use repair_order_features::app::feature_pipeline_use_case::FeaturePipelineUseCase;
use repair_order_features::observability::metrics;
use repair_order_features::{logging, Config, Pipeline};

#[derive(Parser)]
#[command(name = "repair_order_features")]
#[command(about = "Links repair-order headers to their quality checks and derives a wide feature table")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "RO_FEATURES_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for rolling JSON log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the feature table and its report
    Run {
        /// Repair-order export (CSV)
        #[arg(long)]
        input: PathBuf,
        /// Feature table path (default: <input stem>_features.csv next to the input)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Report path (default: <output stem>_transformation_report.json)
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write Prometheus text metrics here at the end of the run
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
    /// Show the structure of an export without writing anything
    Inspect {
        #[arg(long)]
        input: PathBuf,
    },
    /// List the check flag rules in effect
    Flags,
}

fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads RO_FEATURES_CONFIG
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(&cli.log_dir);

    let config = Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &cli.config {
        info!("Using configuration from {}", path.display());
    }
    let pipeline = Pipeline::new(config)?;

    match cli.command {
        Commands::Run {
            input,
            output,
            report,
            metrics_file,
        } => {
            if metrics_file.is_some() {
                metrics::init()?;
            }

            let use_case = FeaturePipelineUseCase::with_file_outputs(pipeline);
            let summary = use_case.execute(&input, output.as_deref(), report.as_deref())?;
            for line in summary.report.summary_lines() {
                println!("{}", line);
            }
            println!("Report: {}", summary.report_file.path.display());

            if let Some(path) = metrics_file {
                metrics::write_to_file(&path)?;
            }
        }
        Commands::Inspect { input } => {
            let summary = pipeline.inspect(&input)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Flags => {
            for line in pipeline.registry().describe() {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
