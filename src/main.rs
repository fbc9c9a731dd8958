use std::path::PathBuf;

use clap::{Parser, Subcommand};
use midi_velocity_infer::inference::OnnxVelocityModel;
use midi_velocity_infer::preprocessing::metadata::DatasetMetadata;
use midi_velocity_infer::tools::ProcessRunner;
use midi_velocity_infer::upload::{publish, UploadService};
use midi_velocity_infer::{Config, InferenceReport, VelocityInfer};
use tracing::warn;

/// Predict note velocities for a MIDI performance
#[derive(Parser)]
#[command(name = "mvi")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a MIDI file and write a copy with predicted velocities
    Infer {
        /// Input MIDI file
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    ShowConfig,
    /// Load a dataset metadata file and print its bounds
    CheckMetadata {
        /// Metadata JSON file (defaults to the configured one)
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Infer { input, json } => {
            let report = run_infer(config, &input);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.message);
                if let Some(path) = &report.output_path {
                    println!("Output: {}", path.display());
                }
                if let Some(url) = &report.url {
                    println!("URL: {}", url);
                }
            }
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::ShowConfig => {
            print!("{}", config.to_toml());
        }
        Commands::CheckMetadata { path } => {
            let path = path.unwrap_or_else(|| config.metadata_path.clone());
            let metadata = DatasetMetadata::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}

fn run_infer(config: Config, input: &std::path::Path) -> InferenceReport {
    let uploads = UploadService::new(&config.upload.upload_dir);
    let midi_path = match uploads.store_file(input) {
        Ok(path) => path,
        Err(err) => {
            warn!(error = %err, "upload failed");
            return InferenceReport::upload_failed(err);
        }
    };

    let model = match OnnxVelocityModel::load(&config.model_path, &config.input_name, config.intra_threads) {
        Ok(model) => model,
        Err(err) => return InferenceReport::from_result(&Err(err)),
    };
    let runner = ProcessRunner::new(config.tool_timeout());
    let mvi = VelocityInfer::new(config, runner, model);

    let result = mvi.infer(&midi_path);
    let report = InferenceReport::from_result(&result);

    let Some(output) = report.output_path.clone() else {
        return report;
    };
    let upload = &mvi.config().upload;
    match publish(&output, &upload.web_root, &upload.base_url) {
        Ok(url) => report.with_url(url),
        Err(err) => {
            warn!(error = %err, "failed to publish result");
            report
        }
    }
}
