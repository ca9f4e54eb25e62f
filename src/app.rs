//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initialises logging
//! - parses CLI arguments and resolves the configuration
//! - runs the pipeline and prints the summary

use std::fs;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, InspectArgs, RunArgs};
use crate::domain::PipelineConfig;
use crate::error::AppError;

pub mod pipeline;

pub use pipeline::{RunOutput, RunRequest, run_pipeline};

/// Entry point for the `ttv` binary.
pub fn run() -> Result<(), AppError> {
    init_logging();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

/// `RUST_LOG` (optionally from `.env`) or `info`.
fn init_logging() {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let request = request_from_args(&args)?;
    let output = run_pipeline(&request)?;
    println!("{}", crate::report::format_run_summary(&output));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let text = match args.path.extension().and_then(|e| e.to_str()) {
        Some("ttvs") => crate::report::format_quick_ttvs(&crate::io::read_quick_ttvs(&args.path)?),
        _ => {
            let (header, lc) = crate::io::read_litecurve(&args.path)?;
            crate::report::format_table_summary(&header, &lc)
        }
    };
    println!("{text}");
    Ok(())
}

/// Defaults, then the JSON file, then CLI flags.
pub fn config_from_args(args: &RunArgs) -> Result<PipelineConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(kernel) = args.kernel {
        config.kernel = kernel;
    }
    config.validate()?;
    Ok(config)
}

fn load_config(path: &Path) -> Result<PipelineConfig, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config '{}': {e}", path.display())))?;
    PipelineConfig::from_json(&text)
}

pub fn request_from_args(args: &RunArgs) -> Result<RunRequest, AppError> {
    Ok(RunRequest {
        mission: args.mission,
        target: args.target.clone(),
        catalog: args.catalog.clone(),
        data_dir: args.data_dir.clone(),
        output_dir: args.output_dir.clone(),
        prior_ttvs: args.prior_ttvs.clone(),
        config: config_from_args(args)?,
    })
}
