//! Command-line parsing for the `ttv` binary.
//!
//! Argument parsing and command dispatch are kept apart from the pipeline
//! code; `app` turns these structs into a `RunRequest`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{KernelChoice, Mission};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ttv", version, about = "Light-curve detrending and transit-timing estimation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detrend a target's photometry and estimate its transit times.
    Run(RunArgs),
    /// Summarise a stored light-curve table or quick-TTV file.
    Inspect(InspectArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Naming convention of the target.
    #[arg(long, value_enum, default_value_t = Mission::Kepler)]
    pub mission: Mission,

    /// Target name, e.g. K00137.
    #[arg(long)]
    pub target: String,

    /// Planet catalog CSV.
    #[arg(long, value_name = "CSV")]
    pub catalog: PathBuf,

    /// Directory holding `<target>_*.csv` photometry.
    #[arg(long, value_name = "DIR")]
    pub data_dir: PathBuf,

    #[arg(long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Published transit times used to seed the ephemeris.
    #[arg(long, value_name = "FILE")]
    pub prior_ttvs: Option<PathBuf>,

    /// JSON file overriding pipeline defaults.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Random seed (overrides the config file).
    #[arg(long)]
    pub seed: Option<u64>,

    /// GP kernel family for detrending (overrides the config file).
    #[arg(long, value_enum)]
    pub kernel: Option<KernelChoice>,
}

#[derive(Debug, Parser)]
pub struct InspectArgs {
    /// A `.ltc` table or a `.ttvs` file.
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::parse_from([
            "ttv", "run", "--mission", "simulated", "--target", "S00137", "--catalog", "cat.csv",
            "--data-dir", "data", "--output-dir", "out", "--seed", "7", "--kernel", "sho",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.mission, Mission::Simulated);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.kernel, Some(KernelChoice::Sho));
        assert!(args.prior_ttvs.is_none());
    }

    #[test]
    fn run_requires_target() {
        assert!(Cli::try_parse_from(["ttv", "run", "--catalog", "c", "--data-dir", "d", "--output-dir", "o"]).is_err());
    }
}
