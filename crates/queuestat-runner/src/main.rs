//! # queuestat
//!
//! CLI runner for queuestat models.

use clap::{Parser, Subcommand, ValueEnum};
use queuestat_model::load_model;
use queuestat_runner::{export_csv, export_json, run_model, RunnerError, SimulationReport};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Duration Parsing
// ============================================================================

/// Parse a run length into seconds.
///
/// A bare number is seconds (`90`). Numbers may carry an `s`, `m` or `h`
/// suffix and be chained (`10m`, `1h30m`); a trailing bare number is seconds.
fn parse_duration(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let mut total = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("Invalid duration '{}': expected a number", s))?;

        let mut chars = tail.chars();
        let unit = match chars.next() {
            None | Some('s') => 1.0,
            Some('m') => 60.0,
            Some('h') => 3600.0,
            Some(c) => return Err(format!("Invalid duration '{}': unknown unit '{}'", s, c)),
        };
        total += value * unit;
        rest = chars.as_str();
    }

    if total > 0.0 {
        Ok(total)
    } else {
        Err(format!("Invalid duration '{}': must be positive", s))
    }
}

// ============================================================================
// CLI Configuration
// ============================================================================

/// Output format for the report.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Full report as JSON.
    #[default]
    Json,
    /// Per-source summary rows as CSV.
    Csv,
}

/// queuestat - waiting, processing and queue statistics for queueing models
#[derive(Parser, Debug)]
#[command(name = "queuestat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulation from a YAML model file
    Run(RunConfig),
    /// Load and validate a YAML model file without running it
    Validate {
        /// Path to the model file
        model: PathBuf,
    },
}

/// Options for `queuestat run`.
#[derive(clap::Args, Debug)]
pub struct RunConfig {
    /// Path to the model file
    pub model: PathBuf,

    /// Random seed (overrides the model's `simulation.seed`)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Simulation duration, e.g. `90`, `10m`, `1h30m` (overrides `simulation.duration_s`)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<f64>,

    /// Write the report to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

fn run_simulation(config: &RunConfig) -> Result<SimulationReport, RunnerError> {
    let mut model = load_model(&config.model)?;
    if let Some(seed) = config.seed {
        model.simulation.seed = seed;
    }
    if let Some(duration) = config.duration {
        model.simulation.duration_s = duration;
    }
    tracing::info!(
        "Loaded {} ({} resources, {} sources), seed {}",
        config.model.display(),
        model.resources.len(),
        model.sources.len(),
        model.simulation.seed
    );
    run_model(&model)
}

fn write_report<W: Write>(
    report: &SimulationReport,
    format: OutputFormat,
    writer: &mut W,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Json => export_json(report, writer),
        OutputFormat::Csv => export_csv(report, writer),
    }
}

fn main() -> Result<(), RunnerError> {
    // Default to "warn" level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(config) => {
            let report = run_simulation(&config)?;
            match &config.output {
                Some(path) => {
                    let file = std::fs::File::create(path)?;
                    let mut writer = std::io::BufWriter::new(file);
                    write_report(&report, config.format, &mut writer)?;
                    writer.flush()?;
                    eprintln!("Report written to {}", path.display());
                }
                None => {
                    let stdout = std::io::stdout();
                    write_report(&report, config.format, &mut stdout.lock())?;
                }
            }
        }
        Commands::Validate { model } => {
            let loaded = load_model(&model)?;
            println!(
                "{}: OK ({} resources, {} sources)",
                model.display(),
                loaded.resources.len(),
                loaded.sources.len()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90"), Ok(90.0));
        assert_eq!(parse_duration("10m"), Ok(600.0));
        assert_eq!(parse_duration("1h30m"), Ok(5400.0));
        assert_eq!(parse_duration("1m30"), Ok(90.0));
        assert_eq!(parse_duration("45s"), Ok(45.0));
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "queuestat", "run", "model.yaml", "--seed", "3", "--duration", "2m", "--format", "csv",
        ]);
        match cli.command {
            Commands::Run(config) => {
                assert_eq!(config.seed, Some(3));
                assert_eq!(config.duration, Some(120.0));
                assert!(matches!(config.format, OutputFormat::Csv));
                assert!(config.output.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
