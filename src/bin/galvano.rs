//! Galvano CLI - batch analysis of biometric export directories
//!
//! Commands:
//! - run: analyze a directory of exports and write aggregate tables
//! - validate-config: load and validate a configuration file
//! - inspect: parse one export and print respondent diagnostics

use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use galvano::report::ReportSink;
use galvano::{JsonDirSink, PipelineConfig, PipelineProcessor, GALVANO_VERSION};

/// Galvano - offline EDA and pupil-dilation analysis pipeline
#[derive(Parser)]
#[command(name = "galvano")]
#[command(version = GALVANO_VERSION)]
#[command(about = "Aggregate biometric arousal signals across respondents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a directory of exports and write aggregate tables
    Run {
        /// Directory containing export files
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for aggregate tables and the run report
        #[arg(short, long)]
        out: PathBuf,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Append the run log to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Log filter (error, warn, info, debug, trace)
        #[arg(long, default_value = "info")]
        log_level: String,
    },

    /// Load and validate a configuration file
    ValidateConfig {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Parse one export file and print respondent diagnostics
    Inspect {
        /// Export file
        #[arg(short, long)]
        input: PathBuf,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), galvano::PipelineError> {
    match cli.command {
        Commands::Run {
            input,
            out,
            config,
            log_file,
            log_level,
        } => {
            init_logger(&log_level, log_file.as_deref())?;
            let config = PipelineConfig::from_json_file(&config)?;
            let processor = PipelineProcessor::new(config)?;
            let report = processor.process_directory(&input)?;

            log::info!(
                "run {}: {} respondents aggregated, {} excluded, {} flagged degenerate",
                report.provenance.run_id,
                report.respondents.len(),
                report.excluded.len(),
                report.degenerate.len()
            );
            for excluded in &report.excluded {
                log::warn!("excluded {}: {}", excluded.id, excluded.reason);
            }

            JsonDirSink::new(out).write(&report)?;
            Ok(())
        }

        Commands::ValidateConfig { config } => {
            let config = PipelineConfig::from_json_file(&config)?;
            println!(
                "configuration valid: {} catalog events, {} comparison groups",
                config.events.len(),
                config.comparison_groups.len()
            );
            Ok(())
        }

        Commands::Inspect { input, config } => {
            let config = PipelineConfig::from_json_file(&config)?;
            let processor = PipelineProcessor::new(config)?;
            let respondent = processor.load_respondent(&input)?;

            println!("respondent: {}", respondent.id);
            println!("samples: {}", respondent.eda.len());
            println!("malformed cells: {}", respondent.malformed_rows);
            println!("segments: {}", respondent.segments.len());
            for segment in &respondent.segments {
                println!(
                    "  {} [{}, {})  {} positions",
                    segment.label,
                    segment.start,
                    segment.end,
                    segment.duration()
                );
            }
            Ok(())
        }
    }
}

/// Initialize the run log: stderr by default, or appended to a file so every
/// respondent-level failure of a batch stays attributable afterwards.
fn init_logger(level: &str, log_file: Option<&std::path::Path>) -> std::io::Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
