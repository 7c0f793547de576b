//! Gate Analytics CLI - Command-line interface for Gate Analytics
//!
//! Commands:
//! - run: Process an access log into attendance, session and cluster tables
//! - validate: Report which rows of an access log would be dropped
//! - config: Print the effective configuration

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gate_analytics::encoder::TableEncoder;
use gate_analytics::pipeline::PipelineReport;
use gate_analytics::schema::{CleaningReport, EventCleaner};
use gate_analytics::types::AttendanceKind;
use gate_analytics::{AnalyticsError, AnalyticsPipeline, PipelineConfig, VERSION};

/// Gate Analytics - Attendance and session analytics for gate access logs
#[derive(Parser)]
#[command(name = "gate-analytics")]
#[command(version = VERSION)]
#[command(about = "Turn gate access logs into attendance, session and cluster tables", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write result tables
    Run {
        /// Input CSV file (user_id,event_type,event_time)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the result tables
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Load configuration from a JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of clusters
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Seed for centroid initialization
        #[arg(long)]
        seed: Option<u64>,

        /// Session merge tolerance in minutes
        #[arg(long)]
        gap_minutes: Option<i64>,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check an access log and report dropped rows
    Validate {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Configuration file to load
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays clean for reports
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), GateCliError> {
    match cli.command {
        Commands::Run {
            input,
            output_dir,
            config,
            clusters,
            seed,
            gap_minutes,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(k) = clusters {
                config.cluster_count = k;
            }
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(minutes) = gap_minutes {
                config.gap_tolerance_minutes = minutes;
            }
            config.validate()?;

            cmd_run(config, &input, &output_dir, json)
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, GateCliError> {
    match path {
        Some(path) => Ok(PipelineConfig::load(path)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_run(
    config: PipelineConfig,
    input: &Path,
    output_dir: &Path,
    json: bool,
) -> Result<(), GateCliError> {
    let pipeline = AnalyticsPipeline::new(config);
    let report = pipeline.run(input, output_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_report(&report);
    }

    match report.failed_stage() {
        Some(failed) => Err(GateCliError::StageFailed {
            stage: failed.stage.to_string(),
            message: failed.error.clone().unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

fn print_run_report(report: &PipelineReport) {
    println!("Gate Analytics Run");
    println!("==================");
    println!("Run ID:     {}", report.run_id);
    println!("Input:      {}", report.input.display());
    println!("Input rows: {}", report.input_rows);

    if let Some(cleaning) = &report.attendance_cleaning {
        println!("Attendance: {}", cleaning.summary());
    }
    if let Some(cleaning) = &report.session_cleaning {
        println!("Sessions:   {}", cleaning.summary());
    }

    println!("\nStages:");
    for stage in &report.stages {
        match &stage.error {
            Some(error) => println!("  [FAIL] {}: {}", stage.stage, error),
            None => {
                let outputs: Vec<String> = stage
                    .outputs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                println!(
                    "  [OK]   {}: {} rows -> {}",
                    stage.stage,
                    stage.rows,
                    outputs.join(", ")
                );
            }
        }
    }

    if let Some(clustering) = &report.clustering {
        println!(
            "\nClusters:   {} of {} active, {} iterations{}",
            clustering.active_clusters,
            clustering.requested_clusters,
            clustering.iterations,
            if clustering.converged { "" } else { " (not converged)" }
        );
    }
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), GateCliError> {
    let rows = TableEncoder::read_raw_rows(input)?;

    // Both policies drop the same rows; the strict one is the reference
    let report: CleaningReport = EventCleaner::strict().clean::<AttendanceKind>(&rows).report;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let counts = report.skip_counts();
        println!("Validation Report");
        println!("=================");
        println!("Total rows:    {}", report.total_rows);
        println!("Valid rows:    {}", report.accepted_rows);
        println!("Skipped rows:  {}", report.skipped_rows());
        println!("  missing user_id:    {}", counts.missing_user_id);
        println!("  unknown event_type: {}", counts.unknown_event_type);
        println!("  invalid timestamp:  {}", counts.invalid_timestamp);

        if !report.skipped.is_empty() {
            println!("\nSkipped:");
            for skipped in &report.skipped {
                println!("  - Row {} (user {:?}): {}", skipped.row, skipped.user_id, skipped.reason);
            }
        }
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(GateCliError::ValidationFailed(report.skipped_rows()))
    }
}

// Error types

#[derive(Debug)]
enum GateCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    StageFailed { stage: String, message: String },
}

impl From<io::Error> for GateCliError {
    fn from(e: io::Error) -> Self {
        GateCliError::Io(e)
    }
}

impl From<AnalyticsError> for GateCliError {
    fn from(e: AnalyticsError) -> Self {
        GateCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for GateCliError {
    fn from(e: serde_json::Error) -> Self {
        GateCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<GateCliError> for CliError {
    fn from(e: GateCliError) -> Self {
        match e {
            GateCliError::Io(e) | GateCliError::Analytics(AnalyticsError::Io(e)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            GateCliError::Analytics(AnalyticsError::Csv(e)) => CliError {
                code: "CSV_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Input must have user_id,event_type,event_time columns".to_string()),
            },
            GateCliError::Json(e) | GateCliError::Analytics(AnalyticsError::Json(e)) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            GateCliError::Analytics(e @ AnalyticsError::InvalidConfig(_)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'gate-analytics config' to see valid settings".to_string()),
            },
            GateCliError::Analytics(e) => CliError {
                code: "CLUSTERING_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Lower the cluster count or provide more users".to_string()),
            },
            GateCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rows failed validation", count),
                hint: Some("Dropped rows are listed in the validation report".to_string()),
            },
            GateCliError::StageFailed { stage, message } => CliError {
                code: "STAGE_FAILED".to_string(),
                message: format!("{} stage failed: {}", stage, message),
                hint: Some("Tables from earlier stages were kept".to_string()),
            },
        }
    }
}
