//! Gaze Flux CLI - Command-line interface for Gaze Flux
//!
//! Commands:
//! - extract: Build participant features from tracker exports (batch mode)
//! - doctor: Diagnose configuration and input files

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use gaze_flux::aoi::read_aoi_file;
use gaze_flux::baseline::RestPupilSizes;
use gaze_flux::config::{RunConfig, Verbosity};
use gaze_flux::export::{ExportLevel, FeatureTableEncoder};
use gaze_flux::pipeline::{read_participants, BatchRequest};
use gaze_flux::recording::RecordingFiles;
use gaze_flux::types::TrackerKind;
use gaze_flux::{GazeError, GAZEFLUX_VERSION, PRODUCER_NAME};

/// Gaze Flux - Eye-tracking feature engine
#[derive(Parser)]
#[command(name = "gazeflux")]
#[command(version = GAZEFLUX_VERSION)]
#[command(about = "Compute gaze features from eye tracker exports", long_about = None)]
struct Cli {
    /// More log output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build participant features from tracker exports (batch mode)
    Extract {
        #[command(flatten)]
        input: InputArgs,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Rows to export
        #[arg(long, default_value = "all")]
        level: LevelArg,

        /// Interval features to export, in column order (defaults to all)
        #[arg(long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Per-AOI features to export, in column order; `numtransfrom`
        /// expands to one column per other AOI (defaults to all)
        #[arg(long, value_delimiter = ',')]
        aoi_features: Option<Vec<String>>,

        /// Participant id per recording (defaults to the recording ids)
        #[arg(long, value_delimiter = ',')]
        participants: Option<Vec<String>>,

        /// Log-time offset per recording in ms (defaults to 1000 each)
        #[arg(long, value_delimiter = ',')]
        log_time_offsets: Option<Vec<i64>>,

        /// Use only the first N ms of every segment
        #[arg(long)]
        prune_length: Option<i64>,

        /// Aggregate invalid segments into scenes too
        #[arg(long)]
        include_invalid: bool,

        /// Split low-quality segments around their largest invalid run
        #[arg(long)]
        auto_partition: bool,
    },

    /// Diagnose configuration and input files
    Doctor {
        #[command(flatten)]
        input: InputArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Run configuration (JSON); overrides --tracker
    #[arg(long)]
    config: Option<PathBuf>,

    /// Eye tracker that produced the exports
    #[arg(long, default_value = "tobiiv3")]
    tracker: TrackerArg,

    /// Directory holding the exports
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// Recording ids to process
    #[arg(short, long, value_delimiter = ',')]
    recordings: Vec<String>,

    /// AOI definition file
    #[arg(long)]
    aoi_file: Option<PathBuf>,

    /// Rest pupil size table
    #[arg(long)]
    rest_pupil_file: Option<PathBuf>,
}

impl InputArgs {
    fn load_config(&self) -> Result<RunConfig, CliFailure> {
        match &self.config {
            Some(path) => Ok(RunConfig::from_json(&fs::read_to_string(path)?)?),
            None => Ok(RunConfig::new(self.tracker.into())),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TrackerArg {
    /// Tobii Studio 1.x/2.x exports
    Tobiiv2,
    /// Tobii Studio 3.x exports
    Tobiiv3,
    /// SMI BeGaze exports
    Smi,
}

impl From<TrackerArg> for TrackerKind {
    fn from(arg: TrackerArg) -> Self {
        match arg {
            TrackerArg::Tobiiv2 => TrackerKind::TobiiV2,
            TrackerArg::Tobiiv3 => TrackerKind::TobiiV3,
            TrackerArg::Smi => TrackerKind::Smi,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    /// Scene rows only
    Scenes,
    /// Segment rows only
    Segments,
    /// Scene and segment rows
    All,
}

impl From<LevelArg> for ExportLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Scenes => ExportLevel::Scenes,
            LevelArg::Segments => ExportLevel::Segments,
            LevelArg::All => ExportLevel::All,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), CliFailure> {
    let requested = if cli.verbose {
        Some(Verbosity::Verbose)
    } else if cli.quiet {
        Some(Verbosity::Quiet)
    } else {
        None
    };

    match cli.command {
        Commands::Extract {
            input,
            output,
            level,
            features,
            aoi_features,
            participants,
            log_time_offsets,
            prune_length,
            include_invalid,
            auto_partition,
        } => {
            let mut config = input.load_config()?;
            if let Some(verbosity) = requested {
                config.verbosity = verbosity;
            }
            init_logging(config.verbosity);

            if prune_length.is_some() {
                config.policy.prune_length = prune_length;
            }
            if include_invalid {
                config.policy.require_valid_segs = false;
            }
            if auto_partition {
                config.policy.auto_partition_low_quality_segments = true;
            }
            config.validate()?;

            let mut request = BatchRequest::new(&input.data_dir, input.recordings.clone());
            if let Some(participants) = participants {
                request = request.with_participant_ids(participants);
            }
            request.log_time_offsets = log_time_offsets;
            request.aoi_file = input.aoi_file.clone();
            request.rest_pupil_file = input.rest_pupil_file.clone();

            let mut encoder = FeatureTableEncoder::new().with_level(level.into());
            if let Some(features) = features {
                encoder = encoder.with_features(features);
            }
            if let Some(aoi_features) = aoi_features {
                encoder = encoder.with_aoi_features(aoi_features);
            }

            cmd_extract(&config, &request, &encoder, &output)
        }
        Commands::Doctor { input, json } => {
            init_logging(requested.unwrap_or_default());
            cmd_doctor(&input, json)
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    // RUST_LOG still refines the level per module
    env_logger::Builder::new()
        .filter_level(verbosity.level_filter())
        .parse_default_env()
        .init();
}

fn cmd_extract(
    config: &RunConfig,
    request: &BatchRequest,
    encoder: &FeatureTableEncoder,
    output: &Path,
) -> Result<(), CliFailure> {
    if request.recording_ids.is_empty() {
        return Err(CliFailure::NoRecordings);
    }

    let outcome = read_participants(config, request)?;
    for skipped in &outcome.skipped {
        log::warn!("skipped {}: {}", skipped.recording_id, skipped.reason);
    }
    if outcome.participants.is_empty() {
        return Err(CliFailure::NoParticipants(outcome.skipped.len()));
    }

    let json = encoder.encode_to_json(&outcome.participants)?;

    if output.as_os_str() == "-" {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{json}")?;
    } else {
        fs::write(output, format!("{json}\n"))?;
        log::info!(
            "wrote {} participants to {}",
            outcome.participants.len(),
            output.display()
        );
    }
    Ok(())
}

fn cmd_doctor(input: &InputArgs, json: bool) -> Result<(), CliFailure> {
    let mut checks: Vec<DoctorCheck> = vec![DoctorCheck::ok(
        "version",
        format!("{PRODUCER_NAME} version {GAZEFLUX_VERSION}"),
    )];

    // Check configuration
    let config = match input.load_config() {
        Ok(config) => match config.validate() {
            Ok(()) => {
                checks.push(DoctorCheck::ok(
                    "config",
                    format!("Tracker {}", config.tracker),
                ));
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck::error("config", e.to_string()));
                None
            }
        },
        Err(e) => {
            checks.push(DoctorCheck::error("config", CliError::from(e).message));
            None
        }
    };

    // Check shared inputs if provided
    if let Some(path) = &input.aoi_file {
        checks.push(match read_aoi_file(path) {
            Ok(aois) => DoctorCheck::ok("aoi_file", format!("{} AOIs defined", aois.len())),
            Err(e) => DoctorCheck::error("aoi_file", e.to_string()),
        });
    }
    if let Some(path) = &input.rest_pupil_file {
        checks.push(match RestPupilSizes::read_file(path) {
            Ok(_) => DoctorCheck::ok("rest_pupil_file", "Rest pupil table valid".to_string()),
            Err(e) => DoctorCheck::error("rest_pupil_file", e.to_string()),
        });
    }

    // Check recording files
    if let Some(config) = &config {
        for recording_id in &input.recordings {
            let files = RecordingFiles::for_recording(config.tracker, &input.data_dir, recording_id);
            let missing = files.missing();
            let name = format!("recording:{recording_id}");
            checks.push(if missing.is_empty() {
                DoctorCheck::ok(&name, "All required files present".to_string())
            } else {
                DoctorCheck::warning(
                    &name,
                    format!(
                        "Missing {}",
                        missing
                            .iter()
                            .map(|path| path.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: GAZEFLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Gaze Flux Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(CliFailure::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum CliFailure {
    Io(io::Error),
    Gaze(GazeError),
    Json(serde_json::Error),
    NoRecordings,
    NoParticipants(usize),
    DoctorFailed,
}

impl From<io::Error> for CliFailure {
    fn from(e: io::Error) -> Self {
        CliFailure::Io(e)
    }
}

impl From<GazeError> for CliFailure {
    fn from(e: GazeError) -> Self {
        CliFailure::Gaze(e)
    }
}

impl From<serde_json::Error> for CliFailure {
    fn from(e: serde_json::Error) -> Self {
        CliFailure::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CliFailure> for CliError {
    fn from(e: CliFailure) -> Self {
        match e {
            CliFailure::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CliFailure::Gaze(e) if e.is_configuration() => CliError {
                code: "CONFIGURATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'gazeflux doctor' to check the configuration".to_string()),
            },
            CliFailure::Gaze(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the exports match the selected tracker".to_string()),
            },
            CliFailure::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CliFailure::NoRecordings => CliError {
                code: "NO_RECORDINGS".to_string(),
                message: "No recording ids given".to_string(),
                hint: Some("Pass --recordings P1,P2".to_string()),
            },
            CliFailure::NoParticipants(skipped) => CliError {
                code: "NO_PARTICIPANTS".to_string(),
                message: format!("All {skipped} recordings were skipped"),
                hint: Some("Re-run with --verbose to see why".to_string()),
            },
            CliFailure::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }

    fn warning(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message,
        }
    }

    fn error(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
