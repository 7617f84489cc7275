//! Aqua CLI - Command-line interface for Aqua Index
//!
//! Commands:
//! - assess: Compute indices and risk levels for a batch of samples
//! - validate: Check input rows without computing anything
//! - standards: Print the permissible limits and thresholds of a standard

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aqua_index::config::EngineConfig;
use aqua_index::encoder::ReportEncoder;
use aqua_index::ingest::{RowIngestor, SampleRecord};
use aqua_index::pipeline::{assess_ingested, screen_rows};
use aqua_index::standards::{Standard, StandardId, StandardsRegistry};
use aqua_index::types::{AssessmentRecord, Metal, RowError};
use aqua_index::{Assessor, ComputeError, AQUA_VERSION};

/// Aqua - heavy-metal pollution indices for groundwater samples
#[derive(Parser)]
#[command(name = "aqua")]
#[command(version = AQUA_VERSION)]
#[command(about = "Compute HPI, HEI, CF and PLI and classify pollution risk", long_about = None)]
struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a batch of samples
    Assess {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Standard to assess against (overrides the config file)
        #[arg(long)]
        standard: Option<StandardArg>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Load the standards registry from file instead of the built-in one
        #[arg(long)]
        standards: Option<PathBuf>,

        /// Engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the full report (producer, provenance, stats, row errors)
        #[arg(long)]
        report: bool,
    },

    /// Validate input rows
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print standard limits and thresholds
    Standards {
        /// Only print this standard
        #[arg(long)]
        standard: Option<StandardArg>,

        /// Load the standards registry from file instead of the built-in one
        #[arg(long)]
        standards: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StandardArg {
    #[value(name = "WHO", alias = "who")]
    Who,
    #[value(name = "BIS", alias = "bis")]
    Bis,
}

impl From<StandardArg> for StandardId {
    fn from(arg: StandardArg) -> Self {
        match arg {
            StandardArg::Who => StandardId::Who,
            StandardArg::Bis => StandardId::Bis,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one sample row per line)
    Ndjson,
    /// JSON array of sample rows
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
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

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), AquaCliError> {
    match cli.command {
        Commands::Assess {
            input,
            output,
            standard,
            input_format,
            output_format,
            standards,
            config,
            report,
        } => cmd_assess(AssessArgs {
            input,
            output,
            standard: standard.map(StandardId::from),
            input_format,
            output_format,
            standards,
            config,
            report,
        }),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Standards {
            standard,
            standards,
            json,
        } => cmd_standards(standard.map(StandardId::from), standards.as_deref(), json),
    }
}

struct AssessArgs {
    input: PathBuf,
    output: PathBuf,
    standard: Option<StandardId>,
    input_format: InputFormat,
    output_format: OutputFormat,
    standards: Option<PathBuf>,
    config: Option<PathBuf>,
    report: bool,
}

fn cmd_assess(args: AssessArgs) -> Result<(), AquaCliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    // No backend can be wired from the command line, so a delegated config
    // fails here at the configuration stage.
    let registry = load_registry(args.standards.as_deref())?;
    let assessor = Assessor::from_config(&config, registry, None)?;
    let standard = args.standard.unwrap_or(config.standard);

    let records = read_records(&args.input, &args.input_format)?;
    if records.is_empty() {
        return Err(AquaCliError::NoRows);
    }
    let missing = RowIngestor::missing_columns(&records);
    if !missing.is_empty() {
        return Err(AquaCliError::MissingColumns(missing));
    }

    let ingested = RowIngestor::ingest(records);
    let batch = assess_ingested(ingested, standard, assessor.registry())?;

    if !batch.row_errors.is_empty() {
        warn!(
            rejected = batch.row_errors.len(),
            "some rows were rejected; run 'aqua validate' for details"
        );
    }
    info!(
        standard = %batch.standard,
        records = batch.records.len(),
        classifier = assessor.classifier_name(),
        "assessment complete"
    );

    let output_data = if args.report {
        let report = ReportEncoder::new().encode(&batch);
        match args.output_format {
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)? + "\n",
            OutputFormat::Ndjson | OutputFormat::Json => serde_json::to_string(&report)? + "\n",
        }
    } else {
        format_output(&batch.records, &args.output_format)?
    };

    write_output(&args.output, &output_data)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), AquaCliError> {
    let records = read_records(input, &input_format)?;
    let total_rows = records.len();
    let missing_columns = RowIngestor::missing_columns(&records);

    let screened = screen_rows(RowIngestor::ingest(records));

    let report = ValidationReport {
        total_rows,
        valid_rows: screened.rows.len(),
        invalid_rows: screened.row_errors.len(),
        missing_columns: missing_columns.iter().map(|m| m.symbol().to_string()).collect(),
        errors: screened.row_errors,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:   {}", report.total_rows);
        println!("Valid rows:   {}", report.valid_rows);
        println!("Invalid rows: {}", report.invalid_rows);

        if !report.missing_columns.is_empty() {
            println!("\nMissing columns: {}", report.missing_columns.join(", "));
        }

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                let reasons: Vec<String> = err.errors.iter().map(|e| e.to_string()).collect();
                println!(
                    "  - Row {} ({}): {}",
                    err.index + 1,
                    err.location.as_deref().unwrap_or("unknown"),
                    reasons.join("; ")
                );
            }
        }
    }

    if report.invalid_rows > 0 {
        Err(AquaCliError::ValidationFailed(report.invalid_rows))
    } else {
        Ok(())
    }
}

fn cmd_standards(
    standard: Option<StandardId>,
    standards: Option<&Path>,
    json: bool,
) -> Result<(), AquaCliError> {
    let registry = load_registry(standards)?;
    let selected: Vec<&Standard> = match standard {
        Some(id) => vec![registry.resolve(id)?],
        None => registry.iter().collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    for standard in selected {
        let t = &standard.thresholds;
        println!("{} Standard", standard.id);
        println!("============");
        println!(
            "{:<6} {:<10} {:>12} {:>12} {:>8}",
            "Metal", "Name", "Permissible", "Ideal", "Weight"
        );
        for metal in Metal::ALL {
            println!(
                "{:<6} {:<10} {:>12} {:>12} {:>8}",
                metal.symbol(),
                metal.name(),
                fmt_opt(standard.limits.permissible.get(metal)),
                fmt_opt(standard.limits.ideal.get(metal)),
                fmt_opt(standard.limits.weight.get(metal)),
            );
        }
        println!(
            "\nRisk thresholds: HPI > {}, HEI > {}, CF > {}, PLI > {}\n",
            t.hpi, t.hei, t.cf, t.pli
        );
    }

    Ok(())
}

// Helper functions

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn load_registry(path: Option<&Path>) -> Result<StandardsRegistry, AquaCliError> {
    match path {
        Some(path) => Ok(StandardsRegistry::from_json(&fs::read_to_string(path)?)?),
        None => Ok(StandardsRegistry::builtin()),
    }
}

fn read_input(input: &Path) -> Result<String, AquaCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_records(input: &Path, format: &InputFormat) -> Result<Vec<SampleRecord>, AquaCliError> {
    let input_data = read_input(input)?;
    let records = match format {
        InputFormat::Ndjson => RowIngestor::parse_ndjson(&input_data)?,
        InputFormat::Json => RowIngestor::parse_array(&input_data)?,
    };
    Ok(records)
}

fn write_output(output: &Path, data: &str) -> Result<(), AquaCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output(
    records: &[AssessmentRecord],
    format: &OutputFormat,
) -> Result<String, AquaCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum AquaCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoRows,
    MissingColumns(Vec<Metal>),
    ValidationFailed(usize),
}

impl From<io::Error> for AquaCliError {
    fn from(e: io::Error) -> Self {
        AquaCliError::Io(e)
    }
}

impl From<ComputeError> for AquaCliError {
    fn from(e: ComputeError) -> Self {
        AquaCliError::Compute(e)
    }
}

impl From<serde_json::Error> for AquaCliError {
    fn from(e: serde_json::Error) -> Self {
        AquaCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<AquaCliError> for CliError {
    fn from(e: AquaCliError) -> Self {
        match e {
            AquaCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            AquaCliError::Compute(e) => compute_error(e),
            AquaCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            AquaCliError::NoRows => CliError {
                code: "NO_ROWS".to_string(),
                message: "No sample rows found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            AquaCliError::MissingColumns(metals) => CliError {
                code: "MISSING_COLUMNS".to_string(),
                message: format!(
                    "Missing required columns: {}",
                    metals
                        .iter()
                        .map(|m| m.symbol())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                hint: Some("Rows need As, Cd, Cr, Pb and Zn columns".to_string()),
            },
            AquaCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rows failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

fn compute_error(e: ComputeError) -> CliError {
    let code = match &e {
        ComputeError::UnknownStandard(_) => "UNKNOWN_STANDARD",
        ComputeError::InvalidStandard { .. } => "INVALID_STANDARD",
        ComputeError::ParseError(_) | ComputeError::JsonError(_) => "PARSE_ERROR",
        ComputeError::InvalidConfig(_) => "INVALID_CONFIG",
        ComputeError::Classification(_) => "CLASSIFICATION_ERROR",
        ComputeError::EncodingError(_) => "ENCODING_ERROR",
    };
    let hint = match &e {
        ComputeError::UnknownStandard(_) => "Use WHO or BIS, or add the standard to the registry file",
        ComputeError::InvalidConfig(_) => {
            "Check the config file; the delegated classifier needs a backend and is only available through the library"
        }
        _ => "Check input format",
    };
    CliError {
        code: code.to_string(),
        message: format!("{} (stage: {})", e, e.stage()),
        hint: Some(hint.to_string()),
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rows: usize,
    valid_rows: usize,
    invalid_rows: usize,
    missing_columns: Vec<String>,
    errors: Vec<RowError>,
}
