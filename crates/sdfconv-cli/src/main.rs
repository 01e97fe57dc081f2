//! urdf2sdf - convert a URDF robot description into an SDF model

mod config;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use sdfconv_core::{Sdf, Severity};
use sdfconv_urdf::UrdfConverter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "urdf2sdf")]
#[command(about = "Convert URDF robot descriptions to SDF")]
#[command(version)]
struct Args {
    /// URDF file to convert
    #[arg(required_unless_present = "init_config")]
    input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "urdf2sdf.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Keep links attached through fixed joints as separate links
    #[arg(long)]
    no_reduce: bool,

    /// Do not emit joint limits
    #[arg(long)]
    no_limits: bool,

    /// Write a JSON conversion report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Re-read the produced document against the schema
    #[arg(long)]
    validate: bool,

    /// Write a default configuration file and exit
    #[arg(long)]
    init_config: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging; diagnostics go to stderr so stdout stays a clean document
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("urdf2sdf v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = config::load_config(&args.config)?;
    if args.no_reduce {
        config.convert.reduce_fixed_joints = false;
    }
    if args.no_limits {
        config.convert.enforce_limits = false;
    }

    let input = args.input.context("No input file given")?;
    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let converter = UrdfConverter::new(config.convert.clone())?;
    let conversion = converter.convert_str(&content);
    info!(
        links = conversion.link_count(),
        joints = conversion.joint_count(),
        warnings = conversion.diagnostics.count(Severity::Warning),
        "Conversion finished"
    );

    let xml = conversion.sdf.to_xml_with_indent(config.output.indent)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &xml).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote SDF");
        }
        None => print!("{}", xml),
    }

    let mut ok = conversion.is_ok();

    if args.validate {
        let (_, errors) = Sdf::from_xml(converter.schema(), &xml)?;
        for e in &errors {
            warn!(code = %e.code, "{}", e.message);
        }
        if errors.is_empty() {
            info!("Document is valid");
        } else {
            error!(count = errors.len(), "Document failed validation");
            ok = false;
        }
    }

    if let Some(path) = &args.report {
        report::Report::new(&input, content.as_bytes(), &conversion).write(path)?;
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
