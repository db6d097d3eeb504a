//! CLI entry point for the EXI grammar-table generator.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use v2g_exi_codegen::config::Config;
use v2g_exi_codegen::emit::describe_all;
use v2g_exi_codegen::error::ConfigError;
use v2g_exi_codegen::order::topological_sort;
use v2g_exi_codegen::xsd::parse_xsd;
use v2g_exi_codegen::{analyze, GeneratorError};

#[derive(Parser)]
#[command(name = "v2g-exi-codegen")]
#[command(about = "Generate EXI grammar tables from ISO 15118 / DIN 70121 XSD schemas")]
struct Args {
    /// Directory containing the XSD schema files named in the config.
    #[arg(long)]
    schema_dir: PathBuf,

    /// Restrict generation to these schema file names (repeatable).
    /// Defaults to every schema referenced by the config's `files` table.
    #[arg(long = "schema")]
    schemas: Vec<String>,

    /// Only generate files whose `prefix` matches.
    #[arg(long)]
    prefix: Option<String>,

    /// Output directory for generated artifacts.
    #[arg(short, long)]
    output: PathBuf,

    /// Path to the generator's TOML configuration.
    #[arg(short, long)]
    config: PathBuf,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

const EXIT_OK: u8 = 0;
const EXIT_MISSING_CONFIG: u8 = 1;
const EXIT_INVALID_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(err) => {
            error!(error = %err, "fatal error");
            let code = err
                .downcast_ref::<ConfigError>()
                .map(|e| match e {
                    ConfigError::NotFound(_) | ConfigError::Read { .. } => EXIT_MISSING_CONFIG,
                    _ => EXIT_INVALID_CONFIG,
                })
                .unwrap_or(EXIT_INVALID_CONFIG);
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A `SchemaError`/`GrammarError` for one schema file is logged and
/// generation continues with the next `FileSpec`; the process
/// exit code only reflects `ConfigError` and the degenerate case where
/// every requested schema failed.
fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config).context("loading configuration")?;
    config
        .validate_against(&args.schemas)
        .context("validating configuration against requested schemas")?;

    let wanted: Vec<&str> = args.schemas.iter().map(String::as_str).collect();
    let mut attempted = 0;
    let mut succeeded = 0;

    std::fs::create_dir_all(&args.output).context("creating output directory")?;

    for file_spec in &config.files {
        if !wanted.is_empty() && !wanted.contains(&file_spec.schema.as_str()) {
            continue;
        }
        if let Some(prefix) = &args.prefix {
            if &file_spec.prefix != prefix {
                continue;
            }
        }

        let span = info_span!("generate_file", schema = %file_spec.schema, prefix = %file_spec.prefix);
        let _enter = span.enter();
        attempted += 1;

        let schema_path = args.schema_dir.join(&file_spec.schema);
        match generate_one(&schema_path, &config) {
            Ok(count) => {
                info!(types = count, "generated descriptors");
                succeeded += 1;
            }
            Err(err) => warn!(error = %err, "skipping schema after error"),
        }
    }

    if attempted > 0 && succeeded == 0 {
        anyhow::bail!("no schema file generated successfully");
    }
    Ok(())
}

/// Runs the analyzer → orderer → emission-descriptor pipeline for one
/// schema file. Errors here are per-file and never abort `run`.
fn generate_one(schema_path: &std::path::Path, config: &Config) -> Result<usize, GeneratorError> {
    let schema = parse_xsd(schema_path)
        .map_err(|err| v2g_exi_codegen::error::SchemaError::ParseFailure(err.to_string()))?;
    let analyzer_data = analyze(&schema, config)?;
    let ordered = topological_sort(analyzer_data.generate_elements)?;
    let descriptors = describe_all(&ordered, config);

    let mut ok = 0;
    for descriptor in descriptors {
        descriptor?;
        ok += 1;
    }
    Ok(ok)
}
