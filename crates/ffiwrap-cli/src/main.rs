//! Command-line interface for the ffiwrap binding pipeline

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ffiwrap_bindings::{ArtifactHandle, BindingGenerationResult, BindingProcessor, ProcessingOutcome};
use ffiwrap_codegen::{DirectorySink, GenerationReport, GeneratorConfig, MemorySink, WrapperGenerator};
use ffiwrap_core::DiagnosticLevel;
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ffiwrap")]
#[command(about = "Generate host-language wrappers from FFI binding output")]
#[command(version)]
#[command(long_about = "Processes the constants and bindings artifacts of a binding generator into an intermediate representation and renders typed wrapper classes from it")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable quiet mode (suppress non-error output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Set log level
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate wrapper classes from binding artifacts
    Generate {
        #[command(flatten)]
        input: InputArgs,
        /// Output directory for generated wrappers
        #[arg(short, long, default_value = "generated")]
        out: PathBuf,
        /// Generator configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Override the library name from the configuration
        #[arg(long)]
        library: Option<String>,
        /// Override the namespace from the configuration
        #[arg(long)]
        namespace: Option<String>,
        /// Render everything but write nothing
        #[arg(long)]
        dry_run: bool,
        /// Write the generation report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show what the processor extracts from binding artifacts
    Inspect {
        #[command(flatten)]
        input: InputArgs,
        /// Output format
        #[arg(long, value_enum, default_value = "summary")]
        format: InspectFormat,
    },
    /// Write a configuration file holding the defaults
    InitConfig {
        /// Destination of the configuration file
        #[arg(default_value = "ffiwrap.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Where the upstream binding artifacts come from
#[derive(Args, Debug, Default)]
struct InputArgs {
    /// File with the function declarations
    #[arg(short, long)]
    bindings: Option<PathBuf>,
    /// File with the constant declarations (defaults to the bindings file)
    #[arg(long)]
    constants: Option<PathBuf>,
    /// JSON-encoded result of the upstream binding generation step
    #[arg(long, conflicts_with_all = ["bindings", "constants"])]
    result: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Debug)]
enum InspectFormat {
    Summary,
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let outcome = match cli.command {
        Commands::Generate {
            input,
            out,
            config,
            library,
            namespace,
            dry_run,
            report,
        } => handle_generate_command(&input, &out, config.as_deref(), library, namespace, dry_run, report.as_deref()),
        Commands::Inspect { input, format } => handle_inspect_command(&input, format),
        Commands::InitConfig { path, force } => handle_init_config_command(&path, force),
    };

    if let Err(err) = outcome {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else if cli.verbose {
        log::LevelFilter::Debug
    } else {
        match &cli.log_level {
            Some(LogLevel::Error) => log::LevelFilter::Error,
            Some(LogLevel::Warn) => log::LevelFilter::Warn,
            Some(LogLevel::Info) => log::LevelFilter::Info,
            Some(LogLevel::Debug) => log::LevelFilter::Debug,
            Some(LogLevel::Trace) => log::LevelFilter::Trace,
            None => log::LevelFilter::Info,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();
}

impl InputArgs {
    /// Build the upstream result these arguments describe
    fn to_generation_result(&self) -> Result<BindingGenerationResult> {
        if let Some(path) = &self.result {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read binding result {}", path.display()))?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Invalid binding result in {}", path.display()));
        }

        let Some(bindings) = &self.bindings else {
            bail!("No input given: pass --bindings <FILE> or --result <FILE>");
        };
        let constants = self.constants.as_ref().unwrap_or(bindings);
        Ok(BindingGenerationResult::succeeded(
            ArtifactHandle::Path(constants.clone()),
            ArtifactHandle::Path(bindings.clone()),
        ))
    }
}

fn process_input(input: &InputArgs) -> Result<ProcessingOutcome> {
    let result = input.to_generation_result()?;
    let outcome = BindingProcessor::new().process_with_diagnostics(&result)?;

    for diagnostic in outcome.diagnostics.diagnostics() {
        match diagnostic.level {
            DiagnosticLevel::Error => error!("{}", diagnostic),
            DiagnosticLevel::Warning => warn!("{}", diagnostic),
            DiagnosticLevel::Info => debug!("{}", diagnostic),
        }
    }
    Ok(outcome)
}

fn load_config(path: Option<&Path>, library: Option<String>, namespace: Option<String>) -> Result<GeneratorConfig> {
    let mut config = match path {
        Some(path) => GeneratorConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => GeneratorConfig::default(),
    };

    if let Some(library) = library {
        config.library_name = library;
    }
    if let Some(namespace) = namespace {
        config.namespace = namespace;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn handle_generate_command(
    input: &InputArgs,
    out: &Path,
    config: Option<&Path>,
    library: Option<String>,
    namespace: Option<String>,
    dry_run: bool,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config, library, namespace)?;
    let outcome = process_input(input)?;
    if outcome.bindings.is_empty() {
        warn!("The binding artifacts contain no functions, structures or constants");
    }

    let generator = WrapperGenerator::new(config)?;
    let report = if dry_run {
        let mut sink = MemorySink::new();
        let report = generator.write_to(&outcome.bindings, &mut sink)?;
        for name in sink.into_inner().keys() {
            println!("{}", out.join(name).display());
        }
        report
    } else {
        let mut sink = DirectorySink::new(out)?;
        let report = generator.write_to(&outcome.bindings, &mut sink)?;
        info!("Wrote {} files to {}", sink.written().len(), sink.root().display());
        report
    };

    print_report(&report);
    if let Some(path) = report_path {
        fs::write(path, report.to_json()?).with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if report.has_failures() {
        bail!("{} of {} artifacts failed to generate", report.failures.len(), report.failures.len() + report.artifacts.len());
    }
    Ok(())
}

fn print_report(report: &GenerationReport) {
    for collision in &report.collisions {
        warn!(
            "'{}' renamed to '{}' in {} (source '{}')",
            collision.requested, collision.assigned, collision.scope, collision.source
        );
    }
    for failure in &report.failures {
        error!("{}: {}", failure.artifact, failure.error);
    }
    info!("Generated {}", report.summary());
}

fn handle_inspect_command(input: &InputArgs, format: InspectFormat) -> Result<()> {
    let outcome = process_input(input)?;
    let bindings = &outcome.bindings;

    match format {
        InspectFormat::Json => {
            println!("{}", serde_json::to_string_pretty(bindings)?);
        }
        InspectFormat::Summary => {
            println!(
                "{} functions, {} structures, {} enums, {} constants ({} warnings)",
                bindings.function_count(),
                bindings.structure_count(),
                bindings.enums().count(),
                bindings.constants().len(),
                outcome.diagnostics.warning_count()
            );
            for function in bindings.functions() {
                println!("  fn {}({}) -> {}", function.name, function.parameter_types().join(", "), function.return_type);
            }
            for structure in bindings.structures() {
                println!("  {} {} ({} fields)", structure.kind(), structure.name, structure.fields.len());
            }
        }
    }
    Ok(())
}

fn handle_init_config_command(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite it", path.display());
    }

    let content = GeneratorConfig::default().to_toml_string()?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_arguments() {
        let cli = Cli::try_parse_from([
            "ffiwrap", "generate", "--bindings", "lib.h", "--out", "build", "--library", "math", "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Commands::Generate { input, out, library, dry_run, .. } => {
                assert_eq!(input.bindings, Some(PathBuf::from("lib.h")));
                assert_eq!(out, PathBuf::from("build"));
                assert_eq!(library.as_deref(), Some("math"));
                assert!(dry_run);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_result_conflicts_with_files() {
        assert!(Cli::try_parse_from(["ffiwrap", "inspect", "--result", "r.json", "--bindings", "lib.h"]).is_err());
        assert!(Cli::try_parse_from(["ffiwrap", "-v", "-q", "inspect"]).is_err());
    }

    #[test]
    fn test_constants_default_to_bindings_file() {
        let input = InputArgs {
            bindings: Some(PathBuf::from("lib.h")),
            ..InputArgs::default()
        };
        let result = input.to_generation_result().unwrap();
        assert!(result.success);
        assert_eq!(result.constants, Some(ArtifactHandle::Path(PathBuf::from("lib.h"))));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let err = InputArgs::default().to_generation_result().unwrap_err();
        assert!(err.to_string().contains("--bindings"));
    }

    #[test]
    fn test_result_file_is_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("result.json");
        fs::write(&path, r#"{"success": false, "errors": ["header not found"], "constants": null, "bindings": null}"#).unwrap();

        let input = InputArgs {
            result: Some(path),
            ..InputArgs::default()
        };
        let err = process_input(&input).unwrap_err();
        assert!(err.to_string().contains("header not found"));
    }

    #[test]
    fn test_overrides_are_validated() {
        let config = load_config(None, Some("math".to_string()), None).unwrap();
        assert_eq!(config.library_name, "math");
        assert!(load_config(None, None, Some("Bad\\1Name".to_string())).is_err());
    }

    #[test]
    fn test_init_config_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ffiwrap.toml");

        handle_init_config_command(&path, false).unwrap();
        assert!(handle_init_config_command(&path, false).is_err());
        handle_init_config_command(&path, true).unwrap();

        let config = GeneratorConfig::from_file(&path).unwrap();
        assert_eq!(config.library_name, "native");
    }
}
