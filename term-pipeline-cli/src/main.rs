//! term-pipeline command line runner
//!
//! Runs a pipeline configuration against CSV sources and sinks, or checks a
//! configuration without touching any data.
//!
//! Exit codes: 0 on success, 1 when a stage failed, 2 when the
//! configuration is invalid.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use term_pipeline::config::PipelineConfig;
use term_pipeline::error::{ErrorCategory, PipelineError};
use term_pipeline::formatters::{FormatterConfig, RunSummaryFormatter};
use term_pipeline::logging::setup::init_logging;
use term_pipeline::orchestrator::{Orchestrator, Pipeline, Stage};
use tracing::info;

const EXIT_STAGE_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "term-pipeline", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a pipeline
    Run {
        /// Pipeline configuration file
        #[arg(long, short)]
        config: PathBuf,
        /// Run every stage but write nothing at load
        #[arg(long)]
        dry_run: bool,
        /// Emit JSON logs on the console
        #[arg(long)]
        json_logs: bool,
        /// Override `logging.level`
        #[arg(long)]
        log_level: Option<String>,
        /// Disable colored summary output
        #[arg(long)]
        no_color: bool,
    },
    /// Validate a configuration and print the resolved plan
    CheckConfig {
        /// Pipeline configuration file
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run {
            config,
            dry_run,
            json_logs,
            log_level,
            no_color,
        } => run(&config, dry_run, json_logs, log_level, no_color).await,
        Command::CheckConfig { config } => check_config(&config).map(|plan| {
            print!("{plan}");
            ExitCode::SUCCESS
        }),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<PipelineError>() {
        Some(e) if e.category() == ErrorCategory::Configuration => EXIT_CONFIGURATION,
        _ => EXIT_STAGE_FAILED,
    }
}

async fn run(
    path: &Path,
    dry_run: bool,
    json_logs: bool,
    log_level: Option<String>,
    no_color: bool,
) -> Result<ExitCode> {
    let mut config = PipelineConfig::from_path(path)?;
    config.dry_run |= dry_run;
    config.logging.json |= json_logs;
    if let Some(level) = log_level {
        config.logging.level = level;
    }

    let _guard = init_logging(config.logging.to_setup()?)?;
    info!(config = %path.display(), dry_run = config.dry_run, "Starting pipeline");

    let result = Orchestrator::csv().run(&config).await?;

    let formatter = RunSummaryFormatter::with_config(
        FormatterConfig::default().with_colors(!(no_color || config.logging.json)),
    );
    print!("{}", formatter.format(&result)?);

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_STAGE_FAILED))
    }
}

/// Builds the pipeline and renders what a run would do.
fn check_config(path: &Path) -> Result<String> {
    use std::fmt::Write;

    let config = PipelineConfig::from_path(path)?;
    let pipeline = Pipeline::build(config)?;
    let config = pipeline.config();
    let mut out = String::new();

    writeln!(out, "✅ Configuration is valid: {}", path.display())?;
    writeln!(out, "Pipeline: {}", config.pipeline_id)?;
    if config.dry_run {
        writeln!(out, "Mode: dry run")?;
    }
    writeln!(out)?;
    writeln!(out, "Sources:")?;
    for (table, source) in &config.extraction_cfg.sources {
        writeln!(out, "   {table}: {}", source.path.display())?;
    }
    writeln!(out)?;
    writeln!(out, "Stages:")?;
    for stage in Stage::ALL {
        let detail = match stage {
            Stage::PreTransform => step_names(pipeline.pre_plan().steps()),
            Stage::PostTransform => step_names(pipeline.post_plan().steps()),
            Stage::Validate => format!("{} rule(s)", pipeline.rules().len()),
            _ => String::new(),
        };
        let state = if pipeline.stage_enabled(stage) {
            "enabled"
        } else {
            "disabled"
        };
        writeln!(out, "   {:<15} {state:<9} {detail}", stage.as_str())?;
    }
    Ok(out)
}

fn step_names(steps: &[term_pipeline::transform::TransformationStep]) -> String {
    if steps.is_empty() {
        return "no steps".to_string();
    }
    steps
        .iter()
        .map(|s| {
            if s.enabled {
                s.name.clone()
            } else {
                format!("{} (off)", s.name)
            }
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}
