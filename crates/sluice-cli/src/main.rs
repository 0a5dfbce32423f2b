//! CLI binary for running and validating Sluice pipelines.

mod args;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use sluice_pipeline::{
    default_registry, CancellationStack, EnvironmentLayers, NodeRegistry, Severity, Workflow,
};
use sluice_types::{codes, SluiceError};

use crate::args::{Invocation, LogType};

#[derive(Parser)]
#[command(
    name = "sluice",
    about = "Declarative batch pipeline runner",
    disable_help_flag = true,
    disable_version_flag = true,
    after_help = "Arguments: -pipeline <file> [-logType console|file] [-logFile <path>] \
                  [-verbose] [-validate] [-Key value ...]"
)]
struct Cli {
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    version: Option<bool>,

    /// `-key value` pairs; unreserved keys override the pipeline environment
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let invocation = match args::parse_invocation(&cli.args) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.result_code());
        }
    };

    if let Err(err) = init_tracing(&invocation) {
        eprintln!("error: {err:#}");
        std::process::exit(codes::FAULT);
    }

    let code = match run(invocation) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "Sluice failed");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn init_tracing(invocation: &Invocation) -> anyhow::Result<()> {
    let default = if invocation.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match invocation.log_type {
        LogType::Console => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogType::File => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&invocation.log_file)
                .with_context(|| format!("opening log file {}", invocation.log_file.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
    }
    Ok(())
}

/// Errors that escape the runner map to the code of the underlying
/// `SluiceError`, or a generic fault.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SluiceError>())
        .map(SluiceError::result_code)
        .unwrap_or(codes::FAULT)
}

fn run(invocation: Invocation) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    runtime.block_on(cmd_run(invocation))
}

async fn cmd_run(invocation: Invocation) -> anyhow::Result<i32> {
    let Some(path) = invocation.pipeline.as_deref() else {
        return Err(SluiceError::ValidationError("missing -pipeline <file>".into()).into());
    };
    let document = sluice_document::load(path)
        .with_context(|| format!("loading pipeline {}", path.display()))?;
    let registry = default_registry();

    if invocation.validate {
        return Ok(cmd_validate(path, &document, &registry));
    }

    let layers = EnvironmentLayers::from_process().with_overrides(invocation.overrides);
    let stack = Arc::new(CancellationStack::new());
    let workflow = Workflow::build(&document, &registry, &layers, Arc::clone(&stack))?;

    let interrupts = {
        let stack = Arc::clone(&stack);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!(depth = stack.depth(), "Interrupt received");
                stack.interrupt();
            }
        })
    };

    let report = workflow.execute().await;
    interrupts.abort();

    println!(
        "Workflow '{}' finished with code {} in {:.3}s",
        report.name,
        report.exit_code(),
        report.duration.as_secs_f64()
    );
    if !report.is_success() {
        println!("  {}", report.result.message());
    }
    Ok(report.exit_code())
}

fn cmd_validate(path: &Path, document: &sluice_document::PipelineDocument, registry: &NodeRegistry) -> i32 {
    let diagnostics = sluice_pipeline::validate(&document.workflow, registry);
    if diagnostics.is_empty() {
        println!("Pipeline {} is valid", path.display());
        return codes::SUCCESS;
    }

    for diag in &diagnostics {
        println!("{diag}");
    }
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    println!("{} error(s), {} warning(s)", errors, diagnostics.len() - errors);

    if errors > 0 {
        codes::INVALID
    } else {
        codes::SUCCESS
    }
}
