#![warn(missing_docs)]
//! asmscope CLI Library
//!
//! This module provides the CLI infrastructure for asmscope binaries.
//! Use `asmscope::run()` (or `asmscope_cli::run()`) in your main function with
//! a function that builds the operation registry.
//!
//! The same binary plays two roles:
//! - **driver** (no operation argument): spawns one child per registered
//!   operation, captures the machine code each child's engine prints, and
//!   writes `<results>/<operation>.log`
//! - **child** (`-- <operation>`): runs one operation in a loop and exits with
//!   the protocol code
//!
//! # Example
//!
//! ```ignore
//! use asmscope_cli::AsmConfig;
//! use asmscope_core::{Registry, Value};
//!
//! fn operations(_config: &AsmConfig) -> Registry {
//!     let mut registry = Registry::new();
//!     registry.register_fn("answer", || Ok(Value::Int(42)));
//!     registry
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     asmscope_cli::run(operations)
//! }
//! ```

mod collector;
mod config;
mod driver;
mod environment;
mod extract;
mod launcher;
mod planner;
mod shutdown;
mod writer;

pub use collector::{CapturedOutput, CollectError, Collected, collect};
pub use config::*;
pub use driver::{
    Driver, DriverError, OperationOutcome, OperationReport, PipelineError, RunSummary,
};
pub use environment::{RuntimeEnvironment, current_program, filter_args, inherited_args};
pub use extract::{ExtractError, ExtractedSection, MarkerKind, Markers, extract};
pub use launcher::{ChildInvocation, LaunchError, Launcher, OPERATION_PLACEHOLDER};
pub use planner::{ExecutionPlan, OperationTarget, build_plan};
pub use shutdown::{CancelToken, install_shutdown_handler, shutdown_requested};
pub use writer::{ARTIFACT_EXTENSION, ResultWriter, WriteError};

use anyhow::Context;
use asmscope_core::{ChildMain, Registry, protocol};
use clap::{ArgAction, Parser};
use regex::Regex;
use std::path::PathBuf;

/// asmscope CLI arguments
#[derive(Parser, Debug)]
#[command(name = "asmscope")]
#[command(
    author,
    version,
    about = "asmscope - capture the machine code compiled for each operation",
    after_long_help = "Artifacts are written only when the launched program prints its compiled \
code between the configured markers. The bundled operations run natively and print none, so \
point [launcher] program/base_args (and [markers]) in asmscope.toml at an engine that prints \
its machine code."
)]
pub struct Cli {
    /// Operation to run in child mode; omit to drive every operation
    pub operation: Option<String>,

    /// Configuration file (default: discover asmscope.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory receiving one <operation>.log per captured operation
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Only run operations whose name matches this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Input length for the bundled operations
    #[arg(long)]
    pub array_length: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Internal: engine flags forwarded to children (`-XX:...`)
    #[arg(short = 'X', hide = true, action = ArgAction::Append, allow_hyphen_values = true)]
    pub engine_flags: Vec<String>,
}

/// Run the asmscope CLI with the operations produced by `build`.
/// This is the main entry point for asmscope binaries.
///
/// In child mode this function does not return: the process exits with the
/// protocol code.
pub fn run(build: impl FnOnce(&AsmConfig) -> Registry) -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli, build)
}

/// Run the asmscope CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli, build: impl FnOnce(&AsmConfig) -> Registry) -> anyhow::Result<()> {
    // Handle child mode first (before any other initialization)
    if let Some(operation) = cli.operation.as_deref() {
        let code = run_child_mode(&cli, build, operation);
        std::process::exit(code);
    }

    init_logging(cli.verbose, "info");

    let config = load_config(&cli)?;
    run_driver(&cli, &config, build)
}

/// Run as a child process and return its exit code
fn run_child_mode(cli: &Cli, build: impl FnOnce(&AsmConfig) -> Registry, operation: &str) -> i32 {
    init_logging(cli.verbose, "warn");

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return protocol::INVOCATION_ERROR;
        }
    };

    if !cli.engine_flags.is_empty() {
        tracing::debug!(flags = ?cli.engine_flags, "ignoring engine flags");
    }

    let mut registry = build(&config);
    ChildMain::new(&mut registry, config.child.iterations).run(operation)
}

fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        "asmscope=debug".to_string()
    } else {
        format!("asmscope={default_level}")
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Discover or load `asmscope.toml`, then apply CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<AsmConfig> {
    let mut config = match &cli.config {
        Some(path) => AsmConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AsmConfig::discover().unwrap_or_default(),
    };

    if let Some(length) = cli.array_length {
        config.child.array_length = length;
    }
    if let Some(dir) = &cli.results_dir {
        config.output.directory = dir.to_string_lossy().into_owned();
    }

    Ok(config)
}

fn run_driver(
    cli: &Cli,
    config: &AsmConfig,
    build: impl FnOnce(&AsmConfig) -> Registry,
) -> anyhow::Result<()> {
    install_shutdown_handler();

    let filter = cli
        .filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --filter pattern")?;

    let registry = build(config);
    let plan = build_plan(&registry, filter.as_ref());

    if plan.is_empty() {
        println!("No operations found.");
        return Ok(());
    }

    let launcher = Launcher::from_config(&config.launcher);
    let environment = RuntimeEnvironment::detect(&config.environment, launcher.program());
    tracing::info!(
        "Capturing {} operations into {} ({} {}, {} bit vectors)",
        plan.len(),
        config.output.directory,
        environment.runtime,
        environment.arch,
        environment.vector_bits
    );

    let driver = Driver::new(
        launcher,
        Markers::from(&config.markers),
        ResultWriter::new(&config.output.directory),
        environment,
    );
    driver.run(&plan.targets)?;

    Ok(())
}
