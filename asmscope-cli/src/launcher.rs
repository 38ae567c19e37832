//! Process Launcher
//!
//! Builds the argument vector for a child that re-runs this program in
//! single-operation mode, and starts it with piped stdout/stderr.
//!
//! ```text
//! <program> <base args> <operation engine args> <diagnostic args> <marker> <operation>
//! ```
//!
//! `{operation}` inside a diagnostic argument is replaced by the operation
//! name, so the engine can be told which method to print and not to inline.

use crate::config::LauncherConfig;
use crate::environment::{current_program, inherited_args};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use thiserror::Error;

/// Placeholder substituted in diagnostic arguments
pub const OPERATION_PLACEHOLDER: &str = "{operation}";

/// The child could not be started
#[derive(Debug, Error)]
#[error("failed to start {program}: {source}")]
pub struct LaunchError {
    /// Program that failed to start
    pub program: String,
    /// Underlying OS error
    #[source]
    pub source: std::io::Error,
}

/// A fully resolved child command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInvocation {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments after the executable
    pub args: Vec<String>,
}

impl ChildInvocation {
    /// Full argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Builds and starts child invocations
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    base_args: Vec<String>,
    diagnostic_args: Vec<String>,
    marker: String,
}

impl Launcher {
    /// Launcher for `program` with the default diagnostic flags and marker
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        let defaults = LauncherConfig::default();
        Self {
            program: program.into(),
            base_args,
            diagnostic_args: defaults.diagnostic_args,
            marker: defaults.marker,
        }
    }

    /// Launcher configured from `asmscope.toml`, re-running the current
    /// executable with this process's own (filtered) arguments unless
    /// configured otherwise.
    pub fn from_config(config: &LauncherConfig) -> Self {
        let program = config
            .program
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(current_program);

        let mut base_args = if config.inherit_args {
            inherited_args(&config.filtered_arg_prefixes)
        } else {
            Vec::new()
        };
        base_args.extend(config.base_args.iter().cloned());

        Self {
            program,
            base_args,
            diagnostic_args: config.diagnostic_args.clone(),
            marker: config.marker.clone(),
        }
    }

    /// Replace the diagnostic flag templates
    pub fn with_diagnostic_args(mut self, diagnostic_args: Vec<String>) -> Self {
        self.diagnostic_args = diagnostic_args;
        self
    }

    /// Replace the self-invocation marker; an empty marker is omitted
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Program every child runs
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the child command line for `operation`
    pub fn invocation(&self, operation: &str, engine_args: &[String]) -> ChildInvocation {
        let mut args = Vec::with_capacity(
            self.base_args.len() + engine_args.len() + self.diagnostic_args.len() + 2,
        );
        args.extend(self.base_args.iter().cloned());
        args.extend(engine_args.iter().cloned());
        args.extend(
            self.diagnostic_args
                .iter()
                .map(|arg| arg.replace(OPERATION_PLACEHOLDER, operation)),
        );
        if !self.marker.is_empty() {
            args.push(self.marker.clone());
        }
        args.push(operation.to_string());

        ChildInvocation {
            program: self.program.clone(),
            args,
        }
    }

    /// Start `invocation` with null stdin and piped stdout/stderr
    pub fn spawn(&self, invocation: &ChildInvocation) -> Result<Child, LaunchError> {
        Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError {
                program: invocation.program.display().to_string(),
                source,
            })
    }
}
