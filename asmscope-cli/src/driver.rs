//! Driver
//!
//! Runs the capture pipeline once per planned operation, strictly one at a
//! time:
//!
//! ```text
//! launch -> collect -> decode exit -> extract -> write
//! ```
//!
//! Any failure along the way is recorded against that operation and the
//! driver moves on. Only an unusable output directory stops the run.

use crate::collector::{CollectError, Collected, collect};
use crate::environment::RuntimeEnvironment;
use crate::extract::{ExtractError, Markers, extract};
use crate::launcher::{LaunchError, Launcher};
use crate::planner::OperationTarget;
use crate::shutdown::CancelToken;
use crate::writer::{ResultWriter, WriteError};
use asmscope_core::ChildExit;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Per-operation failure; never stops the run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The child could not be started
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Reading the child's output (or waiting for it) failed
    #[error("failed to read child output: {0}")]
    Read(#[source] io::Error),

    /// The child reported failure
    #[error("child failed with {0}")]
    UnsuccessfulExit(ChildExit),

    /// The captured output has no usable section
    #[error("{source}")]
    MissingMarker {
        /// Which marker was missing
        #[source]
        source: ExtractError,
        /// Full stdout of the child
        raw_output: String,
    },

    /// The artifact could not be written
    #[error(transparent)]
    Write(#[from] WriteError),

    /// Cancellation arrived while the child was running
    #[error("cancelled")]
    Cancelled,
}

/// Failure that aborts the whole run
#[derive(Debug, Error)]
pub enum DriverError {
    /// The output directory could not be created
    #[error("cannot prepare output directory: {0}")]
    OutputDirectory(#[source] WriteError),
}

/// What happened to one operation
#[derive(Debug)]
pub enum OperationOutcome {
    /// An artifact was written
    Written {
        /// Artifact path
        path: PathBuf,
        /// Checksum nibble reported by the child
        checksum: u8,
    },
    /// The pipeline failed for this operation
    Failed(PipelineError),
    /// Not launched because the run was cancelled
    Skipped,
}

/// Outcome of one planned operation
#[derive(Debug)]
pub struct OperationReport {
    /// Operation name
    pub name: String,
    /// What happened
    pub outcome: OperationOutcome,
}

/// Outcomes of every planned operation, in execution order
#[derive(Debug, Default)]
pub struct RunSummary {
    /// One report per planned operation
    pub reports: Vec<OperationReport>,
}

impl RunSummary {
    /// Operations with an artifact
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Written { .. }))
    }

    /// Operations that failed
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Failed(_)))
    }

    /// Operations never launched
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Skipped))
    }

    /// Report for `name`
    pub fn get(&self, name: &str) -> Option<&OperationReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    fn count(&self, pred: impl Fn(&OperationOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| pred(&r.outcome)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} failed, {} skipped",
            self.written(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Sequential capture driver
#[derive(Debug)]
pub struct Driver {
    launcher: Launcher,
    markers: Markers,
    writer: ResultWriter,
    environment: RuntimeEnvironment,
    cancel: CancelToken,
}

impl Driver {
    /// Create a driver
    pub fn new(
        launcher: Launcher,
        markers: Markers,
        writer: ResultWriter,
        environment: RuntimeEnvironment,
    ) -> Self {
        Self {
            launcher,
            markers,
            writer,
            environment,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` to interrupt the run
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every target in order.
    ///
    /// Returns `Err` only if the output directory cannot be created; every
    /// other failure is recorded in the summary.
    pub fn run(&self, targets: &[OperationTarget]) -> Result<RunSummary, DriverError> {
        self.writer.prepare().map_err(DriverError::OutputDirectory)?;

        let pb = ProgressBar::new(targets.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut summary = RunSummary {
            reports: Vec::with_capacity(targets.len()),
        };

        for target in targets {
            let outcome = if self.cancel.is_cancelled() {
                OperationOutcome::Skipped
            } else {
                pb.set_message(target.name.clone());
                self.process(target, &pb)
            };
            summary.reports.push(OperationReport {
                name: target.name.clone(),
                outcome,
            });
            pb.inc(1);
        }

        if self.cancel.is_cancelled() {
            pb.abandon_with_message("Cancelled");
        } else {
            pb.finish_with_message("Complete");
        }
        tracing::info!("{summary}");

        Ok(summary)
    }

    fn process(&self, target: &OperationTarget, pb: &ProgressBar) -> OperationOutcome {
        match self.capture(target, pb) {
            Ok((path, checksum)) => {
                tracing::info!(
                    operation = %target.name,
                    checksum,
                    "wrote {}",
                    path.display()
                );
                OperationOutcome::Written { path, checksum }
            }
            Err(PipelineError::Cancelled) => {
                tracing::warn!(operation = %target.name, "cancelled; no artifact written");
                OperationOutcome::Failed(PipelineError::Cancelled)
            }
            Err(e) => {
                tracing::error!(operation = %target.name, "{e}");
                if let PipelineError::MissingMarker { raw_output, .. } = &e {
                    pb.suspend(|| eprintln!("{}", raw_output_report(&target.name, raw_output)));
                }
                OperationOutcome::Failed(e)
            }
        }
    }

    fn capture(
        &self,
        target: &OperationTarget,
        pb: &ProgressBar,
    ) -> Result<(PathBuf, u8), PipelineError> {
        let invocation = self.launcher.invocation(&target.name, &target.engine_args);
        tracing::debug!(operation = %target.name, argv = ?invocation.argv(), "launching child");

        let child = self.launcher.spawn(&invocation)?;
        let collected = collect(child, &self.cancel).map_err(|e| match e {
            CollectError::Cancelled => PipelineError::Cancelled,
            CollectError::Wait(e) => PipelineError::Read(e),
        })?;

        pb.suspend(|| eprintln!("{}", stderr_report(&target.name, &collected.output.stderr)));

        let (checksum, stdout) = decode(collected)?;
        let section = match extract(&stdout, &self.markers) {
            Ok(section) => section,
            Err(source) => {
                return Err(PipelineError::MissingMarker {
                    source,
                    raw_output: stdout,
                });
            }
        };

        let header = self.environment.header(&target.name);
        let path = self.writer.write(&target.name, &header, &section)?;
        Ok((path, checksum))
    }
}

/// Checksum and stdout of a collected child.
///
/// The exit code is decoded first; a stdout read error only matters for a
/// child that reported success.
fn decode(collected: Collected) -> Result<(u8, String), PipelineError> {
    let checksum = match ChildExit::from_status(collected.status) {
        ChildExit::Success { checksum } => checksum,
        other => return Err(PipelineError::UnsuccessfulExit(other)),
    };
    if let Some(e) = collected.stdout_error {
        return Err(PipelineError::Read(e));
    }
    Ok((checksum, collected.output.stdout))
}

/// Child stderr under an `<name>:` heading
fn stderr_report(name: &str, stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        format!("{name}:")
    } else {
        format!("{name}:\n{stderr}")
    }
}

fn raw_output_report(name: &str, raw_output: &str) -> String {
    format!("{name}: raw output\n{}", raw_output.trim_end())
}
