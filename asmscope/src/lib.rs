#![warn(missing_docs)]
//! # asmscope
//!
//! Captures the optimized machine code an execution engine produces for a set
//! of numeric operations, so different coding styles can be compared offline.
//!
//! - **Process Isolation**: every operation runs in its own child process; a
//!   failing operation is reported and the batch continues
//! - **Exit-Code Protocol**: children report success, failure and a checksum
//!   nibble through their exit status alone
//! - **Marker Extraction**: the compiled-code section is sliced out of the
//!   child's stdout between configurable sentinel markers
//! - **Bundled Kernels**: scalar and lane-chunked integer loops ready to run
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     asmscope::run(asmscope::kernels::registry)
//! }
//! ```
//!
//! Running the binary without arguments drives every operation and writes
//! `results/<operation>.log`; `asmscope -- <operation>` runs one operation in
//! child mode.
//!
//! ## Engine Setup
//!
//! The bundled kernels run as native code and print nothing, so with the
//! stock configuration every operation ends with a missing-marker failure.
//! Artifacts appear once `[launcher] program` and `base_args` in
//! `asmscope.toml` point at an engine that prints its compiled code for the
//! diagnostic flags, and `[markers]` match what that engine prints:
//!
//! ```toml
//! [launcher]
//! program = "/usr/bin/java"
//! inherit_args = false
//! base_args = ["-cp", "kernels.jar", "Kernels"]
//! ```
//!
//! ## Custom Operations
//!
//! ```ignore
//! use asmscope::{AsmConfig, Registry, Value};
//!
//! fn operations(_config: &AsmConfig) -> Registry {
//!     let mut registry = Registry::new();
//!     registry.register_fn("answer", || Ok(Value::Int(42)));
//!     registry
//! }
//! ```

pub mod kernels;

// Re-export core types
pub use asmscope_core::{
    ChildExit, ChildMain, DEFAULT_ITERATIONS, FnOperation, Operation, OperationDef,
    OperationError, Registry, Value, fold_iterations, from_fn, protocol,
};

// Re-export the driver side
pub use asmscope_cli::{
    AsmConfig, CancelToken, Cli, Driver, DriverError, Launcher, Markers, OperationOutcome,
    OperationTarget, PipelineError, ResultWriter, RunSummary, RuntimeEnvironment, build_plan,
    extract, run, run_with_cli,
};
