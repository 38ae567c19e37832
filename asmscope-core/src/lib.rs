#![warn(missing_docs)]
//! asmscope Core - Child Runtime
//!
//! This crate provides the pieces shared by the driver and its child processes:
//! - `Registry` of named operations (explicit, built once at start-up)
//! - The exit-code protocol a child uses to report success, failure and a
//!   checksum nibble
//! - `ChildMain`, which resolves one operation and runs it in a fold loop

mod child;
pub mod protocol;
mod registry;

pub use child::{ChildMain, fold_iterations};
pub use protocol::{ChildExit, DEFAULT_ITERATIONS};
pub use registry::{FnOperation, Operation, OperationDef, OperationError, Registry, Value, from_fn};
