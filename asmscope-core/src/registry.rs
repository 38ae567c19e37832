//! Operation Registry
//!
//! Explicit name → operation table, built once at process start. The driver
//! only reads names (and per-operation engine flags); a child process resolves
//! one name and invokes it repeatedly.

use std::fmt;
use thiserror::Error;

/// Value returned by a single invocation of an operation.
///
/// The set of kinds is closed; every variant can be folded into the child's
/// checksum accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    /// 32-bit scalar
    Int(i32),
    /// 64-bit scalar
    Long(i64),
    /// Boolean, folded as 0 or 1
    Bool(bool),
    /// Array of 32-bit scalars, folded element by element
    Ints(&'a [i32]),
}

impl Value<'_> {
    /// XOR-fold this value into `acc` and return the new accumulator.
    ///
    /// 32-bit values are sign-extended before folding.
    #[inline]
    pub fn fold_into(self, acc: i64) -> i64 {
        match self {
            Value::Int(v) => acc ^ i64::from(v),
            Value::Long(v) => acc ^ v,
            Value::Bool(v) => acc ^ i64::from(v),
            Value::Ints(values) => values.iter().fold(acc, |acc, &v| acc ^ i64::from(v)),
        }
    }
}

/// Error raised by an operation while it is being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationError {
    message: String,
}

impl OperationError {
    /// Create an error with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named unit of work the child process invokes in a loop.
///
/// Implementors may hand back a view into their own buffers; the caller
/// consumes the value before the next invocation.
pub trait Operation {
    /// Run the operation once
    fn invoke(&mut self) -> Result<Value<'_>, OperationError>;
}

/// Adapter turning a closure into an [`Operation`].
pub struct FnOperation<F>(F);

impl<F> Operation for FnOperation<F>
where
    F: FnMut() -> Result<Value<'static>, OperationError>,
{
    fn invoke(&mut self) -> Result<Value<'_>, OperationError> {
        (self.0)()
    }
}

/// Wrap a closure as an [`Operation`].
pub fn from_fn<F>(f: F) -> FnOperation<F>
where
    F: FnMut() -> Result<Value<'static>, OperationError>,
{
    FnOperation(f)
}

/// A registered operation together with its launch metadata
pub struct OperationDef {
    name: String,
    engine_args: Vec<String>,
    operation: Box<dyn Operation>,
}

impl OperationDef {
    /// Operation name, used as the child's argument and the artifact name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra engine flags appended to this operation's child invocation
    pub fn engine_args(&self) -> &[String] {
        &self.engine_args
    }

    /// Invoke the underlying operation once
    #[inline]
    pub fn invoke(&mut self) -> Result<Value<'_>, OperationError> {
        self.operation.invoke()
    }
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("name", &self.name)
            .field("engine_args", &self.engine_args)
            .finish_non_exhaustive()
    }
}

/// Ordered table of operations keyed by name.
///
/// Registering a name twice replaces the earlier entry in place.
#[derive(Debug, Default)]
pub struct Registry {
    operations: Vec<OperationDef>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under `name`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        operation: impl Operation + 'static,
    ) -> &mut Self {
        self.insert(name.into(), Vec::new(), Box::new(operation))
    }

    /// Register an operation that needs extra engine flags in its child
    pub fn register_with_args<I, S>(
        &mut self,
        name: impl Into<String>,
        engine_args: I,
        operation: impl Operation + 'static,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine_args = engine_args.into_iter().map(Into::into).collect();
        self.insert(name.into(), engine_args, Box::new(operation))
    }

    /// Register a closure under `name`
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: FnMut() -> Result<Value<'static>, OperationError> + 'static,
    {
        self.register(name, from_fn(f))
    }

    fn insert(
        &mut self,
        name: String,
        engine_args: Vec<String>,
        operation: Box<dyn Operation>,
    ) -> &mut Self {
        let def = OperationDef {
            name,
            engine_args,
            operation,
        };
        match self.operations.iter().position(|op| op.name == def.name) {
            Some(index) => self.operations[index] = def,
            None => self.operations.push(def),
        }
        self
    }

    /// Look up an operation by name
    pub fn get(&self, name: &str) -> Option<&OperationDef> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Look up an operation by name for invocation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut OperationDef> {
        self.operations.iter_mut().find(|op| op.name == name)
    }

    /// Iterate registered operations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &OperationDef> {
        self.operations.iter()
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.name.as_str())
    }

    /// Number of registered operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry has no operations
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
