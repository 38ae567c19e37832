//! Child Process Entry Point
//!
//! Handles the child side of the driver/child architecture: resolve one
//! operation, invoke it in a tight loop so the execution engine reaches its
//! steady-state compiled code, and turn the outcome into an exit code.
//!
//! Every returned value is XOR-folded into a loop-local accumulator that ends
//! up in the exit code, so the loop cannot be discarded as dead code.

use crate::protocol::{FOLD_SEED, INVOCATION_ERROR, UNKNOWN_OPERATION, success_code};
use crate::registry::{OperationDef, OperationError, Registry};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Child main loop
pub struct ChildMain<'r> {
    registry: &'r mut Registry,
    iterations: u64,
}

impl<'r> ChildMain<'r> {
    /// Create a child runner over `registry`, invoking the operation
    /// `iterations` times.
    pub fn new(registry: &'r mut Registry, iterations: u64) -> Self {
        Self {
            registry,
            iterations,
        }
    }

    /// Run the named operation and return the process exit code.
    pub fn run(&mut self, name: &str) -> i32 {
        let Some(operation) = self.registry.get_mut(name) else {
            eprintln!("Error: could not find operation: {}", name);
            return UNKNOWN_OPERATION;
        };

        let iterations = self.iterations;
        let result = catch_unwind(AssertUnwindSafe(|| fold_iterations(operation, iterations)));

        match result {
            Ok(Ok(accumulator)) => success_code(accumulator),
            Ok(Err(e)) => {
                eprintln!("Error: operation {} failed: {}", name, e);
                INVOCATION_ERROR
            }
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                eprintln!("Error: operation {} panicked: {}", name, message);
                INVOCATION_ERROR
            }
        }
    }
}

/// Invoke `operation` `iterations` times and return the folded accumulator.
pub fn fold_iterations(
    operation: &mut OperationDef,
    iterations: u64,
) -> Result<i64, OperationError> {
    let mut accumulator = FOLD_SEED;
    for _ in 0..iterations {
        accumulator = operation.invoke()?.fold_into(accumulator);
    }
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_ITERATIONS;
    use crate::registry::Value;

    fn counting_registry() -> Registry {
        let mut registry = Registry::new();
        let mut n = 0i32;
        registry.register_fn("count", move || {
            n += 1;
            Ok(Value::Int(n))
        });
        registry
    }

    #[test]
    fn test_unknown_operation_exits_1() {
        let mut registry = counting_registry();
        let code = ChildMain::new(&mut registry, DEFAULT_ITERATIONS).run("missing");
        assert_eq!(code, 1);
    }

    #[test]
    fn test_exit_code_carries_fold() {
        let mut registry = counting_registry();
        let code = ChildMain::new(&mut registry, DEFAULT_ITERATIONS).run("count");

        let mut expected = FOLD_SEED;
        for n in 1..=DEFAULT_ITERATIONS as i64 {
            expected ^= n;
        }
        assert_eq!(code, 10 + expected.rem_euclid(13) as i32);
    }

    #[test]
    fn test_constant_operation_even_iterations() {
        // An even number of identical XORs cancels out, leaving the seed
        let mut registry = Registry::new();
        registry.register_fn("five", || Ok(Value::Int(5)));

        let code = ChildMain::new(&mut registry, DEFAULT_ITERATIONS).run("five");
        assert_eq!(code, 10 + (42 % 13));
    }

    #[test]
    fn test_array_and_bool_results() {
        let mut registry = Registry::new();
        registry
            .register_fn("ints", || Ok(Value::Ints(&[1, 2, 4])))
            .register_fn("flag", || Ok(Value::Bool(true)));

        // 42 ^ 1 ^ 2 ^ 4 = 45
        assert_eq!(ChildMain::new(&mut registry, 1).run("ints"), 10 + 45 % 13);
        // 42 ^ 1 ^ 1 ^ 1 = 43
        assert_eq!(ChildMain::new(&mut registry, 3).run("flag"), 10 + 43 % 13);
    }

    #[test]
    fn test_operation_error_exits_2() {
        let mut registry = Registry::new();
        let mut calls = 0;
        registry.register_fn("flaky", move || {
            calls += 1;
            if calls > 10 {
                Err(OperationError::new("ran out of input"))
            } else {
                Ok(Value::Long(calls))
            }
        });

        let code = ChildMain::new(&mut registry, DEFAULT_ITERATIONS).run("flaky");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_panicking_operation_exits_2() {
        let mut registry = Registry::new();
        registry.register_fn("boom", || panic!("intentional panic"));

        let code = ChildMain::new(&mut registry, DEFAULT_ITERATIONS).run("boom");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_fold_iterations_zero() {
        let mut registry = counting_registry();
        let op = registry.get_mut("count").unwrap();
        assert_eq!(fold_iterations(op, 0).unwrap(), FOLD_SEED);
    }
}
