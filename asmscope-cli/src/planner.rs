//! Operation Planner
//!
//! Builds the execution plan by filtering and ordering registered operations.
//!
//! Filtering: optional regex pattern matched against the operation name.
//!
//! Ordering: operations are sorted alphabetically by name for deterministic
//! execution.

use asmscope_core::Registry;
use regex::Regex;

/// One operation the driver will run in a child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTarget {
    /// Operation name passed to the child
    pub name: String,
    /// Extra engine flags for this operation's child
    pub engine_args: Vec<String>,
}

impl OperationTarget {
    /// Target with no extra engine flags
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine_args: Vec::new(),
        }
    }

    /// Attach engine flags
    pub fn with_engine_args(mut self, engine_args: Vec<String>) -> Self {
        self.engine_args = engine_args;
        self
    }
}

/// Execution plan for operations
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Ordered list of operations to run
    pub targets: Vec<OperationTarget>,
}

impl ExecutionPlan {
    /// Number of planned operations
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Build execution plan from the registry
///
/// Filters operations by name and returns them in deterministic order.
pub fn build_plan(registry: &Registry, filter: Option<&Regex>) -> ExecutionPlan {
    let mut targets: Vec<_> = registry
        .iter()
        .filter(|op| filter.is_none_or(|re| re.is_match(op.name())))
        .map(|op| OperationTarget::new(op.name()).with_engine_args(op.engine_args().to_vec()))
        .collect();

    // Sort alphabetically for deterministic execution order
    targets.sort_by(|a, b| a.name.cmp(&b.name));

    ExecutionPlan { targets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asmscope_core::Value;

    fn registry(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            registry.register_fn(*name, || Ok(Value::Int(1)));
        }
        registry
    }

    fn names(plan: &ExecutionPlan) -> Vec<&str> {
        plan.targets.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_no_filter() {
        let plan = build_plan(&registry(&["c_op", "a_op", "b_op"]), None);

        // Should be sorted alphabetically
        assert_eq!(names(&plan), ["a_op", "b_op", "c_op"]);
    }

    #[test]
    fn test_regex_filter() {
        let re = Regex::new("^sum_").unwrap();
        let plan = build_plan(
            &registry(&["sum_lanes", "mul_scalar", "sum_scalar", "filter_sum_lanes"]),
            Some(&re),
        );

        assert_eq!(names(&plan), ["sum_lanes", "sum_scalar"]);
    }

    #[test]
    fn test_filter_matches_nothing() {
        let re = Regex::new("^nope$").unwrap();
        let plan = build_plan(&registry(&["a", "b"]), Some(&re));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_engine_args_carried() {
        let mut registry = registry(&["plain"]);
        registry.register_with_args(
            "tagged",
            ["-XX:-UseSuperWord"],
            asmscope_core::from_fn(|| Ok(Value::Bool(true))),
        );

        let plan = build_plan(&registry, None);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.targets[0], OperationTarget::new("plain"));
        assert_eq!(
            plan.targets[1],
            OperationTarget::new("tagged").with_engine_args(vec!["-XX:-UseSuperWord".into()])
        );
    }
}
