//! Bundled integer kernels
//!
//! Each kernel family comes in three flavors so their compiled code can be
//! compared side by side:
//!
//! - `<family>_scalar`: plain element-by-element loop
//! - `<family>_scalar_no_superword`: the same loop, with the engine's
//!   auto-vectorizer switched off for its child
//! - `<family>_lanes`: the loop restructured into fixed-width lane chunks
//!
//! Inputs are generated once per process from a fixed seed, so the driver and
//! every child agree on them.

use asmscope_cli::AsmConfig;
use asmscope_core::{Operation, OperationError, Registry, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::rc::Rc;

/// Lane count of the chunked variants
pub const LANES: usize = 8;

/// Engine flag disabling superword (auto-vectorization) in a child
pub const NO_SUPERWORD: &str = "-XX:-UseSuperWord";

/// Exclusive upper bound of the small-valued filter inputs
const SMALL_BOUND: i32 = 12;

const INPUT_SEED: u64 = 0x5eed_a53c;

/// Input arrays shared by every kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorInputs {
    /// Full-range values
    pub a: Vec<i32>,
    /// Full-range values
    pub b: Vec<i32>,
    /// Values in `0..12`, so equality filters hit often and unpredictably
    pub a_small: Vec<i32>,
    /// Values in `0..12`
    pub b_small: Vec<i32>,
    /// Filter needle for `a_small`
    pub fa: i32,
    /// Filter needle for `b_small` (and the second `or` needle)
    pub fb: i32,
}

impl VectorInputs {
    /// Generate `len`-element inputs from `seed`
    pub fn generate(len: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let full = |rng: &mut StdRng| -> Vec<i32> {
            (0..len).map(|_| rng.gen_range(i32::MIN..=i32::MAX)).collect()
        };
        let a = full(&mut rng);
        let b = full(&mut rng);
        let small = |rng: &mut StdRng| -> Vec<i32> {
            (0..len).map(|_| rng.gen_range(0..SMALL_BOUND)).collect()
        };
        let a_small = small(&mut rng);
        let b_small = small(&mut rng);

        Self {
            a,
            b,
            a_small,
            b_small,
            fa: rng.gen_range(0..SMALL_BOUND),
            fb: rng.gen_range(0..SMALL_BOUND),
        }
    }

    /// Number of elements per array
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// Whether the arrays are empty
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

// ============================================================================
// Sum
// ============================================================================

/// Wrapping sum, one element at a time
#[inline(never)]
pub fn sum_scalar(a: &[i32]) -> i32 {
    a.iter().fold(0i32, |sum, &x| sum.wrapping_add(x))
}

/// Wrapping sum over `LANES` independent accumulators
#[inline(never)]
pub fn sum_lanes(a: &[i32]) -> i32 {
    let chunks = a.chunks_exact(LANES);
    let tail = chunks.remainder();
    let mut acc = [0i32; LANES];
    for chunk in chunks {
        for (lane, &x) in acc.iter_mut().zip(chunk) {
            *lane = lane.wrapping_add(x);
        }
    }
    acc.iter().chain(tail).fold(0i32, |sum, &x| sum.wrapping_add(x))
}

// ============================================================================
// Elementwise add / mul
// ============================================================================

/// `out[i] = a[i] + b[i]`, wrapping
#[inline(never)]
pub fn add_scalar(a: &[i32], b: &[i32], out: &mut [i32]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x.wrapping_add(y);
    }
}

/// `out[i] = a[i] + b[i]`, wrapping, `LANES` at a time
#[inline(never)]
pub fn add_lanes(a: &[i32], b: &[i32], out: &mut [i32]) {
    map_lanes(a, b, out, i32::wrapping_add);
}

/// `out[i] = a[i] * b[i]`, wrapping
#[inline(never)]
pub fn mul_scalar(a: &[i32], b: &[i32], out: &mut [i32]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = x.wrapping_mul(y);
    }
}

/// `out[i] = a[i] * b[i]`, wrapping, `LANES` at a time
#[inline(never)]
pub fn mul_lanes(a: &[i32], b: &[i32], out: &mut [i32]) {
    map_lanes(a, b, out, i32::wrapping_mul);
}

#[inline(always)]
fn map_lanes(a: &[i32], b: &[i32], out: &mut [i32], op: fn(i32, i32) -> i32) {
    let len = out.len().min(a.len()).min(b.len());
    let split = len - len % LANES;
    let (out_body, out_tail) = out[..len].split_at_mut(split);

    for ((o, x), y) in out_body
        .chunks_exact_mut(LANES)
        .zip(a[..split].chunks_exact(LANES))
        .zip(b[..split].chunks_exact(LANES))
    {
        for lane in 0..LANES {
            o[lane] = op(x[lane], y[lane]);
        }
    }
    for ((o, &x), &y) in out_tail.iter_mut().zip(&a[split..]).zip(&b[split..]) {
        *o = op(x, y);
    }
}

// ============================================================================
// Equality filters, XOR-reduced to one bool
// ============================================================================

/// XOR of `a[i] == fa` over all elements
#[inline(never)]
pub fn filter_scalar(a: &[i32], fa: i32) -> bool {
    a.iter().fold(false, |acc, &x| acc ^ (x == fa))
}

/// XOR of `a[i] == fa`, `LANES` at a time
#[inline(never)]
pub fn filter_lanes(a: &[i32], fa: i32) -> bool {
    let chunks = a.chunks_exact(LANES);
    let tail = chunks.remainder();
    let mut mask = [false; LANES];
    for chunk in chunks {
        for (m, &x) in mask.iter_mut().zip(chunk) {
            *m ^= x == fa;
        }
    }
    mask.iter().fold(false, |acc, &m| acc ^ m) ^ filter_scalar(tail, fa)
}

/// XOR of `a[i] == fa || a[i] == fb`
#[inline(never)]
pub fn filter_or2_scalar(a: &[i32], fa: i32, fb: i32) -> bool {
    a.iter().fold(false, |acc, &x| acc ^ (x == fa || x == fb))
}

/// XOR of `a[i] == fa || a[i] == fb`, `LANES` at a time
#[inline(never)]
pub fn filter_or2_lanes(a: &[i32], fa: i32, fb: i32) -> bool {
    let chunks = a.chunks_exact(LANES);
    let tail = chunks.remainder();
    let mut mask = [false; LANES];
    for chunk in chunks {
        for (m, &x) in mask.iter_mut().zip(chunk) {
            *m ^= (x == fa) | (x == fb);
        }
    }
    mask.iter().fold(false, |acc, &m| acc ^ m) ^ filter_or2_scalar(tail, fa, fb)
}

/// XOR of `a[i] == fa && b[i] == fb`
#[inline(never)]
pub fn filter_and2_scalar(a: &[i32], b: &[i32], fa: i32, fb: i32) -> bool {
    a.iter()
        .zip(b)
        .fold(false, |acc, (&x, &y)| acc ^ (x == fa && y == fb))
}

/// XOR of `a[i] == fa && b[i] == fb`, `LANES` at a time
#[inline(never)]
pub fn filter_and2_lanes(a: &[i32], b: &[i32], fa: i32, fb: i32) -> bool {
    let len = a.len().min(b.len());
    let split = len - len % LANES;
    let mut mask = [false; LANES];
    for (x, y) in a[..split]
        .chunks_exact(LANES)
        .zip(b[..split].chunks_exact(LANES))
    {
        for lane in 0..LANES {
            mask[lane] ^= (x[lane] == fa) & (y[lane] == fb);
        }
    }
    mask.iter().fold(false, |acc, &m| acc ^ m)
        ^ filter_and2_scalar(&a[split..len], &b[split..len], fa, fb)
}

// ============================================================================
// Filtered sums
// ============================================================================

/// Sum of `b[i]` where `a[i] == fa`
#[inline(never)]
pub fn filter_sum_scalar(a: &[i32], b: &[i32], fa: i32) -> i64 {
    let mut sum = 0i64;
    for (&x, &y) in a.iter().zip(b) {
        if x == fa {
            sum += i64::from(y);
        }
    }
    sum
}

/// Sum of `b[i]` where `a[i] == fa`, selecting with a bit mask instead of a
/// branch
#[inline(never)]
pub fn filter_sum_branchless_scalar(a: &[i32], b: &[i32], fa: i32) -> i64 {
    let mut sum = 0i64;
    for (&x, &y) in a.iter().zip(b) {
        let n = x.wrapping_sub(fa);
        // all ones iff n == 0
        let mask = !(n >> 31) & !(n.wrapping_neg() >> 31);
        sum += i64::from(mask & y);
    }
    sum
}

/// Sum of `b[i]` where `a[i] == fa`, `LANES` at a time
#[inline(never)]
pub fn filter_sum_lanes(a: &[i32], b: &[i32], fa: i32) -> i64 {
    let len = a.len().min(b.len());
    let split = len - len % LANES;
    let mut acc = [0i64; LANES];
    for (x, y) in a[..split]
        .chunks_exact(LANES)
        .zip(b[..split].chunks_exact(LANES))
    {
        for lane in 0..LANES {
            acc[lane] += if x[lane] == fa { i64::from(y[lane]) } else { 0 };
        }
    }
    acc.iter().sum::<i64>() + filter_sum_scalar(&a[split..len], &b[split..len], fa)
}

// ============================================================================
// Registry
// ============================================================================

/// How a kernel consumes the inputs
#[derive(Clone, Copy)]
enum Shape {
    /// Reduces the inputs to a scalar
    Reduce(fn(&VectorInputs) -> Value<'static>),
    /// Writes `a op b` into the kernel's output buffer
    Map(fn(&[i32], &[i32], &mut [i32])),
}

/// A kernel bound to the shared inputs
struct Kernel {
    inputs: Rc<VectorInputs>,
    shape: Shape,
    output: Vec<i32>,
}

impl Kernel {
    fn new(inputs: &Rc<VectorInputs>, shape: Shape) -> Self {
        let output = match shape {
            Shape::Map(_) => vec![0; inputs.len()],
            Shape::Reduce(_) => Vec::new(),
        };
        Self {
            inputs: Rc::clone(inputs),
            shape,
            output,
        }
    }
}

impl Operation for Kernel {
    fn invoke(&mut self) -> Result<Value<'_>, OperationError> {
        match self.shape {
            Shape::Reduce(f) => Ok(f(&self.inputs)),
            Shape::Map(f) => {
                f(&self.inputs.a, &self.inputs.b, &mut self.output);
                Ok(Value::Ints(&self.output))
            }
        }
    }
}

/// Register `<family>_scalar`, `<family>_scalar_no_superword` and
/// `<family>_lanes`
fn register_family(
    registry: &mut Registry,
    inputs: &Rc<VectorInputs>,
    family: &str,
    scalar: Shape,
    lanes: Shape,
) {
    registry.register(format!("{family}_scalar"), Kernel::new(inputs, scalar));
    registry.register_with_args(
        format!("{family}_scalar_no_superword"),
        [NO_SUPERWORD],
        Kernel::new(inputs, scalar),
    );
    registry.register(format!("{family}_lanes"), Kernel::new(inputs, lanes));
}

/// Build the bundled operation registry, sized by `[child] array_length`.
pub fn registry(config: &AsmConfig) -> Registry {
    registry_with_inputs(VectorInputs::generate(config.child.array_length, INPUT_SEED))
}

/// Build the bundled operation registry over explicit inputs.
pub fn registry_with_inputs(inputs: VectorInputs) -> Registry {
    let inputs = Rc::new(inputs);
    let mut registry = Registry::new();

    register_family(
        &mut registry,
        &inputs,
        "sum",
        Shape::Reduce(|v| Value::Int(sum_scalar(&v.a))),
        Shape::Reduce(|v| Value::Int(sum_lanes(&v.a))),
    );
    register_family(
        &mut registry,
        &inputs,
        "add",
        Shape::Map(add_scalar),
        Shape::Map(add_lanes),
    );
    register_family(
        &mut registry,
        &inputs,
        "mul",
        Shape::Map(mul_scalar),
        Shape::Map(mul_lanes),
    );
    register_family(
        &mut registry,
        &inputs,
        "filter",
        Shape::Reduce(|v| Value::Bool(filter_scalar(&v.a_small, v.fa))),
        Shape::Reduce(|v| Value::Bool(filter_lanes(&v.a_small, v.fa))),
    );
    register_family(
        &mut registry,
        &inputs,
        "filter_or2",
        Shape::Reduce(|v| Value::Bool(filter_or2_scalar(&v.a_small, v.fa, v.fb))),
        Shape::Reduce(|v| Value::Bool(filter_or2_lanes(&v.a_small, v.fa, v.fb))),
    );
    register_family(
        &mut registry,
        &inputs,
        "filter_and2",
        Shape::Reduce(|v| Value::Bool(filter_and2_scalar(&v.a_small, &v.b_small, v.fa, v.fb))),
        Shape::Reduce(|v| Value::Bool(filter_and2_lanes(&v.a_small, &v.b_small, v.fa, v.fb))),
    );
    register_family(
        &mut registry,
        &inputs,
        "filter_sum",
        Shape::Reduce(|v| Value::Long(filter_sum_scalar(&v.a_small, &v.b_small, v.fa))),
        Shape::Reduce(|v| Value::Long(filter_sum_lanes(&v.a_small, &v.b_small, v.fa))),
    );

    registry.register(
        "filter_sum_branchless_scalar",
        Kernel::new(
            &inputs,
            Shape::Reduce(|v| {
                Value::Long(filter_sum_branchless_scalar(&v.a_small, &v.b_small, v.fa))
            }),
        ),
    );
    registry.register_with_args(
        "filter_sum_branchless_scalar_no_superword",
        [NO_SUPERWORD],
        Kernel::new(
            &inputs,
            Shape::Reduce(|v| {
                Value::Long(filter_sum_branchless_scalar(&v.a_small, &v.b_small, v.fa))
            }),
        ),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use asmscope_core::ChildMain;

    // Not a multiple of LANES, so every tail path runs
    const ODD_LEN: usize = 8 * 37 + 5;

    fn inputs() -> VectorInputs {
        VectorInputs::generate(ODD_LEN, 7)
    }

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(VectorInputs::generate(64, 1), VectorInputs::generate(64, 1));
        assert_ne!(VectorInputs::generate(64, 1), VectorInputs::generate(64, 2));
    }

    #[test]
    fn test_small_inputs_in_bound() {
        let v = inputs();
        assert_eq!(v.len(), ODD_LEN);
        assert!(v.a_small.iter().chain(&v.b_small).all(|x| (0..SMALL_BOUND).contains(x)));
        assert!((0..SMALL_BOUND).contains(&v.fa));
        assert!((0..SMALL_BOUND).contains(&v.fb));
    }

    #[test]
    fn test_sum_variants_agree() {
        let v = inputs();
        assert_eq!(sum_scalar(&v.a), sum_lanes(&v.a));
        assert_eq!(sum_scalar(&[1, 2, 3]), 6);
        assert_eq!(sum_lanes(&[i32::MAX, 1]), i32::MIN);
    }

    #[test]
    fn test_map_variants_agree() {
        let v = inputs();
        let mut scalar = vec![0; ODD_LEN];
        let mut lanes = vec![0; ODD_LEN];

        add_scalar(&v.a, &v.b, &mut scalar);
        add_lanes(&v.a, &v.b, &mut lanes);
        assert_eq!(scalar, lanes);
        assert_eq!(scalar[3], v.a[3].wrapping_add(v.b[3]));

        mul_scalar(&v.a, &v.b, &mut scalar);
        mul_lanes(&v.a, &v.b, &mut lanes);
        assert_eq!(scalar, lanes);
        assert_eq!(scalar[ODD_LEN - 1], v.a[ODD_LEN - 1].wrapping_mul(v.b[ODD_LEN - 1]));
    }

    #[test]
    fn test_filter_variants_agree() {
        let v = inputs();
        assert_eq!(filter_scalar(&v.a_small, v.fa), filter_lanes(&v.a_small, v.fa));
        assert_eq!(
            filter_or2_scalar(&v.a_small, v.fa, v.fb),
            filter_or2_lanes(&v.a_small, v.fa, v.fb)
        );
        assert_eq!(
            filter_and2_scalar(&v.a_small, &v.b_small, v.fa, v.fb),
            filter_and2_lanes(&v.a_small, &v.b_small, v.fa, v.fb)
        );
    }

    #[test]
    fn test_filter_parity() {
        assert!(filter_scalar(&[3, 1, 3, 3], 3));
        assert!(!filter_lanes(&[3, 3, 0, 0, 0, 0, 0, 0, 0, 3, 3], 3));
        assert!(!filter_or2_scalar(&[1, 2, 5], 1, 2));
    }

    #[test]
    fn test_filter_sum_variants_agree() {
        let v = inputs();
        let expected = filter_sum_scalar(&v.a_small, &v.b_small, v.fa);
        assert_eq!(filter_sum_lanes(&v.a_small, &v.b_small, v.fa), expected);
        assert_eq!(
            filter_sum_branchless_scalar(&v.a_small, &v.b_small, v.fa),
            expected
        );
    }

    #[test]
    fn test_branchless_mask_edges() {
        let a = [i32::MIN, i32::MAX, 0, -1, 5];
        let b = [100, 200, 300, 400, 500];
        for needle in [i32::MIN, i32::MAX, 0, -1, 5, 6] {
            assert_eq!(
                filter_sum_branchless_scalar(&a, &b, needle),
                filter_sum_scalar(&a, &b, needle),
                "needle {needle}"
            );
        }
    }

    #[test]
    fn test_registry_names() {
        let registry = registry_with_inputs(VectorInputs::generate(16, 1));
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names.len(), 7 * 3 + 2);
        for family in ["sum", "add", "mul", "filter", "filter_or2", "filter_and2", "filter_sum"] {
            assert!(names.contains(&format!("{family}_scalar").as_str()));
            assert!(names.contains(&format!("{family}_lanes").as_str()));
            assert_eq!(
                registry
                    .get(&format!("{family}_scalar_no_superword"))
                    .unwrap()
                    .engine_args(),
                [NO_SUPERWORD]
            );
        }
        assert!(registry.get("sum_lanes").unwrap().engine_args().is_empty());
    }

    #[test]
    fn test_invoke_returns_kernel_result() {
        let v = VectorInputs::generate(20, 3);
        let expected_sum = sum_scalar(&v.a);
        let mut expected_add = vec![0; 20];
        add_scalar(&v.a, &v.b, &mut expected_add);

        let mut registry = registry_with_inputs(v);
        assert_eq!(
            registry.get_mut("sum_lanes").unwrap().invoke().unwrap(),
            Value::Int(expected_sum)
        );
        assert_eq!(
            registry.get_mut("add_lanes").unwrap().invoke().unwrap(),
            Value::Ints(&expected_add)
        );
    }

    #[test]
    fn test_scalar_and_lanes_exit_alike() {
        let mut registry = registry_with_inputs(inputs());
        let mut child = ChildMain::new(&mut registry, 11);
        for family in ["sum", "add", "mul", "filter", "filter_or2", "filter_and2", "filter_sum"] {
            let scalar = child.run(&format!("{family}_scalar"));
            assert!((10..=22).contains(&scalar));
            assert_eq!(child.run(&format!("{family}_lanes")), scalar, "{family}");
            assert_eq!(
                child.run(&format!("{family}_scalar_no_superword")),
                scalar,
                "{family}"
            );
        }
    }

    #[test]
    fn test_empty_inputs() {
        let mut registry = registry_with_inputs(VectorInputs::generate(0, 1));
        let mut child = ChildMain::new(&mut registry, 3);
        // 42 ^ 0 ^ 0 ^ 0
        assert_eq!(child.run("sum_lanes"), 10 + 42 % 13);
        assert_eq!(child.run("add_scalar"), 10 + 42 % 13);
    }
}
