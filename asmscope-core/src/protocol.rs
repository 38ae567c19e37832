//! Exit-Code Protocol
//!
//! A child process reports its outcome through a single exit status byte:
//!
//! ```text
//!  0..=9    failure sub-code (1 = unknown operation, 2 = invocation error)
//! 10..=255  success; (code - 10) carries the checksum fold modulo 13
//! ```
//!
//! The checksum only exists to keep the optimizer from discarding the
//! operation loop. The parent decodes it for display but never re-verifies it.

use std::fmt;
use std::process::ExitStatus;

/// Exit code for a name that is not in the registry
pub const UNKNOWN_OPERATION: i32 = 1;

/// Exit code for an operation that failed or panicked while running
pub const INVOCATION_ERROR: i32 = 2;

/// Lowest exit code that means success
pub const SUCCESS_BASE: i32 = 10;

/// Modulus applied to the accumulator before adding [`SUCCESS_BASE`]
pub const CHECKSUM_MODULUS: i64 = 13;

/// Initial value of the child's fold accumulator
pub const FOLD_SEED: i64 = 42;

/// Number of times a child invokes its operation
pub const DEFAULT_ITERATIONS: u64 = 100_000;

/// Encode a successful run's accumulator as an exit code in `10..=22`.
///
/// Uses the Euclidean remainder so negative accumulators stay in range.
pub fn success_code(accumulator: i64) -> i32 {
    SUCCESS_BASE + accumulator.rem_euclid(CHECKSUM_MODULUS) as i32
}

/// Decoded outcome of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    /// Exit code >= 10
    Success {
        /// `code - 10`; informational only
        checksum: u8,
    },
    /// Exit code 1
    UnknownOperation,
    /// Exit code 2
    InvocationError,
    /// Any other code below 10
    Failed {
        /// Raw exit code
        code: i32,
    },
    /// Terminated without an exit code (killed by a signal)
    Signaled,
}

impl ChildExit {
    /// Decode a raw exit code; `None` means the process had no exit code.
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            None => ChildExit::Signaled,
            Some(code) if code >= SUCCESS_BASE => ChildExit::Success {
                checksum: (code - SUCCESS_BASE).min(i32::from(u8::MAX)) as u8,
            },
            Some(UNKNOWN_OPERATION) => ChildExit::UnknownOperation,
            Some(INVOCATION_ERROR) => ChildExit::InvocationError,
            Some(code) => ChildExit::Failed { code },
        }
    }

    /// Decode a process exit status
    pub fn from_status(status: ExitStatus) -> Self {
        Self::from_code(status.code())
    }

    /// Whether the child reported success
    pub fn is_success(&self) -> bool {
        matches!(self, ChildExit::Success { .. })
    }

    /// Raw exit code, if any
    pub fn code(&self) -> Option<i32> {
        match *self {
            ChildExit::Success { checksum } => Some(SUCCESS_BASE + i32::from(checksum)),
            ChildExit::UnknownOperation => Some(UNKNOWN_OPERATION),
            ChildExit::InvocationError => Some(INVOCATION_ERROR),
            ChildExit::Failed { code } => Some(code),
            ChildExit::Signaled => None,
        }
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Success { checksum } => write!(
                f,
                "exit code {} (success, checksum {})",
                SUCCESS_BASE + i32::from(*checksum),
                checksum
            ),
            ChildExit::UnknownOperation => {
                write!(f, "exit code {} (unknown operation)", UNKNOWN_OPERATION)
            }
            ChildExit::InvocationError => {
                write!(f, "exit code {} (invocation error)", INVOCATION_ERROR)
            }
            ChildExit::Failed { code } => write!(f, "exit code {}", code),
            ChildExit::Signaled => write!(f, "terminated by signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_code_range() {
        assert_eq!(success_code(0), 10);
        assert_eq!(success_code(42), 13);
        assert_eq!(success_code(12), 22);
        assert_eq!(success_code(13), 10);
        for acc in [-1_000_003, -43, -1, 0, 7, 99_999, i64::MAX, i64::MIN] {
            let code = success_code(acc);
            assert!((10..=22).contains(&code), "{acc} -> {code}");
        }
    }

    #[test]
    fn test_success_code_negative_accumulator() {
        // -43 = -4 * 13 + 9
        assert_eq!(success_code(-43), 19);
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(ChildExit::from_code(Some(1)), ChildExit::UnknownOperation);
        assert_eq!(ChildExit::from_code(Some(2)), ChildExit::InvocationError);
        assert_eq!(ChildExit::from_code(Some(0)), ChildExit::Failed { code: 0 });
        assert_eq!(ChildExit::from_code(Some(9)), ChildExit::Failed { code: 9 });
        assert_eq!(ChildExit::from_code(Some(-1)), ChildExit::Failed { code: -1 });
        assert_eq!(ChildExit::from_code(None), ChildExit::Signaled);
        assert!(!ChildExit::from_code(Some(9)).is_success());
    }

    #[test]
    fn test_decode_success() {
        assert_eq!(
            ChildExit::from_code(Some(10)),
            ChildExit::Success { checksum: 0 }
        );
        assert_eq!(
            ChildExit::from_code(Some(22)),
            ChildExit::Success { checksum: 12 }
        );
        // Anything at or above the threshold counts, even outside 10..=22
        assert!(ChildExit::from_code(Some(255)).is_success());
    }

    #[test]
    fn test_code_roundtrip() {
        for code in [0, 1, 2, 3, 9, 10, 15, 22] {
            assert_eq!(ChildExit::from_code(Some(code)).code(), Some(code));
        }
        assert_eq!(ChildExit::Signaled.code(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ChildExit::UnknownOperation.to_string(),
            "exit code 1 (unknown operation)"
        );
        assert_eq!(
            ChildExit::Success { checksum: 3 }.to_string(),
            "exit code 13 (success, checksum 3)"
        );
    }
}
