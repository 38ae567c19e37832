//! Runtime Environment
//!
//! Collects what the launcher and the result writer need to know about the
//! running process: its own executable, the arguments it was started with, and
//! the runtime/OS/architecture names plus the preferred vector width printed
//! in every artifact header.
//!
//! Linux-specific data (kernel release) gracefully degrades on other
//! platforms, returning "unknown".

use crate::config::EnvironmentConfig;
use std::path::{Path, PathBuf};

/// Host description printed at the top of every artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEnvironment {
    /// Runtime name
    pub runtime: String,
    /// Operating system name
    pub os: String,
    /// Operating system version
    pub os_version: String,
    /// CPU architecture
    pub arch: String,
    /// Preferred vector width in bits
    pub vector_bits: u32,
}

impl RuntimeEnvironment {
    /// Detect the host children of `program` run on, applying any overrides
    /// from configuration.
    ///
    /// Without a configured `runtime_name`, the runtime is named after
    /// `program`'s file name.
    pub fn detect(config: &EnvironmentConfig, program: &Path) -> Self {
        Self {
            runtime: config
                .runtime_name
                .clone()
                .unwrap_or_else(|| runtime_name(program)),
            os: std::env::consts::OS.to_string(),
            os_version: get_os_version().unwrap_or_else(|| "unknown".to_string()),
            arch: std::env::consts::ARCH.to_string(),
            vector_bits: config.vector_bits.unwrap_or_else(preferred_vector_bits),
        }
    }

    /// Artifact header for `operation`
    pub fn header(&self, operation: &str) -> String {
        let mut header = String::new();
        header.push_str(&format!("Running benchmark {}:\n", operation));
        header.push_str(&format!("\ton runtime: {}\n", self.runtime));
        header.push_str(&format!(
            "\ton OS: {} {} {}\n",
            self.os, self.os_version, self.arch
        ));
        header.push_str(&format!("\twith vector size: {} bits\n", self.vector_bits));
        header.push_str("-----\n");
        header
    }
}

fn runtime_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Path of the running executable.
///
/// Falls back to `argv[0]` when the OS cannot report it, so a bad lookup
/// surfaces as a per-operation launch failure rather than aborting the run.
pub fn current_program() -> PathBuf {
    std::env::current_exe()
        .ok()
        .or_else(|| std::env::args_os().next().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_PKG_NAME")))
}

/// Arguments this process was started with, minus `argv[0]` and anything
/// matching `filtered_prefixes`.
pub fn inherited_args(filtered_prefixes: &[String]) -> Vec<String> {
    filter_args(
        std::env::args_os()
            .skip(1)
            .map(|arg| arg.to_string_lossy().into_owned()),
        filtered_prefixes,
    )
}

/// Drop every argument starting with one of `filtered_prefixes`.
pub fn filter_args(
    args: impl IntoIterator<Item = String>,
    filtered_prefixes: &[String],
) -> Vec<String> {
    args.into_iter()
        .filter(|arg| {
            !filtered_prefixes
                .iter()
                .any(|prefix| arg.starts_with(prefix.as_str()))
        })
        .collect()
}

/// Widest SIMD register the CPU supports, in bits
fn preferred_vector_bits() -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx512f") {
            512
        } else if std::is_x86_feature_detected!("avx2") {
            256
        } else {
            128
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        128
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        64
    }
}

/// Get kernel release from /proc (Linux only)
fn get_os_version() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/sys/kernel/osrelease")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_environment() -> RuntimeEnvironment {
        RuntimeEnvironment {
            runtime: "TestVM".to_string(),
            os: "linux".to_string(),
            os_version: "6.1.0".to_string(),
            arch: "x86_64".to_string(),
            vector_bits: 256,
        }
    }

    #[test]
    fn test_header_format() {
        let header = fixed_environment().header("sum_scalar");
        assert_eq!(
            header,
            "Running benchmark sum_scalar:\n\
             \ton runtime: TestVM\n\
             \ton OS: linux 6.1.0 x86_64\n\
             \twith vector size: 256 bits\n\
             -----\n"
        );
    }

    #[test]
    fn test_detect_applies_overrides() {
        let config = EnvironmentConfig {
            runtime_name: Some("OpenJDK 64-Bit Server VM".to_string()),
            vector_bits: Some(512),
        };
        let env = RuntimeEnvironment::detect(&config, Path::new("/usr/bin/java"));
        assert_eq!(env.runtime, "OpenJDK 64-Bit Server VM");
        assert_eq!(env.vector_bits, 512);
        assert_eq!(env.arch, std::env::consts::ARCH);
    }

    #[test]
    fn test_detect_defaults() {
        let env = RuntimeEnvironment::detect(&EnvironmentConfig::default(), &current_program());
        let exe = std::env::current_exe().unwrap();
        assert_eq!(env.runtime, exe.file_name().unwrap().to_string_lossy());
        assert!(env.vector_bits >= 64);
        assert!(!env.os_version.is_empty());
    }

    #[test]
    fn test_runtime_named_after_program() {
        let config = EnvironmentConfig::default();
        let env = RuntimeEnvironment::detect(&config, Path::new("/opt/jdk-21/bin/java"));
        assert_eq!(env.runtime, "java");

        let env = RuntimeEnvironment::detect(&config, Path::new("asmscope"));
        assert_eq!(env.runtime, "asmscope");
    }

    #[test]
    fn test_filter_args() {
        let prefixes = vec!["-agentlib".to_string(), "-Xdebug".to_string()];
        let args = [
            "-agentlib:jdwp=transport=dt_socket",
            "--array-length",
            "64",
            "-Xdebug",
            "-v",
        ]
        .into_iter()
        .map(String::from);

        assert_eq!(filter_args(args, &prefixes), ["--array-length", "64", "-v"]);
    }

    #[test]
    fn test_filter_args_no_prefixes() {
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(filter_args(args.clone(), &[]), args);
    }

    #[test]
    fn test_current_program_exists() {
        assert!(current_program().exists());
    }
}
