//! Configuration loading from asmscope.toml
//!
//! asmscope configuration can be specified in an `asmscope.toml` file in the
//! project root. The configuration is automatically discovered by walking up
//! from the current directory. Every field has a default, so an empty file
//! (or no file at all) gives the stock HotSpot-style setup.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// asmscope configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AsmConfig {
    /// Child launch configuration
    #[serde(default)]
    pub launcher: LauncherConfig,
    /// Sentinel markers framing the captured section
    #[serde(default)]
    pub markers: MarkerConfig,
    /// Child-mode configuration
    #[serde(default)]
    pub child: ChildConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Values reported in artifact headers
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

/// How child processes are launched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Program to run (defaults to the current executable)
    #[serde(default)]
    pub program: Option<String>,
    /// Forward the driver's own arguments to each child
    #[serde(default = "default_inherit_args")]
    pub inherit_args: bool,
    /// Inherited arguments starting with any of these prefixes are dropped
    #[serde(default = "default_filtered_arg_prefixes")]
    pub filtered_arg_prefixes: Vec<String>,
    /// Extra arguments placed after the inherited ones
    #[serde(default)]
    pub base_args: Vec<String>,
    /// Engine diagnostic flags; `{operation}` is replaced by the operation name
    #[serde(default = "default_diagnostic_args")]
    pub diagnostic_args: Vec<String>,
    /// Self-invocation marker placed right before the operation name
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: None,
            inherit_args: default_inherit_args(),
            filtered_arg_prefixes: default_filtered_arg_prefixes(),
            base_args: Vec::new(),
            diagnostic_args: default_diagnostic_args(),
            marker: default_marker(),
        }
    }
}

fn default_inherit_args() -> bool {
    true
}
fn default_filtered_arg_prefixes() -> Vec<String> {
    ["-agentlib", "-agentpath", "-Xdebug", "-Xrunjdwp"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_diagnostic_args() -> Vec<String> {
    [
        "-XX:+UnlockDiagnosticVMOptions",
        "-XX:PrintAssemblyOptions=intel",
        "-XX:CompileCommand=print,*{operation}",
        "-XX:CompileCommand=dontinline,*{operation}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_marker() -> String {
    "--".to_string()
}

/// Markers used to slice the compiled-code section out of child stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Start of an optimized compilation record
    #[serde(default = "default_compilation_marker")]
    pub compilation: String,
    /// Method entry point; the section starts right after it
    #[serde(default = "default_entry_marker")]
    pub entry: String,
    /// Start of trailing metadata; the section ends right before it
    #[serde(default = "default_metadata_marker")]
    pub metadata: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            compilation: default_compilation_marker(),
            entry: default_entry_marker(),
            metadata: default_metadata_marker(),
        }
    }
}

fn default_compilation_marker() -> String {
    "Compiled method (c2)".to_string()
}
fn default_entry_marker() -> String {
    "[Entry Point]".to_string()
}
fn default_metadata_marker() -> String {
    "\nImmutableOopMap".to_string()
}

/// Child-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildConfig {
    /// Number of times the child invokes its operation
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Input length for the bundled kernels
    #[serde(default = "default_array_length")]
    pub array_length: usize,
}

impl Default for ChildConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            array_length: default_array_length(),
        }
    }
}

fn default_iterations() -> u64 {
    asmscope_core::DEFAULT_ITERATIONS
}
fn default_array_length() -> usize {
    8192
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one `<operation>.log` per captured operation
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "results".to_string()
}

/// Overrides for values reported in artifact headers
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Runtime name (defaults to the launched program's file name)
    #[serde(default)]
    pub runtime_name: Option<String>,
    /// Preferred vector width in bits (defaults to CPU feature detection)
    #[serde(default)]
    pub vector_bits: Option<u32>,
}

impl AsmConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("asmscope.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# asmscope Configuration

[launcher]
# Program to run for each operation (default: the current executable).
# Artifacts are only written when this program prints its compiled code
# between the [markers] below; the bundled native kernels print none.
# program = "/usr/bin/java"
# Forward the driver's own arguments to each child
inherit_args = true
# Inherited arguments with these prefixes are not forwarded
filtered_arg_prefixes = ["-agentlib", "-agentpath", "-Xdebug", "-Xrunjdwp"]
# Extra arguments placed after the inherited ones
base_args = []
# Engine diagnostic flags; {operation} is replaced by the operation name
diagnostic_args = [
    "-XX:+UnlockDiagnosticVMOptions",
    "-XX:PrintAssemblyOptions=intel",
    "-XX:CompileCommand=print,*{operation}",
    "-XX:CompileCommand=dontinline,*{operation}",
]
# Self-invocation marker placed before the operation name
marker = "--"

[markers]
compilation = "Compiled method (c2)"
entry = "[Entry Point]"
metadata = "\nImmutableOopMap"

[child]
# Invocations per child process
iterations = 100000
# Input length for the bundled kernels
array_length = 8192

[output]
# One <operation>.log per captured operation
directory = "results"

[environment]
# Overrides for the artifact header (uncomment to enable)
# runtime_name = "OpenJDK 64-Bit Server VM"
# vector_bits = 256
"#
        .to_string()
    }
}
