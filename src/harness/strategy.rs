//! Capabilities injected into the harness
//!
//! Per-benchmark variation lives in implementations of these traits rather
//! than in the harness itself.

use crate::config::RunConfiguration;
use crate::error::Result;
use crate::harness::prerequisite::Requirement;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A program invocation: argv plus optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run
    pub program: String,
    /// Arguments, without the program name
    pub args: Vec<String>,
    /// Working directory (default: inherited)
    pub workdir: Option<PathBuf>,
}

impl CommandSpec {
    /// Command without arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    /// Parse a whitespace-separated command line (no quoting)
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Environment-variable overrides for one execution.
///
/// The overrides are applied to the child process only; the harness never
/// touches its own environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    vars: BTreeMap<String, String>,
}

impl ExecutionEnvironment {
    /// Empty set of overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an override
    pub fn set(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.vars.insert(name.into(), value.to_string());
        self
    }

    /// Value of an override
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Overrides sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when nothing is overridden
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Captured result of an execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// Standard output followed by standard error
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Produces the benchmark binary
pub trait Builder {
    /// Path of the binary or image the build produces
    fn target(&self) -> &Path;

    /// Run the build; on success [`Builder::target`] must exist
    fn build(&self) -> Result<()>;
}

/// Runs commands and captures their output
pub trait Executor {
    /// Execute `command` with `env` applied on top of the inherited environment.
    ///
    /// A non-zero exit is not an error here; only a failure to launch is.
    fn execute(&self, command: &CommandSpec, env: &ExecutionEnvironment) -> Result<CommandOutput>;
}

/// Extracts metrics from captured benchmark output
pub trait Parser {
    /// Metrics this parser reports, in report order
    fn metrics(&self) -> Vec<String>;

    /// Extract `(metric, value)` pairs; a missing pattern is a parse error
    fn parse(&self, output: &str) -> Result<Vec<(String, f64)>>;
}

/// Benchmark-specific input generation and command assembly
pub trait Configurator {
    /// Benchmark name used in logs
    fn name(&self) -> &str;

    /// Tools and minimum versions needed to run the benchmark
    fn requirements(&self) -> Vec<Requirement> {
        Vec::new()
    }

    /// Write the input artifacts for `run`, returning their paths.
    ///
    /// Must be deterministic: the same run writes byte-identical files.
    fn write_artifacts(&self, run: &RunConfiguration) -> Result<Vec<PathBuf>>;

    /// Command and environment launching the benchmark for `run`
    fn command(&self, run: &RunConfiguration) -> Result<(CommandSpec, ExecutionEnvironment)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::new("mpirun").arg("--np").arg("4").args(["xhpl"]);
        assert_eq!(cmd.to_string(), "mpirun --np 4 xhpl");
        assert_eq!(CommandSpec::from_line("  lspci  -v ").unwrap().args, vec!["-v"]);
        assert!(CommandSpec::from_line("   ").is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let env = ExecutionEnvironment::new()
            .set("OMP_NUM_THREADS", 4)
            .set("CUDA_VISIBLE_DEVICES", "0,1");
        assert_eq!(env.get("OMP_NUM_THREADS"), Some("4"));
        let names: Vec<&str> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["CUDA_VISIBLE_DEVICES", "OMP_NUM_THREADS"]);
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            stdout: "a".into(),
            stderr: "b\n".into(),
            exit_code: Some(0),
        };
        assert_eq!(out.combined(), "a\nb\n");
        assert_eq!(CommandOutput::success("x").combined(), "x");
    }
}
