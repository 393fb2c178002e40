//! Error types for hpcbench
//!
//! The taxonomy follows the benchmark lifecycle: a missing tool or a failed
//! build stops the whole process, while configuration, execution and parse
//! failures only invalidate the run configuration they belong to.

use std::path::PathBuf;
use thiserror::Error;

use crate::harness::HarnessState;

/// Main error type for hpcbench operations
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Required tool missing or older than the minimum version
    #[error("{tool} >= {required} is required (found: {found})")]
    Prerequisite {
        tool: String,
        required: String,
        found: String,
    },

    /// Internally inconsistent run configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External build step failed
    #[error("Build of '{target}' failed: {stderr}")]
    Build { target: String, stderr: String },

    /// Benchmark command exited with a non-accepted status
    #[error("Command '{command}' failed with exit code {exit_code:?}: {stderr}")]
    Execution {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Expected pattern absent from benchmark output
    #[error("No value for metric '{metric}': {reason}")]
    Parse { metric: String, reason: String },

    /// I/O error while writing artifacts or logs
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Illegal edge in the harness state machine
    #[error("Invalid harness transition: {from} -> {to}")]
    InvalidTransition { from: HarnessState, to: HarnessState },
}

impl HarnessError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a prerequisite error
    pub fn prerequisite(
        tool: impl Into<String>,
        required: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Prerequisite {
            tool: tool.into(),
            required: required.into(),
            found: found.into(),
        }
    }

    /// Create a parse error
    pub fn parse(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error must terminate the whole process.
    ///
    /// Per-configuration failures (bad configuration, failed run, missing
    /// metric) return `false` so that a sweep can skip to the next point.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Prerequisite { .. }
                | Self::Build { .. }
                | Self::Io { .. }
                | Self::InvalidTransition { .. }
        )
    }

    /// Last lines of the captured stderr, if this error carries any
    pub fn stderr_tail(&self, lines: usize) -> Option<String> {
        let stderr = match self {
            Self::Build { stderr, .. } | Self::Execution { stderr, .. } => stderr,
            _ => return None,
        };

        let all: Vec<&str> = stderr.lines().collect();
        let start = all.len().saturating_sub(lines);
        Some(all[start..].join("\n"))
    }
}

/// Result type alias for hpcbench operations
pub type Result<T> = std::result::Result<T, HarnessError>;

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::Configuration(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| HarnessError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_policy() {
        assert!(HarnessError::prerequisite("openmpi", "4", "3.1.5").is_fatal());
        assert!(HarnessError::Build {
            target: "xhpl".into(),
            stderr: String::new()
        }
        .is_fatal());

        assert!(!HarnessError::config("ranks mismatch").is_fatal());
        assert!(!HarnessError::parse("gflops", "no summary line").is_fatal());
        assert!(!HarnessError::Execution {
            command: "mpirun".into(),
            exit_code: Some(1),
            stderr: String::new()
        }
        .is_fatal());
    }

    #[test]
    fn test_prerequisite_message() {
        let err = HarnessError::prerequisite("singularity", "3.4.1", "3.2.0");
        assert_eq!(
            err.to_string(),
            "singularity >= 3.4.1 is required (found: 3.2.0)"
        );
    }

    #[test]
    fn test_stderr_tail() {
        let err = HarnessError::Execution {
            command: "mpirun".into(),
            exit_code: Some(1),
            stderr: "a\nb\nc\nd".into(),
        };
        assert_eq!(err.stderr_tail(2).as_deref(), Some("c\nd"));
        assert!(HarnessError::config("x").stderr_tail(2).is_none());
    }

    #[test]
    fn test_io_with_path() {
        let res: std::io::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = res.with_path("/tmp/HPL.dat").unwrap_err();
        assert!(err.to_string().contains("/tmp/HPL.dat"));
    }
}
