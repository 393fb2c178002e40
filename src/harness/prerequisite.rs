//! Version probes for the external tools a benchmark depends on

use crate::error::{HarnessError, Result};
use crate::harness::strategy::{CommandSpec, ExecutionEnvironment, Executor};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Dotted-integer version, compared numerically with zero padding
/// (`4.10 > 4.9`, `4.0 == 4`)
#[derive(Debug, Clone, Eq)]
pub struct DottedVersion(Vec<u64>);

impl DottedVersion {
    /// Numeric components
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    fn component(&self, i: usize) -> u64 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for DottedVersion {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let components = s
            .trim()
            .trim_end_matches('.')
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| HarnessError::config(format!("invalid version '{}'", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(components))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// How to read the installed version of a tool
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    /// Tool name used in requirements
    pub tool: &'static str,
    /// Command printing the version
    pub command: &'static str,
    /// Pattern whose first group is the version
    pub pattern: &'static str,
}

/// Known tools and their version probes
pub const PROBES: &[Probe] = &[
    Probe { tool: "gcc", command: "gcc --version", pattern: r"\(GCC\)\s*([\d.]+)" },
    Probe { tool: "cuda", command: "nvcc --version", pattern: r"release\s*([\d.]+)" },
    Probe { tool: "singularity", command: "singularity --version", pattern: r"version\s*([\d.]+)" },
    Probe { tool: "nvidia", command: "nvidia-smi", pattern: r"Version:\s*([\d.]+)" },
    Probe { tool: "openmpi", command: "mpirun --version", pattern: r"mpirun.+?([\d.]+)" },
    Probe { tool: "connectx", command: "lspci", pattern: r"ConnectX-(\d+)" },
    Probe { tool: "cmake", command: "cmake --version", pattern: r"cmake version\s*([\d.]+)" },
    Probe { tool: "hpc_sdk", command: "nvfortran --version", pattern: r"nvfortran\s*([\d.]+)" },
    Probe { tool: "pgi", command: "pgfortran --version", pattern: r"pgfortran\s*([\d.]+)" },
];

/// Look up the probe of a tool
pub fn probe(tool: &str) -> Option<&'static Probe> {
    PROBES.iter().find(|p| p.tool == tool)
}

/// A tool that must be present at or above a minimum version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Tool name, as listed in [`PROBES`]
    pub tool: String,
    /// Minimum accepted version
    pub minimum: String,
}

impl Requirement {
    /// Require `tool >= minimum`
    pub fn new(tool: impl Into<String>, minimum: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            minimum: minimum.into(),
        }
    }

    /// Probe the installed version and compare it against the minimum
    pub fn check(&self, executor: &dyn Executor) -> Result<DottedVersion> {
        let probe = probe(&self.tool).ok_or_else(|| {
            HarnessError::config(format!("no version probe known for '{}'", self.tool))
        })?;
        let minimum: DottedVersion = self.minimum.parse()?;
        let pattern = Regex::new(probe.pattern)
            .map_err(|e| HarnessError::config(format!("bad probe pattern: {}", e)))?;
        let command = CommandSpec::from_line(probe.command)
            .ok_or_else(|| HarnessError::config("empty probe command"))?;

        debug!("Probing {} with '{}'", self.tool, command);
        let output = executor
            .execute(&command, &ExecutionEnvironment::new())
            .map_err(|_| HarnessError::prerequisite(&self.tool, &self.minimum, "not installed"))?;

        let found = pattern
            .captures(&output.combined())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                HarnessError::prerequisite(&self.tool, &self.minimum, "unknown version")
            })?;
        let installed: DottedVersion = found
            .parse()
            .map_err(|_| HarnessError::prerequisite(&self.tool, &self.minimum, found.as_str()))?;

        if installed < minimum {
            return Err(HarnessError::prerequisite(
                &self.tool,
                &self.minimum,
                installed.to_string(),
            ));
        }

        info!("{} {} (>= {})", self.tool, installed, minimum);
        Ok(installed)
    }
}
