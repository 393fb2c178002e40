//! Lifecycle states of the benchmark harness

use serde::Serialize;
use std::fmt;

/// Harness lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HarnessState {
    /// Nothing has happened yet
    Created,
    /// Every required tool meets its minimum version
    PrerequisitesChecked,
    /// The benchmark binary exists
    Built,
    /// Input artifacts for the current run are written
    Configured,
    /// The benchmark command is executing
    Running,
    /// Metrics were extracted from the captured output
    Parsed,
    /// Samples were appended to the result store
    Recorded,
    /// A step failed
    Failed,
}

impl HarnessState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Recorded` loops back to `Running` for the next repeat and to
    /// `Configured` for the next run configuration. `Failed` may only move
    /// on to `Configured`; the harness additionally refuses that edge when
    /// the failure happened before the binary was built.
    pub fn can_transition(self, next: HarnessState) -> bool {
        use HarnessState::*;

        match (self, next) {
            (Failed, Failed) => false,
            (_, Failed) => true,
            (Created, PrerequisitesChecked)
            | (PrerequisitesChecked, Built)
            | (Built, Configured)
            | (Configured, Running)
            | (Running, Parsed)
            | (Parsed, Recorded)
            | (Recorded, Running)
            | (Recorded, Configured)
            | (Failed, Configured) => true,
            _ => false,
        }
    }

    /// Upper-case name used in logs
    pub fn name(self) -> &'static str {
        match self {
            HarnessState::Created => "CREATED",
            HarnessState::PrerequisitesChecked => "PREREQUISITES_CHECKED",
            HarnessState::Built => "BUILT",
            HarnessState::Configured => "CONFIGURED",
            HarnessState::Running => "RUNNING",
            HarnessState::Parsed => "PARSED",
            HarnessState::Recorded => "RECORDED",
            HarnessState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
