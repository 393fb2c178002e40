//! Immutable description of one benchmark invocation
//!
//! A [`RunConfiguration`] is only produced by [`RunConfigurationBuilder::build`],
//! which validates every field and derives the process grid. Changing any
//! parameter means building a new configuration; nothing is edited in place.

use crate::error::{HarnessError, Result};
use crate::system::topology::{process_grid, ProcessGrid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Algorithmic knobs forwarded verbatim to the input deck and the result key
pub type AlgorithmKnobs = BTreeMap<String, i64>;

/// Files a run reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPaths {
    /// Generated input deck
    pub input_deck: PathBuf,
    /// Captured stdout/stderr of the benchmark
    pub output_log: PathBuf,
    /// Container image wrapping the benchmark, if any
    pub container_image: Option<PathBuf>,
}

impl RunPaths {
    /// Directory holding the input deck and the other generated artifacts
    pub fn work_dir(&self) -> &Path {
        match self.input_deck.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

/// One benchmark invocation's resource and algorithmic parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    nodes: usize,
    tasks_per_node: usize,
    omp_threads: usize,
    gpu_count: usize,
    problem_size: u64,
    block_size: u64,
    grid: ProcessGrid,
    knobs: AlgorithmKnobs,
    paths: RunPaths,
}

impl RunConfiguration {
    /// Start a new builder
    pub fn builder() -> RunConfigurationBuilder {
        RunConfigurationBuilder::default()
    }

    /// Builder pre-filled with this configuration, for deriving a new one
    pub fn to_builder(&self) -> RunConfigurationBuilder {
        RunConfigurationBuilder {
            nodes: self.nodes,
            tasks_per_node: self.tasks_per_node,
            omp_threads: self.omp_threads,
            gpu_count: self.gpu_count,
            problem_size: Some(self.problem_size),
            block_size: self.block_size,
            grid: Some(self.grid),
            knobs: self.knobs.clone(),
            input_deck: Some(self.paths.input_deck.clone()),
            output_log: Some(self.paths.output_log.clone()),
            container_image: self.paths.container_image.clone(),
        }
    }

    /// Number of participating nodes
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// MPI ranks per node
    pub fn tasks_per_node(&self) -> usize {
        self.tasks_per_node
    }

    /// OpenMP threads per rank
    pub fn omp_threads(&self) -> usize {
        self.omp_threads
    }

    /// GPUs per node (0 in CPU-only mode)
    pub fn gpu_count(&self) -> usize {
        self.gpu_count
    }

    /// Problem size (matrix dimension for HPL)
    pub fn problem_size(&self) -> u64 {
        self.problem_size
    }

    /// Block size
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Process grid covering all ranks
    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    /// Total MPI ranks
    pub fn ranks(&self) -> usize {
        self.nodes * self.tasks_per_node
    }

    /// Algorithmic knobs
    pub fn knobs(&self) -> &AlgorithmKnobs {
        &self.knobs
    }

    /// Value of a knob, or `default` when unset
    pub fn knob(&self, name: &str, default: i64) -> i64 {
        self.knobs.get(name).copied().unwrap_or(default)
    }

    /// Input/output paths
    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    /// True when the run targets accelerators
    pub fn uses_gpus(&self) -> bool {
        self.gpu_count > 0
    }
}

/// Validating builder for [`RunConfiguration`]
#[derive(Debug, Clone)]
pub struct RunConfigurationBuilder {
    nodes: usize,
    tasks_per_node: usize,
    omp_threads: usize,
    gpu_count: usize,
    problem_size: Option<u64>,
    block_size: u64,
    grid: Option<ProcessGrid>,
    knobs: AlgorithmKnobs,
    input_deck: Option<PathBuf>,
    output_log: Option<PathBuf>,
    container_image: Option<PathBuf>,
}

impl Default for RunConfigurationBuilder {
    fn default() -> Self {
        Self {
            nodes: 1,
            tasks_per_node: 1,
            omp_threads: 1,
            gpu_count: 0,
            problem_size: None,
            block_size: 256,
            grid: None,
            knobs: AlgorithmKnobs::new(),
            input_deck: None,
            output_log: None,
            container_image: None,
        }
    }
}

impl RunConfigurationBuilder {
    /// Set the node count
    pub fn nodes(mut self, nodes: usize) -> Self {
        self.nodes = nodes;
        self
    }

    /// Set MPI ranks per node
    pub fn tasks_per_node(mut self, tasks: usize) -> Self {
        self.tasks_per_node = tasks;
        self
    }

    /// Set OpenMP threads per rank
    pub fn omp_threads(mut self, threads: usize) -> Self {
        self.omp_threads = threads;
        self
    }

    /// Set GPUs per node
    pub fn gpu_count(mut self, gpus: usize) -> Self {
        self.gpu_count = gpus;
        self
    }

    /// Pin the problem size
    pub fn problem_size(mut self, size: u64) -> Self {
        self.problem_size = Some(size);
        self
    }

    /// Set the block size
    pub fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Use an explicit process grid instead of the derived one
    pub fn grid(mut self, grid: ProcessGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Drop any explicit or inherited grid so it is derived again
    pub fn derive_grid(mut self) -> Self {
        self.grid = None;
        self
    }

    /// Set one knob
    pub fn knob(mut self, name: impl Into<String>, value: i64) -> Self {
        self.knobs.insert(name.into(), value);
        self
    }

    /// Overlay several knobs on the current set
    pub fn knobs(mut self, knobs: &AlgorithmKnobs) -> Self {
        self.knobs
            .extend(knobs.iter().map(|(name, value)| (name.clone(), *value)));
        self
    }

    /// Set the input-deck path
    pub fn input_deck(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_deck = Some(path.into());
        self
    }

    /// Set the output-log path
    pub fn output_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_log = Some(path.into());
        self
    }

    /// Wrap the run in a container image
    pub fn container_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.container_image = Some(path.into());
        self
    }

    /// Whether a problem size has been pinned
    pub fn has_problem_size(&self) -> bool {
        self.problem_size.is_some()
    }

    /// Ranks the configuration will launch
    pub fn ranks(&self) -> usize {
        self.nodes * self.tasks_per_node
    }

    /// Nodes the configuration will use
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// GPUs per node the configuration will use
    pub fn gpus_per_node(&self) -> usize {
        self.gpu_count
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<RunConfiguration> {
        for (name, value) in [
            ("nodes", self.nodes),
            ("tasks_per_node", self.tasks_per_node),
            ("omp_threads", self.omp_threads),
        ] {
            if value == 0 {
                return Err(HarnessError::config(format!("{} must be positive", name)));
            }
        }

        let problem_size = match self.problem_size {
            Some(0) | None => {
                return Err(HarnessError::config("problem size must be set and positive"))
            }
            Some(n) => n,
        };
        if self.block_size == 0 {
            return Err(HarnessError::config("block size must be positive"));
        }

        let ranks = self.ranks();
        let grid = match self.grid {
            Some(grid) if grid.ranks() != ranks => {
                return Err(HarnessError::config(format!(
                    "process grid {} does not cover {} ranks ({} nodes x {} tasks)",
                    grid, ranks, self.nodes, self.tasks_per_node
                )))
            }
            Some(grid) => grid,
            None => process_grid(ranks)?,
        };

        let input_deck = self
            .input_deck
            .ok_or_else(|| HarnessError::config("input deck path is required"))?;
        let output_log = self
            .output_log
            .ok_or_else(|| HarnessError::config("output log path is required"))?;

        Ok(RunConfiguration {
            nodes: self.nodes,
            tasks_per_node: self.tasks_per_node,
            omp_threads: self.omp_threads,
            gpu_count: self.gpu_count,
            problem_size,
            block_size: self.block_size,
            grid,
            knobs: self.knobs,
            paths: RunPaths {
                input_deck,
                output_log,
                container_image: self.container_image,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RunConfigurationBuilder {
        RunConfiguration::builder()
            .problem_size(40_000)
            .input_deck("/tmp/run/HPL.dat")
            .output_log("/tmp/run/HPL.log")
    }

    #[test]
    fn test_grid_is_derived() {
        let run = base().nodes(2).tasks_per_node(6).build().unwrap();
        assert_eq!(run.ranks(), 12);
        assert_eq!(run.grid(), ProcessGrid { p: 3, q: 4 });
    }

    #[test]
    fn test_explicit_grid_must_cover_ranks() {
        let err = base()
            .tasks_per_node(4)
            .grid(ProcessGrid { p: 2, q: 3 })
            .build()
            .unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));

        let run = base()
            .tasks_per_node(4)
            .grid(ProcessGrid { p: 1, q: 4 })
            .build()
            .unwrap();
        assert_eq!(run.grid(), ProcessGrid { p: 1, q: 4 });
    }

    #[test]
    fn test_missing_fields() {
        assert!(RunConfiguration::builder().build().is_err());
        assert!(base().nodes(0).build().is_err());
        assert!(base().block_size(0).build().is_err());
        assert!(RunConfiguration::builder()
            .problem_size(1000)
            .input_deck("HPL.dat")
            .build()
            .is_err());
    }

    #[test]
    fn test_derivation_leaves_original_untouched() {
        let original = base()
            .knob("bcast", 0)
            .container_image("/opt/hpl.sif")
            .build()
            .unwrap();
        let derived = original
            .to_builder()
            .knob("bcast", 3)
            .problem_size(20_000)
            .build()
            .unwrap();

        assert_eq!(original.knob("bcast", -1), 0);
        assert_eq!(original.problem_size(), 40_000);
        assert_eq!(derived.knob("bcast", -1), 3);
        assert_eq!(derived.problem_size(), 20_000);
        assert_eq!(derived.paths().container_image, original.paths().container_image);
    }

    #[test]
    fn test_gpu_change_rederives_grid() {
        let run = base().tasks_per_node(2).gpu_count(2).build().unwrap();
        let bigger = run
            .to_builder()
            .tasks_per_node(8)
            .gpu_count(8)
            .derive_grid()
            .build()
            .unwrap();
        assert_eq!(bigger.grid(), ProcessGrid { p: 2, q: 4 });
        assert_eq!(run.grid(), ProcessGrid { p: 1, q: 2 });
    }

    #[test]
    fn test_work_dir() {
        let run = base().build().unwrap();
        assert_eq!(run.paths().work_dir(), Path::new("/tmp/run"));
    }
}
