//! HPL auto-tuning
//!
//! Tuning runs in two passes. The sizing pass derives the problem size from
//! aggregate memory unless the caller pinned one. The sweep pass runs every
//! point of a [`SweepSpace`] once into a shared log, ranks the passing
//! results of that log and regenerates the input artifacts of the winner
//! as a new [`RunConfiguration`].

use crate::config::{RunConfiguration, RunConfigurationBuilder};
use crate::error::{HarnessError, IoResultExt, Result};
use crate::harness::Harness;
use crate::hpl::summary::{parse_summaries, rank, SummaryRecord, Variant};
use crate::results::{ResultKey, ResultStore, Sample};
use crate::system::capacity::{
    matrix_dimension, total_memory_bytes, DEFAULT_ROUNDING, DEFAULT_UTILIZATION, DOUBLE_BYTES,
};
use crate::system::topology::ProcessGrid;
use crate::tuner::sweep::SweepSpace;
use humansize::{format_size, BINARY};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Memory the sizing pass may fill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudget {
    /// Bytes of one device (GPU memory, or host memory in CPU mode)
    pub per_device_bytes: f64,
    /// Devices per node
    pub devices_per_node: usize,
    /// Participating nodes
    pub nodes: usize,
}

impl MemoryBudget {
    /// Aggregate bytes across every device of every node
    pub fn total_bytes(&self) -> f64 {
        total_memory_bytes(self.per_device_bytes, self.devices_per_node, self.nodes)
    }
}

/// Result of a sweep
#[derive(Debug, Clone)]
pub struct TuningOutcome {
    /// Fresh configuration built from the best passing result
    pub winner: RunConfiguration,
    /// Decoded variant of the best result
    pub variant: Variant,
    /// Passing results, fastest first
    pub ranking: Vec<SummaryRecord>,
    /// Sweep points that produced no result
    pub skipped: usize,
    /// Artifacts regenerated for the winner
    pub artifacts: Vec<PathBuf>,
}

impl TuningOutcome {
    /// The ranking as a result store, one key per decoded variant
    pub fn ranking_store(&self) -> Result<ResultStore> {
        let mut store = ResultStore::new();
        for record in &self.ranking {
            let mut knobs = self.winner.knobs().clone();
            knobs.extend(record.variant()?.knobs());

            let key = ResultKey {
                problem_size: record.n,
                block_size: record.nb,
                knobs: knobs.into_iter().collect(),
                ..ResultKey::from(&self.winner)
            };
            store.record(&key, "time_s", Sample::Value(record.time_s));
            store.record(&key, "gflops", Sample::Value(record.gflops));
        }
        Ok(store)
    }
}

/// Sizes a run and searches its algorithm knobs
#[derive(Debug, Clone)]
pub struct AutoTuner {
    space: SweepSpace,
    utilization: f64,
    tuned_dir: PathBuf,
}

impl AutoTuner {
    /// Tuner over `space`; the winner's artifacts go to `tuned_dir`
    pub fn new(space: SweepSpace, tuned_dir: impl Into<PathBuf>) -> Self {
        Self {
            space,
            utilization: DEFAULT_UTILIZATION,
            tuned_dir: tuned_dir.into(),
        }
    }

    /// Fraction of memory the sizing pass targets
    pub fn with_utilization(mut self, utilization: f64) -> Self {
        self.utilization = utilization;
        self
    }

    /// Search space
    pub fn space(&self) -> &SweepSpace {
        &self.space
    }

    /// Fill in the problem size from `budget` unless one is already set
    pub fn size(
        &self,
        builder: RunConfigurationBuilder,
        budget: &MemoryBudget,
    ) -> Result<RunConfigurationBuilder> {
        if builder.has_problem_size() {
            return Ok(builder);
        }

        let total = budget.total_bytes();
        let n = matrix_dimension(total, self.utilization, DOUBLE_BYTES, DEFAULT_ROUNDING)?;
        info!(
            "Sized N={} from {} across {} node(s) x {} device(s)",
            n,
            format_size(total as u64, BINARY),
            budget.nodes,
            budget.devices_per_node
        );
        Ok(builder.problem_size(n))
    }

    /// Run every sweep point once and regenerate the fastest passing one
    pub fn sweep(&self, harness: &mut Harness, base: &RunConfiguration) -> Result<TuningOutcome> {
        self.space.validate()?;
        harness.prepare()?;

        let log = base.paths().output_log.clone();
        reset_log(&log)?;

        let points = self.space.points();
        let total = points.len();
        let mut skipped = 0;

        for (i, point) in points.iter().enumerate() {
            let run = match base.to_builder().knobs(point).build() {
                Ok(run) => run,
                Err(err) => {
                    warn!("Skipping sweep point {}/{} {:?}: {}", i + 1, total, point, err);
                    skipped += 1;
                    continue;
                }
            };

            info!("Sweep point {}/{} {:?}", i + 1, total, point);
            match harness.execute_once(&run) {
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!("Skipping sweep point {}/{} {:?}: {}", i + 1, total, point, err);
                    skipped += 1;
                }
            }
        }

        let output = std::fs::read_to_string(&log).with_path(&log)?;
        let ranking = rank(parse_summaries(&output));
        let best = ranking
            .first()
            .ok_or_else(|| HarnessError::config(format!("no sweep point in {} passed", log.display())))?;
        let variant = best.variant()?;
        info!("Best variant {} at {:.2} Gflop/s", best.token, best.gflops);

        let winner = base
            .to_builder()
            .problem_size(best.n)
            .block_size(best.nb)
            .grid(ProcessGrid {
                p: best.p,
                q: best.q,
            })
            .knobs(&variant.knobs())
            .input_deck(self.tuned_dir.join(file_name(&base.paths().input_deck)))
            .output_log(self.tuned_dir.join(file_name(&log)))
            .build()?;
        let artifacts = harness.configure(&winner)?;

        Ok(TuningOutcome {
            winner,
            variant,
            ranking,
            skipped,
            artifacts,
        })
    }

    /// Sizing pass followed by the sweep
    pub fn tune(
        &self,
        harness: &mut Harness,
        builder: RunConfigurationBuilder,
        budget: &MemoryBudget,
    ) -> Result<TuningOutcome> {
        let base = self.size(builder, budget)?.build()?;
        self.sweep(harness, &base)
    }
}

fn reset_log(log: &Path) -> Result<()> {
    if let Some(dir) = log.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_path(dir)?;
    }
    std::fs::File::create(log).with_path(log)?;
    Ok(())
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map_or_else(|| PathBuf::from("HPL.dat"), PathBuf::from)
}
