//! # hpcbench - Benchmark Orchestration for HPC Clusters
//!
//! hpcbench drives HPC benchmarks through one lifecycle shared by every
//! benchmark: check prerequisites, build, write input artifacts, run,
//! parse and record. On top of it sits an auto-tuner for High-Performance
//! Linpack that sizes the problem from memory, sweeps the algorithmic
//! variants and regenerates the input deck of the fastest one.
//!
//! ## Features
//!
//! - **Process Grids**: Closest-to-square `P x Q` factorization of the rank count
//! - **Affinity Planning**: Rank to socket maps from the per-socket device layout
//! - **Problem Sizing**: Largest matrix fitting a fraction of aggregate memory
//! - **Harness State Machine**: Pluggable build, execute, parse and configure steps
//! - **Result Store**: Repeated samples with a `-` sentinel for missing values
//! - **HPL Auto-Tuning**: Sweep, batch parse, rank and regenerate
//!
//! ## Quick Start
//!
//! ```no_run
//! use hpcbench::system::{process_grid, matrix_dimension, total_memory_bytes};
//!
//! let grid = process_grid(12).unwrap();
//! println!("{}", grid); // 3x4
//!
//! let bytes = total_memory_bytes(80.0 * 1024f64.powi(3), 4, 2);
//! let n = matrix_dimension(bytes, 0.9, 8, 10_000).unwrap();
//! println!("N = {}", n);
//! ```
//!
//! ## Running HPL
//!
//! ```no_run
//! use hpcbench::config::{HarnessSettings, RunConfiguration};
//! use hpcbench::harness::{Harness, Prebuilt, ProcessExecutor};
//! use hpcbench::hpl::{HplParser, HplWorkload};
//! use hpcbench::system::SocketTopology;
//!
//! let workload = HplWorkload::native(
//!     "bin/xhpl",
//!     vec!["node01".to_string()],
//!     SocketTopology::balanced(8, 2),
//! );
//! let mut harness = Harness::new(
//!     HarnessSettings::default(),
//!     Box::new(workload),
//!     Box::new(Prebuilt::new("bin/xhpl")),
//!     Box::new(ProcessExecutor),
//!     Box::new(HplParser),
//! );
//!
//! let run = RunConfiguration::builder()
//!     .tasks_per_node(8)
//!     .problem_size(60_000)
//!     .input_deck("output/HPL.dat")
//!     .output_log("output/HPL.log")
//!     .build()
//!     .unwrap();
//!
//! let report = harness.execute(&run).unwrap();
//! println!("{}", harness.store().aggregate(&report.key, "gflops"));
//! ```
//!
//! ## Auto-Tuning
//!
//! ```no_run
//! use hpcbench::tuner::{AutoTuner, MemoryBudget, SweepSpace};
//! # use hpcbench::config::{HarnessSettings, RunConfiguration};
//! # use hpcbench::harness::{Harness, Prebuilt, ProcessExecutor};
//! # use hpcbench::hpl::{HplParser, HplWorkload};
//! # use hpcbench::system::SocketTopology;
//! # let workload = HplWorkload::native("bin/xhpl", vec![], SocketTopology::balanced(8, 2));
//! # let mut harness = Harness::new(HarnessSettings::default(), Box::new(workload),
//! #     Box::new(Prebuilt::new("bin/xhpl")), Box::new(ProcessExecutor), Box::new(HplParser));
//!
//! let tuner = AutoTuner::new(SweepSpace::hpl_default(), "output/tuned");
//! let budget = MemoryBudget { per_device_bytes: 256e9, devices_per_node: 1, nodes: 1 };
//! let builder = RunConfiguration::builder()
//!     .tasks_per_node(8)
//!     .input_deck("output/sweep/HPL.dat")
//!     .output_log("output/sweep/HPL.log");
//!
//! let outcome = tuner.tune(&mut harness, builder, &budget).unwrap();
//! println!("best: {}", outcome.ranking[0].token);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod harness;
pub mod hpl;
pub mod results;
pub mod system;
pub mod tuner;

// Re-export commonly used types
pub use config::{HarnessSettings, RunConfiguration};
pub use error::{HarnessError, Result};
pub use harness::{Harness, HarnessState};
pub use results::ResultStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use hpcbench::prelude::*;
    //! ```

    pub use crate::config::{AlgorithmKnobs, HarnessSettings, RunConfiguration, RunConfigurationBuilder};
    pub use crate::error::{HarnessError, Result};
    pub use crate::harness::{
        Builder, CommandSpec, Configurator, ExecutionEnvironment, Executor, Harness, HarnessState,
        Parser,
    };
    pub use crate::hpl::{HplDeck, HplParser, HplWorkload};
    pub use crate::results::{render, ResultKey, ResultStore, Sample};
    pub use crate::system::{affinity_map, matrix_dimension, process_grid, ProcessGrid, SocketTopology};
    pub use crate::tuner::{AutoTuner, MemoryBudget, SweepSpace};
}
