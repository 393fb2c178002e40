//! Configuration settings for hpcbench
//!
//! Defines the command line, the harness settings derived from it, and the
//! on-disk layout of a benchmark session.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, IoResultExt, Result};

/// Timestamp format of per-session output directories
pub const SESSION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H:%M:%S";

/// hpcbench - benchmark orchestration and auto-tuning for HPC clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "hpcbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Benchmark orchestration and auto-tuning for HPC clusters")]
#[command(long_about = r#"
hpcbench drives HPC benchmarks through a fixed lifecycle: check
prerequisites, build, generate inputs, run, parse and record.

Features:
  - Closest-to-square MPI process grids
  - GPU/CPU socket affinity planning
  - Memory-based problem sizing
  - Repeated measurements with a missing-value sentinel
  - HPL auto-tuning over algorithmic variants

Examples:
  hpcbench grid 12                                  # 3x4 process grid
  hpcbench size 320G                                # HPL problem size
  hpcbench hpl --gpu 4 --tasks 4 --sif hpl.sif      # Containerised GPU run
  hpcbench hpl --tasks 8 --autotune --memory 64G    # Tuned CPU run
"#)]
pub struct CliArgs {
    /// Root directory holding bin/, build/ and output/
    #[arg(long, default_value = ".", value_name = "PATH", global = true)]
    pub prefix: PathBuf,

    /// Output directory (default: <prefix>/output/<timestamp>)
    #[arg(long, value_name = "PATH", global = true)]
    pub outdir: Option<PathBuf>,

    /// Number of measurements per run configuration
    #[arg(long, default_value = "1", value_name = "NUM", global = true)]
    pub repeat: usize,

    /// Pause between repeated measurements (e.g., 5s, 500ms)
    #[arg(long, default_value = "5s", value_name = "DURATION", global = true)]
    pub cooldown: String,

    /// Extra exit codes treated as success (0 is always accepted)
    #[arg(long = "accept-exit-code", value_name = "CODE", global = true)]
    pub accept_exit_codes: Vec<i32>,

    /// Append benchmark output to existing logs instead of overwriting them
    #[arg(long, global = true)]
    pub append: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Output format for reports
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub output_format: OutputFormat,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run (and optionally auto-tune) the High-Performance Linpack benchmark
    #[command(name = "hpl")]
    Hpl(HplArgs),

    /// Print the process grid for a rank count
    #[command(name = "grid")]
    Grid {
        /// Total MPI ranks
        ranks: usize,
    },

    /// Derive a problem size from available memory
    #[command(name = "size")]
    Size {
        /// Memory per device (e.g., 40G); defaults to host memory
        memory: Option<String>,
        /// Devices per node
        #[arg(long, default_value = "1")]
        devices: usize,
        /// Number of nodes
        #[arg(long, default_value = "1")]
        nodes: usize,
        /// Fraction of memory to use
        #[arg(long, default_value = "0.9")]
        utilization: f64,
        /// Bytes per matrix element
        #[arg(long, default_value = "8")]
        element_bytes: u64,
        /// Round the dimension down to a multiple of this value
        #[arg(long, default_value = "10000")]
        rounding: u64,
    },

    /// Print the socket affinity list for a device count
    #[command(name = "affinity")]
    Affinity {
        /// Devices to place
        devices: usize,
        /// Devices per socket, comma separated (default: detected)
        #[arg(long, value_delimiter = ',')]
        sockets: Vec<usize>,
        /// Detect the layout from `nvidia-smi topo -m` instead of CPU sockets
        #[arg(long)]
        gpu: bool,
    },

    /// Show the detected node topology and job allocation
    #[command(name = "topology")]
    Topology,
}

/// Options of the `hpl` subcommand
#[derive(Args, Debug, Clone)]
pub struct HplArgs {
    /// Problem size (default: sized from memory)
    #[arg(short = 's', long, value_name = "N")]
    pub size: Option<u64>,

    /// Block size
    #[arg(short = 'b', long, default_value = "256", value_name = "NB")]
    pub blocksize: u64,

    /// Process rows (requires --qgrid)
    #[arg(short = 'p', long, value_name = "P", requires = "qgrid")]
    pub pgrid: Option<usize>,

    /// Process columns (requires --pgrid)
    #[arg(long, value_name = "Q", requires = "pgrid")]
    pub qgrid: Option<usize>,

    /// Number of nodes (default: all allocated hosts)
    #[arg(long, value_name = "NUM")]
    pub nodes: Option<usize>,

    /// MPI ranks per node (default: GPUs per node, or NUMA nodes on CPU)
    #[arg(long, value_name = "NUM")]
    pub tasks: Option<usize>,

    /// OpenMP threads per rank
    #[arg(long, default_value = "1", value_name = "NUM")]
    pub omp: usize,

    /// GPUs per node (0 = CPU-only)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub gpu: usize,

    /// GPUs per socket, comma separated (default: from nvidia-smi)
    #[arg(long, value_delimiter = ',', value_name = "LIST")]
    pub device_per_socket: Vec<usize>,

    /// Memory per device for sizing (e.g., 40G); defaults to host memory
    #[arg(long, value_name = "SIZE")]
    pub memory: Option<String>,

    /// Fraction of memory used by the sizing pass
    #[arg(long, default_value = "0.9")]
    pub utilization: f64,

    /// Container image of the NVIDIA HPL benchmark
    #[arg(long, value_name = "PATH")]
    pub sif: Option<PathBuf>,

    /// Native xhpl binary (default: <prefix>/bin/xhpl)
    #[arg(long, value_name = "PATH")]
    pub binary: Option<PathBuf>,

    /// Shell script that builds the native binary when it is missing
    #[arg(long, value_name = "PATH")]
    pub build_script: Option<PathBuf>,

    /// Participating hosts (default: from the batch scheduler)
    #[arg(long = "host", value_name = "HOST")]
    pub hosts: Vec<String>,

    /// Use the mixed-precision HPL-AI benchmark
    #[arg(long)]
    pub ai: bool,

    /// Process mapping (0 = row-major, 1 = column-major)
    #[arg(long, default_value = "0")]
    pub pmap: i64,

    /// Panel factorization (0 = left, 1 = Crout, 2 = right)
    #[arg(long, default_value = "2")]
    pub pfact: i64,

    /// Recursive stopping criterium
    #[arg(long, default_value = "1")]
    pub nbmin: i64,

    /// Panels in recursion
    #[arg(long, default_value = "2")]
    pub ndiv: i64,

    /// Recursive panel factorization (0 = left, 1 = Crout, 2 = right)
    #[arg(long, default_value = "2")]
    pub rfact: i64,

    /// Broadcast variant (0..5)
    #[arg(long, default_value = "0")]
    pub bcast: i64,

    /// Look-ahead depth
    #[arg(long, default_value = "1")]
    pub depth: i64,

    /// Sweep over algorithmic variants and regenerate the deck of the winner
    #[arg(long)]
    pub autotune: bool,

    /// JSON file describing the sweep space (default: built-in HPL space)
    #[arg(long, value_name = "PATH")]
    pub sweep: Option<PathBuf>,

    /// Skip the prerequisite checks
    #[arg(long)]
    pub skip_prerequisites: bool,
}

impl HplArgs {
    /// Algorithmic knobs given on the command line
    pub fn knobs(&self) -> crate::config::AlgorithmKnobs {
        [
            ("pmap", self.pmap),
            ("pfact", self.pfact),
            ("nbmin", self.nbmin),
            ("ndiv", self.ndiv),
            ("rfact", self.rfact),
            ("bcast", self.bcast),
            ("depth", self.depth),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Settings governing how the harness runs each configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Measurements per run configuration
    pub repeat: usize,
    /// Pause between repeated measurements
    pub cooldown: Duration,
    /// Exit codes treated as success
    pub accepted_exit_codes: Vec<i32>,
    /// Append to the output log instead of truncating it
    pub append_output: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            repeat: 1,
            cooldown: Duration::from_secs(5),
            accepted_exit_codes: vec![0],
            append_output: false,
        }
    }
}

impl HarnessSettings {
    /// Create settings from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        if args.repeat == 0 {
            return Err(HarnessError::config("--repeat must be at least 1"));
        }

        let cooldown = humantime::parse_duration(&args.cooldown).map_err(|e| {
            HarnessError::config(format!("Invalid cooldown '{}': {}", args.cooldown, e))
        })?;

        let mut accepted_exit_codes = vec![0];
        for code in &args.accept_exit_codes {
            if !accepted_exit_codes.contains(code) {
                accepted_exit_codes.push(*code);
            }
        }

        Ok(Self {
            repeat: args.repeat,
            cooldown,
            accepted_exit_codes,
            append_output: args.append,
        })
    }

    /// Whether `code` counts as a successful exit
    pub fn accepts(&self, code: i32) -> bool {
        self.accepted_exit_codes.contains(&code)
    }
}

/// Directory layout of a benchmark session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLayout {
    /// Installed binaries and container images
    pub bin: PathBuf,
    /// Build trees
    pub build: PathBuf,
    /// Generated inputs and captured outputs of this session
    pub output: PathBuf,
}

impl SessionLayout {
    /// Layout under `prefix`; the output directory is timestamped unless given
    pub fn new(prefix: &Path, outdir: Option<&Path>) -> Self {
        let output = match outdir {
            Some(dir) => dir.to_path_buf(),
            None => prefix.join("output").join(
                chrono::Local::now()
                    .format(SESSION_TIMESTAMP_FORMAT)
                    .to_string(),
            ),
        };

        Self {
            bin: prefix.join("bin"),
            build: prefix.join("build"),
            output,
        }
    }

    /// Create all directories of the layout
    pub fn create(&self) -> Result<()> {
        for dir in [&self.bin, &self.build, &self.output] {
            std::fs::create_dir_all(dir).with_path(dir)?;
        }
        Ok(())
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        let num = size.trim_end_matches(|c| c == 'T' || c == 'B');
        (num, 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    Ok((num * multiplier as f64) as u64)
}
