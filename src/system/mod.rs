//! Node introspection and resource planning
//!
//! Computes process grids, device affinity and memory-driven problem sizes,
//! and discovers the socket layout and allocated hosts they are derived from.

pub mod capacity;
pub mod hpc;
pub mod numa;
pub mod topology;

pub use capacity::{host_memory_bytes, matrix_dimension, total_memory_bytes};
pub use hpc::{allocated_hosts, expand_node_list, Hostfile, SchedulerType};
pub use numa::{parse_gpu_numa, NumaTopology};
pub use topology::{affinity_map, format_affinity, process_grid, ProcessGrid, SocketTopology};
