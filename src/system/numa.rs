//! NUMA topology discovery for multi-socket nodes
//!
//! Feeds the affinity planner with a [`SocketTopology`]: CPU task slots per
//! NUMA node read from sysfs, or GPUs per NUMA node parsed from the
//! `nvidia-smi topo -m` matrix.

use crate::system::topology::SocketTopology;
use regex::Regex;
use std::sync::OnceLock;

/// NUMA node information
#[derive(Debug, Clone)]
pub struct NumaNode {
    /// Node ID
    pub id: usize,
    /// CPUs belonging to this node
    pub cpus: Vec<usize>,
    /// Total memory in bytes
    pub memory_total: u64,
}

/// NUMA topology information
#[derive(Debug, Clone)]
pub struct NumaTopology {
    /// NUMA nodes, sorted by id
    pub nodes: Vec<NumaNode>,
    /// Total CPUs across all nodes
    pub total_cpus: usize,
}

impl Default for NumaTopology {
    fn default() -> Self {
        Self::detect()
    }
}

impl NumaTopology {
    /// Detect NUMA topology from the system
    #[cfg(target_os = "linux")]
    pub fn detect() -> Self {
        let mut nodes = Vec::new();

        if let Ok(entries) = std::fs::read_dir("/sys/devices/system/node") {
            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                let name_str = name.to_string_lossy();

                if let Some(id) = name_str
                    .strip_prefix("node")
                    .and_then(|n| n.parse::<usize>().ok())
                {
                    let node_path = entry.path();
                    nodes.push(NumaNode {
                        id,
                        cpus: Self::read_node_cpus(&node_path),
                        memory_total: Self::read_node_memory(&node_path),
                    });
                }
            }
        }

        nodes.sort_by_key(|n| n.id);

        if nodes.is_empty() {
            return Self::single_node();
        }

        let total_cpus = nodes.iter().map(|n| n.cpus.len()).sum();
        Self { nodes, total_cpus }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Self {
        Self::single_node()
    }

    fn single_node() -> Self {
        let num_cpus = num_cpus::get();
        Self {
            nodes: vec![NumaNode {
                id: 0,
                cpus: (0..num_cpus).collect(),
                memory_total: 0,
            }],
            total_cpus: num_cpus,
        }
    }

    #[cfg(target_os = "linux")]
    fn read_node_cpus(node_path: &std::path::Path) -> Vec<usize> {
        std::fs::read_to_string(node_path.join("cpulist"))
            .map(|content| parse_cpu_list(content.trim()))
            .unwrap_or_default()
    }

    #[cfg(target_os = "linux")]
    fn read_node_memory(node_path: &std::path::Path) -> u64 {
        // Format: "Node X MemTotal: 12345 kB"
        std::fs::read_to_string(node_path.join("meminfo"))
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|line| line.contains("MemTotal:"))
                    .and_then(|line| line.split_whitespace().nth(3))
                    .and_then(|kb| kb.parse::<u64>().ok())
            })
            .map(|kb| kb * 1024)
            .unwrap_or(0)
    }

    /// CPU task slots per NUMA node, indexed by node id
    pub fn socket_topology(&self) -> SocketTopology {
        let sockets = self.nodes.iter().map(|n| n.id + 1).max().unwrap_or(0);
        let mut slots = vec![0; sockets];
        for node in &self.nodes {
            slots[node.id] = node.cpus.len();
        }
        SocketTopology::new(slots)
    }

    /// Print NUMA topology summary
    pub fn print_summary(&self) {
        println!("NUMA Topology:");
        println!("  Nodes: {}", self.nodes.len());
        println!("  Total CPUs: {}", self.total_cpus);

        for node in &self.nodes {
            println!("  Node {}:", node.id);
            println!("    CPUs: {}", node.cpus.len());
            if node.memory_total > 0 {
                println!(
                    "    Memory: {}",
                    humansize::format_size(node.memory_total, humansize::BINARY)
                );
            }
        }
    }
}

/// Parse CPU list format (e.g., "0-3,8-11" -> [0,1,2,3,8,9,10,11])
pub fn parse_cpu_list(s: &str) -> Vec<usize> {
    let mut cpus = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(start..=end);
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            cpus.push(cpu);
        }
    }

    cpus
}

fn gpu_row() -> &'static Regex {
    static GPU_ROW: OnceLock<Regex> = OnceLock::new();
    GPU_ROW.get_or_init(|| Regex::new(r"^GPU\d+\s").expect("valid GPU row pattern"))
}

/// NUMA node of every GPU, in device order, from `nvidia-smi topo -m`.
///
/// Each `GPUn` row ends with the CPU affinity range, the NUMA affinity and,
/// on recent drivers, a `GPU NUMA ID` column that is usually `N/A`. The NUMA
/// affinity is the last plain integer on the row.
pub fn parse_gpu_numa(topo: &str) -> Vec<usize> {
    topo.lines()
        .filter(|line| gpu_row().is_match(line))
        .filter_map(|line| {
            line.split_whitespace()
                .rev()
                .find_map(|token| token.parse::<usize>().ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPO: &str = "\
\tGPU0\tGPU1\tGPU2\tGPU3\tmlx5_0\tCPU Affinity\tNUMA Affinity\tGPU NUMA ID
GPU0\t X \tNV12\tNV12\tNV12\tSYS\t48-63\t3\t\tN/A
GPU1\tNV12\t X \tNV12\tNV12\tSYS\t48-63\t3\t\tN/A
GPU2\tNV12\tNV12\t X \tNV12\tPXB\t16-31\t1\t\tN/A
GPU3\tNV12\tNV12\tNV12\t X \tPXB\t16-31\t1\t\tN/A

Legend:
  X    = Self
";

    #[test]
    fn test_topology_detection() {
        let topology = NumaTopology::detect();
        assert!(!topology.nodes.is_empty());
        assert!(topology.total_cpus >= 1);
        assert!(topology.socket_topology().total_devices() >= 1);
    }

    #[test]
    fn test_cpu_list_parsing() {
        assert_eq!(parse_cpu_list("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0,2,4"), vec![0, 2, 4]);
        assert_eq!(parse_cpu_list("0-2,4-6"), vec![0, 1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_gpu_numa_parsing() {
        assert_eq!(parse_gpu_numa(TOPO), vec![3, 3, 1, 1]);

        let topo = SocketTopology::from_device_nodes(&parse_gpu_numa(TOPO));
        assert_eq!(topo.devices_per_socket, vec![0, 2, 0, 2]);
    }

    #[test]
    fn test_socket_topology_from_nodes() {
        let topology = NumaTopology {
            nodes: vec![
                NumaNode { id: 0, cpus: (0..4).collect(), memory_total: 0 },
                NumaNode { id: 1, cpus: (4..8).collect(), memory_total: 0 },
            ],
            total_cpus: 8,
        };
        assert_eq!(topology.socket_topology().devices_per_socket, vec![4, 4]);
    }
}
