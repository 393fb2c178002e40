//! MPI process-grid and device affinity planning
//!
//! Both functions are pure: they are called fresh for every run
//! configuration, so a changed device count can never leave a stale
//! affinity list behind.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two-dimensional decomposition of MPI ranks (`p` rows, `q` columns)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessGrid {
    /// Number of process rows
    pub p: usize,
    /// Number of process columns
    pub q: usize,
}

impl ProcessGrid {
    /// Total ranks covered by the grid
    pub fn ranks(&self) -> usize {
        self.p * self.q
    }
}

impl fmt::Display for ProcessGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.p, self.q)
    }
}

/// Compute the closest-to-square process grid for `total_ranks`.
///
/// The returned grid satisfies `p * q == total_ranks` and `p <= q`, with the
/// smallest possible `q - p`. A prime rank count yields `1 x total_ranks`.
pub fn process_grid(total_ranks: usize) -> Result<ProcessGrid> {
    if total_ranks == 0 {
        return Err(HarnessError::config("cannot build a process grid for 0 ranks"));
    }

    // The largest divisor not exceeding sqrt(n) is the closest-to-square p
    let mut p = 1;
    let mut i = 1;
    while i * i <= total_ranks {
        if total_ranks % i == 0 {
            p = i;
        }
        i += 1;
    }

    Ok(ProcessGrid {
        p,
        q: total_ranks / p,
    })
}

/// Number of devices (GPUs or task slots) attached to each socket
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SocketTopology {
    /// `devices_per_socket[i]` is the device count on socket `i`
    pub devices_per_socket: Vec<usize>,
}

impl SocketTopology {
    /// Create a topology from per-socket device counts
    pub fn new(devices_per_socket: Vec<usize>) -> Self {
        Self { devices_per_socket }
    }

    /// Build a topology from the NUMA node of every device, in device order
    pub fn from_device_nodes(nodes: &[usize]) -> Self {
        let sockets = nodes.iter().max().map(|m| m + 1).unwrap_or(0);
        let mut devices_per_socket = vec![0; sockets];
        for &node in nodes {
            devices_per_socket[node] += 1;
        }
        Self { devices_per_socket }
    }

    /// Spread `devices` over `sockets` as evenly as possible, lower
    /// sockets taking the remainder
    pub fn balanced(devices: usize, sockets: usize) -> Self {
        let sockets = sockets.max(1);
        let (base, extra) = (devices / sockets, devices % sockets);
        Self {
            devices_per_socket: (0..sockets).map(|i| base + usize::from(i < extra)).collect(),
        }
    }

    /// Total devices across all sockets
    pub fn total_devices(&self) -> usize {
        self.devices_per_socket.iter().sum()
    }

    /// Affinity list for the first `device_count` devices
    pub fn affinity(&self, device_count: usize) -> Result<Vec<usize>> {
        affinity_map(device_count, &self.devices_per_socket)
    }
}

/// Map each device index to the socket it is attached to.
///
/// Sockets are walked in order and socket `i` contributes `sockets[i]`
/// entries, so an asymmetric layout like `[0, 2]` maps both devices to
/// socket 1. The result has exactly `device_count` entries; rank `i` binds
/// to `result[i]`.
pub fn affinity_map(device_count: usize, sockets: &[usize]) -> Result<Vec<usize>> {
    let available: usize = sockets.iter().sum();
    if available < device_count {
        return Err(HarnessError::config(format!(
            "{} devices requested but socket layout {:?} only provides {}",
            device_count, sockets, available
        )));
    }

    let mut map: Vec<usize> = sockets
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .flat_map(|(socket, &count)| std::iter::repeat(socket).take(count))
        .collect();
    map.truncate(device_count);

    Ok(map)
}

/// Join an affinity list with `:` as expected by the NVIDIA launch wrappers
pub fn format_affinity(map: &[usize]) -> String {
    map.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_grid_examples() {
        assert_eq!(process_grid(1).unwrap(), ProcessGrid { p: 1, q: 1 });
        assert_eq!(process_grid(12).unwrap(), ProcessGrid { p: 3, q: 4 });
        assert_eq!(process_grid(16).unwrap(), ProcessGrid { p: 4, q: 4 });
        assert_eq!(process_grid(13).unwrap(), ProcessGrid { p: 1, q: 13 });
        assert_eq!(process_grid(8).unwrap(), ProcessGrid { p: 2, q: 4 });
    }

    #[test]
    fn test_grid_zero_ranks() {
        assert!(process_grid(0).is_err());
    }

    #[test]
    fn test_grid_is_closest_to_square() {
        for n in 1..256usize {
            let grid = process_grid(n).unwrap();
            assert_eq!(grid.ranks(), n);
            assert!(grid.p <= grid.q);

            for d in (1..=n).filter(|d| n % d == 0) {
                let (p, q) = (d, n / d);
                if p <= q {
                    assert!(grid.q - grid.p <= q - p, "n={n}: {grid} vs {p}x{q}");
                }
            }
        }
    }

    #[test]
    fn test_affinity_asymmetric_layout() {
        assert_eq!(affinity_map(2, &[0, 2]).unwrap(), vec![1, 1]);
        assert!(affinity_map(4, &[0, 2]).is_err());
    }

    #[test]
    fn test_affinity_truncates() {
        assert_eq!(affinity_map(3, &[2, 2]).unwrap(), vec![0, 0, 1]);
        assert_eq!(affinity_map(4, &[2, 2]).unwrap(), vec![0, 0, 1, 1]);
        assert!(affinity_map(0, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_topology_from_device_nodes() {
        let topo = SocketTopology::from_device_nodes(&[1, 1, 3, 3]);
        assert_eq!(topo.devices_per_socket, vec![0, 2, 0, 2]);
        assert_eq!(topo.affinity(4).unwrap(), vec![1, 1, 3, 3]);
        assert_eq!(format_affinity(&topo.affinity(3).unwrap()), "1:1:3");
    }

    #[test]
    fn test_balanced_topology() {
        assert_eq!(SocketTopology::balanced(4, 2).devices_per_socket, vec![2, 2]);
        assert_eq!(SocketTopology::balanced(5, 2).devices_per_socket, vec![3, 2]);
        assert_eq!(SocketTopology::balanced(3, 0).devices_per_socket, vec![3]);
    }

    proptest! {
        #[test]
        fn prop_affinity_completeness(
            sockets in proptest::collection::vec(0usize..5, 0..6),
            pick in 0usize..32,
        ) {
            let total: usize = sockets.iter().sum();
            let devices = if total == 0 { 0 } else { pick % (total + 1) };
            let map = affinity_map(devices, &sockets).unwrap();

            prop_assert_eq!(map.len(), devices);
            for id in map {
                prop_assert!(sockets[id] > 0);
            }
        }

        #[test]
        fn prop_grid_multiplies_back(n in 1usize..10_000) {
            let grid = process_grid(n).unwrap();
            prop_assert_eq!(grid.p * grid.q, n);
            prop_assert!(grid.p <= grid.q);
        }
    }
}
