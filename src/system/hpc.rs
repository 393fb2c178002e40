//! HPC job environment integration
//!
//! Resolves the participating hosts from the batch scheduler and renders the
//! MPI hostfile for a run.

use crate::error::{IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Detected HPC scheduler type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerType {
    /// Slurm Workload Manager
    Slurm,
    /// PBS/Torque
    Pbs,
    /// No scheduler detected
    None,
}

impl SchedulerType {
    /// Detect scheduler from environment
    pub fn detect() -> Self {
        if env::var("SLURM_JOB_ID").is_ok() || env::var("SLURM_NODELIST").is_ok() {
            SchedulerType::Slurm
        } else if env::var("PBS_JOBID").is_ok() {
            SchedulerType::Pbs
        } else {
            SchedulerType::None
        }
    }

    /// Get scheduler name
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerType::Slurm => "Slurm",
            SchedulerType::Pbs => "PBS/Torque",
            SchedulerType::None => "None",
        }
    }
}

/// Hosts allocated to the current job, falling back to the local host
pub fn allocated_hosts() -> Vec<String> {
    let hosts = match SchedulerType::detect() {
        SchedulerType::Slurm => env::var("SLURM_NODELIST")
            .or_else(|_| env::var("SLURM_JOB_NODELIST"))
            .map(|s| expand_node_list(&s))
            .unwrap_or_default(),
        SchedulerType::Pbs => env::var("PBS_NODEFILE")
            .ok()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|content| {
                let mut hosts: Vec<String> = Vec::new();
                for host in content.lines().map(str::trim).filter(|s| !s.is_empty()) {
                    if !hosts.iter().any(|h| h == host) {
                        hosts.push(host.to_string());
                    }
                }
                hosts
            })
            .unwrap_or_default(),
        SchedulerType::None => Vec::new(),
    };

    if hosts.is_empty() {
        vec![local_hostname()]
    } else {
        hosts
    }
}

/// Name of the local host
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Expand a Slurm node list.
///
/// Handles plain comma lists (`node1,node2`) and bracketed ranges with
/// zero padding (`node[01-03,07]`), including several bracketed groups
/// (`gpu[1-2],cpu[08-09]`).
pub fn expand_node_list(nodelist: &str) -> Vec<String> {
    let mut nodes = Vec::new();

    for group in split_top_level(nodelist) {
        let group = group.trim();
        if group.is_empty() {
            continue;
        }

        let (Some(open), Some(close)) = (group.find('['), group.rfind(']')) else {
            nodes.push(group.to_string());
            continue;
        };

        let prefix = &group[..open];
        let suffix = &group[close + 1..];

        for item in group[open + 1..close].split(',') {
            match item.split_once('-') {
                Some((start, end)) => {
                    if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                        let width = start.len();
                        for i in s..=e {
                            nodes.push(format!("{}{:0width$}{}", prefix, i, suffix, width = width));
                        }
                    }
                }
                None => nodes.push(format!("{}{}{}", prefix, item, suffix)),
            }
        }
    }

    nodes
}

/// Split on commas that are not inside brackets
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);

    parts
}

/// MPI hostfile: one `<host> slots=<n>` line per participating host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostfile {
    /// Participating hosts, in launch order
    pub hosts: Vec<String>,
    /// MPI slots per host
    pub slots: usize,
}

impl Hostfile {
    /// Take the first `nodes` hosts with `slots` ranks each
    pub fn new(hosts: &[String], nodes: usize, slots: usize) -> Self {
        Self {
            hosts: hosts.iter().take(nodes).cloned().collect(),
            slots,
        }
    }

    /// Render the hostfile contents
    pub fn render(&self) -> String {
        self.hosts
            .iter()
            .map(|host| format!("{} slots={}\n", host, self.slots))
            .collect()
    }

    /// Write the hostfile to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).with_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_node_list() {
        let nodes = expand_node_list("node[01-04]");
        assert_eq!(nodes, vec!["node01", "node02", "node03", "node04"]);

        let nodes = expand_node_list("node1,node2,node3");
        assert_eq!(nodes, vec!["node1", "node2", "node3"]);
    }

    #[test]
    fn test_expand_mixed_ranges() {
        let nodes = expand_node_list("gpu[08-09,12]");
        assert_eq!(nodes, vec!["gpu08", "gpu09", "gpu12"]);

        let nodes = expand_node_list("gpu[1-2],cpu07");
        assert_eq!(nodes, vec!["gpu1", "gpu2", "cpu07"]);
    }

    #[test]
    fn test_hostfile_render() {
        let hosts = vec!["gpu01".to_string(), "gpu02".to_string(), "gpu03".to_string()];
        let hostfile = Hostfile::new(&hosts, 2, 4);
        assert_eq!(hostfile.render(), "gpu01 slots=4\ngpu02 slots=4\n");
    }

    #[test]
    fn test_hostfile_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostfile");
        Hostfile::new(&["n1".to_string()], 1, 8).write(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "n1 slots=8\n");
    }

    #[test]
    fn test_allocated_hosts_not_empty() {
        assert!(!allocated_hosts().is_empty());
    }
}
