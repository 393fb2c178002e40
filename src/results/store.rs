//! Keyed accumulation of repeated-run samples

use crate::config::RunConfiguration;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Marker printed for a repeat that produced no parseable value
pub const MISSING: &str = "-";

/// One recorded measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Parsed metric value
    Value(f64),
    /// The repeat ran but its output held no value for the metric
    Missing,
}

impl Sample {
    /// Numeric value, if any
    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(*v),
            Sample::Missing => None,
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Value(v) => write!(f, "{:.2}", v),
            Sample::Missing => f.write_str(MISSING),
        }
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Sample::Value(v) => serializer.serialize_f64(*v),
            Sample::Missing => serializer.serialize_str(MISSING),
        }
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Value(value)
    }
}

/// Configuration fields identifying one logical benchmark configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResultKey {
    /// Number of nodes
    pub nodes: usize,
    /// MPI ranks per node
    pub tasks_per_node: usize,
    /// OpenMP threads per rank
    pub omp_threads: usize,
    /// GPUs per node
    pub gpu_count: usize,
    /// Problem size
    pub problem_size: u64,
    /// Block size
    pub block_size: u64,
    /// Algorithmic knobs, sorted by name
    pub knobs: Vec<(String, i64)>,
}

impl ResultKey {
    /// Value of the knob called `name`, if the key carries it
    pub fn knob(&self, name: &str) -> Option<i64> {
        self.knobs
            .iter()
            .find(|(knob, _)| knob == name)
            .map(|(_, value)| *value)
    }
}

impl From<&RunConfiguration> for ResultKey {
    fn from(run: &RunConfiguration) -> Self {
        Self {
            nodes: run.nodes(),
            tasks_per_node: run.tasks_per_node(),
            omp_threads: run.omp_threads(),
            gpu_count: run.gpu_count(),
            problem_size: run.problem_size(),
            block_size: run.block_size(),
            // BTreeMap iteration is already sorted by knob name
            knobs: run
                .knobs()
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect(),
        }
    }
}

/// Samples of every metric observed for one key, in first-seen metric order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultRecord {
    metrics: Vec<(String, Vec<Sample>)>,
}

impl ResultRecord {
    /// Samples of `metric`, in repeat order
    pub fn samples(&self, metric: &str) -> Option<&[Sample]> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, samples)| samples.as_slice())
    }

    /// Metric names in first-seen order
    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }

    fn push(&mut self, metric: &str, sample: Sample) {
        match self.metrics.iter_mut().find(|(name, _)| name == metric) {
            Some((_, samples)) => samples.push(sample),
            None => self.metrics.push((metric.to_string(), vec![sample])),
        }
    }
}

/// Result store keyed by [`ResultKey`], preserving insertion order
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    entries: Vec<(ResultKey, ResultRecord)>,
    index: HashMap<ResultKey, usize>,
}

impl ResultStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample, creating the record on first use of the key
    pub fn record(&mut self, key: &ResultKey, metric: &str, sample: Sample) {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.entries.push((key.clone(), ResultRecord::default()));
                self.index.insert(key.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        self.entries[slot].1.push(metric, sample);
    }

    /// Record for `key`, if any sample has been stored
    pub fn get(&self, key: &ResultKey) -> Option<&ResultRecord> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    /// Samples of one key/metric pair
    pub fn samples(&self, key: &ResultKey, metric: &str) -> Option<&[Sample]> {
        self.get(key).and_then(|record| record.samples(metric))
    }

    /// Mean of the samples, or `None` when a sample is missing or none exist
    pub fn mean(&self, key: &ResultKey, metric: &str) -> Option<f64> {
        let values: Vec<f64> = self
            .samples(key, metric)?
            .iter()
            .map(Sample::value)
            .collect::<Option<_>>()?;

        match values.len() {
            0 => None,
            1 => Some(values[0]),
            _ => Some(statistical::mean(&values)),
        }
    }

    /// Render the samples of one cell.
    ///
    /// Any missing sample collapses the cell to `-`. Otherwise values are
    /// listed one per line with two decimals, followed by `<mean>` when more
    /// than one sample exists.
    pub fn aggregate(&self, key: &ResultKey, metric: &str) -> String {
        let samples = match self.samples(key, metric) {
            Some(samples) if !samples.is_empty() => samples,
            _ => return MISSING.to_string(),
        };
        if samples.iter().any(|s| matches!(s, Sample::Missing)) {
            return MISSING.to_string();
        }

        let mut lines: Vec<String> = samples.iter().map(Sample::to_string).collect();
        if samples.len() > 1 {
            if let Some(mean) = self.mean(key, metric) {
                lines.push(format!("<{:.2}>", mean));
            }
        }
        lines.join("\n")
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &ResultKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Key/record pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &ResultRecord)> {
        self.entries.iter().map(|(key, record)| (key, record))
    }

    /// Every metric name seen, in first-seen order
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (_, record) in &self.entries {
            for name in record.metric_names() {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> ResultKey {
        ResultKey {
            nodes: 1,
            tasks_per_node: 4,
            omp_threads: 2,
            gpu_count: 4,
            problem_size: n,
            block_size: 288,
            knobs: vec![("bcast".into(), 0), ("pfact".into(), 2)],
        }
    }

    #[test]
    fn test_missing_sample_collapses_cell() {
        let mut store = ResultStore::new();
        let k = key(40_000);
        store.record(&k, "gflops", Sample::Value(42.1));
        store.record(&k, "gflops", Sample::Missing);
        store.record(&k, "gflops", Sample::Value(43.0));

        assert_eq!(store.aggregate(&k, "gflops"), "-");
        assert_eq!(store.mean(&k, "gflops"), None);
    }

    #[test]
    fn test_aggregate_with_mean() {
        let mut store = ResultStore::new();
        let k = key(40_000);
        store.record(&k, "gflops", 42.1.into());
        store.record(&k, "gflops", 43.0.into());

        assert_eq!(store.aggregate(&k, "gflops"), "42.10\n43.00\n<42.55>");
    }

    #[test]
    fn test_single_sample_unadorned() {
        let mut store = ResultStore::new();
        let k = key(40_000);
        store.record(&k, "time_s", 12.345.into());
        assert_eq!(store.aggregate(&k, "time_s"), "12.35");
        assert_eq!(store.aggregate(&k, "gflops"), "-");
        assert_eq!(store.aggregate(&key(1), "time_s"), "-");
    }

    #[test]
    fn test_insertion_order_and_lazy_creation() {
        let mut store = ResultStore::new();
        store.record(&key(30_000), "gflops", 1.0.into());
        store.record(&key(10_000), "time_s", 2.0.into());
        store.record(&key(30_000), "time_s", 3.0.into());

        let keys: Vec<u64> = store.keys().map(|k| k.problem_size).collect();
        assert_eq!(keys, vec![30_000, 10_000]);
        assert_eq!(store.metric_names(), vec!["gflops", "time_s"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_key_from_run() {
        let run = RunConfiguration::builder()
            .tasks_per_node(4)
            .gpu_count(4)
            .problem_size(80_000)
            .knob("rfact", 1)
            .knob("bcast", 3)
            .input_deck("HPL.dat")
            .output_log("HPL.log")
            .build()
            .unwrap();
        let key = ResultKey::from(&run);

        assert_eq!(key.problem_size, 80_000);
        assert_eq!(key.knobs[0], ("bcast".to_string(), 3));
        assert_eq!(key.knob("rfact"), Some(1));
        assert_eq!(key.knob("pfact"), None);
    }

    #[test]
    fn test_sample_json() {
        let json = serde_json::to_string(&vec![Sample::Value(1.5), Sample::Missing]).unwrap();
        assert_eq!(json, r#"[1.5,"-"]"#);
    }
}
