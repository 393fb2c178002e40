//! Report rendering for the result store
//!
//! Text output is a fixed-column table with one row per [`ResultKey`]; a
//! cell holding several samples spans several physical lines.

use crate::config::OutputFormat;
use crate::error::{HarnessError, Result};
use crate::results::store::{ResultKey, ResultStore, MISSING};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const KEY_COLUMNS: [&str; 6] = ["node", "task", "omp", "gpu", "n", "nb"];

/// Knob names used by any key in `store`, sorted
fn knob_names(store: &ResultStore) -> Vec<String> {
    let names: BTreeSet<&str> = store
        .keys()
        .flat_map(|key| key.knobs.iter().map(|(name, _)| name.as_str()))
        .collect();
    names.into_iter().map(str::to_string).collect()
}

/// Key cells of one row, with a knob cell for every name in `knobs`
fn key_cells(key: &ResultKey, knobs: &[String]) -> Vec<String> {
    let mut cells = vec![
        key.nodes.to_string(),
        key.tasks_per_node.to_string(),
        key.omp_threads.to_string(),
        key.gpu_count.to_string(),
        key.problem_size.to_string(),
        key.block_size.to_string(),
    ];
    cells.extend(knobs.iter().map(|name| {
        key.knob(name)
            .map(|value| value.to_string())
            .unwrap_or_else(|| MISSING.to_string())
    }));
    cells
}

/// Column labels for `store`: key fields, every knob any key carries, then
/// every metric
pub fn default_header(store: &ResultStore) -> Vec<String> {
    let mut header: Vec<String> = if store.is_empty() {
        Vec::new()
    } else {
        KEY_COLUMNS.iter().map(|s| s.to_string()).collect()
    };
    header.extend(knob_names(store));
    header.extend(store.metric_names());
    header
}

/// Render the store as a fixed-column text table.
///
/// `header` labels the columns: first the key fields, then one column per
/// tracked metric. When `header` is shorter than a row, the remaining
/// columns keep their default labels.
pub fn render(store: &ResultStore, header: &[String]) -> String {
    let defaults = default_header(store);
    let knobs = knob_names(store);
    let metrics = store.metric_names();

    let labels: Vec<String> = defaults
        .iter()
        .enumerate()
        .map(|(i, default)| header.get(i).cloned().unwrap_or_else(|| default.clone()))
        .collect();

    let rows: Vec<Vec<String>> = store
        .keys()
        .map(|key| {
            let mut row = key_cells(key, &knobs);
            row.extend(metrics.iter().map(|m| store.aggregate(key, m)));
            row
        })
        .collect();

    let columns = labels
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; columns];
    for (i, label) in labels.iter().enumerate() {
        widths[i] = widths[i].max(label.len());
    }
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            let longest = cell.lines().map(str::len).max().unwrap_or(0);
            widths[i] = widths[i].max(longest);
        }
    }

    let rule: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut out = String::new();
    out.push_str(&rule);
    push_line(&mut out, &widths, |i| labels.get(i).map(String::as_str).unwrap_or(""));
    out.push_str(&rule);

    for row in &rows {
        let cells: Vec<Vec<&str>> = row.iter().map(|cell| cell.lines().collect()).collect();
        let height = cells.iter().map(Vec::len).max().unwrap_or(1).max(1);
        for line in 0..height {
            push_line(&mut out, &widths, |i| {
                cells
                    .get(i)
                    .and_then(|cell| cell.get(line))
                    .copied()
                    .unwrap_or("")
            });
        }
    }
    out.push_str(&rule);

    out
}

fn push_line<'a>(out: &mut String, widths: &[usize], cell: impl Fn(usize) -> &'a str) {
    for (i, width) in widths.iter().enumerate() {
        out.push_str(&format!("| {:^width$} ", cell(i), width = width));
    }
    out.push_str("|\n");
}

#[derive(Serialize)]
struct JsonRow<'a> {
    key: &'a ResultKey,
    samples: BTreeMap<&'a str, &'a [crate::results::Sample]>,
    mean: BTreeMap<&'a str, Option<f64>>,
}

/// Render the store as a JSON array, one object per key
pub fn render_json(store: &ResultStore) -> Result<String> {
    let rows: Vec<JsonRow<'_>> = store
        .iter()
        .map(|(key, record)| {
            let mut samples = BTreeMap::new();
            let mut mean = BTreeMap::new();
            for metric in record.metric_names() {
                samples.insert(metric, record.samples(metric).unwrap_or(&[]));
                mean.insert(metric, store.mean(key, metric));
            }
            JsonRow { key, samples, mean }
        })
        .collect();

    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Render the store as CSV: key fields and knobs, then the aggregate of every metric
/// with newlines replaced by spaces
pub fn render_csv(store: &ResultStore) -> Result<String> {
    let knobs = knob_names(store);
    let metrics = store.metric_names();
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(default_header(store))
        .map_err(|e| HarnessError::config(format!("CSV report: {}", e)))?;
    for key in store.keys() {
        let mut row = key_cells(key, &knobs);
        row.extend(
            metrics
                .iter()
                .map(|m| store.aggregate(key, m).replace('\n', " ")),
        );
        writer
            .write_record(&row)
            .map_err(|e| HarnessError::config(format!("CSV report: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| HarnessError::config(format!("CSV report: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| HarnessError::config(format!("CSV report: {}", e)))
}

/// Render in the requested output format
pub fn render_as(store: &ResultStore, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render(store, &default_header(store))),
        OutputFormat::Json => render_json(store),
        OutputFormat::Csv => render_csv(store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Sample;

    fn key(nb: u64) -> ResultKey {
        key_with(nb, &[("bcast", 1)])
    }

    fn key_with(nb: u64, knobs: &[(&str, i64)]) -> ResultKey {
        ResultKey {
            nodes: 1,
            tasks_per_node: 2,
            omp_threads: 4,
            gpu_count: 2,
            problem_size: 40_000,
            block_size: nb,
            knobs: knobs.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        }
    }

    /// Keys carrying different knob sets, as after a sweep followed by a
    /// run of the tuned winner
    fn mixed_store() -> ResultStore {
        let mut store = ResultStore::new();
        store.record(&key_with(256, &[("bcast", 1)]), "gflops", 11.0.into());
        store.record(
            &key_with(256, &[("bcast", 2), ("pfact", 7)]),
            "gflops",
            22.0.into(),
        );
        store
    }

    fn store() -> ResultStore {
        let mut store = ResultStore::new();
        store.record(&key(256), "gflops", 42.1.into());
        store.record(&key(256), "gflops", 43.0.into());
        store.record(&key(288), "gflops", Sample::Missing);
        store
    }

    #[test]
    fn test_render_table() {
        let table = render(&store(), &default_header(&store()));
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[0].starts_with("+------+"));
        assert!(lines[1].contains("node") && lines[1].contains("gflops"));
        // two samples plus the mean on three physical lines
        assert!(lines[3].contains("42.10"));
        assert!(lines[4].contains("43.00"));
        assert!(lines[5].contains("<42.55>"));
        assert!(lines[6].contains(" 288 ") && lines[6].contains(" - "));
        assert_eq!(lines.len(), 8);

        let width = lines[0].len();
        assert!(lines.iter().all(|l| l.len() == width));
    }

    #[test]
    fn test_custom_header() {
        let header = vec!["Nodes".to_string()];
        let table = render(&store(), &header);
        assert!(table.lines().nth(1).unwrap().contains("Nodes"));
        assert!(table.lines().nth(1).unwrap().contains("task"));
    }

    #[test]
    fn test_empty_store() {
        let table = render(&ResultStore::new(), &[]);
        assert_eq!(table, "+\n|\n+\n+\n");
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&store()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["samples"]["gflops"][1], 43.0);
        assert_eq!(value[1]["samples"]["gflops"][0], "-");
        assert!(value[1]["mean"]["gflops"].is_null());
    }

    #[test]
    fn test_render_csv() {
        let csv = render_csv(&store()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "node,task,omp,gpu,n,nb,bcast,gflops");
        assert_eq!(lines[1], "1,2,4,2,40000,256,1,42.10 43.00 <42.55>");
        assert_eq!(lines[2], "1,2,4,2,40000,288,1,-");
    }

    #[test]
    fn test_mixed_knobs_table() {
        let store = mixed_store();
        let header = default_header(&store);
        assert_eq!(header, ["node", "task", "omp", "gpu", "n", "nb", "bcast", "pfact", "gflops"]);

        let table = render(&store, &header);
        let lines: Vec<&str> = table.lines().collect();
        let columns = |line: &str| -> Vec<String> {
            line.trim_matches('|')
                .split('|')
                .map(|cell| cell.trim().to_string())
                .collect()
        };

        assert_eq!(columns(lines[1])[7..], ["pfact", "gflops"]);
        assert_eq!(columns(lines[3])[6..], ["1", "-", "11.00"]);
        assert_eq!(columns(lines[4])[6..], ["2", "7", "22.00"]);

        let width = lines[0].len();
        assert!(lines.iter().all(|l| l.len() == width));
    }

    #[test]
    fn test_mixed_knobs_csv() {
        let csv = render_csv(&mixed_store()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "node,task,omp,gpu,n,nb,bcast,pfact,gflops");
        assert_eq!(lines[1], "1,2,4,2,40000,256,1,-,11.00");
        assert_eq!(lines[2], "1,2,4,2,40000,256,2,7,22.00");
    }
}
