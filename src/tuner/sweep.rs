//! Knob search space

use crate::config::AlgorithmKnobs;
use crate::error::{HarnessError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Candidate values per algorithm knob.
///
/// The points of the space are the Cartesian product of every knob's
/// candidates, enumerated with the last knob (by name) varying fastest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SweepSpace {
    knobs: BTreeMap<String, Vec<i64>>,
}

impl SweepSpace {
    /// Empty space; yields a single point with no knobs
    pub fn new() -> Self {
        Self::default()
    }

    /// The HPL variants worth searching on a fixed problem size
    pub fn hpl_default() -> Self {
        Self::new()
            .with("bcast", vec![0, 1, 2, 3, 4, 5])
            .with("pfact", vec![0, 1, 2])
            .with("rfact", vec![0, 1, 2])
            .with("nbmin", vec![2, 4])
            .with("ndiv", vec![2])
    }

    /// Add or replace the candidates of one knob
    pub fn with(mut self, name: impl Into<String>, values: Vec<i64>) -> Self {
        self.knobs.insert(name.into(), values);
        self
    }

    /// Load a space from a JSON object such as `{"bcast": [0, 1], "nbmin": [2, 4]}`
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let space: Self = serde_json::from_str(&text)?;
        space.validate()?;
        Ok(space)
    }

    /// Every knob needs at least one candidate
    pub fn validate(&self) -> Result<()> {
        match self.knobs.iter().find(|(_, values)| values.is_empty()) {
            Some((name, _)) => Err(HarnessError::config(format!(
                "sweep knob '{}' has no candidate values",
                name
            ))),
            None => Ok(()),
        }
    }

    /// Knob names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.knobs.keys().map(String::as_str)
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.knobs.values().map(Vec::len).product()
    }

    /// True when some knob has no candidates
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerate the Cartesian product
    pub fn points(&self) -> Vec<AlgorithmKnobs> {
        self.knobs
            .iter()
            .fold(vec![AlgorithmKnobs::new()], |points, (name, values)| {
                points
                    .iter()
                    .flat_map(|point| {
                        values.iter().map(move |&value| {
                            let mut next = point.clone();
                            next.insert(name.clone(), value);
                            next
                        })
                    })
                    .collect()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cartesian_product() {
        let space = SweepSpace::new()
            .with("bcast", vec![0, 1])
            .with("nbmin", vec![2, 4, 8]);
        let points = space.points();

        assert_eq!(points.len(), 6);
        assert_eq!(space.len(), 6);
        assert_eq!(points[0]["bcast"], 0);
        assert_eq!(points[0]["nbmin"], 2);
        assert_eq!(points[1]["nbmin"], 4);
        assert_eq!(points[5]["bcast"], 1);
        assert_eq!(points[5]["nbmin"], 8);
    }

    #[test]
    fn test_hpl_default_size() {
        let space = SweepSpace::hpl_default();
        assert_eq!(space.points().len(), 6 * 3 * 3 * 2);
        assert_eq!(
            space.names().collect::<Vec<_>>(),
            vec!["bcast", "nbmin", "ndiv", "pfact", "rfact"]
        );
    }

    #[test]
    fn test_empty_space_has_one_point() {
        let points = SweepSpace::new().points();
        assert_eq!(points.len(), 1);
        assert!(points[0].is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        std::fs::write(&path, r#"{"bcast": [1, 3], "depth": [0]}"#).unwrap();

        let space = SweepSpace::from_file(&path).unwrap();
        assert_eq!(space, SweepSpace::new().with("bcast", vec![1, 3]).with("depth", vec![0]));

        std::fs::write(&path, r#"{"bcast": []}"#).unwrap();
        assert!(matches!(
            SweepSpace::from_file(&path),
            Err(HarnessError::Configuration(_))
        ));

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(SweepSpace::from_file(&path).is_err());
    }
}
