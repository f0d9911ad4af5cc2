//! Rest pupil baselines
//!
//! This module loads per-participant rest pupil sizes and expresses pupil
//! measurements as a percentage change from them. Baselines enable relative
//! interpretation of pupil dilation across participants.
//!
//! The rest pupil file is a tab-separated table with one row per participant:
//!
//! ```text
//! participant    task1    task2
//! P1             3.21     3.30
//! ```

use crate::error::GazeError;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Rest pupil sizes of one participant, keyed by scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestPupilBaseline {
    sizes: BTreeMap<String, f64>,
}

impl RestPupilBaseline {
    pub fn new(sizes: BTreeMap<String, f64>) -> Self {
        Self { sizes }
    }

    /// Rest pupil size recorded for a scene
    pub fn for_scene(&self, scene: &str) -> Option<f64> {
        self.sizes.get(scene).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Rest pupil sizes of every participant of a study
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestPupilSizes {
    participants: BTreeMap<String, RestPupilBaseline>,
}

impl RestPupilSizes {
    /// Parse the rest pupil table. Empty or non-positive sizes are unknown.
    pub fn parse(source_name: &str, raw: &str) -> Result<Self, GazeError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .trim(Trim::All)
            .from_reader(raw.as_bytes());
        let scenes: Vec<String> = reader.headers()?.iter().skip(1).map(str::to_string).collect();

        let mut participants = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());
            let Some(participant) = record.get(0).filter(|id| !id.is_empty()) else {
                continue;
            };

            let mut sizes = BTreeMap::new();
            for (scene, cell) in scenes.iter().zip(record.iter().skip(1)) {
                if cell.is_empty() {
                    continue;
                }
                let size: f64 = cell.parse().map_err(|_| {
                    GazeError::parse(
                        source_name,
                        line,
                        format!("invalid rest pupil size '{cell}' for scene '{scene}'"),
                    )
                })?;
                if size > 0.0 {
                    sizes.insert(scene.clone(), size);
                }
            }
            participants.insert(participant.to_string(), RestPupilBaseline::new(sizes));
        }

        Ok(Self { participants })
    }

    /// Read the rest pupil table from a file
    pub fn read_file(path: &Path) -> Result<Self, GazeError> {
        if !path.exists() {
            return Err(GazeError::MissingFile(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&path.display().to_string(), &raw)
    }

    /// Baseline of one participant, if the table has a row for it
    pub fn for_participant(&self, participant: &str) -> Option<&RestPupilBaseline> {
        self.participants.get(participant)
    }
}

/// Calculate deviation from baseline as percentage
pub fn calculate_deviation(current: f64, baseline: f64) -> Option<f64> {
    if baseline > 0.0 {
        Some(((current - baseline) / baseline) * 100.0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "participant\ttask1\ttask2\nP1\t3.0\t3.5\nP2\t\t-1\n";

    #[test]
    fn test_parse_rest_pupil_table() {
        let sizes = RestPupilSizes::parse("rest.tsv", TABLE).unwrap();

        let p1 = sizes.for_participant("P1").unwrap();
        assert_eq!(p1.for_scene("task1"), Some(3.0));
        assert_eq!(p1.for_scene("task2"), Some(3.5));
        assert_eq!(p1.for_scene("task3"), None);

        // empty and non-positive sizes are unknown
        assert!(sizes.for_participant("P2").unwrap().is_empty());
        assert!(sizes.for_participant("P3").is_none());
    }

    #[test]
    fn test_parse_rejects_malformed_size() {
        let err = RestPupilSizes::parse("rest.tsv", "participant\ttask1\nP1\tbig\n").unwrap_err();
        assert!(matches!(err, GazeError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_deviation_calculation() {
        // 3.6 against a 3.0 rest size is 20% above baseline
        let expected = ((3.6 - 3.0) / 3.0) * 100.0;
        assert!((calculate_deviation(3.6, 3.0).unwrap() - expected).abs() < 1e-9);
        assert_eq!(calculate_deviation(3.6, 0.0), None);
    }
}
