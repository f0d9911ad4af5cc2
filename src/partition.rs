//! Scene and segment partitioning
//!
//! A segment file lists one segment per line, tab separated:
//!
//! ```text
//! scene_id    segment_id    start    end
//! ```
//!
//! Scenes keep the order of their first appearance and segments the order of
//! the file. Time windows are taken as given.

use crate::error::GazeError;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// `[start, end)` window of one segment (ms)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDef {
    pub name: String,
    pub start: i64,
    pub end: i64,
}

/// A named, ordered group of segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDef {
    pub name: String,
    pub segments: Vec<SegmentDef>,
}

/// Ordered scene → segment hierarchy of one recording
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub scenes: Vec<SceneDef>,
}

impl Partition {
    /// Parse a segment file. Zero segments, empty windows and duplicate
    /// segment ids are configuration errors.
    pub fn parse(source_name: &str, raw: &str) -> Result<Self, GazeError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_reader(raw.as_bytes());

        let mut scenes: Vec<SceneDef> = Vec::new();
        let mut seen = HashSet::new();

        for record in reader.records() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let line = record.position().map_or(0, |p| p.line());
            let field = |index: usize, what: &str| {
                record
                    .get(index)
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| GazeError::parse(source_name, line, format!("missing {what}")))
            };

            let scene = field(0, "scene id")?.to_string();
            let segment = field(1, "segment id")?.to_string();
            let start = parse_time(source_name, line, field(2, "start time")?)?;
            let end = parse_time(source_name, line, field(3, "end time")?)?;

            if end <= start {
                return Err(GazeError::Configuration(format!(
                    "{source_name} line {line}: segment '{segment}' ends at {end}, not after its start {start}"
                )));
            }
            if !seen.insert(segment.clone()) {
                return Err(GazeError::Configuration(format!(
                    "{source_name} line {line}: duplicate segment id '{segment}'"
                )));
            }

            let definition = SegmentDef {
                name: segment,
                start,
                end,
            };
            match scenes.iter_mut().find(|s| s.name == scene) {
                Some(existing) => existing.segments.push(definition),
                None => scenes.push(SceneDef {
                    name: scene,
                    segments: vec![definition],
                }),
            }
        }

        let partition = Self { scenes };
        if partition.segment_count() == 0 {
            return Err(GazeError::NoSegments(source_name.to_string()));
        }
        partition.warn_on_overlaps(source_name);
        Ok(partition)
    }

    /// Read a segment file
    pub fn read_file(path: &Path) -> Result<Self, GazeError> {
        if !path.exists() {
            return Err(GazeError::MissingFile(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&path.display().to_string(), &raw)
    }

    pub fn segment_count(&self) -> usize {
        self.scenes.iter().map(|scene| scene.segments.len()).sum()
    }

    /// Every segment with its scene name, in file order per scene
    pub fn segments(&self) -> impl Iterator<Item = (&str, &SegmentDef)> {
        self.scenes.iter().flat_map(|scene| {
            scene
                .segments
                .iter()
                .map(move |segment| (scene.name.as_str(), segment))
        })
    }

    fn warn_on_overlaps(&self, source_name: &str) {
        let mut windows: Vec<&SegmentDef> = self.segments().map(|(_, s)| s).collect();
        windows.sort_by_key(|s| s.start);
        for pair in windows.windows(2) {
            if pair[1].start < pair[0].end {
                log::warn!(
                    "{}: segments '{}' and '{}' overlap",
                    source_name,
                    pair[0].name,
                    pair[1].name
                );
            }
        }
    }
}

fn parse_time(source_name: &str, line: u64, cell: &str) -> Result<i64, GazeError> {
    cell.parse::<i64>()
        .ok()
        .or_else(|| {
            cell.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
        })
        .ok_or_else(|| GazeError::parse(source_name, line, format!("invalid time '{cell}'")))
}
