//! Areas of interest
//!
//! An [`Aoi`] is a named union of polygons in media coordinates, optionally
//! restricted to a set of `[start, end)` time windows.
//!
//! AOI files are tab separated:
//!
//! ```text
//! Menu    0,0     200,0   200,100   0,100
//! #       0,5000  9000,12000
//! ```
//!
//! The `#` line sets the active windows of the AOI above it. Repeating an AOI
//! name adds another polygon to it.

use crate::error::GazeError;
use crate::types::GazePoint;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Simple polygon, tested by ray casting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<GazePoint>,
}

impl Polygon {
    pub fn new(vertices: Vec<GazePoint>) -> Self {
        Self { vertices }
    }

    /// Point-in-polygon test (ray casting)
    pub fn contains(&self, point: &GazePoint) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if ((vi.y > point.y) != (vj.y > point.y))
                && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Named area of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aoi {
    pub name: String,
    pub polygons: Vec<Polygon>,
    /// `[start, end)` windows in which the AOI exists; always active when empty
    pub active_windows: Vec<(i64, i64)>,
}

impl Aoi {
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>) -> Self {
        Self {
            name: name.into(),
            polygons,
            active_windows: Vec::new(),
        }
    }

    pub fn with_windows(mut self, windows: Vec<(i64, i64)>) -> Self {
        self.active_windows = windows;
        self
    }

    pub fn contains(&self, point: &GazePoint) -> bool {
        self.polygons.iter().any(|polygon| polygon.contains(point))
    }

    pub fn is_active_at(&self, timestamp: i64) -> bool {
        self.active_windows.is_empty()
            || self
                .active_windows
                .iter()
                .any(|&(start, end)| start <= timestamp && timestamp < end)
    }

    /// Whether the AOI is active at any point of `[start, end)`
    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.active_windows.is_empty()
            || self
                .active_windows
                .iter()
                .any(|&(w_start, w_end)| w_start < end && start < w_end)
    }

    /// Whether a gaze point at `timestamp` falls into the AOI
    pub fn hit(&self, timestamp: i64, point: &GazePoint) -> bool {
        self.is_active_at(timestamp) && self.contains(point)
    }
}

/// Parse AOI definitions
pub fn parse_aois(source_name: &str, raw: &str) -> Result<Vec<Aoi>, GazeError> {
    let mut aois: Vec<Aoi> = Vec::new();
    let mut last: Option<usize> = None;

    for (number, line) in raw.lines().enumerate() {
        let line_number = number as u64 + 1;
        let mut fields = line.split('\t').map(str::trim).filter(|f| !f.is_empty());
        let Some(name) = fields.next() else {
            continue;
        };

        if name == "#" {
            let index = last.ok_or_else(|| {
                GazeError::parse(source_name, line_number, "time windows before any AOI")
            })?;
            let windows = fields
                .map(|field| {
                    parse_pair(field)
                        .map(|(start, end)| (start as i64, end as i64))
                        .ok_or_else(|| {
                            GazeError::parse(
                                source_name,
                                line_number,
                                format!("invalid time window '{field}'"),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            aois[index].active_windows.extend(windows);
            continue;
        }

        let vertices = fields
            .map(|field| {
                parse_pair(field).map(|(x, y)| GazePoint::new(x, y)).ok_or_else(|| {
                    GazeError::parse(source_name, line_number, format!("invalid vertex '{field}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if vertices.len() < 3 {
            return Err(GazeError::parse(
                source_name,
                line_number,
                format!("AOI '{name}' needs at least 3 vertices"),
            ));
        }

        let index = match aois.iter().position(|aoi| aoi.name == name) {
            Some(index) => {
                aois[index].polygons.push(Polygon::new(vertices));
                index
            }
            None => {
                aois.push(Aoi::new(name, vec![Polygon::new(vertices)]));
                aois.len() - 1
            }
        };
        last = Some(index);
    }

    Ok(aois)
}

/// Read AOI definitions from a file
pub fn read_aoi_file(path: &Path) -> Result<Vec<Aoi>, GazeError> {
    if !path.exists() {
        return Err(GazeError::MissingFile(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    parse_aois(&path.display().to_string(), &raw)
}

fn parse_pair(field: &str) -> Option<(f64, f64)> {
    let (a, b) = field.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}
