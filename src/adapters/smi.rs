//! SMI BeGaze adapter
//!
//! Samples come from a `Samples.txt` export, fixations, saccades and user
//! events from a single sectioned `Events.txt` export. SMI timestamps are in
//! microseconds and converted to milliseconds on read.

use super::table::{Column, MonotonicClock, Row, TableFormat, TsvReader};
use super::{mean_of_available, PupilDeriver, TrackerAdapter};
use crate::config::{Eye, RunConfig};
use crate::error::GazeError;
use crate::types::{
    Datapoint, Event, EventKind, Fixation, GazePoint, MediaOffset, Saccade, SaccadeCandidate,
    TrackerKind,
};
use crate::validity::{classify_sample, ValidityRule};
use std::collections::HashMap;

const SAMPLES: &str = "SMI Samples";
const EVENTS: &str = "SMI Events";

/// SMI validity codes: 1 tracked, 0 lost
const SMI_VALIDITY: ValidityRule = ValidityRule::AtLeast(1);

const HEADER_PREFIX: &str = "Table Header for ";

fn micros_to_millis(value: i64) -> i64 {
    value / 1000
}

/// SMI BeGaze adapter
#[derive(Debug, Clone)]
pub struct SmiAdapter {
    offset: MediaOffset,
    eye: Eye,
    saccade_threshold: f64,
}

impl SmiAdapter {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            offset: config.media_offset,
            eye: config.tracker_settings.smi_eye.unwrap_or(Eye::Left),
            saccade_threshold: config.thresholds.valid_samples_prop_saccade,
        }
    }

    fn event_prefix(&self, kind: &str) -> String {
        format!("{} {}", kind, self.eye.code())
    }
}

impl TrackerAdapter for SmiAdapter {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Smi
    }

    fn read_samples(&self, raw: &str) -> Result<Vec<Datapoint>, GazeError> {
        let format = TableFormat {
            comments: true,
            preamble_lines: 0,
        };
        let mut reader = TsvReader::new(SAMPLES, raw, format)?;
        let time = reader.column("Time")?;
        let sample_type = reader.column("Type")?;
        let left = EyeColumns::new(&reader, Eye::Left)?;
        let right = EyeColumns::new(&reader, Eye::Right)?;

        let mut clock = MonotonicClock::default();
        let mut pupils = PupilDeriver::default();
        let mut samples = Vec::new();
        for row in reader.rows() {
            let row = row?;
            if row.text(&sample_type) != Some("SMP") {
                continue;
            }
            let ts = micros_to_millis(row.require_int(&time)?);
            clock.check(&row, ts)?;

            let l = left.read(&row)?;
            let r = right.read(&row)?;
            let classified = classify_sample(SMI_VALIDITY, l.validity, r.validity);
            let (pupil_size, pupil_velocity) =
                pupils.next(ts, classified.is_valid, l.diameter, r.diameter);

            let tracked: Vec<GazePoint> = [&l, &r]
                .into_iter()
                .filter(|eye| SMI_VALIDITY.eye_ok(eye.validity))
                .filter_map(|eye| eye.point)
                .collect();
            let gaze = if tracked.is_empty() {
                None
            } else {
                let n = tracked.len() as f64;
                Some(
                    GazePoint::new(
                        tracked.iter().map(|p| p.x).sum::<f64>() / n,
                        tracked.iter().map(|p| p.y).sum::<f64>() / n,
                    )
                    .offset_by(self.offset),
                )
            };

            samples.push(Datapoint {
                timestamp: ts,
                pupil_size,
                pupil_velocity,
                distance: mean_of_available(l.distance, r.distance),
                is_valid: classified.is_valid,
                is_valid_blink: classified.is_valid_blink,
                gaze,
                fixation_index: None,
            });
        }
        Ok(samples)
    }

    fn read_fixations(&self, raw: &str) -> Result<Vec<Fixation>, GazeError> {
        let sections = EventSections::split(raw);
        let Some(table) = sections.table("Fixations", &self.event_prefix("Fixation")) else {
            return Ok(Vec::new());
        };
        let source_name = format!("{} (Fixations)", EVENTS);
        let mut reader = TsvReader::new(&source_name, &table, TableFormat::default())?;
        let number = reader.column("Number")?;
        let start = reader.column("Start")?;
        let duration = reader.column("Duration")?;
        let x = reader.column("Location X")?;
        let y = reader.column("Location Y")?;

        let mut fixations = Vec::new();
        for row in reader.rows() {
            let row = row?;
            let fixation_duration = micros_to_millis(row.require_int(&duration)?);
            if fixation_duration <= 0 {
                log::debug!(
                    "{} line {}: skipping fixation with duration {}",
                    source_name,
                    row.line(),
                    fixation_duration
                );
                continue;
            }
            fixations.push(Fixation::new(
                row.require_int(&number)?,
                micros_to_millis(row.require_int(&start)?),
                fixation_duration,
                GazePoint::new(row.require_float(&x)?, row.require_float(&y)?),
                self.offset,
            ));
        }
        Ok(fixations)
    }

    fn read_saccades(&self, raw: &str, samples: &[Datapoint]) -> Result<Vec<Saccade>, GazeError> {
        let sections = EventSections::split(raw);
        let Some(table) = sections.table("Saccades", &self.event_prefix("Saccade")) else {
            return Ok(Vec::new());
        };
        let source_name = format!("{} (Saccades)", EVENTS);
        let mut reader = TsvReader::new(&source_name, &table, TableFormat::default())?;
        let number = reader.column("Number")?;
        let start = reader.column("Start")?;
        let duration = reader.column("Duration")?;
        let start_x = reader.column("Start Loc.X")?;
        let start_y = reader.column("Start Loc.Y")?;
        let end_x = reader.column("End Loc.X")?;
        let end_y = reader.column("End Loc.Y")?;
        let acceleration = reader.optional_column("Average Accel.");

        let mut saccades = Vec::new();
        for row in reader.rows() {
            let row = row?;
            let ts = micros_to_millis(row.require_int(&start)?);
            let end_ts = ts + micros_to_millis(row.require_int(&duration)?);
            let path = [
                (ts, GazePoint::new(row.require_float(&start_x)?, row.require_float(&start_y)?)),
                (end_ts, GazePoint::new(row.require_float(&end_x)?, row.require_float(&end_y)?)),
            ];
            let quality = window_quality(samples, ts, end_ts);

            let Some(mut candidate) =
                SaccadeCandidate::from_path(row.require_int(&number)?, &path, end_ts, quality)
            else {
                log::debug!("{} line {}: skipping empty saccade", source_name, row.line());
                continue;
            };
            candidate.acceleration = row.optional_float(acceleration.as_ref())?;
            if let Some(saccade) = candidate.into_saccade(self.saccade_threshold, self.offset) {
                saccades.push(saccade);
            }
        }
        Ok(saccades)
    }

    fn read_events(&self, raw: &str) -> Result<Vec<Event>, GazeError> {
        let sections = EventSections::split(raw);
        let Some(table) = sections.table("User Events", "UserEvent") else {
            return Ok(Vec::new());
        };
        let source_name = format!("{} (User Events)", EVENTS);
        let mut reader = TsvReader::new(&source_name, &table, TableFormat::default())?;
        let start = reader.column("Start")?;
        let description = reader.optional_column("Description");

        let mut events = Vec::new();
        for row in reader.rows() {
            let row = row?;
            events.push(Event::new(
                micros_to_millis(row.require_int(&start)?),
                EventKind::LogData {
                    description: row.text_or_empty(description.as_ref()),
                },
                None,
                self.offset,
            ));
        }
        Ok(events)
    }
}

/// Proportion of valid samples in `[start, end]`; 1.0 when no sample falls inside
fn window_quality(samples: &[Datapoint], start: i64, end: i64) -> f64 {
    let from = samples.partition_point(|s| s.timestamp < start);
    let to = samples.partition_point(|s| s.timestamp <= end);
    let window = &samples[from..to.max(from)];
    if window.is_empty() {
        return 1.0;
    }
    window.iter().filter(|s| s.is_valid).count() as f64 / window.len() as f64
}

/// Per-eye sample columns of an SMI samples export
struct EyeColumns {
    diameter: Column,
    distance: Column,
    validity: Column,
    por_x: Column,
    por_y: Column,
}

struct EyeReading {
    diameter: Option<f64>,
    distance: Option<f64>,
    validity: Option<i64>,
    point: Option<GazePoint>,
}

impl EyeColumns {
    fn new(reader: &TsvReader<'_>, eye: Eye) -> Result<Self, GazeError> {
        let code = eye.code();
        Ok(Self {
            diameter: reader.column(&format!("{code} Mapped Diameter [mm]"))?,
            distance: reader.column(&format!("{code} EPOS Z"))?,
            validity: reader.column(&format!("{code} Validity"))?,
            por_x: reader.column(&format!("{code} POR X [px]"))?,
            por_y: reader.column(&format!("{code} POR Y [px]"))?,
        })
    }

    fn read(&self, row: &Row<'_>) -> Result<EyeReading, GazeError> {
        Ok(EyeReading {
            diameter: row.float(&self.diameter)?,
            distance: row.float(&self.distance)?,
            validity: row.int(&self.validity)?,
            point: match (row.float(&self.por_x)?, row.float(&self.por_y)?) {
                (Some(x), Some(y)) => Some(GazePoint::new(x, y)),
                _ => None,
            },
        })
    }
}

/// The sections of an SMI events export.
///
/// Each `Table Header for <Section>:` line is followed by the column header of
/// that section; data rows of every section are interleaved below and are told
/// apart by their first field (`Fixation L`, `Saccade R`, `UserEvent`, ...).
struct EventSections<'a> {
    headers: HashMap<&'a str, &'a str>,
    rows: Vec<&'a str>,
}

impl<'a> EventSections<'a> {
    fn split(raw: &'a str) -> Self {
        let mut headers = HashMap::new();
        let mut rows = Vec::new();
        let mut pending: Option<&'a str> = None;

        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(section) = trimmed.strip_prefix(HEADER_PREFIX) {
                pending = Some(section.trim_end_matches(':').trim());
            } else if let Some(section) = pending.take() {
                headers.insert(section, line);
            } else {
                rows.push(line);
            }
        }
        Self { headers, rows }
    }

    /// Header plus the rows whose first field is `row_tag`, as one TSV table
    fn table(&self, section: &str, row_tag: &str) -> Option<String> {
        let header = self.headers.get(section)?;
        let mut table = String::from(*header);
        for row in &self.rows {
            if row.split('\t').next().map(str::trim) == Some(row_tag) {
                table.push('\n');
                table.push_str(row);
            }
        }
        table.push('\n');
        Some(table)
    }
}
