//! Tobii Studio 1.x/2.x adapter
//!
//! Parses the separate All-Data, Fixation-Data and Event-Data exports. The
//! All-Data export of these versions carries no pupil or validity columns, so
//! every sample counts as valid and the blink status stays unknown.

use super::table::{MonotonicClock, TableFormat, TsvReader};
use super::tobii;
use super::TrackerAdapter;
use crate::config::RunConfig;
use crate::error::GazeError;
use crate::types::{
    Datapoint, Event, EventKind, Fixation, GazePoint, MediaOffset, Saccade, TrackerKind,
};

const ALL_DATA: &str = "TobiiV2 All-Data";
const FIXATION_DATA: &str = "TobiiV2 Fixation-Data";
const EVENT_DATA: &str = "TobiiV2 Event-Data";

/// Media name of the screen recording in Tobii Studio 2 exports
pub const DEFAULT_MEDIA_NAME: &str = "Screen Recordings (1)";

/// Tobii Studio 1.x/2.x adapter
#[derive(Debug, Clone)]
pub struct TobiiV2Adapter {
    offset: MediaOffset,
    media_name: String,
    event_header_lines: usize,
    saccade_threshold: f64,
}

impl TobiiV2Adapter {
    pub fn from_config(config: &RunConfig) -> Self {
        let settings = &config.tracker_settings;
        Self {
            offset: config.media_offset,
            media_name: settings
                .media_name
                .clone()
                .unwrap_or_else(|| DEFAULT_MEDIA_NAME.to_string()),
            event_header_lines: settings.event_header_lines,
            saccade_threshold: config.thresholds.valid_samples_prop_saccade,
        }
    }
}

impl TrackerAdapter for TobiiV2Adapter {
    fn kind(&self) -> TrackerKind {
        TrackerKind::TobiiV2
    }

    fn read_samples(&self, raw: &str) -> Result<Vec<Datapoint>, GazeError> {
        let mut reader = TsvReader::new(ALL_DATA, raw, TableFormat::default())?;
        let timestamp = reader.column("RecordingTimestamp")?;
        let avg_x = reader.column("avg_x")?;
        let avg_y = reader.optional_column("avg_y");

        let mut clock = MonotonicClock::default();
        let mut samples = Vec::new();
        for row in reader.rows() {
            let row = row?;
            let ts = row.require_int(&timestamp)?;
            clock.check(&row, ts)?;

            let gaze = match (row.float(&avg_x)?, row.optional_float(avg_y.as_ref())?) {
                (Some(x), Some(y)) => Some(GazePoint::new(x, y).offset_by(self.offset)),
                _ => None,
            };

            samples.push(Datapoint {
                timestamp: ts,
                pupil_size: None,
                pupil_velocity: None,
                distance: None,
                is_valid: true,
                is_valid_blink: None,
                gaze,
                fixation_index: None,
            });
        }
        Ok(samples)
    }

    fn read_fixations(&self, raw: &str) -> Result<Vec<Fixation>, GazeError> {
        let mut reader = TsvReader::new(FIXATION_DATA, raw, TableFormat::default())?;
        let index = reader.column("Unnamed: 0")?;
        let start = reader.column("starttime")?;
        let duration = reader.column("duration")?;
        let end_x = reader.column("endx")?;
        let end_y = reader.column("endy")?;

        let mut fixations = Vec::new();
        for (position, row) in reader.rows().enumerate() {
            let row = row?;
            let fixation_duration = row.require_int(&duration)?;
            if fixation_duration <= 0 {
                log::debug!(
                    "{} line {}: skipping fixation with duration {}",
                    FIXATION_DATA,
                    row.line(),
                    fixation_duration
                );
                continue;
            }
            let point = GazePoint::new(
                row.require_int(&end_x)? as f64,
                row.require_int(&end_y)? as f64,
            );
            fixations.push(Fixation::new(
                row.int(&index)?.unwrap_or(position as i64),
                row.require_int(&start)?,
                fixation_duration,
                point,
                self.offset,
            ));
        }
        Ok(fixations)
    }

    fn read_saccades(&self, raw: &str, _samples: &[Datapoint]) -> Result<Vec<Saccade>, GazeError> {
        tobii::reconstruct_saccades(
            ALL_DATA,
            raw,
            &self.media_name,
            self.saccade_threshold,
            self.offset,
        )
    }

    fn read_events(&self, raw: &str) -> Result<Vec<Event>, GazeError> {
        let format = TableFormat {
            comments: false,
            preamble_lines: self.event_header_lines.saturating_sub(1),
        };
        let mut reader = TsvReader::new(EVENT_DATA, raw, format)?;
        let timestamp = reader.column("Timestamp")?;
        let event = reader.column("Event")?;
        let event_key = reader.optional_column("EventKey");
        let data1 = reader.optional_column("Data1");
        let data2 = reader.optional_column("Data2");
        let descriptor = reader.optional_column("Descriptor");

        let mut events = Vec::new();
        for row in reader.rows() {
            let row = row?;
            let tag = row.text_or_empty(Some(&event));
            let kind = match tag.as_str() {
                "LeftMouseClick" => EventKind::LeftMouseClick {
                    x: row.optional_float(data1.as_ref())?,
                    y: row.optional_float(data2.as_ref())?,
                },
                "RightMouseClick" => EventKind::RightMouseClick {
                    x: row.optional_float(data1.as_ref())?,
                    y: row.optional_float(data2.as_ref())?,
                },
                "KeyPress" => EventKind::KeyPress {
                    key_code: row.optional_int(data1.as_ref())?,
                    key_name: row.text_or_empty(descriptor.as_ref()),
                },
                "LogData" => EventKind::LogData {
                    description: row.text_or_empty(data1.as_ref()),
                },
                _ => EventKind::Other { tag },
            };
            events.push(Event::new(
                row.require_int(&timestamp)?,
                kind,
                row.optional_int(event_key.as_ref())?,
                self.offset,
            ));
        }
        Ok(events)
    }
}
