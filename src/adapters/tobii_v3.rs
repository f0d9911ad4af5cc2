//! Tobii Studio 3.x adapter
//!
//! Tobii Studio 3 writes a single All-Data export holding samples, fixation
//! labels and external events. Only rows recorded on the configured media with
//! an eye tracker timestamp are gaze samples.

use super::table::{MonotonicClock, TableFormat, TsvReader};
use super::tobii::{self, EyeValidityColumns, PointColumns, RecordingFilter, TOBII_VALIDITY};
use super::{mean_of_available, PupilDeriver, TrackerAdapter};
use crate::config::RunConfig;
use crate::error::GazeError;
use crate::types::{Datapoint, Event, EventKind, Fixation, MediaOffset, Saccade, TrackerKind};
use crate::validity::classify_sample;

const ALL_DATA: &str = "TobiiV3 All-Data";

/// Media name of the screen recording in Tobii Studio 3 exports
pub const DEFAULT_MEDIA_NAME: &str = "ScreenRec";

/// Tobii Studio 3.x adapter
#[derive(Debug, Clone)]
pub struct TobiiV3Adapter {
    offset: MediaOffset,
    media_name: String,
    saccade_threshold: f64,
}

impl TobiiV3Adapter {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            offset: config.media_offset,
            media_name: config
                .tracker_settings
                .media_name
                .clone()
                .unwrap_or_else(|| DEFAULT_MEDIA_NAME.to_string()),
            saccade_threshold: config.thresholds.valid_samples_prop_saccade,
        }
    }
}

impl TrackerAdapter for TobiiV3Adapter {
    fn kind(&self) -> TrackerKind {
        TrackerKind::TobiiV3
    }

    fn read_samples(&self, raw: &str) -> Result<Vec<Datapoint>, GazeError> {
        let mut reader = TsvReader::new(ALL_DATA, raw, TableFormat::default())?;
        let filter = RecordingFilter::new(&reader, &self.media_name)?;
        let timestamp = reader.column("RecordingTimestamp")?;
        let pupil_left = reader.column("PupilLeft")?;
        let pupil_right = reader.column("PupilRight")?;
        let distance_left = reader.column("DistanceLeft")?;
        let distance_right = reader.column("DistanceRight")?;
        let validity = EyeValidityColumns::new(&reader)?;
        let gaze = PointColumns::new(&reader, "GazePointX (ADCSpx)", "GazePointY (ADCSpx)")?;
        let fixation_index = reader.optional_column("FixationIndex");

        let mut clock = MonotonicClock::default();
        let mut pupils = PupilDeriver::default();
        let mut samples = Vec::new();
        for row in reader.rows() {
            let row = row?;
            if !filter.accepts(&row) {
                continue;
            }
            let ts = row.require_int(&timestamp)?;
            clock.check(&row, ts)?;

            let (left, right) = validity.codes(&row)?;
            let classified = classify_sample(TOBII_VALIDITY, left, right);
            let (pupil_size, pupil_velocity) = pupils.next(
                ts,
                classified.is_valid,
                row.float(&pupil_left)?,
                row.float(&pupil_right)?,
            );

            samples.push(Datapoint {
                timestamp: ts,
                pupil_size,
                pupil_velocity,
                distance: mean_of_available(
                    row.float(&distance_left)?,
                    row.float(&distance_right)?,
                ),
                is_valid: classified.is_valid,
                is_valid_blink: classified.is_valid_blink,
                gaze: gaze.read(&row)?.map(|point| point.offset_by(self.offset)),
                fixation_index: row.optional_int(fixation_index.as_ref())?,
            });
        }
        Ok(samples)
    }

    fn read_fixations(&self, raw: &str) -> Result<Vec<Fixation>, GazeError> {
        let mut reader = TsvReader::new(ALL_DATA, raw, TableFormat::default())?;
        let filter = RecordingFilter::new(&reader, &self.media_name)?;
        let timestamp = reader.column("RecordingTimestamp")?;
        let event_type = reader.column("GazeEventType")?;
        let index = reader.column("FixationIndex")?;
        let duration = reader.column("GazeEventDuration")?;
        let point = PointColumns::new(&reader, "FixationPointX (MCSpx)", "FixationPointY (MCSpx)")?;

        let mut fixations = Vec::new();
        let mut current_index = None;
        for row in reader.rows() {
            let row = row?;
            if !filter.accepts(&row) || row.text(&event_type) != Some("Fixation") {
                continue;
            }
            let Some(fixation_index) = row.int(&index)? else {
                continue;
            };
            if current_index == Some(fixation_index) {
                continue;
            }
            current_index = Some(fixation_index);

            let fixation_duration = row.require_int(&duration)?;
            let Some(fixation_point) = point.read(&row)? else {
                log::debug!(
                    "{} line {}: fixation {} has no fixation point",
                    ALL_DATA,
                    row.line(),
                    fixation_index
                );
                continue;
            };
            if fixation_duration <= 0 {
                log::debug!(
                    "{} line {}: skipping fixation {} with duration {}",
                    ALL_DATA,
                    row.line(),
                    fixation_index,
                    fixation_duration
                );
                continue;
            }
            fixations.push(Fixation::new(
                fixation_index,
                row.require_int(&timestamp)?,
                fixation_duration,
                fixation_point,
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
        let mut reader = TsvReader::new(ALL_DATA, raw, TableFormat::default())?;
        let timestamp = reader.column("RecordingTimestamp")?;
        let mouse = reader.optional_column("MouseEvent");
        let mouse_x = reader.optional_column("MouseEventX (ADCSpx)");
        let mouse_y = reader.optional_column("MouseEventY (ADCSpx)");
        let key = reader.optional_column("KeyPressEvent");
        let studio = reader.optional_column("StudioEvent");
        let studio_data = reader.optional_column("StudioEventData");

        let mut events = Vec::new();
        for row in reader.rows() {
            let row = row?;
            let mouse_event = row.text_or_empty(mouse.as_ref());
            let key_event = row.text_or_empty(key.as_ref());
            let studio_event = row.text_or_empty(studio.as_ref());

            let kind = if !mouse_event.is_empty() {
                let x = row.optional_float(mouse_x.as_ref())?;
                let y = row.optional_float(mouse_y.as_ref())?;
                if mouse_event.starts_with("Left") {
                    EventKind::LeftMouseClick { x, y }
                } else if mouse_event.starts_with("Right") {
                    EventKind::RightMouseClick { x, y }
                } else {
                    EventKind::Other { tag: mouse_event }
                }
            } else if !key_event.is_empty() {
                EventKind::KeyPress {
                    key_code: None,
                    key_name: key_event,
                }
            } else if !studio_event.is_empty() {
                if studio_event == "LogData" {
                    EventKind::LogData {
                        description: row.text_or_empty(studio_data.as_ref()),
                    }
                } else {
                    EventKind::Other { tag: studio_event }
                }
            } else {
                continue;
            };

            events.push(Event::new(
                row.require_int(&timestamp)?,
                kind,
                None,
                self.offset,
            ));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GazePoint;

    const HEADER: &str = "MediaName\tEyeTrackerTimestamp\tRecordingTimestamp\tGazeEventType\tGazeEventDuration\tFixationIndex\tSaccadeIndex\tPupilLeft\tPupilRight\tDistanceLeft\tDistanceRight\tValidityLeft\tValidityRight\tGazePointX (ADCSpx)\tGazePointY (ADCSpx)\tFixationPointX (MCSpx)\tFixationPointY (MCSpx)\tMouseEvent\tMouseEventX (ADCSpx)\tMouseEventY (ADCSpx)\tKeyPressEvent\tStudioEvent\tStudioEventData";

    fn export() -> String {
        [
            HEADER,
            "ScreenRec\t\t0\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\t\tScreenRecStarted\t",
            "ScreenRec\t1000\t0\tFixation\t40\t1\t\t3.0\t3.2\t600\t620\t0\t0\t100\t100\t100\t100\t\t\t\t\t\t",
            "ScreenRec\t1010\t10\tFixation\t40\t1\t\t3.2\t3.4\t600\t620\t0\t4\t102\t100\t100\t100\t\t\t\t\t\t",
            "ScreenRec\t\t15\t\t\t\t\t\t\t\t\t\t\t\t\t\t\tLeft\t300\t200\t\t\t",
            "ScreenRec\t1020\t20\tSaccade\t20\t\t1\t-1\t-1\t\t\t4\t4\t\t\t\t\t\t\t\t\t\t",
            "ScreenRec\t1030\t30\tSaccade\t20\t\t1\t3.4\t3.4\t600\t620\t0\t0\t200\t100\t\t\t\t\t\t\t\t",
            "ScreenRec\t1040\t40\tFixation\t60\t2\t\t3.4\t3.6\t600\t620\t0\t0\t300\t100\t300\t100\t\t\t\tA\t\t",
            "Intro\t1050\t50\tFixation\t60\t9\t\t3.4\t3.6\t600\t620\t0\t0\t300\t100\t300\t100\t\t\t\t\t\t",
        ]
        .join("\n")
    }

    fn adapter() -> TobiiV3Adapter {
        TobiiV3Adapter::from_config(&RunConfig::new(TrackerKind::TobiiV3))
    }

    #[test]
    fn test_read_samples_filters_media_and_classifies() {
        let samples = adapter().read_samples(&export()).unwrap();
        assert_eq!(samples.len(), 5);

        assert!(samples[0].is_valid);
        assert_eq!(samples[0].is_valid_blink, Some(true));
        assert_eq!(samples[0].pupil_velocity, None);
        assert!((samples[0].pupil_size.unwrap() - 3.1).abs() < 1e-9);
        assert_eq!(samples[0].distance, Some(610.0));

        // one eye lost: still valid, not blink-valid
        assert!(samples[1].is_valid);
        assert_eq!(samples[1].is_valid_blink, Some(false));
        assert!((samples[1].pupil_velocity.unwrap() - 0.02).abs() < 1e-9);

        // both eyes lost: no pupil, velocity resets on the next sample
        assert!(!samples[2].is_valid);
        assert_eq!(samples[2].pupil_size, None);
        assert_eq!(samples[2].gaze, None);
        assert_eq!(samples[3].pupil_velocity, None);
    }

    #[test]
    fn test_pupil_velocity_skips_untracked_sample() {
        let export = [
            HEADER,
            "ScreenRec\t1000\t0\tFixation\t30\t1\t\t3.0\t3.0\t600\t600\t0\t0\t100\t100\t100\t100\t\t\t\t\t\t",
            "ScreenRec\t1010\t10\tFixation\t30\t1\t\t4.0\t4.0\t600\t600\t3\t3\t100\t100\t100\t100\t\t\t\t\t\t",
            "ScreenRec\t1020\t20\tFixation\t30\t1\t\t3.0\t3.0\t600\t600\t0\t0\t100\t100\t100\t100\t\t\t\t\t\t",
        ]
        .join("\n");
        let samples = adapter().read_samples(&export).unwrap();

        let valid: Vec<bool> = samples.iter().map(|s| s.is_valid).collect();
        assert_eq!(valid, vec![true, false, true]);
        // the invalid row still reports its pupil diameter
        assert_eq!(samples[1].pupil_size, Some(4.0));
        let velocities: Vec<Option<f64>> = samples.iter().map(|s| s.pupil_velocity).collect();
        assert_eq!(velocities, vec![None, None, None]);
    }

    #[test]
    fn test_read_fixations_one_per_index() {
        let fixations = adapter().read_fixations(&export()).unwrap();
        assert_eq!(fixations.len(), 2);
        assert_eq!(fixations[0].index, 1);
        assert_eq!(fixations[0].duration, 40);
        assert_eq!(fixations[1].timestamp, 40);
        assert_eq!(fixations[1].point, GazePoint::new(300.0, 100.0));
    }

    #[test]
    fn test_read_saccades_reconstructs() {
        let mut config = RunConfig::new(TrackerKind::TobiiV3);
        config.thresholds.valid_samples_prop_saccade = 0.6;
        let saccades = TobiiV3Adapter::from_config(&config)
            .read_saccades(&export(), &[])
            .unwrap();
        // last gaze (valid), invalid saccade sample, valid sample, boundary: 3 of 4
        assert_eq!(saccades.len(), 1);
        assert!((saccades[0].quality - 0.75).abs() < 1e-9);
        assert_eq!(saccades[0].timestamp, 10);
        assert_eq!(saccades[0].duration, 30);
    }

    #[test]
    fn test_read_events() {
        let events = adapter().read_events(&export()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0].kind,
            EventKind::Other {
                tag: "ScreenRecStarted".to_string()
            }
        );
        assert_eq!(
            events[1].kind,
            EventKind::LeftMouseClick {
                x: Some(300.0),
                y: Some(200.0)
            }
        );
        assert_eq!(events[1].timestamp, 15);
        assert!(matches!(events[2].kind, EventKind::KeyPress { ref key_name, .. } if key_name == "A"));
    }
}
