//! Pieces shared by the Tobii Studio adapters
//!
//! Both Tobii generations label each All-Data row with a gaze-event type,
//! which feeds the saccade reconstructor, and mix rows of several media in
//! one export.

use super::table::{Column, Row, TableFormat, TsvReader};
use crate::error::GazeError;
use crate::saccade::{GazeEventKind, GazeEventSample, SaccadeReconstructor};
use crate::types::{GazePoint, MediaOffset, Saccade};
use crate::validity::{classify_sample, ValidityRule};

/// Tobii validity codes: 0 (certain) .. 4 (eye not found); below 2 is tracked
pub(crate) const TOBII_VALIDITY: ValidityRule = ValidityRule::Below(2);

/// Selects the rows recorded on the configured media
pub(crate) struct RecordingFilter {
    media_name: String,
    media: Column,
    eye_tracker_timestamp: Column,
}

impl RecordingFilter {
    pub fn new(reader: &TsvReader<'_>, media_name: &str) -> Result<Self, GazeError> {
        Ok(Self {
            media_name: media_name.to_string(),
            media: reader.column("MediaName")?,
            eye_tracker_timestamp: reader.column("EyeTrackerTimestamp")?,
        })
    }

    pub fn accepts(&self, row: &Row<'_>) -> bool {
        row.text(&self.media) == Some(self.media_name.as_str())
            && row.text(&self.eye_tracker_timestamp).is_some()
    }
}

/// Columns of a screen-space point given as an X/Y pair
pub(crate) struct PointColumns {
    x: Column,
    y: Column,
}

impl PointColumns {
    pub fn new(reader: &TsvReader<'_>, x: &str, y: &str) -> Result<Self, GazeError> {
        Ok(Self {
            x: reader.column(x)?,
            y: reader.column(y)?,
        })
    }

    /// The point, when both coordinates are present
    pub fn read(&self, row: &Row<'_>) -> Result<Option<GazePoint>, GazeError> {
        Ok(match (row.float(&self.x)?, row.float(&self.y)?) {
            (Some(x), Some(y)) => Some(GazePoint::new(x, y)),
            _ => None,
        })
    }
}

/// Per-eye validity code columns
pub(crate) struct EyeValidityColumns {
    left: Column,
    right: Column,
}

impl EyeValidityColumns {
    pub fn new(reader: &TsvReader<'_>) -> Result<Self, GazeError> {
        Ok(Self {
            left: reader.column("ValidityLeft")?,
            right: reader.column("ValidityRight")?,
        })
    }

    pub fn codes(&self, row: &Row<'_>) -> Result<(Option<i64>, Option<i64>), GazeError> {
        Ok((row.int(&self.left)?, row.int(&self.right)?))
    }
}

/// Read the labelled gaze-event stream of the configured media
pub(crate) fn read_gaze_events(
    source_name: &str,
    raw: &str,
    media_name: &str,
) -> Result<Vec<GazeEventSample>, GazeError> {
    let mut reader = TsvReader::new(source_name, raw, TableFormat::default())?;
    let filter = RecordingFilter::new(&reader, media_name)?;
    let timestamp = reader.column("RecordingTimestamp")?;
    let event_type = reader.column("GazeEventType")?;
    let saccade_index = reader.optional_column("SaccadeIndex");
    let validity = EyeValidityColumns::new(&reader)?;
    let gaze = PointColumns::new(&reader, "GazePointX (ADCSpx)", "GazePointY (ADCSpx)")?;
    let fixation_point =
        PointColumns::new(&reader, "FixationPointX (MCSpx)", "FixationPointY (MCSpx)")?;

    let mut samples = Vec::new();
    for row in reader.rows() {
        let row = row?;
        if !filter.accepts(&row) {
            continue;
        }
        let (left, right) = validity.codes(&row)?;
        samples.push(GazeEventSample {
            timestamp: row.require_int(&timestamp)?,
            kind: GazeEventKind::from_label(row.text(&event_type).unwrap_or_default()),
            gaze: gaze.read(&row)?,
            gaze_valid: classify_sample(TOBII_VALIDITY, left, right).is_valid,
            fixation_point: fixation_point.read(&row)?,
            saccade_index: row.optional_int(saccade_index.as_ref())?,
        });
    }
    Ok(samples)
}

/// Reconstruct the saccades of a Tobii All-Data export
pub(crate) fn reconstruct_saccades(
    source_name: &str,
    raw: &str,
    media_name: &str,
    threshold: f64,
    offset: MediaOffset,
) -> Result<Vec<Saccade>, GazeError> {
    let stream = read_gaze_events(source_name, raw, media_name)?;
    let saccades = SaccadeReconstructor::reconstruct(stream, threshold, offset);
    log::debug!("{}: reconstructed {} saccades", source_name, saccades.len());
    Ok(saccades)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "MediaName\tEyeTrackerTimestamp\tRecordingTimestamp\tGazeEventType\tSaccadeIndex\tValidityLeft\tValidityRight\tGazePointX (ADCSpx)\tGazePointY (ADCSpx)\tFixationPointX (MCSpx)\tFixationPointY (MCSpx)";

    #[test]
    fn test_gaze_events_skip_other_media() {
        let raw = format!(
            "{HEADER}\n\
             ScreenRec\t1000\t0\tFixation\t\t0\t0\t100\t100\t100\t100\n\
             Intro\t1010\t10\tSaccade\t1\t0\t0\t150\t100\t\t\n\
             ScreenRec\t\t15\tSaccade\t1\t0\t0\t150\t100\t\t\n\
             ScreenRec\t1020\t20\tSaccade\t1\t4\t4\t\t\t\t\n"
        );
        let samples = read_gaze_events("All-Data", &raw, "ScreenRec").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].kind, GazeEventKind::Fixation);
        assert_eq!(samples[0].fixation_point, Some(GazePoint::new(100.0, 100.0)));
        assert!(samples[1].gaze.is_none());
        assert!(!samples[1].gaze_valid);
        assert_eq!(samples[1].saccade_index, Some(1));
    }

    #[test]
    fn test_reconstruct_from_export() {
        let raw = format!(
            "{HEADER}\n\
             ScreenRec\t1000\t0\tFixation\t\t0\t0\t100\t100\t100\t100\n\
             ScreenRec\t1010\t10\tFixation\t\t0\t0\t100\t100\t100\t100\n\
             ScreenRec\t1020\t20\tSaccade\t3\t0\t1\t150\t100\t\t\n\
             ScreenRec\t1030\t30\tSaccade\t3\t1\t0\t250\t100\t\t\n\
             ScreenRec\t1040\t40\tFixation\t\t0\t0\t300\t100\t300\t100\n"
        );
        let saccades =
            reconstruct_saccades("All-Data", &raw, "ScreenRec", 1.0, MediaOffset::default())
                .unwrap();
        assert_eq!(saccades.len(), 1);
        assert_eq!(saccades[0].index, 3);
        assert_eq!(saccades[0].duration, 30);
        assert_eq!(saccades[0].quality, 1.0);
    }

    #[test]
    fn test_missing_gaze_event_column() {
        let raw = "MediaName\tEyeTrackerTimestamp\tRecordingTimestamp\nScreenRec\t1\t0\n";
        let err = read_gaze_events("All-Data", raw, "ScreenRec").unwrap_err();
        assert!(matches!(err, GazeError::MissingColumn { .. }));
    }
}
