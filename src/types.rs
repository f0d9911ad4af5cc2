//! Core types for the Gaze Flux pipeline
//!
//! This module defines the canonical, tracker-agnostic event streams produced by
//! the tracker adapters: gaze samples, fixations, saccades and external events.

use crate::error::GazeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Eye tracker identifier, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    TobiiV2,
    TobiiV3,
    Smi,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::TobiiV2 => "tobiiv2",
            TrackerKind::TobiiV3 => "tobiiv3",
            TrackerKind::Smi => "smi",
        }
    }
}

impl FromStr for TrackerKind {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tobiiv2" => Ok(TrackerKind::TobiiV2),
            "tobiiv3" => Ok(TrackerKind::TobiiV3),
            "smi" => Ok(TrackerKind::Smi),
            _ => Err(GazeError::UnknownTracker(s.to_string())),
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen coordinate in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,
}

impl GazePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &GazePoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Translate a point from screen space into media space
    pub fn offset_by(self, offset: MediaOffset) -> Self {
        Self {
            x: self.x - offset.x,
            y: self.y - offset.y,
        }
    }
}

/// Position of the recorded media on screen, subtracted from tracker coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaOffset {
    pub x: f64,
    pub y: f64,
}

/// One raw gaze sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Recording timestamp (ms)
    pub timestamp: i64,
    /// Mean of the available eyes' pupil sizes
    pub pupil_size: Option<f64>,
    /// |Δ pupil size| / Δt against the previous sample, if both carried a size
    pub pupil_velocity: Option<f64>,
    /// Mean eye-to-tracker distance
    pub distance: Option<f64>,
    pub is_valid: bool,
    /// Whether both eyes were tracked; `None` when the tracker gives no per-eye codes
    pub is_valid_blink: Option<bool>,
    pub gaze: Option<GazePoint>,
    pub fixation_index: Option<i64>,
}

/// A period of stable gaze
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub index: i64,
    /// Start timestamp (ms)
    pub timestamp: i64,
    /// Duration (ms, > 0)
    pub duration: i64,
    pub point: GazePoint,
}

impl Fixation {
    pub fn new(
        index: i64,
        timestamp: i64,
        duration: i64,
        point: GazePoint,
        offset: MediaOffset,
    ) -> Self {
        Self {
            index,
            timestamp,
            duration,
            point: point.offset_by(offset),
        }
    }

    pub fn end(&self) -> i64 {
        self.timestamp + self.duration
    }
}

/// A rapid eye movement between two fixations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saccade {
    pub index: i64,
    pub timestamp: i64,
    pub duration: i64,
    pub start: GazePoint,
    pub end: GazePoint,
    /// Path length over the sampled points (px)
    pub distance: f64,
    /// distance / duration (px/ms)
    pub speed: f64,
    pub acceleration: Option<f64>,
    /// Valid samples / total samples over the saccade window
    pub quality: f64,
}

/// Saccade measurements awaiting the quality gate
#[derive(Debug, Clone, PartialEq)]
pub struct SaccadeCandidate {
    pub index: i64,
    pub timestamp: i64,
    pub duration: i64,
    pub start: GazePoint,
    pub end: GazePoint,
    pub distance: f64,
    pub acceleration: Option<f64>,
    pub quality: f64,
}

impl SaccadeCandidate {
    /// Build a candidate from the sampled path of a saccade window.
    ///
    /// Returns `None` for an empty path or a non-positive duration.
    pub fn from_path(
        index: i64,
        path: &[(i64, GazePoint)],
        end_timestamp: i64,
        quality: f64,
    ) -> Option<Self> {
        let (start_ts, start) = *path.first()?;
        let (_, end) = *path.last()?;
        let duration = end_timestamp - start_ts;
        if duration <= 0 {
            return None;
        }
        let distance = path
            .windows(2)
            .map(|pair| pair[0].1.distance_to(&pair[1].1))
            .sum();

        Some(Self {
            index,
            timestamp: start_ts,
            duration,
            start,
            end,
            distance,
            acceleration: None,
            quality,
        })
    }

    /// Apply the quality gate and media offset. Windows below `threshold` are dropped.
    pub fn into_saccade(self, threshold: f64, offset: MediaOffset) -> Option<Saccade> {
        if self.quality < threshold || self.duration <= 0 {
            return None;
        }
        Some(Saccade {
            index: self.index,
            timestamp: self.timestamp,
            duration: self.duration,
            start: self.start.offset_by(offset),
            end: self.end.offset_by(offset),
            distance: self.distance,
            speed: self.distance / self.duration as f64,
            acceleration: self.acceleration,
            quality: self.quality,
        })
    }
}

/// Kind-specific payload of an external log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    LeftMouseClick { x: Option<f64>, y: Option<f64> },
    RightMouseClick { x: Option<f64>, y: Option<f64> },
    KeyPress { key_code: Option<i64>, key_name: String },
    LogData { description: String },
    Other { tag: String },
}

/// An external-log event (mouse, keyboard, annotations)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: i64,
    pub kind: EventKind,
    pub event_key: Option<i64>,
}

impl Event {
    pub fn new(timestamp: i64, kind: EventKind, event_key: Option<i64>, offset: MediaOffset) -> Self {
        let kind = match kind {
            EventKind::LeftMouseClick { x, y } => EventKind::LeftMouseClick {
                x: x.map(|x| x - offset.x),
                y: y.map(|y| y - offset.y),
            },
            EventKind::RightMouseClick { x, y } => EventKind::RightMouseClick {
                x: x.map(|x| x - offset.x),
                y: y.map(|y| y - offset.y),
            },
            other => other,
        };
        Self {
            timestamp,
            kind,
            event_key,
        }
    }
}

/// Flags describing data-quality problems of a segment or scene.
///
/// These never abort processing; they surface alongside the validity features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    NoSamples,
    BelowValidityThreshold,
    InvalidGapTooLong,
    BlinkStatusUnknown,
    SplitFromLowQuality,
    NoValidSegments,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_kind_from_str() {
        assert_eq!("TobiiV3".parse::<TrackerKind>().unwrap(), TrackerKind::TobiiV3);
        assert_eq!("smi".parse::<TrackerKind>().unwrap(), TrackerKind::Smi);
        let err = "EyeLink".parse::<TrackerKind>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_fixation_applies_media_offset() {
        let fix = Fixation::new(
            1,
            100,
            250,
            GazePoint::new(500.0, 400.0),
            MediaOffset { x: 100.0, y: 50.0 },
        );
        assert_eq!(fix.point, GazePoint::new(400.0, 350.0));
        assert_eq!(fix.end(), 350);
    }

    #[test]
    fn test_candidate_path_distance_and_speed() {
        let path = vec![
            (0, GazePoint::new(0.0, 0.0)),
            (10, GazePoint::new(3.0, 4.0)),
            (20, GazePoint::new(6.0, 8.0)),
        ];
        let candidate = SaccadeCandidate::from_path(7, &path, 20, 1.0).unwrap();
        assert_eq!(candidate.duration, 20);
        assert!((candidate.distance - 10.0).abs() < 1e-9);

        let saccade = candidate.into_saccade(0.5, MediaOffset::default()).unwrap();
        assert!((saccade.speed - 0.5).abs() < 1e-9);
        assert_eq!(saccade.end, GazePoint::new(6.0, 8.0));
    }

    #[test]
    fn test_candidate_below_threshold_is_dropped() {
        let path = vec![(0, GazePoint::new(0.0, 0.0)), (10, GazePoint::new(1.0, 1.0))];
        let candidate = SaccadeCandidate::from_path(1, &path, 10, 0.25).unwrap();
        assert!(candidate.into_saccade(0.6, MediaOffset::default()).is_none());
    }

    #[test]
    fn test_event_mouse_offset() {
        let event = Event::new(
            10,
            EventKind::LeftMouseClick {
                x: Some(300.0),
                y: Some(200.0),
            },
            None,
            MediaOffset { x: 100.0, y: 100.0 },
        );
        assert_eq!(
            event.kind,
            EventKind::LeftMouseClick {
                x: Some(200.0),
                y: Some(100.0)
            }
        );
    }
}
