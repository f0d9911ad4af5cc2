//! Eye tracker adapters
//!
//! This module provides adapters that parse raw tracker exports and map them
//! to the canonical, tracker-agnostic event streams of [`crate::types`].
//! Column contracts stay per tracker; only the derivations below are shared.

mod smi;
mod table;
mod tobii;
mod tobii_v2;
mod tobii_v3;

pub use smi::SmiAdapter;
pub use tobii_v2::TobiiV2Adapter;
pub use tobii_v3::TobiiV3Adapter;

use crate::config::RunConfig;
use crate::error::GazeError;
use crate::types::{Datapoint, Event, Fixation, Saccade, TrackerKind};

/// Trait for eye tracker adapters
pub trait TrackerAdapter {
    fn kind(&self) -> TrackerKind;

    /// Parse the gaze sample export
    fn read_samples(&self, raw: &str) -> Result<Vec<Datapoint>, GazeError>;

    /// Parse the fixation export
    fn read_fixations(&self, raw: &str) -> Result<Vec<Fixation>, GazeError>;

    /// Parse or reconstruct saccades. `samples` are the already parsed samples
    /// of the same recording, used by trackers that score saccades against them.
    fn read_saccades(&self, raw: &str, samples: &[Datapoint]) -> Result<Vec<Saccade>, GazeError>;

    /// Parse the external event export
    fn read_events(&self, raw: &str) -> Result<Vec<Event>, GazeError>;
}

/// Select the adapter for the configured tracker
pub fn adapter_for(config: &RunConfig) -> Box<dyn TrackerAdapter> {
    match config.tracker {
        TrackerKind::TobiiV2 => Box::new(TobiiV2Adapter::from_config(config)),
        TrackerKind::TobiiV3 => Box::new(TobiiV3Adapter::from_config(config)),
        TrackerKind::Smi => Box::new(SmiAdapter::from_config(config)),
    }
}

/// Mean of the values a tracker actually measured (> 0)
pub(crate) fn mean_of_available(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    let measured: Vec<f64> = [left, right]
        .into_iter()
        .flatten()
        .filter(|value| *value > 0.0)
        .collect();
    if measured.is_empty() {
        None
    } else {
        Some(measured.iter().sum::<f64>() / measured.len() as f64)
    }
}

/// Derives pupil size and pupil velocity along a sample stream
#[derive(Debug, Default)]
pub(crate) struct PupilDeriver {
    previous: Option<(i64, f64)>,
}

impl PupilDeriver {
    /// Returns `(pupil_size, pupil_velocity)` for the next sample.
    ///
    /// Velocity needs a pupil size on both this and the previous sample and
    /// both must be valid, so it is `None` at stream start and right after any
    /// invalid sample or sample without a pupil size.
    pub fn next(
        &mut self,
        timestamp: i64,
        is_valid: bool,
        left: Option<f64>,
        right: Option<f64>,
    ) -> (Option<f64>, Option<f64>) {
        let size = mean_of_available(left, right);
        let tracked = size.filter(|_| is_valid);
        let velocity = match (self.previous, tracked) {
            (Some((last_ts, last_size)), Some(size)) if timestamp > last_ts => {
                Some((size - last_size).abs() / (timestamp - last_ts) as f64)
            }
            _ => None,
        };
        self.previous = tracked.map(|size| (timestamp, size));
        (size, velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_available_excludes_missing_eyes() {
        assert_eq!(mean_of_available(Some(3.0), Some(5.0)), Some(4.0));
        assert_eq!(mean_of_available(Some(3.0), Some(-1.0)), Some(3.0));
        assert_eq!(mean_of_available(None, Some(5.0)), Some(5.0));
        assert_eq!(mean_of_available(None, Some(0.0)), None);
    }

    #[test]
    fn test_pupil_velocity_resets_after_missing_pupil() {
        let mut deriver = PupilDeriver::default();
        assert_eq!(deriver.next(0, true, Some(3.0), Some(3.0)), (Some(3.0), None));

        let (_, velocity) = deriver.next(10, true, Some(4.0), Some(4.0));
        assert!((velocity.unwrap() - 0.1).abs() < 1e-9);

        assert_eq!(deriver.next(20, true, None, Some(-1.0)), (None, None));
        assert_eq!(deriver.next(30, true, Some(4.0), None), (Some(4.0), None));

        let (_, velocity) = deriver.next(40, true, Some(5.0), None);
        assert!((velocity.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_pupil_velocity_resets_after_invalid_sample() {
        let mut deriver = PupilDeriver::default();
        assert_eq!(deriver.next(0, true, Some(3.0), Some(3.0)), (Some(3.0), None));
        // an untracked sample keeps its size but never feeds velocity
        assert_eq!(deriver.next(10, false, Some(4.0), Some(4.0)), (Some(4.0), None));
        assert_eq!(deriver.next(20, true, Some(3.0), Some(3.0)), (Some(3.0), None));

        let (_, velocity) = deriver.next(30, true, Some(4.0), Some(4.0));
        assert!((velocity.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_adapter_selection() {
        for kind in [TrackerKind::TobiiV2, TrackerKind::TobiiV3, TrackerKind::Smi] {
            let adapter = adapter_for(&RunConfig::new(kind));
            assert_eq!(adapter.kind(), kind);
        }
    }
}
