//! Saccade reconstruction
//!
//! Trackers that only label each sample with a gaze-event type (Tobii) do not
//! export saccades. [`SaccadeReconstructor`] rebuilds them from the labelled
//! sample stream with an explicit state machine:
//!
//! ```text
//! AwaitingFixation --Fixation--> InFixation --Saccade--> InSaccade --Fixation--> InFixation
//! ```
//!
//! Each closed saccade window is scored as `valid samples / total samples` and
//! emitted only when the score reaches the configured threshold.

use crate::types::{GazePoint, MediaOffset, Saccade, SaccadeCandidate};

/// Gaze-event label attached to a sample by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeEventKind {
    Fixation,
    Saccade,
    Unclassified,
}

impl GazeEventKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Fixation" => GazeEventKind::Fixation,
            "Saccade" => GazeEventKind::Saccade,
            _ => GazeEventKind::Unclassified,
        }
    }
}

/// One labelled sample fed to the reconstructor
#[derive(Debug, Clone, PartialEq)]
pub struct GazeEventSample {
    pub timestamp: i64,
    pub kind: GazeEventKind,
    /// Gaze coordinate, when the tracker reported one
    pub gaze: Option<GazePoint>,
    /// Whether the eye validity codes accept the sample
    pub gaze_valid: bool,
    /// Tracker's estimate of the current fixation point
    pub fixation_point: Option<GazePoint>,
    pub saccade_index: Option<i64>,
}

impl GazeEventSample {
    fn valid_gaze(&self) -> Option<GazePoint> {
        self.gaze.filter(|_| self.gaze_valid)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SaccadeWindow {
    index: i64,
    path: Vec<(i64, GazePoint)>,
    valid_samples: u32,
    total_samples: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum ReconstructorState {
    AwaitingFixation,
    InFixation { unclassified_run: u32 },
    InSaccade(SaccadeWindow),
}

/// State machine turning a labelled sample stream into saccades
#[derive(Debug)]
pub struct SaccadeReconstructor {
    state: ReconstructorState,
    /// Last known gaze coordinate and whether it came from a valid sample
    last_gaze: Option<((i64, GazePoint), bool)>,
    threshold: f64,
    offset: MediaOffset,
    next_index: i64,
    saccades: Vec<Saccade>,
}

impl SaccadeReconstructor {
    pub fn new(threshold: f64, offset: MediaOffset) -> Self {
        Self {
            state: ReconstructorState::AwaitingFixation,
            last_gaze: None,
            threshold,
            offset,
            next_index: 1,
            saccades: Vec::new(),
        }
    }

    /// Reconstruct every saccade of a complete stream
    pub fn reconstruct<I>(samples: I, threshold: f64, offset: MediaOffset) -> Vec<Saccade>
    where
        I: IntoIterator<Item = GazeEventSample>,
    {
        let mut reconstructor = Self::new(threshold, offset);
        for sample in samples {
            reconstructor.push(&sample);
        }
        reconstructor.finish()
    }

    /// Feed the next sample of the stream
    pub fn push(&mut self, sample: &GazeEventSample) {
        let state = std::mem::replace(&mut self.state, ReconstructorState::AwaitingFixation);

        self.state = match (state, sample.kind) {
            (ReconstructorState::AwaitingFixation, GazeEventKind::Fixation) => {
                ReconstructorState::InFixation { unclassified_run: 0 }
            }
            (ReconstructorState::AwaitingFixation, _) => ReconstructorState::AwaitingFixation,

            (ReconstructorState::InFixation { .. }, GazeEventKind::Fixation) => {
                ReconstructorState::InFixation { unclassified_run: 0 }
            }
            (ReconstructorState::InFixation { unclassified_run }, GazeEventKind::Unclassified) => {
                ReconstructorState::InFixation {
                    unclassified_run: unclassified_run + 1,
                }
            }
            (ReconstructorState::InFixation { unclassified_run }, GazeEventKind::Saccade) => {
                ReconstructorState::InSaccade(self.open_window(sample, unclassified_run))
            }

            (ReconstructorState::InSaccade(mut window), GazeEventKind::Saccade) => {
                if let Some(point) = sample.valid_gaze() {
                    window.path.push((sample.timestamp, point));
                    window.valid_samples += 1;
                }
                window.total_samples += 1;
                ReconstructorState::InSaccade(window)
            }
            (ReconstructorState::InSaccade(mut window), GazeEventKind::Unclassified) => {
                window.total_samples += 1;
                ReconstructorState::InSaccade(window)
            }
            (ReconstructorState::InSaccade(window), GazeEventKind::Fixation) => {
                self.close_window(window, sample);
                ReconstructorState::InFixation { unclassified_run: 0 }
            }
        };

        self.remember_gaze(sample);
    }

    /// Finish the stream. A saccade still open at the end is dropped.
    pub fn finish(self) -> Vec<Saccade> {
        self.saccades
    }

    fn open_window(&mut self, sample: &GazeEventSample, unclassified_run: u32) -> SaccadeWindow {
        let index = sample.saccade_index.unwrap_or(self.next_index);
        self.next_index = index + 1;

        let mut window = SaccadeWindow {
            index,
            path: Vec::new(),
            valid_samples: 0,
            // the boundary sample of the previous fixation, the current one and
            // every unclassified sample in between
            total_samples: 2 + unclassified_run,
        };

        if let Some((coord, last_valid)) = self.last_gaze {
            window.path.push(coord);
            if last_valid {
                window.valid_samples += 1;
            }
        }
        if let Some(point) = sample.valid_gaze() {
            window.path.push((sample.timestamp, point));
            window.valid_samples += 1;
        }
        window
    }

    fn close_window(&mut self, mut window: SaccadeWindow, boundary: &GazeEventSample) {
        if let Some(point) = boundary.valid_gaze().or(boundary.fixation_point) {
            window.path.push((boundary.timestamp, point));
            window.valid_samples += 1;
        }
        window.total_samples += 1;

        let quality = window.valid_samples as f64 / window.total_samples as f64;
        let accepted = SaccadeCandidate::from_path(
            window.index,
            &window.path,
            boundary.timestamp,
            quality,
        )
        .and_then(|candidate| candidate.into_saccade(self.threshold, self.offset));

        match accepted {
            Some(saccade) => self.saccades.push(saccade),
            None => log::trace!(
                "dropping saccade window {} (quality {:.2})",
                window.index,
                quality
            ),
        }
    }

    fn remember_gaze(&mut self, sample: &GazeEventSample) {
        if let Some(point) = sample.gaze {
            self.last_gaze = Some(((sample.timestamp, point), sample.gaze_valid));
        } else if sample.kind == GazeEventKind::Fixation {
            if let Some(point) = sample.fixation_point {
                self.last_gaze = Some(((sample.timestamp, point), true));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GazeEventKind::{Fixation, Saccade as Sacc, Unclassified};
    use super::*;

    fn labelled(timestamp: i64, kind: GazeEventKind, x: f64, valid: bool) -> GazeEventSample {
        GazeEventSample {
            timestamp,
            kind,
            gaze: Some(GazePoint::new(x, 100.0)),
            gaze_valid: valid,
            fixation_point: None,
            saccade_index: None,
        }
    }

    #[test]
    fn test_single_saccade_all_valid() {
        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Fixation, 100.0, true),
            labelled(20, Sacc, 150.0, true),
            labelled(30, Sacc, 250.0, true),
            labelled(40, Fixation, 300.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 1.0, MediaOffset::default());

        assert_eq!(saccades.len(), 1);
        let s = &saccades[0];
        assert_eq!(s.quality, 1.0);
        // window opens at the last fixation sample and closes at the boundary fixation
        assert_eq!(s.timestamp, 10);
        assert_eq!(s.duration, 30);
        assert_eq!(s.start, GazePoint::new(100.0, 100.0));
        assert_eq!(s.end, GazePoint::new(300.0, 100.0));
        assert!((s.distance - 200.0).abs() < 1e-9);
        assert!((s.speed - 200.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_quality_window_is_dropped() {
        // window: last fixation gaze (invalid), two invalid saccade samples and a
        // boundary with only a fixation-point estimate: 1 valid of 4 samples
        let mut boundary = labelled(40, Fixation, 0.0, false);
        boundary.gaze = None;
        boundary.fixation_point = Some(GazePoint::new(300.0, 100.0));

        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Fixation, 110.0, false),
            labelled(20, Sacc, 150.0, false),
            labelled(30, Sacc, 250.0, false),
            boundary,
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 0.6, MediaOffset::default());
        assert!(saccades.is_empty());
    }

    #[test]
    fn test_quality_counts_unclassified_samples() {
        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Unclassified, 100.0, true),
            labelled(20, Unclassified, 100.0, true),
            labelled(30, Sacc, 200.0, true),
            labelled(40, Fixation, 300.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 0.0, MediaOffset::default());
        assert_eq!(saccades.len(), 1);
        // valid: last gaze + saccade sample + boundary = 3; total: 2 + 2 unclassified + 1 = 5
        assert!((saccades[0].quality - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_never_reaching_fixation_yields_nothing() {
        let stream = vec![
            labelled(0, Sacc, 100.0, true),
            labelled(10, Unclassified, 120.0, true),
            labelled(20, Sacc, 140.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 0.0, MediaOffset::default());
        assert!(saccades.is_empty());
    }

    #[test]
    fn test_open_window_at_end_is_dropped() {
        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Sacc, 200.0, true),
            labelled(20, Sacc, 300.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 0.0, MediaOffset::default());
        assert!(saccades.is_empty());
    }

    #[test]
    fn test_boundary_falls_back_to_fixation_point() {
        let mut boundary = labelled(30, Fixation, 0.0, false);
        boundary.fixation_point = Some(GazePoint::new(400.0, 100.0));

        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Sacc, 200.0, true),
            labelled(20, Sacc, 300.0, true),
            boundary,
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 1.0, MediaOffset::default());
        assert_eq!(saccades.len(), 1);
        assert_eq!(saccades[0].end, GazePoint::new(400.0, 100.0));
        assert_eq!(saccades[0].duration, 30);
    }

    #[test]
    fn test_uses_tracker_saccade_index() {
        let mut first_saccade = labelled(10, Sacc, 200.0, true);
        first_saccade.saccade_index = Some(42);
        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            first_saccade,
            labelled(20, Fixation, 300.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 1.0, MediaOffset::default());
        assert_eq!(saccades[0].index, 42);
    }

    #[test]
    fn test_two_saccades_get_sequential_indices() {
        let stream = vec![
            labelled(0, Fixation, 100.0, true),
            labelled(10, Sacc, 200.0, true),
            labelled(20, Fixation, 300.0, true),
            labelled(30, Sacc, 400.0, true),
            labelled(40, Fixation, 500.0, true),
        ];
        let saccades = SaccadeReconstructor::reconstruct(stream, 1.0, MediaOffset::default());
        assert_eq!(saccades.len(), 2);
        assert_eq!(saccades[0].index, 1);
        assert_eq!(saccades[1].index, 2);
    }
}
