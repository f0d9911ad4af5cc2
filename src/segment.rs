//! Segment construction
//!
//! A [`Segment`] owns the part of a recording that falls into its (possibly
//! pruned) `[start, end)` window, together with its validity summary and
//! features. Low quality segments may be split once around their largest
//! invalid run.

use crate::aoi::Aoi;
use crate::baseline::RestPupilBaseline;
use crate::config::{QualityThresholds, RunConfig, SegmentPolicy};
use crate::features::{blink_status_known, FeatureDeriver, FeatureInput, FeatureSet};
use crate::partition::SegmentDef;
use crate::recording::Streams;
use crate::types::{Datapoint, Event, Fixation, QualityFlag, Saccade};
use crate::validity::ValiditySummary;
use serde::{Deserialize, Serialize};

/// Shared, read-only inputs of segment and scene construction
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub thresholds: &'a QualityThresholds,
    pub policy: &'a SegmentPolicy,
    pub aois: &'a [Aoi],
    pub rest_pupil: Option<&'a RestPupilBaseline>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        config: &'a RunConfig,
        aois: &'a [Aoi],
        rest_pupil: Option<&'a RestPupilBaseline>,
    ) -> Self {
        Self {
            thresholds: &config.thresholds,
            policy: &config.policy,
            aois,
            rest_pupil,
        }
    }

    /// Rest pupil size recorded for a scene
    pub fn rest_pupil_size(&self, scene: &str) -> Option<f64> {
        self.rest_pupil.and_then(|baseline| baseline.for_scene(scene))
    }

    /// End of a window after pruning
    pub fn effective_end(&self, start: i64, end: i64) -> i64 {
        match self.policy.prune_length {
            Some(prune) => end.min(start.saturating_add(prune)),
            None => end,
        }
    }
}

/// One analysed time window of a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    pub scene: String,
    pub start: i64,
    /// Declared end of the window
    pub end: i64,
    /// End after pruning; data is selected from `[start, effective_end)`
    pub effective_end: i64,
    pub samples: Vec<Datapoint>,
    pub fixations: Vec<Fixation>,
    pub saccades: Vec<Saccade>,
    pub events: Vec<Event>,
    pub validity: ValiditySummary,
    pub is_valid: bool,
    pub quality_flags: Vec<QualityFlag>,
    pub features: FeatureSet,
    /// Parent segment when this one comes from a split
    pub split_from: Option<String>,
    /// Replaced by its split children
    pub superseded: bool,
}

impl Segment {
    /// Build one segment from the recording streams
    pub fn build(
        scene: &str,
        definition: &SegmentDef,
        streams: &Streams<'_>,
        ctx: &BuildContext<'_>,
    ) -> Self {
        Self::build_window(
            scene,
            &definition.name,
            definition.start,
            definition.end,
            streams,
            ctx,
            None,
        )
    }

    /// Build a segment and, when auto partitioning is on and its coverage is
    /// too low, its split children. The parent comes first and is marked
    /// superseded when children exist.
    pub fn build_with_splits(
        scene: &str,
        definition: &SegmentDef,
        streams: &Streams<'_>,
        ctx: &BuildContext<'_>,
    ) -> Vec<Self> {
        let mut parent = Self::build(scene, definition, streams, ctx);
        let splittable = ctx.policy.auto_partition_low_quality_segments
            && parent.validity.total_samples > 0
            && parent.validity.below_coverage(ctx.thresholds);
        let Some(run) = parent.validity.largest_invalid_run.filter(|_| splittable) else {
            return vec![parent];
        };

        let halves = [
            (format!("{}_1", parent.name), parent.start, run.start),
            (format!("{}_2", parent.name), run.end, parent.effective_end),
        ];
        let children: Vec<Segment> = halves
            .into_iter()
            .filter(|(_, start, end)| end > start)
            .map(|(name, start, end)| {
                Self::build_window(
                    scene,
                    &name,
                    start,
                    end,
                    streams,
                    ctx,
                    Some(parent.name.clone()),
                )
            })
            .collect();

        if children.is_empty() {
            return vec![parent];
        }
        log::debug!(
            "segment '{}' split around invalid run [{}, {})",
            parent.name,
            run.start,
            run.end
        );
        parent.superseded = true;
        let mut segments = vec![parent];
        segments.extend(children);
        segments
    }

    fn build_window(
        scene: &str,
        name: &str,
        start: i64,
        end: i64,
        streams: &Streams<'_>,
        ctx: &BuildContext<'_>,
        split_from: Option<String>,
    ) -> Self {
        let effective_end = ctx.effective_end(start, end);
        let window = streams.window(start, effective_end);

        let validity = ValiditySummary::from_samples(window.samples, effective_end);
        let mut quality_flags = validity.quality_flags(ctx.thresholds);
        let is_valid = quality_flags.is_empty();
        if !blink_status_known(window.samples) {
            quality_flags.push(QualityFlag::BlinkStatusUnknown);
        }
        if split_from.is_some() {
            quality_flags.push(QualityFlag::SplitFromLowQuality);
        }

        let features = FeatureDeriver::derive(&FeatureInput {
            start,
            end: effective_end,
            length: effective_end - start,
            samples: window.samples,
            fixations: window.fixations,
            saccades: window.saccades,
            events: window.events,
            validity: &validity,
            thresholds: ctx.thresholds,
            aois: ctx.aois,
            rest_pupil_size: ctx.rest_pupil_size(scene),
        });

        Self {
            name: name.to_string(),
            scene: scene.to_string(),
            start,
            end,
            effective_end,
            samples: window.samples.to_vec(),
            fixations: window.fixations.to_vec(),
            saccades: window.saccades.to_vec(),
            events: window.events.to_vec(),
            validity,
            is_valid,
            quality_flags,
            features,
            split_from,
            superseded: false,
        }
    }

    /// Covered duration after pruning
    pub fn length(&self) -> i64 {
        self.effective_end - self.start
    }

    /// Drop the per-sample buffer once features are computed
    pub fn release_samples(&mut self) {
        self.samples = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Recording;
    use crate::types::{EventKind, GazePoint, MediaOffset, TrackerKind};

    fn sample(timestamp: i64, is_valid: bool) -> Datapoint {
        Datapoint {
            timestamp,
            pupil_size: Some(3.0),
            pupil_velocity: None,
            distance: Some(600.0),
            is_valid,
            is_valid_blink: Some(is_valid),
            gaze: None,
            fixation_index: None,
        }
    }

    /// 10 ms samples over [0, 2000), invalid in [800, 1300)
    fn recording_with_gap() -> Recording {
        let samples = (0..200)
            .map(|i| {
                let ts = i * 10;
                sample(ts, !(800..1300).contains(&ts))
            })
            .collect();
        Recording::from_streams(TrackerKind::TobiiV3, samples, Vec::new(), Vec::new(), Vec::new())
    }

    fn definition(name: &str, start: i64, end: i64) -> SegmentDef {
        SegmentDef {
            name: name.to_string(),
            start,
            end,
        }
    }

    #[test]
    fn test_segment_selects_window_and_validity() {
        let recording = recording_with_gap();
        let config = RunConfig::new(TrackerKind::TobiiV3);
        let ctx = BuildContext::new(&config, &[], None);

        let segment = Segment::build("task", &definition("a", 0, 2000), &recording.streams(), &ctx);
        assert_eq!(segment.samples.len(), 200);
        assert_eq!(segment.validity.valid_samples, 150);
        assert!(!segment.is_valid);
        assert_eq!(segment.quality_flags, vec![QualityFlag::BelowValidityThreshold]);
        assert_eq!(segment.features.get("largestinvalidgap"), Some(500.0));

        let clean = Segment::build("task", &definition("b", 0, 800), &recording.streams(), &ctx);
        assert!(clean.is_valid);
        assert!(clean.quality_flags.is_empty());
    }

    #[test]
    fn test_prune_length_cuts_window() {
        let recording = Recording::from_streams(
            TrackerKind::TobiiV3,
            vec![sample(0, true), sample(500, true), sample(1000, true), sample(1001, true)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        let mut config = RunConfig::new(TrackerKind::TobiiV3);
        config.policy.prune_length = Some(1001);
        let ctx = BuildContext::new(&config, &[], None);

        let segment = Segment::build("task", &definition("a", 0, 5000), &recording.streams(), &ctx);
        assert_eq!(segment.effective_end, 1001);
        assert_eq!(segment.length(), 1001);
        let timestamps: Vec<i64> = segment.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![0, 500, 1000]);
    }

    #[test]
    fn test_prune_length_drops_late_fixations_and_events() {
        let click = |timestamp| {
            Event::new(
                timestamp,
                EventKind::LeftMouseClick { x: None, y: None },
                None,
                MediaOffset::default(),
            )
        };
        let fixation = |index, timestamp| {
            Fixation::new(index, timestamp, 150, GazePoint::new(0.0, 0.0), MediaOffset::default())
        };
        let recording = Recording::from_streams(
            TrackerKind::TobiiV3,
            (0..50).map(|i| sample(i * 100, true)).collect(),
            vec![fixation(1, 200), fixation(2, 1001), fixation(3, 3000)],
            Vec::new(),
            vec![click(300), click(1500)],
        );
        let mut config = RunConfig::new(TrackerKind::TobiiV3);
        config.policy.prune_length = Some(1000);
        let ctx = BuildContext::new(&config, &[], None);

        let segment = Segment::build("task", &definition("a", 0, 5000), &recording.streams(), &ctx);
        assert_eq!((segment.end, segment.effective_end), (5000, 1000));
        assert_eq!(segment.samples.len(), 10);
        let starts: Vec<i64> = segment.fixations.iter().map(|f| f.timestamp).collect();
        assert_eq!(starts, vec![200]);
        assert_eq!(segment.events.len(), 1);
        assert_eq!(segment.features.get("length"), Some(1000.0));
        assert_eq!(segment.features.get("numfixations"), Some(1.0));
        assert_eq!(segment.features.get("numleftclic"), Some(1.0));
    }

    #[test]
    fn test_low_quality_segment_splits_around_invalid_run() {
        let recording = recording_with_gap();
        let mut config = RunConfig::new(TrackerKind::TobiiV3);
        config.policy.auto_partition_low_quality_segments = true;
        let ctx = BuildContext::new(&config, &[], None);

        let segments =
            Segment::build_with_splits("task", &definition("a", 0, 2000), &recording.streams(), &ctx);
        assert_eq!(segments.len(), 3);

        let parent = &segments[0];
        assert!(parent.superseded);
        assert_eq!(parent.name, "a");

        let first = &segments[1];
        assert_eq!((first.name.as_str(), first.start, first.end), ("a_1", 0, 800));
        assert_eq!(first.validity.coverage(), Some(1.0));
        assert_eq!(first.split_from.as_deref(), Some("a"));
        assert!(first.quality_flags.contains(&QualityFlag::SplitFromLowQuality));

        let second = &segments[2];
        assert_eq!((second.name.as_str(), second.start, second.end), ("a_2", 1300, 2000));
        assert_eq!(second.validity.coverage(), Some(1.0));
        assert!(!second.superseded);
    }

    #[test]
    fn test_no_split_without_auto_partition() {
        let recording = recording_with_gap();
        let config = RunConfig::new(TrackerKind::TobiiV3);
        let ctx = BuildContext::new(&config, &[], None);

        let segments =
            Segment::build_with_splits("task", &definition("a", 0, 2000), &recording.streams(), &ctx);
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].superseded);
    }

    #[test]
    fn test_release_keeps_features() {
        let recording = recording_with_gap();
        let config = RunConfig::new(TrackerKind::TobiiV3);
        let ctx = BuildContext::new(&config, &[], None);

        let mut segment = Segment::build("task", &definition("a", 0, 2000), &recording.streams(), &ctx);
        let features = segment.features.clone();
        segment.release_samples();
        assert!(segment.samples.is_empty());
        assert_eq!(segment.features, features);
    }
}
