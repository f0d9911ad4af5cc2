//! Scene aggregation
//!
//! A [`Scene`] is an arena of [`Segment`]s. Split parents stay in the arena
//! marked superseded; scene features are computed over the active segments
//! (and, with `require_valid_segs`, only the valid ones).

use crate::features::{FeatureDeriver, FeatureInput, FeatureSet};
use crate::partition::SceneDef;
use crate::recording::Streams;
use crate::segment::{BuildContext, Segment};
use crate::types::{Datapoint, Event, Fixation, QualityFlag, Saccade};
use crate::validity::ValiditySummary;
use serde::{Deserialize, Serialize};

/// Named group of segments with aggregated features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    pub segments: Vec<Segment>,
    pub validity: ValiditySummary,
    pub quality_flags: Vec<QualityFlag>,
    pub features: FeatureSet,
}

impl Scene {
    /// Build every segment of a scene definition, then aggregate them
    pub fn build(definition: &SceneDef, streams: &Streams<'_>, ctx: &BuildContext<'_>) -> Self {
        let segments = definition
            .segments
            .iter()
            .flat_map(|segment| Segment::build_with_splits(&definition.name, segment, streams, ctx))
            .collect();
        Self::from_segments(&definition.name, segments, ctx)
    }

    /// Aggregate already built segments
    pub fn from_segments(name: &str, segments: Vec<Segment>, ctx: &BuildContext<'_>) -> Self {
        let mut scene = Self {
            name: name.to_string(),
            segments,
            validity: ValiditySummary::default(),
            quality_flags: Vec::new(),
            features: FeatureSet::default(),
        };
        let (validity, features) = scene.compute_features(ctx);
        if scene.aggregated_segments(ctx).next().is_none() {
            scene.quality_flags.push(QualityFlag::NoValidSegments);
        }
        if scene
            .aggregated_segments(ctx)
            .any(|segment| segment.quality_flags.contains(&QualityFlag::BlinkStatusUnknown))
        {
            scene.quality_flags.push(QualityFlag::BlinkStatusUnknown);
        }
        scene.validity = validity;
        scene.features = features;
        scene
    }

    /// Segments not replaced by a split
    pub fn active_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|segment| !segment.superseded)
    }

    /// Segments that contribute to the scene features
    pub fn aggregated_segments<'s>(
        &'s self,
        ctx: &BuildContext<'_>,
    ) -> impl Iterator<Item = &'s Segment> + 's {
        let require_valid = ctx.policy.require_valid_segs;
        self.active_segments()
            .filter(move |segment| !require_valid || segment.is_valid)
    }

    /// Validity and features over the aggregated segments. Pure over the
    /// scene's current buffers, so it must run before samples are released.
    pub fn compute_features(&self, ctx: &BuildContext<'_>) -> (ValiditySummary, FeatureSet) {
        let included: Vec<&Segment> = self.aggregated_segments(ctx).collect();
        let validity = ValiditySummary::merge(included.iter().map(|segment| &segment.validity));

        let samples: Vec<Datapoint> = concat(&included, |s| &s.samples);
        let fixations: Vec<Fixation> = concat(&included, |s| &s.fixations);
        let saccades: Vec<Saccade> = concat(&included, |s| &s.saccades);
        let events: Vec<Event> = concat(&included, |s| &s.events);

        let start = included.iter().map(|s| s.start).min().unwrap_or_default();
        let end = included.iter().map(|s| s.effective_end).max().unwrap_or(start);
        let length = included.iter().map(|s| s.length()).sum();

        let features = FeatureDeriver::derive(&FeatureInput {
            start,
            end,
            length,
            samples: &samples,
            fixations: &fixations,
            saccades: &saccades,
            events: &events,
            validity: &validity,
            thresholds: ctx.thresholds,
            aois: ctx.aois,
            rest_pupil_size: ctx.rest_pupil_size(&self.name),
        });
        (validity, features)
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.name == name)
    }

    /// Drop the per-sample buffers of every segment
    pub fn release_samples(&mut self) {
        self.segments.iter_mut().for_each(Segment::release_samples);
    }
}

fn concat<T: Clone>(segments: &[&Segment], field: impl Fn(&Segment) -> &Vec<T>) -> Vec<T> {
    segments
        .iter()
        .flat_map(|segment| field(*segment).iter().cloned())
        .collect()
}
