//! Participant aggregation
//!
//! A [`Participant`] owns every scene of one recording, led by the
//! whole-recording scene `{id}_allsc`, plus a flat feature map keyed by
//! entity. The recording is consumed and per-sample buffers are released once
//! features are computed.

use crate::features::FeatureSet;
use crate::partition::Partition;
use crate::recording::Recording;
use crate::scene::Scene;
use crate::segment::{BuildContext, Segment};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Suffix of the whole-recording scene name
pub const WHOLE_SCENE_SUFFIX: &str = "_allsc";

/// Whether a feature set belongs to a scene or a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Scene,
    Segment,
}

/// Key of the participant feature map
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityKey {
    pub fn scene(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Scene,
            name: name.into(),
        }
    }

    pub fn segment(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Segment,
            name: name.into(),
        }
    }
}

/// Features of every scene and segment of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub recording_id: String,
    /// Offset between log time and recording time (ms)
    pub log_time_offset: i64,
    /// Whole-recording scene first, then scenes in partition order
    pub scenes: Vec<Scene>,
    /// Active segments across the partition
    pub segment_count: usize,
    pub features: BTreeMap<EntityKey, FeatureSet>,
}

impl Participant {
    /// Build a participant. The recording is dropped once every scene is
    /// built.
    pub fn build(
        id: &str,
        recording_id: &str,
        log_time_offset: i64,
        recording: Recording,
        partition: &Partition,
        ctx: &BuildContext<'_>,
    ) -> Self {
        log::info!(
            "building participant {id}: {} scenes, {} segments",
            partition.scenes.len(),
            partition.segment_count()
        );
        let streams = recording.streams();
        let scenes: Vec<Scene> = partition
            .scenes
            .iter()
            .map(|definition| Scene::build(definition, &streams, ctx))
            .collect();
        drop(recording);

        let mut active: Vec<Segment> = scenes
            .iter()
            .flat_map(Scene::active_segments)
            .cloned()
            .collect();
        active.sort_by_key(|segment| segment.start);
        let segment_count = active.len();

        let mut whole = Scene::from_segments(&whole_scene_name(id), active, ctx);
        whole.features.set("numofsegments", segment_count as f64);

        let mut all_scenes = Vec::with_capacity(scenes.len() + 1);
        all_scenes.push(whole);
        all_scenes.extend(scenes);
        for scene in &mut all_scenes {
            scene.release_samples();
        }

        let features = collect_features(&all_scenes);
        log::debug!("participant {id}: {} feature sets", features.len());

        Self {
            id: id.to_string(),
            recording_id: recording_id.to_string(),
            log_time_offset,
            scenes: all_scenes,
            segment_count,
            features,
        }
    }

    pub fn whole_scene(&self) -> Option<&Scene> {
        self.scenes.first()
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.name == name)
    }

    pub fn feature_set(&self, kind: EntityKind, name: &str) -> Option<&FeatureSet> {
        self.features.get(&EntityKey {
            kind,
            name: name.to_string(),
        })
    }

    /// One general feature of a scene or segment
    pub fn feature(&self, kind: EntityKind, name: &str, feature: &str) -> Option<f64> {
        self.feature_set(kind, name).and_then(|set| set.get(feature))
    }
}

/// Name of the whole-recording scene of a participant
pub fn whole_scene_name(participant_id: &str) -> String {
    format!("{participant_id}{WHOLE_SCENE_SUFFIX}")
}

/// Scene features plus those of every active partition segment. The
/// whole-recording scene holds copies of the same segments, so only its own
/// features are taken.
fn collect_features(scenes: &[Scene]) -> BTreeMap<EntityKey, FeatureSet> {
    let mut features = BTreeMap::new();
    for (position, scene) in scenes.iter().enumerate() {
        features.insert(EntityKey::scene(&scene.name), scene.features.clone());
        if position == 0 {
            continue;
        }
        for segment in scene.active_segments() {
            features.insert(EntityKey::segment(&segment.name), segment.features.clone());
        }
    }
    features
}
