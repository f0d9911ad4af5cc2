//! Feature table export
//!
//! This module flattens participant features into one table. Columns follow
//! the caller's feature lists: interval features first, then
//! `{aoi}_{feature}` columns for every AOI. Features a row does not have are
//! exported as `null`.

use crate::error::GazeError;
use crate::features::{FeatureSet, AOI_FEATURES, GENERAL_FEATURES, TRANSITION_PREFIX};
use crate::participant::{EntityKind, Participant};
use crate::types::QualityFlag;
use crate::{GAZEFLUX_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Current feature table format version
pub const TABLE_VERSION: &str = "1.0.0";

/// Features only the whole-recording scene carries
const WHOLE_SCENE_FEATURES: &[&str] = &["numofsegments"];

/// AOI feature entry that expands to one `numtransfrom_<AOI>` column per
/// other AOI
pub const TRANSITIONS: &str = "numtransfrom";

/// Which entities become table rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportLevel {
    Scenes,
    Segments,
    #[default]
    All,
}

impl ExportLevel {
    fn includes(&self, kind: EntityKind) -> bool {
        match self {
            ExportLevel::Scenes => kind == EntityKind::Scene,
            ExportLevel::Segments => kind == EntityKind::Segment,
            ExportLevel::All => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Features of one scene or segment of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub participant_id: String,
    pub recording_id: String,
    pub entity: EntityKind,
    pub entity_name: String,
    pub quality_flags: Vec<String>,
    /// One value per table column
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub table_version: String,
    pub producer: TableProducer,
    pub computed_at_utc: String,
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Value of a named column in one row
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.values.get(index).copied().flatten()
    }
}

/// One table column and where its value comes from
enum ColumnSource {
    General(String),
    Aoi { aoi: String, feature: String },
}

impl ColumnSource {
    fn name(&self) -> String {
        match self {
            ColumnSource::General(feature) => feature.to_string(),
            ColumnSource::Aoi { aoi, feature } => format!("{aoi}_{feature}"),
        }
    }

    fn read(&self, features: &FeatureSet) -> Option<f64> {
        match self {
            ColumnSource::General(feature) => features.get(feature),
            ColumnSource::Aoi { aoi, feature } => features.aoi_feature(aoi, feature),
        }
    }
}

/// Feature table encoder
pub struct FeatureTableEncoder {
    instance_id: String,
    level: ExportLevel,
    features: Vec<String>,
    aoi_features: Vec<String>,
}

impl Default for FeatureTableEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureTableEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self::with_instance_id(Uuid::new_v4().to_string())
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self {
            instance_id,
            level: ExportLevel::default(),
            features: GENERAL_FEATURES
                .iter()
                .chain(WHOLE_SCENE_FEATURES)
                .map(|feature| feature.to_string())
                .collect(),
            aoi_features: AOI_FEATURES
                .iter()
                .chain(&[TRANSITIONS])
                .map(|feature| feature.to_string())
                .collect(),
        }
    }

    pub fn with_level(mut self, level: ExportLevel) -> Self {
        self.level = level;
        self
    }

    /// Interval features to export, in column order
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    /// Per-AOI features to export, in column order within each AOI
    pub fn with_aoi_features(mut self, aoi_features: Vec<String>) -> Self {
        self.aoi_features = aoi_features;
        self
    }

    /// Flatten the features of every participant into one table
    pub fn encode(&self, participants: &[Participant]) -> FeatureTable {
        let columns = self.columns(participants);

        let mut rows = Vec::new();
        for participant in participants {
            for (position, scene) in participant.scenes.iter().enumerate() {
                if self.level.includes(EntityKind::Scene) {
                    rows.push(row(
                        participant,
                        EntityKind::Scene,
                        &scene.name,
                        &scene.quality_flags,
                        &scene.features,
                        &columns,
                    ));
                }
                // the whole-recording scene repeats the partition segments
                if position == 0 || !self.level.includes(EntityKind::Segment) {
                    continue;
                }
                for segment in scene.active_segments() {
                    rows.push(row(
                        participant,
                        EntityKind::Segment,
                        &segment.name,
                        &segment.quality_flags,
                        &segment.features,
                        &columns,
                    ));
                }
            }
        }

        FeatureTable {
            table_version: TABLE_VERSION.to_string(),
            producer: TableProducer {
                name: PRODUCER_NAME.to_string(),
                version: GAZEFLUX_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            columns: columns.iter().map(ColumnSource::name).collect(),
            rows,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, participants: &[Participant]) -> Result<String, GazeError> {
        let table = self.encode(participants);
        Ok(serde_json::to_string_pretty(&table)?)
    }

    fn columns(&self, participants: &[Participant]) -> Vec<ColumnSource> {
        let mut columns: Vec<ColumnSource> = self
            .features
            .iter()
            .map(|feature| ColumnSource::General(feature.clone()))
            .collect();

        let aois: BTreeSet<&str> = participants
            .iter()
            .flat_map(|participant| participant.features.values())
            .flat_map(|features| features.aoi.keys())
            .map(String::as_str)
            .collect();
        for aoi in &aois {
            for feature in &self.aoi_features {
                if feature != TRANSITIONS {
                    columns.push(ColumnSource::Aoi {
                        aoi: aoi.to_string(),
                        feature: feature.clone(),
                    });
                    continue;
                }
                for other in aois.iter().filter(|other| *other != aoi) {
                    columns.push(ColumnSource::Aoi {
                        aoi: aoi.to_string(),
                        feature: format!("{TRANSITION_PREFIX}{other}"),
                    });
                }
            }
        }
        columns
    }
}

fn row(
    participant: &Participant,
    entity: EntityKind,
    name: &str,
    flags: &[QualityFlag],
    features: &FeatureSet,
    columns: &[ColumnSource],
) -> FeatureRow {
    FeatureRow {
        participant_id: participant.id.clone(),
        recording_id: participant.recording_id.clone(),
        entity,
        entity_name: name.to_string(),
        quality_flags: flags
            .iter()
            .map(|f| format!("{f:?}").to_lowercase())
            .collect(),
        values: columns.iter().map(|column| column.read(features)).collect(),
    }
}
