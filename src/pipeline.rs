//! Pipeline orchestration
//!
//! This module provides the public API for Gaze Flux.
//! It orchestrates the full pipeline from raw tracker exports to participant
//! features: tracker parsing → partitioning → segment and scene building →
//! participant aggregation.

use crate::adapters::{adapter_for, TrackerAdapter};
use crate::aoi::{read_aoi_file, Aoi};
use crate::baseline::RestPupilSizes;
use crate::config::{RunConfig, DEFAULT_LOG_TIME_OFFSET_MS};
use crate::error::GazeError;
use crate::participant::Participant;
use crate::partition::Partition;
use crate::recording::{Recording, RecordingFiles, RecordingSources};
use crate::segment::BuildContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Recordings to process in one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Directory holding every recording export
    pub data_dir: PathBuf,
    pub recording_ids: Vec<String>,
    /// Participant id per recording (same order and length)
    pub participant_ids: Vec<String>,
    /// Log-time offset per recording (ms); 1000 for each when unset
    pub log_time_offsets: Option<Vec<i64>>,
    /// AOI definitions shared by every participant
    pub aoi_file: Option<PathBuf>,
    pub rest_pupil_file: Option<PathBuf>,
}

impl BatchRequest {
    /// Request where every recording id doubles as participant id
    pub fn new(data_dir: impl Into<PathBuf>, recording_ids: Vec<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            participant_ids: recording_ids.clone(),
            recording_ids,
            log_time_offsets: None,
            aoi_file: None,
            rest_pupil_file: None,
        }
    }

    pub fn with_participant_ids(mut self, participant_ids: Vec<String>) -> Self {
        self.participant_ids = participant_ids;
        self
    }

    pub fn with_aoi_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.aoi_file = Some(path.into());
        self
    }

    pub fn with_rest_pupil_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.rest_pupil_file = Some(path.into());
        self
    }

    /// Check that the per-recording lists line up
    pub fn validate(&self) -> Result<(), GazeError> {
        if self.participant_ids.len() != self.recording_ids.len() {
            return Err(GazeError::Configuration(format!(
                "{} participant ids for {} recordings",
                self.participant_ids.len(),
                self.recording_ids.len()
            )));
        }
        if let Some(offsets) = &self.log_time_offsets {
            if offsets.len() != self.recording_ids.len() {
                return Err(GazeError::Configuration(format!(
                    "{} log time offsets for {} recordings",
                    offsets.len(),
                    self.recording_ids.len()
                )));
            }
        }
        Ok(())
    }

    fn log_time_offset(&self, position: usize) -> i64 {
        self.log_time_offsets
            .as_ref()
            .and_then(|offsets| offsets.get(position).copied())
            .unwrap_or(DEFAULT_LOG_TIME_OFFSET_MS)
    }
}

/// A recording left out of a batch, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecording {
    pub recording_id: String,
    pub participant_id: String,
    pub reason: String,
}

/// Result of a batch run
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub participants: Vec<Participant>,
    pub skipped: Vec<SkippedRecording>,
}

/// Build every participant of a batch.
///
/// Recordings with missing files or unreadable exports are logged and
/// recorded as skipped. Configuration errors (invalid thresholds, unknown
/// tracker, an empty segment file) abort the whole batch.
///
/// # Example
/// ```ignore
/// let config = RunConfig::new(TrackerKind::TobiiV3);
/// let request = BatchRequest::new("data/", vec!["P1".to_string()]);
/// let outcome = read_participants(&config, &request)?;
/// ```
pub fn read_participants(
    config: &RunConfig,
    request: &BatchRequest,
) -> Result<BatchOutcome, GazeError> {
    request.validate()?;

    let mut processor = GazeProcessor::new(config.clone())?;
    if let Some(path) = &request.aoi_file {
        processor = processor.with_aois(read_aoi_file(path)?);
    }
    if let Some(path) = &request.rest_pupil_file {
        processor = processor.with_rest_pupil_sizes(RestPupilSizes::read_file(path)?);
    }

    let mut outcome = BatchOutcome::default();
    for (position, (recording_id, participant_id)) in request
        .recording_ids
        .iter()
        .zip(&request.participant_ids)
        .enumerate()
    {
        let files = RecordingFiles::for_recording(config.tracker, &request.data_dir, recording_id);
        let missing = files.missing();
        if !missing.is_empty() {
            let reason = format!(
                "missing {}",
                missing
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            log::warn!("skipping recording {recording_id}: {reason}");
            outcome.skipped.push(SkippedRecording {
                recording_id: recording_id.clone(),
                participant_id: participant_id.clone(),
                reason,
            });
            continue;
        }

        let offset = request.log_time_offset(position);
        match processor.process_files(participant_id, recording_id, &files, offset) {
            Ok(participant) => outcome.participants.push(participant),
            Err(err) if err.is_configuration() => return Err(err),
            Err(err) => {
                log::warn!("skipping recording {recording_id}: {err}");
                outcome.skipped.push(SkippedRecording {
                    recording_id: recording_id.clone(),
                    participant_id: participant_id.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    log::info!(
        "batch done: {} participants, {} skipped",
        outcome.participants.len(),
        outcome.skipped.len()
    );
    Ok(outcome)
}

/// Processor holding the state shared by every participant of a run.
///
/// Use this to build participants one at a time, from files or from
/// in-memory exports.
pub struct GazeProcessor {
    config: RunConfig,
    adapter: Box<dyn TrackerAdapter>,
    aois: Vec<Aoi>,
    rest_pupil: RestPupilSizes,
}

impl GazeProcessor {
    /// Create a processor for a validated configuration
    pub fn new(config: RunConfig) -> Result<Self, GazeError> {
        config.validate()?;
        let adapter = adapter_for(&config);
        Ok(Self {
            config,
            adapter,
            aois: Vec::new(),
            rest_pupil: RestPupilSizes::default(),
        })
    }

    pub fn with_aois(mut self, aois: Vec<Aoi>) -> Self {
        self.aois = aois;
        self
    }

    pub fn with_rest_pupil_sizes(mut self, rest_pupil: RestPupilSizes) -> Self {
        self.rest_pupil = rest_pupil;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Build a participant from the files of one recording
    pub fn process_files(
        &self,
        participant_id: &str,
        recording_id: &str,
        files: &RecordingFiles,
        log_time_offset: i64,
    ) -> Result<Participant, GazeError> {
        // Stage 1: Partition first so an unusable segment file fails fast
        let partition = Partition::read_file(&files.segments)?;

        // Stage 2: Parse tracker exports
        log::info!("reading recording {recording_id} ({})", self.adapter.kind());
        let recording = Recording::from_files(self.adapter.as_ref(), files)?;

        // Stage 3: Build segments, scenes and the participant
        Ok(self.build(participant_id, recording_id, recording, &partition, log_time_offset))
    }

    /// Build a participant from in-memory exports
    pub fn process_sources(
        &self,
        participant_id: &str,
        recording_id: &str,
        sources: &RecordingSources<'_>,
        segments: &str,
        log_time_offset: i64,
    ) -> Result<Participant, GazeError> {
        let partition = Partition::parse(&format!("{recording_id}.seg"), segments)?;
        let recording = Recording::parse(self.adapter.as_ref(), sources)?;
        Ok(self.build(participant_id, recording_id, recording, &partition, log_time_offset))
    }

    fn build(
        &self,
        participant_id: &str,
        recording_id: &str,
        recording: Recording,
        partition: &Partition,
        log_time_offset: i64,
    ) -> Participant {
        let ctx = BuildContext::new(
            &self.config,
            &self.aois,
            self.rest_pupil.for_participant(participant_id),
        );
        Participant::build(
            participant_id,
            recording_id,
            log_time_offset,
            recording,
            partition,
            &ctx,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::EntityKind;
    use crate::types::TrackerKind;
    use std::fs;
    use std::path::Path;

    /// 10 ms samples over [0, 3000) and two fixations
    fn write_tobii_v2_recording(dir: &Path, recording_id: &str, segments: &str) {
        let mut samples = String::from("RecordingTimestamp\tavg_x\tavg_y\n");
        for i in 0..300 {
            samples.push_str(&format!("{}\t{}\t300\n", i * 10, 100 + i));
        }
        fs::write(dir.join(format!("{recording_id}-All-Data.tsv")), samples).unwrap();
        fs::write(
            dir.join(format!("{recording_id}-Fixation-Data.tsv")),
            "Unnamed: 0\tstarttime\tduration\tendx\tendy\n\
             0\t100\t200\t50\t50\n\
             1\t1500\t300\t150\t50\n",
        )
        .unwrap();
        fs::write(dir.join(format!("{recording_id}.seg")), segments).unwrap();
    }

    #[test]
    fn test_read_participants() {
        let dir = tempfile::tempdir().unwrap();
        write_tobii_v2_recording(dir.path(), "P1", "task\tfirst\t0\t1000\ntask\tsecond\t1000\t3000\n");
        fs::write(
            dir.path().join("shared.aoi"),
            "Left\t0,0\t100,0\t100,100\t0,100\n",
        )
        .unwrap();

        let config = RunConfig::new(TrackerKind::TobiiV2);
        let request =
            BatchRequest::new(dir.path(), vec!["P1".to_string()]).with_aoi_file(dir.path().join("shared.aoi"));
        let outcome = read_participants(&config, &request).unwrap();

        assert!(outcome.skipped.is_empty());
        let participant = &outcome.participants[0];
        assert_eq!(participant.log_time_offset, 1000);
        assert_eq!(participant.segment_count, 2);
        assert_eq!(participant.feature(EntityKind::Segment, "first", "numfixations"), Some(1.0));
        assert_eq!(participant.feature(EntityKind::Scene, "task", "numsamples"), Some(300.0));
        assert_eq!(
            participant
                .feature_set(EntityKind::Scene, "P1_allsc")
                .and_then(|set| set.aoi_feature("Left", "numfixations")),
            Some(1.0)
        );
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_tobii_v2_recording(dir.path(), "P1", "task\tfirst\t0\t1000\n");

        let config = RunConfig::new(TrackerKind::TobiiV2);
        let request = BatchRequest::new(dir.path(), vec!["P1".to_string(), "P2".to_string()]);
        let outcome = read_participants(&config, &request).unwrap();

        assert_eq!(outcome.participants.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].recording_id, "P2");
        assert!(outcome.skipped[0].reason.contains("P2-All-Data.tsv"));
    }

    #[test]
    fn test_parse_errors_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_tobii_v2_recording(dir.path(), "P1", "task\tfirst\t0\t1000\n");
        write_tobii_v2_recording(dir.path(), "P2", "task\tfirst\t0\t1000\n");
        fs::write(
            dir.path().join("P2-All-Data.tsv"),
            "RecordingTimestamp\tavg_x\n10\t1\nnot-a-time\t1\n",
        )
        .unwrap();

        let config = RunConfig::new(TrackerKind::TobiiV2);
        let request = BatchRequest::new(dir.path(), vec!["P1".to_string(), "P2".to_string()]);
        let outcome = read_participants(&config, &request).unwrap();

        assert_eq!(outcome.participants.len(), 1);
        assert_eq!(outcome.skipped[0].participant_id, "P2");
    }

    #[test]
    fn test_zero_segments_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        write_tobii_v2_recording(dir.path(), "P1", "# no segments\n");

        let config = RunConfig::new(TrackerKind::TobiiV2);
        let request = BatchRequest::new(dir.path(), vec!["P1".to_string()]);
        let err = read_participants(&config, &request).unwrap_err();
        assert!(matches!(err, GazeError::NoSegments(_)));
    }

    #[test]
    fn test_mismatched_ids_are_rejected() {
        let config = RunConfig::new(TrackerKind::TobiiV2);
        let request = BatchRequest::new("data", vec!["P1".to_string()])
            .with_participant_ids(vec!["a".to_string(), "b".to_string()]);
        assert!(read_participants(&config, &request).unwrap_err().is_configuration());
    }

    #[test]
    fn test_process_sources_with_rest_pupil() {
        let mut config = RunConfig::new(TrackerKind::TobiiV2);
        config.policy.require_valid_segs = false;
        let rest = RestPupilSizes::parse("rest.tsv", "participant\ttask\nP1\t3.0\n").unwrap();
        let processor = GazeProcessor::new(config).unwrap().with_rest_pupil_sizes(rest);

        let sources = RecordingSources {
            samples: "RecordingTimestamp\tavg_x\n0\t1\n10\t2\n",
            fixations: "Unnamed: 0\tstarttime\tduration\tendx\tendy\n",
            saccades: None,
            events: None,
        };
        let participant = processor
            .process_sources("P1", "rec", &sources, "task\ta\t0\t20\n", 1000)
            .unwrap();
        // Tobii V2 exports carry no pupil sizes, so only the baseline is known
        assert_eq!(participant.feature(EntityKind::Scene, "task", "restpupilsize"), Some(3.0));
        assert_eq!(participant.feature(EntityKind::Scene, "P1_allsc", "restpupilsize"), None);
    }
}
