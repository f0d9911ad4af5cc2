//! Run configuration
//!
//! A single immutable [`RunConfig`] is built (or loaded from JSON) once per run,
//! validated, and threaded by reference through the batch. Defaults match the
//! thresholds the toolkit has always shipped with.

use crate::error::GazeError;
use crate::types::{MediaOffset, TrackerKind};
use serde::{Deserialize, Serialize};

/// Default minimum proportion of valid samples for a segment to be valid
pub const DEFAULT_VALID_PROP_THRESHOLD: f64 = 0.8;

/// Default minimum proportion of valid samples inside a saccade window
pub const DEFAULT_VALID_SAMPLES_PROP_SACCADE: f64 = 1.0;

/// Default offset between external logs and the tracker clock (ms)
pub const DEFAULT_LOG_TIME_OFFSET_MS: i64 = 1000;

/// Which eye an SMI events export is read for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub fn code(&self) -> &'static str {
        match self {
            Eye::Left => "L",
            Eye::Right => "R",
        }
    }
}

/// Logging verbosity requested for the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn level_filter(&self) -> log::LevelFilter {
        match self {
            Verbosity::Quiet => log::LevelFilter::Warn,
            Verbosity::Normal => log::LevelFilter::Info,
            Verbosity::Verbose => log::LevelFilter::Debug,
        }
    }
}

/// Quality thresholds applied uniformly to every segment of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum valid-sample proportion for a segment to count as valid
    pub valid_prop_threshold: f64,
    /// Longest tolerated run of invalid samples (ms); unchecked when `None`
    pub max_invalid_gap_ms: Option<i64>,
    /// Minimum valid-sample proportion inside a saccade window
    pub valid_samples_prop_saccade: f64,
    /// Shortest run of untracked samples counted as a blink (ms)
    pub blink_min_ms: i64,
    /// Longest run of untracked samples counted as a blink (ms)
    pub blink_max_ms: i64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            valid_prop_threshold: DEFAULT_VALID_PROP_THRESHOLD,
            max_invalid_gap_ms: None,
            valid_samples_prop_saccade: DEFAULT_VALID_SAMPLES_PROP_SACCADE,
            blink_min_ms: 100,
            blink_max_ms: 500,
        }
    }
}

/// Per-segment construction policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentPolicy {
    /// Only the first `prune_length` ms of every segment are used
    pub prune_length: Option<i64>,
    /// Exclude invalid segments from scene aggregation
    pub require_valid_segs: bool,
    /// Split low-quality segments once at their largest invalid run
    pub auto_partition_low_quality_segments: bool,
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            prune_length: None,
            require_valid_segs: true,
            auto_partition_low_quality_segments: false,
        }
    }
}

/// Tracker-specific parsing settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Media name marking the recording rows of a Tobii export.
    /// Falls back to the tracker's own default when unset.
    pub media_name: Option<String>,
    /// Preamble lines (header line included) of a Tobii V2 event export
    pub event_header_lines: usize,
    /// Eye whose events are read from an SMI events export
    pub smi_eye: Option<Eye>,
}

/// Immutable configuration for one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub tracker: TrackerKind,
    #[serde(default)]
    pub media_offset: MediaOffset,
    #[serde(default)]
    pub tracker_settings: TrackerSettings,
    #[serde(default)]
    pub thresholds: QualityThresholds,
    #[serde(default)]
    pub policy: SegmentPolicy,
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl RunConfig {
    /// Create a configuration with default thresholds for the given tracker
    pub fn new(tracker: TrackerKind) -> Self {
        Self {
            tracker,
            media_offset: MediaOffset::default(),
            tracker_settings: TrackerSettings::default(),
            thresholds: QualityThresholds::default(),
            policy: SegmentPolicy::default(),
            verbosity: Verbosity::default(),
        }
    }

    pub fn with_policy(mut self, policy: SegmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_thresholds(mut self, thresholds: QualityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Check that every threshold is in range
    pub fn validate(&self) -> Result<(), GazeError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.valid_prop_threshold) {
            return Err(GazeError::Configuration(format!(
                "valid_prop_threshold must be within [0, 1], got {}",
                t.valid_prop_threshold
            )));
        }
        if !(0.0..=1.0).contains(&t.valid_samples_prop_saccade) {
            return Err(GazeError::Configuration(format!(
                "valid_samples_prop_saccade must be within [0, 1], got {}",
                t.valid_samples_prop_saccade
            )));
        }
        if matches!(t.max_invalid_gap_ms, Some(gap) if gap < 0) {
            return Err(GazeError::Configuration(
                "max_invalid_gap_ms must not be negative".to_string(),
            ));
        }
        if t.blink_min_ms > t.blink_max_ms {
            return Err(GazeError::Configuration(format!(
                "blink_min_ms ({}) exceeds blink_max_ms ({})",
                t.blink_min_ms, t.blink_max_ms
            )));
        }
        if matches!(self.policy.prune_length, Some(len) if len <= 0) {
            return Err(GazeError::Configuration(
                "prune_length must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, GazeError> {
        let config: RunConfig = serde_json::from_str(json)
            .map_err(|e| GazeError::Configuration(format!("invalid run configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
