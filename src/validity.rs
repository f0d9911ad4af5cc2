//! Sample and segment validity
//!
//! - Per-sample classification from per-eye tracker validity codes
//! - Segment coverage (proportion of valid samples) and largest invalid run
//! - Quality flags for segments that fall below the configured thresholds

use crate::config::QualityThresholds;
use crate::types::{Datapoint, QualityFlag};
use serde::{Deserialize, Serialize};

/// How a tracker's per-eye validity code is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidityRule {
    /// The eye is tracked when its code is strictly below the value (Tobii: 0 best, 4 lost)
    Below(i64),
    /// The eye is tracked when its code is at least the value (SMI: 1 tracked, 0 lost)
    AtLeast(i64),
}

impl ValidityRule {
    /// Whether one eye's code meets the rule; a missing code never does
    pub fn eye_ok(&self, code: Option<i64>) -> bool {
        match (self, code) {
            (ValidityRule::Below(limit), Some(code)) => code < *limit,
            (ValidityRule::AtLeast(limit), Some(code)) => code >= *limit,
            (_, None) => false,
        }
    }
}

/// Classification of one raw sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleValidity {
    pub is_valid: bool,
    pub is_valid_blink: Option<bool>,
}

/// Classify a sample from its left/right validity codes.
///
/// Valid when at least one eye meets the rule. `is_valid_blink` holds when
/// both eyes do, which keeps single-eye dropouts apart from full tracking loss.
pub fn classify_sample(rule: ValidityRule, left: Option<i64>, right: Option<i64>) -> SampleValidity {
    let left_ok = rule.eye_ok(left);
    let right_ok = rule.eye_ok(right);
    SampleValidity {
        is_valid: left_ok || right_ok,
        is_valid_blink: Some(left_ok && right_ok),
    }
}

/// Contiguous run of invalid samples, `[start, end)` in ms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRun {
    pub start: i64,
    pub end: i64,
}

impl InvalidRun {
    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

/// Aggregated validity of an interval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValiditySummary {
    pub total_samples: usize,
    pub valid_samples: usize,
    /// Longest invalid run; `None` when every sample is valid
    pub largest_invalid_run: Option<InvalidRun>,
}

impl ValiditySummary {
    /// Summarize the samples of an interval ending at `interval_end`.
    ///
    /// A run starts at its first invalid sample and ends at the next valid
    /// sample, or at `interval_end` when the interval closes inside the run.
    pub fn from_samples<'a, I>(samples: I, interval_end: i64) -> Self
    where
        I: IntoIterator<Item = &'a Datapoint>,
    {
        let mut summary = ValiditySummary::default();
        let mut run_start: Option<i64> = None;

        for sample in samples {
            summary.total_samples += 1;
            if sample.is_valid {
                summary.valid_samples += 1;
                if let Some(start) = run_start.take() {
                    summary.record_run(InvalidRun {
                        start,
                        end: sample.timestamp,
                    });
                }
            } else if run_start.is_none() {
                run_start = Some(sample.timestamp);
            }
        }

        if let Some(start) = run_start {
            summary.record_run(InvalidRun {
                start,
                end: interval_end.max(start),
            });
        }

        summary
    }

    fn record_run(&mut self, run: InvalidRun) {
        let longer = self
            .largest_invalid_run
            .map_or(true, |current| run.length() > current.length());
        if longer {
            self.largest_invalid_run = Some(run);
        }
    }

    /// Combine the summaries of several intervals (scene level)
    pub fn merge<'a, I>(summaries: I) -> Self
    where
        I: IntoIterator<Item = &'a ValiditySummary>,
    {
        let mut merged = ValiditySummary::default();
        for summary in summaries {
            merged.total_samples += summary.total_samples;
            merged.valid_samples += summary.valid_samples;
            if let Some(run) = summary.largest_invalid_run {
                merged.record_run(run);
            }
        }
        merged
    }

    /// Proportion of valid samples; `None` for an interval without samples
    pub fn coverage(&self) -> Option<f64> {
        if self.total_samples == 0 {
            None
        } else {
            Some(self.valid_samples as f64 / self.total_samples as f64)
        }
    }

    /// Length of the largest invalid run (0 when there is none)
    pub fn largest_gap_ms(&self) -> i64 {
        self.largest_invalid_run.map_or(0, |run| run.length())
    }

    /// Whether the coverage falls below the configured proportion
    pub fn below_coverage(&self, thresholds: &QualityThresholds) -> bool {
        self.coverage()
            .map_or(true, |coverage| coverage < thresholds.valid_prop_threshold)
    }

    /// Quality flags raised by this interval; empty when it is acceptable
    pub fn quality_flags(&self, thresholds: &QualityThresholds) -> Vec<QualityFlag> {
        let mut flags = Vec::new();
        if self.total_samples == 0 {
            flags.push(QualityFlag::NoSamples);
        } else if self.below_coverage(thresholds) {
            flags.push(QualityFlag::BelowValidityThreshold);
        }
        if let Some(max_gap) = thresholds.max_invalid_gap_ms {
            if self.largest_gap_ms() > max_gap {
                flags.push(QualityFlag::InvalidGapTooLong);
            }
        }
        flags
    }

    /// Whether the interval passes every validity check
    pub fn is_acceptable(&self, thresholds: &QualityThresholds) -> bool {
        self.quality_flags(thresholds).is_empty()
    }
}
