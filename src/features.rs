//! Feature derivation
//!
//! This module derives the statistical features of a segment or scene from
//! the events assigned to it:
//! - General validity counts
//! - Fixation, scan path and saccade aggregates
//! - Pupil size, pupil velocity and head distance statistics, optionally
//!   relative to a rest pupil baseline
//! - Blinks, external events and per-AOI dwell and transition features
//!
//! Every aggregate over an empty set is [`EMPTY_SENTINEL`]; plain counts of an
//! empty set are `0`.

use crate::aoi::Aoi;
use crate::baseline::calculate_deviation;
use crate::config::QualityThresholds;
use crate::types::{Datapoint, Event, EventKind, Fixation, GazePoint, Saccade};
use crate::validity::ValiditySummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of every aggregate computed over an empty set
pub const EMPTY_SENTINEL: f64 = -1.0;

/// Interval-level feature names, in export order
pub const GENERAL_FEATURES: &[&str] = &[
    "length",
    "numsamples",
    "proportionvalid",
    "largestinvalidgap",
    "numfixations",
    "sumfixationduration",
    "meanfixationduration",
    "stddevfixationduration",
    "fixationrate",
    "sumpathdistance",
    "meanpathdistance",
    "stddevpathdistance",
    "meanabspathangles",
    "stddevabspathangles",
    "meanrelpathangles",
    "stddevrelpathangles",
    "numsaccades",
    "sumsaccadedistance",
    "meansaccadedistance",
    "stddevsaccadedistance",
    "sumsaccadeduration",
    "meansaccadeduration",
    "meansaccadespeed",
    "stddevsaccadespeed",
    "maxsaccadespeed",
    "minsaccadespeed",
    "meansaccadeacceleration",
    "fixationsaccadetimeratio",
    "meanpupilsize",
    "stddevpupilsize",
    "maxpupilsize",
    "minpupilsize",
    "startpupilsize",
    "endpupilsize",
    "meanpupilvelocity",
    "stddevpupilvelocity",
    "maxpupilvelocity",
    "minpupilvelocity",
    "meandistance",
    "stddevdistance",
    "maxdistance",
    "mindistance",
    "startdistance",
    "enddistance",
    "restpupilsize",
    "meanpupilsizechange",
    "stddevpupilsizechange",
    "maxpupilsizechange",
    "minpupilsizechange",
    "numblinks",
    "sumblinkduration",
    "meanblinkduration",
    "blinkrate",
    "numevents",
    "numleftclic",
    "numrightclic",
    "numkeypressed",
    "numlogdata",
    "timetofirstleftclic",
    "timetofirstrightclic",
    "timetofirstkeypressed",
];

/// Per-AOI feature names, in export order (transition counts excluded)
pub const AOI_FEATURES: &[&str] = &[
    "numfixations",
    "totaltimespent",
    "proportiontime",
    "proportionnum",
    "meanfixationduration",
    "stddevfixationduration",
    "longestfixation",
    "timetofirstfixation",
    "timetolastfixation",
    "fixationrate",
    "numentries",
    "numexits",
    "numsamples",
];

/// Prefix of the AOI transition counts (`numtransfrom_<AOI>`)
pub const TRANSITION_PREFIX: &str = "numtransfrom_";

/// Features of one segment or scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub values: BTreeMap<String, f64>,
    /// AOI name → AOI feature name → value
    pub aoi: BTreeMap<String, BTreeMap<String, f64>>,
}

impl FeatureSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn aoi_feature(&self, aoi: &str, name: &str) -> Option<f64> {
        self.aoi.get(aoi).and_then(|features| features.get(name)).copied()
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    fn set_count(&mut self, name: &str, count: usize) {
        self.set(name, count as f64);
    }

    fn set_or_sentinel(&mut self, name: &str, value: Option<f64>) {
        self.set(name, value.unwrap_or(EMPTY_SENTINEL));
    }
}

/// Everything the feature computation of one interval reads
#[derive(Debug, Clone, Copy)]
pub struct FeatureInput<'a> {
    /// Start of the interval (ms); times-to-first are relative to it
    pub start: i64,
    /// End of the interval (ms)
    pub end: i64,
    /// Covered duration (ms); the sum of segment lengths for a scene
    pub length: i64,
    pub samples: &'a [Datapoint],
    pub fixations: &'a [Fixation],
    pub saccades: &'a [Saccade],
    pub events: &'a [Event],
    pub validity: &'a ValiditySummary,
    pub thresholds: &'a QualityThresholds,
    pub aois: &'a [Aoi],
    pub rest_pupil_size: Option<f64>,
}

/// Whether every sample carries a known blink status
pub fn blink_status_known(samples: &[Datapoint]) -> bool {
    samples.iter().all(|sample| sample.is_valid_blink.is_some())
}

/// Feature deriver for segments and scenes
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the features of one interval. Pure: the same input always
    /// yields the same set.
    pub fn derive(input: &FeatureInput<'_>) -> FeatureSet {
        let mut features = FeatureSet::default();
        compute_general(&mut features, input);
        compute_fixations(&mut features, input);
        compute_path(&mut features, input.fixations);
        compute_saccades(&mut features, input);
        compute_pupil_and_distance(&mut features, input);
        if let Some(rest) = input.rest_pupil_size {
            compute_rest_baseline(&mut features, input.samples, rest);
        }
        if blink_status_known(input.samples) {
            compute_blinks(&mut features, input);
        }
        compute_events(&mut features, input);
        for aoi in input.aois {
            if aoi.overlaps(input.start, input.end) {
                let aoi_features = compute_aoi(aoi, input);
                features.aoi.insert(aoi.name.clone(), aoi_features);
            }
        }
        features
    }
}

/// Descriptive statistics of a non-empty value list
#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    sum: f64,
    mean: f64,
    stddev: f64,
    min: f64,
    max: f64,
    first: f64,
    last: f64,
}

/// Summarize a value list; `None` when it is empty.
///
/// The standard deviation is the sample one (n - 1) and 0 for a single value.
fn summarize(values: &[f64]) -> Option<Summary> {
    let (&first, &last) = (values.first()?, values.last()?);
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let mean = sum / n;
    let stddev = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    } else {
        0.0
    };
    Some(Summary {
        sum,
        mean,
        stddev,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        first,
        last,
    })
}

fn rate(count: usize, length: i64) -> Option<f64> {
    if count == 0 || length <= 0 {
        None
    } else {
        Some(count as f64 / length as f64)
    }
}

fn compute_general(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    features.set("length", input.length as f64);
    features.set_count("numsamples", input.samples.len());
    features.set_or_sentinel("proportionvalid", input.validity.coverage());
    features.set("largestinvalidgap", input.validity.largest_gap_ms() as f64);
}

fn compute_fixations(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    let durations: Vec<f64> = input.fixations.iter().map(|f| f.duration as f64).collect();
    let summary = summarize(&durations);

    features.set_count("numfixations", durations.len());
    features.set_or_sentinel("sumfixationduration", summary.map(|s| s.sum));
    features.set_or_sentinel("meanfixationduration", summary.map(|s| s.mean));
    features.set_or_sentinel("stddevfixationduration", summary.map(|s| s.stddev));
    features.set_or_sentinel("fixationrate", rate(durations.len(), input.length));
}

fn compute_path(features: &mut FeatureSet, fixations: &[Fixation]) {
    let vectors: Vec<(f64, f64)> = fixations
        .windows(2)
        .map(|pair| (pair[1].point.x - pair[0].point.x, pair[1].point.y - pair[0].point.y))
        .collect();

    let distances: Vec<f64> = vectors.iter().map(|(dx, dy)| dx.hypot(*dy)).collect();
    let distance = summarize(&distances);
    features.set_or_sentinel("sumpathdistance", distance.map(|s| s.sum));
    features.set_or_sentinel("meanpathdistance", distance.map(|s| s.mean));
    features.set_or_sentinel("stddevpathdistance", distance.map(|s| s.stddev));

    let abs_angles: Vec<f64> = vectors
        .iter()
        .filter(|(dx, dy)| *dx != 0.0 || *dy != 0.0)
        .map(|(dx, dy)| dy.atan2(*dx).abs())
        .collect();
    let abs = summarize(&abs_angles);
    features.set_or_sentinel("meanabspathangles", abs.map(|s| s.mean));
    features.set_or_sentinel("stddevabspathangles", abs.map(|s| s.stddev));

    let rel_angles: Vec<f64> = vectors
        .windows(2)
        .filter_map(|pair| relative_angle(pair[0], pair[1]))
        .collect();
    let rel = summarize(&rel_angles);
    features.set_or_sentinel("meanrelpathangles", rel.map(|s| s.mean));
    features.set_or_sentinel("stddevrelpathangles", rel.map(|s| s.stddev));
}

/// Angle between two consecutive path vectors, in `[0, π]`
fn relative_angle(a: (f64, f64), b: (f64, f64)) -> Option<f64> {
    let norms = a.0.hypot(a.1) * b.0.hypot(b.1);
    if norms == 0.0 {
        return None;
    }
    let cos = ((a.0 * b.0 + a.1 * b.1) / norms).clamp(-1.0, 1.0);
    Some(cos.acos())
}

fn compute_saccades(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    let saccades = input.saccades;
    let distances: Vec<f64> = saccades.iter().map(|s| s.distance).collect();
    let durations: Vec<f64> = saccades.iter().map(|s| s.duration as f64).collect();
    let speeds: Vec<f64> = saccades.iter().map(|s| s.speed).collect();
    let accelerations: Vec<f64> = saccades.iter().filter_map(|s| s.acceleration).collect();

    let distance = summarize(&distances);
    let duration = summarize(&durations);
    let speed = summarize(&speeds);

    features.set_count("numsaccades", saccades.len());
    features.set_or_sentinel("sumsaccadedistance", distance.map(|s| s.sum));
    features.set_or_sentinel("meansaccadedistance", distance.map(|s| s.mean));
    features.set_or_sentinel("stddevsaccadedistance", distance.map(|s| s.stddev));
    features.set_or_sentinel("sumsaccadeduration", duration.map(|s| s.sum));
    features.set_or_sentinel("meansaccadeduration", duration.map(|s| s.mean));
    features.set_or_sentinel("meansaccadespeed", speed.map(|s| s.mean));
    features.set_or_sentinel("stddevsaccadespeed", speed.map(|s| s.stddev));
    features.set_or_sentinel("maxsaccadespeed", speed.map(|s| s.max));
    features.set_or_sentinel("minsaccadespeed", speed.map(|s| s.min));
    features.set_or_sentinel(
        "meansaccadeacceleration",
        summarize(&accelerations).map(|s| s.mean),
    );

    let fixation_time: i64 = input.fixations.iter().map(|f| f.duration).sum();
    let ratio = match duration {
        Some(saccade_time) if !input.fixations.is_empty() && saccade_time.sum > 0.0 => {
            Some(fixation_time as f64 / saccade_time.sum)
        }
        _ => None,
    };
    features.set_or_sentinel("fixationsaccadetimeratio", ratio);
}

fn set_summary(features: &mut FeatureSet, suffix: &str, values: &[f64], with_ends: bool) {
    let summary = summarize(values);
    features.set_or_sentinel(&format!("mean{suffix}"), summary.map(|s| s.mean));
    features.set_or_sentinel(&format!("stddev{suffix}"), summary.map(|s| s.stddev));
    features.set_or_sentinel(&format!("max{suffix}"), summary.map(|s| s.max));
    features.set_or_sentinel(&format!("min{suffix}"), summary.map(|s| s.min));
    if with_ends {
        features.set_or_sentinel(&format!("start{suffix}"), summary.map(|s| s.first));
        features.set_or_sentinel(&format!("end{suffix}"), summary.map(|s| s.last));
    }
}

/// Pupil sizes of the valid samples, in time order
fn valid_pupil_sizes(samples: &[Datapoint]) -> Vec<f64> {
    samples
        .iter()
        .filter(|s| s.is_valid)
        .filter_map(|s| s.pupil_size)
        .collect()
}

fn compute_pupil_and_distance(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    let samples = input.samples;
    set_summary(features, "pupilsize", &valid_pupil_sizes(samples), true);

    let velocities: Vec<f64> = samples
        .iter()
        .filter(|s| s.is_valid)
        .filter_map(|s| s.pupil_velocity)
        .collect();
    set_summary(features, "pupilvelocity", &velocities, false);

    let distances: Vec<f64> = samples
        .iter()
        .filter(|s| s.is_valid)
        .filter_map(|s| s.distance)
        .collect();
    set_summary(features, "distance", &distances, true);
}

fn compute_rest_baseline(features: &mut FeatureSet, samples: &[Datapoint], rest: f64) {
    features.set("restpupilsize", rest);
    let changes: Vec<f64> = valid_pupil_sizes(samples)
        .into_iter()
        .filter_map(|size| calculate_deviation(size, rest))
        .collect();
    set_summary(features, "pupilsizechange", &changes, false);
}

/// Durations of the runs of samples where the eyes were not both tracked,
/// kept when they fall within the configured blink range
fn blink_durations(samples: &[Datapoint], thresholds: &QualityThresholds) -> Vec<f64> {
    let mut blinks = Vec::new();
    let mut run: Option<(i64, i64)> = None;

    for sample in samples {
        match (sample.is_valid_blink, run) {
            (Some(false), None) => run = Some((sample.timestamp, sample.timestamp)),
            (Some(false), Some((start, _))) => run = Some((start, sample.timestamp)),
            (_, Some((start, _))) => {
                blinks.push(sample.timestamp - start);
                run = None;
            }
            (_, None) => {}
        }
    }
    if let Some((start, last)) = run {
        blinks.push(last - start);
    }

    blinks
        .into_iter()
        .filter(|d| (thresholds.blink_min_ms..=thresholds.blink_max_ms).contains(d))
        .map(|d| d as f64)
        .collect()
}

fn compute_blinks(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    let blinks = blink_durations(input.samples, input.thresholds);
    let summary = summarize(&blinks);
    features.set_count("numblinks", blinks.len());
    features.set_or_sentinel("sumblinkduration", summary.map(|s| s.sum));
    features.set_or_sentinel("meanblinkduration", summary.map(|s| s.mean));
    features.set_or_sentinel("blinkrate", rate(blinks.len(), input.length));
}

fn compute_events(features: &mut FeatureSet, input: &FeatureInput<'_>) {
    let events = input.events;
    let first = |matches: fn(&EventKind) -> bool| {
        events
            .iter()
            .filter(|e| matches(&e.kind))
            .map(|e| (e.timestamp - input.start) as f64)
            .next()
    };
    let count = |matches: fn(&EventKind) -> bool| events.iter().filter(|e| matches(&e.kind)).count();

    let left = |k: &EventKind| matches!(k, EventKind::LeftMouseClick { .. });
    let right = |k: &EventKind| matches!(k, EventKind::RightMouseClick { .. });
    let key = |k: &EventKind| matches!(k, EventKind::KeyPress { .. });
    let log_data = |k: &EventKind| matches!(k, EventKind::LogData { .. });

    features.set_count("numevents", events.len());
    features.set_count("numleftclic", count(left));
    features.set_count("numrightclic", count(right));
    features.set_count("numkeypressed", count(key));
    features.set_count("numlogdata", count(log_data));
    features.set_or_sentinel("timetofirstleftclic", first(left));
    features.set_or_sentinel("timetofirstrightclic", first(right));
    features.set_or_sentinel("timetofirstkeypressed", first(key));
}

fn fixation_in(aoi: &Aoi, fixation: &Fixation) -> bool {
    aoi.hit(fixation.timestamp, &fixation.point)
}

fn compute_aoi(aoi: &Aoi, input: &FeatureInput<'_>) -> BTreeMap<String, f64> {
    let mut features = FeatureSet::default();
    let inside: Vec<&Fixation> = input.fixations.iter().filter(|f| fixation_in(aoi, f)).collect();
    let durations: Vec<f64> = inside.iter().map(|f| f.duration as f64).collect();
    let summary = summarize(&durations);
    let total_fixation_time: i64 = input.fixations.iter().map(|f| f.duration).sum();

    features.set_count("numfixations", inside.len());
    features.set("totaltimespent", summary.map_or(0.0, |s| s.sum));
    features.set_or_sentinel(
        "proportiontime",
        summary
            .filter(|_| total_fixation_time > 0)
            .map(|s| s.sum / total_fixation_time as f64),
    );
    features.set_or_sentinel(
        "proportionnum",
        (!input.fixations.is_empty()).then(|| inside.len() as f64 / input.fixations.len() as f64),
    );
    features.set_or_sentinel("meanfixationduration", summary.map(|s| s.mean));
    features.set_or_sentinel("stddevfixationduration", summary.map(|s| s.stddev));
    features.set_or_sentinel("longestfixation", summary.map(|s| s.max));
    features.set_or_sentinel(
        "timetofirstfixation",
        inside.first().map(|f| (f.timestamp - input.start) as f64),
    );
    features.set_or_sentinel(
        "timetolastfixation",
        inside.last().map(|f| (f.timestamp - input.start) as f64),
    );
    features.set_or_sentinel("fixationrate", rate(inside.len(), input.length));

    let mut entries = 0;
    let mut exits = 0;
    let mut was_inside = false;
    for fixation in input.fixations {
        let is_inside = fixation_in(aoi, fixation);
        if is_inside && !was_inside {
            entries += 1;
        } else if !is_inside && was_inside {
            exits += 1;
        }
        was_inside = is_inside;
    }
    features.set_count("numentries", entries);
    features.set_count("numexits", exits);

    let samples_inside = input
        .samples
        .iter()
        .filter(|s| s.gaze.map_or(false, |g: GazePoint| aoi.hit(s.timestamp, &g)))
        .count();
    features.set_count("numsamples", samples_inside);

    for other in input.aois {
        if other.name == aoi.name || !other.overlaps(input.start, input.end) {
            continue;
        }
        let transitions = input
            .fixations
            .windows(2)
            .filter(|pair| fixation_in(other, &pair[0]) && fixation_in(aoi, &pair[1]))
            .count();
        features.set_count(&format!("{TRANSITION_PREFIX}{}", other.name), transitions);
    }

    features.values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aoi::Polygon;
    use crate::types::MediaOffset;

    fn fixation(index: i64, timestamp: i64, duration: i64, x: f64, y: f64) -> Fixation {
        Fixation::new(index, timestamp, duration, GazePoint::new(x, y), MediaOffset::default())
    }

    fn sample(timestamp: i64, pupil: f64, blink: Option<bool>) -> Datapoint {
        Datapoint {
            timestamp,
            pupil_size: Some(pupil),
            pupil_velocity: None,
            distance: Some(600.0),
            is_valid: true,
            is_valid_blink: blink,
            gaze: Some(GazePoint::new(50.0, 50.0)),
            fixation_index: None,
        }
    }

    fn square(name: &str, x0: f64) -> Aoi {
        Aoi::new(
            name,
            vec![Polygon::new(vec![
                GazePoint::new(x0, 0.0),
                GazePoint::new(x0 + 100.0, 0.0),
                GazePoint::new(x0 + 100.0, 100.0),
                GazePoint::new(x0, 100.0),
            ])],
        )
    }

    struct Fixture {
        samples: Vec<Datapoint>,
        fixations: Vec<Fixation>,
        saccades: Vec<Saccade>,
        events: Vec<Event>,
        validity: ValiditySummary,
        thresholds: QualityThresholds,
        aois: Vec<Aoi>,
    }

    impl Fixture {
        fn new(samples: Vec<Datapoint>, fixations: Vec<Fixation>) -> Self {
            let validity = ValiditySummary::from_samples(&samples, 1000);
            Self {
                samples,
                fixations,
                saccades: Vec::new(),
                events: Vec::new(),
                validity,
                thresholds: QualityThresholds::default(),
                aois: Vec::new(),
            }
        }

        fn input(&self, rest_pupil_size: Option<f64>) -> FeatureInput<'_> {
            FeatureInput {
                start: 0,
                end: 1000,
                length: 1000,
                samples: &self.samples,
                fixations: &self.fixations,
                saccades: &self.saccades,
                events: &self.events,
                validity: &self.validity,
                thresholds: &self.thresholds,
                aois: &self.aois,
                rest_pupil_size,
            }
        }
    }

    #[test]
    fn test_summarize() {
        let s = summarize(&[2.0, 4.0, 6.0]).unwrap();
        assert_eq!(s.sum, 12.0);
        assert_eq!(s.mean, 4.0);
        assert!((s.stddev - 2.0).abs() < 1e-9);
        assert_eq!((s.min, s.max, s.first, s.last), (2.0, 6.0, 2.0, 6.0));
        assert_eq!(summarize(&[5.0]).unwrap().stddev, 0.0);
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_empty_interval_uses_sentinel() {
        let fixture = Fixture::new(Vec::new(), Vec::new());
        let features = FeatureDeriver::derive(&fixture.input(None));

        assert_eq!(features.get("numfixations"), Some(0.0));
        assert_eq!(features.get("numsaccades"), Some(0.0));
        for name in [
            "sumfixationduration",
            "meanfixationduration",
            "stddevfixationduration",
            "fixationrate",
            "meanpathdistance",
            "meansaccadespeed",
            "fixationsaccadetimeratio",
            "meanpupilsize",
            "proportionvalid",
            "timetofirstleftclic",
        ] {
            assert_eq!(features.get(name), Some(EMPTY_SENTINEL), "{name}");
        }
        assert_eq!(features.get("restpupilsize"), None);
    }

    #[test]
    fn test_fixation_and_path_features() {
        let fixture = Fixture::new(
            Vec::new(),
            vec![
                fixation(1, 0, 100, 0.0, 0.0),
                fixation(2, 200, 200, 30.0, 40.0),
                fixation(3, 500, 300, 30.0, 0.0),
            ],
        );
        let features = FeatureDeriver::derive(&fixture.input(None));

        assert_eq!(features.get("numfixations"), Some(3.0));
        assert_eq!(features.get("sumfixationduration"), Some(600.0));
        assert_eq!(features.get("meanfixationduration"), Some(200.0));
        assert_eq!(features.get("stddevfixationduration"), Some(100.0));
        assert_eq!(features.get("fixationrate"), Some(0.003));
        assert_eq!(features.get("sumpathdistance"), Some(90.0));
        assert_eq!(features.get("meanpathdistance"), Some(45.0));

        // second leg points straight down: |atan2(-40, 0)| = π/2
        let abs = features.get("meanabspathangles").unwrap();
        let expected = ((40.0f64).atan2(30.0) + std::f64::consts::FRAC_PI_2) / 2.0;
        assert!((abs - expected).abs() < 1e-9);
        assert!(features.get("meanrelpathangles").unwrap() > 0.0);
    }

    #[test]
    fn test_pupil_features_against_rest_baseline() {
        let samples = vec![
            sample(0, 3.0, Some(true)),
            sample(10, 3.3, Some(true)),
            sample(20, 3.6, Some(true)),
        ];
        let fixture = Fixture::new(samples, Vec::new());

        let features = FeatureDeriver::derive(&fixture.input(Some(3.0)));
        assert!((features.get("meanpupilsize").unwrap() - 3.3).abs() < 1e-9);
        assert_eq!(features.get("startpupilsize"), Some(3.0));
        assert_eq!(features.get("endpupilsize"), Some(3.6));
        assert_eq!(features.get("restpupilsize"), Some(3.0));
        assert!((features.get("maxpupilsizechange").unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(features.get("minpupilsizechange"), Some(0.0));
        // no velocities were derived for these samples
        assert_eq!(features.get("meanpupilvelocity"), Some(EMPTY_SENTINEL));

        let without = FeatureDeriver::derive(&fixture.input(None));
        assert_eq!(without.get("restpupilsize"), None);
        assert_eq!(without.get("meanpupilsizechange"), None);
    }

    #[test]
    fn test_blinks_only_with_known_status() {
        let mut samples: Vec<Datapoint> = (0..100).map(|i| sample(i * 10, 3.0, Some(true))).collect();
        // 150 ms run: a blink; 20 ms run: too short
        for s in samples.iter_mut().filter(|s| (200..350).contains(&s.timestamp)) {
            s.is_valid_blink = Some(false);
        }
        for s in samples.iter_mut().filter(|s| (600..620).contains(&s.timestamp)) {
            s.is_valid_blink = Some(false);
        }
        let fixture = Fixture::new(samples.clone(), Vec::new());
        let features = FeatureDeriver::derive(&fixture.input(None));
        assert_eq!(features.get("numblinks"), Some(1.0));
        assert_eq!(features.get("sumblinkduration"), Some(150.0));

        samples[0].is_valid_blink = None;
        let unknown = Fixture::new(samples, Vec::new());
        let features = FeatureDeriver::derive(&unknown.input(None));
        assert_eq!(features.get("numblinks"), None);
    }

    #[test]
    fn test_event_features() {
        let mut fixture = Fixture::new(Vec::new(), Vec::new());
        let offset = MediaOffset::default();
        fixture.events = vec![
            Event::new(100, EventKind::LogData { description: "start".into() }, None, offset),
            Event::new(250, EventKind::LeftMouseClick { x: None, y: None }, None, offset),
            Event::new(400, EventKind::LeftMouseClick { x: None, y: None }, None, offset),
        ];
        let features = FeatureDeriver::derive(&fixture.input(None));
        assert_eq!(features.get("numevents"), Some(3.0));
        assert_eq!(features.get("numleftclic"), Some(2.0));
        assert_eq!(features.get("numlogdata"), Some(1.0));
        assert_eq!(features.get("timetofirstleftclic"), Some(250.0));
        assert_eq!(features.get("timetofirstkeypressed"), Some(EMPTY_SENTINEL));
    }

    #[test]
    fn test_aoi_features() {
        let mut fixture = Fixture::new(
            vec![sample(0, 3.0, Some(true))],
            vec![
                fixation(1, 0, 100, 50.0, 50.0),
                fixation(2, 200, 300, 150.0, 50.0),
                fixation(3, 600, 100, 60.0, 50.0),
            ],
        );
        fixture.aois = vec![
            square("left", 0.0),
            square("right", 100.0),
            square("later", 300.0).with_windows(vec![(5000, 6000)]),
        ];
        let features = FeatureDeriver::derive(&fixture.input(None));

        assert!(!features.aoi.contains_key("later"));
        assert_eq!(features.aoi_feature("left", "numfixations"), Some(2.0));
        assert_eq!(features.aoi_feature("left", "totaltimespent"), Some(200.0));
        assert_eq!(features.aoi_feature("left", "proportiontime"), Some(0.4));
        assert_eq!(features.aoi_feature("left", "longestfixation"), Some(100.0));
        assert_eq!(features.aoi_feature("left", "timetolastfixation"), Some(600.0));
        assert_eq!(features.aoi_feature("left", "numentries"), Some(2.0));
        assert_eq!(features.aoi_feature("left", "numexits"), Some(1.0));
        assert_eq!(features.aoi_feature("left", "numsamples"), Some(1.0));
        assert_eq!(features.aoi_feature("left", "numtransfrom_right"), Some(1.0));
        assert_eq!(features.aoi_feature("right", "numtransfrom_left"), Some(1.0));
        assert_eq!(features.aoi_feature("right", "timetofirstfixation"), Some(200.0));
    }

    #[test]
    fn test_derive_is_idempotent() {
        let fixture = Fixture::new(
            vec![sample(0, 3.0, Some(true)), sample(10, 3.2, Some(true))],
            vec![fixation(1, 0, 100, 0.0, 0.0), fixation(2, 200, 100, 10.0, 0.0)],
        );
        let input = fixture.input(Some(3.1));
        assert_eq!(FeatureDeriver::derive(&input), FeatureDeriver::derive(&input));
    }
}
