//! Parsed recordings
//!
//! A [`Recording`] holds every stream of one tracker session, sorted by
//! timestamp so that segment windows can be cut with binary searches.

use crate::adapters::TrackerAdapter;
use crate::error::GazeError;
use crate::types::{Datapoint, Event, Fixation, Saccade, TrackerKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Raw text of the files of one recording
#[derive(Debug, Clone, Copy)]
pub struct RecordingSources<'a> {
    pub samples: &'a str,
    pub fixations: &'a str,
    /// Source of saccades; no saccades are produced without one
    pub saccades: Option<&'a str>,
    /// Source of external events
    pub events: Option<&'a str>,
}

/// Locations of the files of one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFiles {
    pub samples: PathBuf,
    pub fixations: PathBuf,
    pub saccades: Option<PathBuf>,
    pub events: Option<PathBuf>,
    pub segments: PathBuf,
}

impl RecordingFiles {
    /// File names a tracker's export tool produces for `recording_id`
    pub fn for_recording(tracker: TrackerKind, data_dir: &Path, recording_id: &str) -> Self {
        let path = |name: String| data_dir.join(name);
        match tracker {
            TrackerKind::TobiiV2 => Self {
                samples: path(format!("{recording_id}-All-Data.tsv")),
                fixations: path(format!("{recording_id}-Fixation-Data.tsv")),
                saccades: None,
                events: None,
                segments: path(format!("{recording_id}.seg")),
            },
            TrackerKind::TobiiV3 => {
                let all_data = path(format!("{recording_id}-All-Data.tsv"));
                Self {
                    samples: all_data.clone(),
                    fixations: all_data.clone(),
                    saccades: Some(all_data),
                    events: None,
                    segments: path(format!("{recording_id}.seg")),
                }
            }
            TrackerKind::Smi => {
                let events = path(format!("SMI_Sample_{recording_id}_Events.txt"));
                Self {
                    samples: path(format!("SMI_Sample_{recording_id}_Samples.txt")),
                    fixations: events.clone(),
                    saccades: Some(events.clone()),
                    events: Some(events),
                    segments: path(format!("SMI_Sample_{recording_id}.seg")),
                }
            }
        }
    }

    /// Required files that do not exist
    pub fn missing(&self) -> Vec<&Path> {
        [&self.samples, &self.fixations, &self.segments]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|path| !path.exists())
            .collect()
    }
}

/// Every stream of one recording. Media offsets are already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub tracker: TrackerKind,
    pub samples: Vec<Datapoint>,
    pub fixations: Vec<Fixation>,
    pub saccades: Vec<Saccade>,
    pub events: Vec<Event>,
}

impl Recording {
    /// Parse a recording with the given tracker adapter
    pub fn parse(
        adapter: &dyn TrackerAdapter,
        sources: &RecordingSources<'_>,
    ) -> Result<Self, GazeError> {
        let samples = adapter.read_samples(sources.samples)?;
        let fixations = adapter.read_fixations(sources.fixations)?;
        let saccades = match sources.saccades {
            Some(raw) => adapter.read_saccades(raw, &samples)?,
            None => Vec::new(),
        };
        let events = match sources.events {
            Some(raw) => adapter.read_events(raw)?,
            None => Vec::new(),
        };
        Ok(Self::from_streams(
            adapter.kind(),
            samples,
            fixations,
            saccades,
            events,
        ))
    }

    /// Read and parse a recording from disk. A file shared by several
    /// streams is read once; a missing optional file yields an empty stream.
    pub fn from_files(
        adapter: &dyn TrackerAdapter,
        files: &RecordingFiles,
    ) -> Result<Self, GazeError> {
        let mut paths = vec![&files.samples, &files.fixations];
        for path in [&files.saccades, &files.events].into_iter().flatten() {
            if path.exists() {
                paths.push(path);
            } else {
                log::debug!("{} not found, stream left empty", path.display());
            }
        }

        let mut contents: HashMap<PathBuf, String> = HashMap::new();
        for path in paths {
            if contents.contains_key(path) {
                continue;
            }
            if !path.exists() {
                return Err(GazeError::MissingFile(path.clone()));
            }
            contents.insert(path.clone(), std::fs::read_to_string(path)?);
        }

        let sources = RecordingSources {
            samples: loaded(&contents, &files.samples),
            fixations: loaded(&contents, &files.fixations),
            saccades: files
                .saccades
                .as_ref()
                .filter(|path| contents.contains_key(*path))
                .map(|path| loaded(&contents, path)),
            events: files
                .events
                .as_ref()
                .filter(|path| contents.contains_key(*path))
                .map(|path| loaded(&contents, path)),
        };
        Self::parse(adapter, &sources)
    }

    /// Build a recording from already parsed streams
    pub fn from_streams(
        tracker: TrackerKind,
        samples: Vec<Datapoint>,
        mut fixations: Vec<Fixation>,
        mut saccades: Vec<Saccade>,
        mut events: Vec<Event>,
    ) -> Self {
        // stable sorts keep file order among equal timestamps
        fixations.sort_by_key(|f| f.timestamp);
        saccades.sort_by_key(|s| s.timestamp);
        events.sort_by_key(|e| e.timestamp);
        Self {
            tracker,
            samples,
            fixations,
            saccades,
            events,
        }
    }

    /// Borrowed view over every stream
    pub fn streams(&self) -> Streams<'_> {
        Streams {
            samples: &self.samples,
            fixations: &self.fixations,
            saccades: &self.saccades,
            events: &self.events,
        }
    }
}

/// Timestamp-sorted stream slices
#[derive(Debug, Clone, Copy)]
pub struct Streams<'a> {
    pub samples: &'a [Datapoint],
    pub fixations: &'a [Fixation],
    pub saccades: &'a [Saccade],
    pub events: &'a [Event],
}

impl<'a> Streams<'a> {
    /// Everything with a timestamp in `[start, end)`
    pub fn window(&self, start: i64, end: i64) -> Streams<'a> {
        Streams {
            samples: slice_window(self.samples, start, end, |s| s.timestamp),
            fixations: slice_window(self.fixations, start, end, |f| f.timestamp),
            saccades: slice_window(self.saccades, start, end, |s| s.timestamp),
            events: slice_window(self.events, start, end, |e| e.timestamp),
        }
    }
}

fn loaded<'c>(contents: &'c HashMap<PathBuf, String>, path: &Path) -> &'c str {
    contents.get(path).map(String::as_str).unwrap_or_default()
}

fn slice_window<T>(items: &[T], start: i64, end: i64, timestamp: impl Fn(&T) -> i64) -> &[T] {
    let from = items.partition_point(|item| timestamp(item) < start);
    let to = items.partition_point(|item| timestamp(item) < end).max(from);
    &items[from..to]
}
