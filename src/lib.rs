//! Gaze Flux - Eye-tracking feature engine
//!
//! Gaze Flux turns raw eye tracker exports into per-scene and per-segment gaze
//! statistics through a deterministic pipeline: tracker adaptation → saccade
//! reconstruction → partitioning → segment and scene building → participant
//! aggregation → feature table export.
//!
//! ## Trackers
//!
//! - **Tobii Studio 1.x/2.x** (`TobiiV2`): sample and fixation exports
//! - **Tobii Studio 3.x** (`TobiiV3`): a single All-Data export
//! - **SMI BeGaze** (`Smi`): sample export plus a sectioned event export

pub mod adapters;
pub mod aoi;
pub mod baseline;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod participant;
pub mod partition;
pub mod pipeline;
pub mod recording;
pub mod saccade;
pub mod scene;
pub mod segment;
pub mod types;
pub mod validity;

pub use adapters::{adapter_for, TrackerAdapter};
pub use config::RunConfig;
pub use error::GazeError;
pub use export::{FeatureTable, FeatureTableEncoder};
pub use participant::{EntityKey, EntityKind, Participant};
pub use pipeline::{read_participants, BatchOutcome, BatchRequest, GazeProcessor};

/// Gaze Flux version embedded in every feature table
pub const GAZEFLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for feature tables
pub const PRODUCER_NAME: &str = "gaze-flux";
