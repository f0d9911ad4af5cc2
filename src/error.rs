//! Error types for Gaze Flux

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing recordings or building features
#[derive(Debug, Error)]
pub enum GazeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown eye tracker type: {0}")]
    UnknownTracker(String),

    #[error("No segments found in {0}")]
    NoSegments(String),

    #[error("Failed to parse {source_name} (line {line}): {message}")]
    ParseError {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("Missing required column '{column}' in {source_name}")]
    MissingColumn { source_name: String, column: String },

    #[error("Missing input file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl GazeError {
    pub(crate) fn parse(source_name: &str, line: u64, message: impl Into<String>) -> Self {
        GazeError::ParseError {
            source_name: source_name.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Configuration errors abort a whole batch; every other error only
    /// affects the participant being built.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GazeError::Configuration(_) | GazeError::UnknownTracker(_) | GazeError::NoSegments(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(GazeError::UnknownTracker("EyeLink".into()).is_configuration());
        assert!(GazeError::NoSegments("p1.seg".into()).is_configuration());
        assert!(!GazeError::MissingFile(PathBuf::from("p1.tsv")).is_configuration());
        assert!(!GazeError::parse("samples", 3, "bad number").is_configuration());
    }

    #[test]
    fn test_parse_error_message() {
        let err = GazeError::parse("Fixation-Data.tsv", 12, "invalid integer 'abc'");
        assert_eq!(
            err.to_string(),
            "Failed to parse Fixation-Data.tsv (line 12): invalid integer 'abc'"
        );
    }
}
