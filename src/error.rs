//! Error types for galvano

use thiserror::Error;

/// Errors that can occur while loading, segmenting, or aggregating data
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing column '{column}' in header of '{file}'")]
    MissingColumn { file: String, column: String },

    #[error("export '{file}' contains no sample rows")]
    EmptyExport { file: String },

    #[error("boundary position '{cell}' in '{file}' is not an integer")]
    BoundaryParse { file: String, cell: String },

    #[error(
        "segment integrity failure for respondent '{respondent}': \
         {boundaries} boundary markers, expected {expected} segments, found {found}"
    )]
    SegmentIntegrity {
        respondent: String,
        boundaries: usize,
        expected: usize,
        found: usize,
    },

    #[error("flat signal for respondent '{respondent}': every value equals {value}")]
    DegenerateNormalization { respondent: String, value: f64 },
}
