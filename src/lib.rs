//! Galvano - offline EDA and pupil-dilation analysis for media-stimulus
//! research
//!
//! Galvano ingests per-respondent biometric exports synchronized to video
//! event markers and turns them into comparative aggregates through a
//! deterministic pipeline: ingestion → event segmentation → tonic/phasic
//! decomposition → normalization → peak detection → cross-respondent
//! aggregation.
//!
//! Rendering and statistical testing stay outside the crate: every aggregate
//! is exposed as a serializable table any backend can consume.

pub mod aggregate;
pub mod config;
pub mod decompose;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod peaks;
pub mod pipeline;
pub mod report;
pub mod segmenter;
pub mod types;

pub use config::{BoundaryOrdering, PipelineConfig};
pub use error::PipelineError;
pub use pipeline::{analyze_directory, PipelineProcessor};
pub use report::{JsonDirSink, ReportSink, RunReport};

/// Galvano version embedded in all run reports
pub const GALVANO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run reports
pub const PRODUCER_NAME: &str = "galvano";
