//! Pipeline configuration
//!
//! Every tunable of the analysis lives here as one immutable value passed into
//! the components; nothing in the crate reads process-wide mutable state.
//! Defaults match the production study setup: 32 ms sampling, millisecond
//! sync positions, 1 s detection bins.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default tonic rolling-mean width in samples (about 5 s at 32 ms sampling)
pub const DEFAULT_ROLLING_WINDOW: usize = 156;

/// Default positions-to-seconds scale (sync positions in milliseconds)
pub const DEFAULT_BIN_SCALE: f64 = 1.0 / 1000.0;

/// How boundary markers are paired into segments.
///
/// The export lists markers chronologically, but historical tooling grouped
/// them by category label before pairing. The two orders coincide for the
/// standard numbered event catalogs; they diverge when a catalog is not
/// lexicographically aligned with presentation order, so the choice is
/// explicit rather than inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryOrdering {
    /// Pair markers in the order they appear in the file (authoritative default)
    #[default]
    Chronological,
    /// Stable-sort markers by category label before pairing
    CategoryGrouped,
}

/// Which analyses the pipeline runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSelection {
    /// Peak detection on the raw EDA channel
    pub eda_peaks: bool,
    /// Peak detection on the averaged pupil channel
    pub pupil_peaks: bool,
    /// Peak detection on the normalized phasic component
    pub phasic_peaks: bool,
    /// Per-category and time-binned means of normalized EDA
    pub mean_eda: bool,
    /// Whole-recording overview distributions per respondent
    pub overview: bool,
}

impl Default for AnalysisSelection {
    fn default() -> Self {
        Self {
            eda_peaks: true,
            pupil_peaks: false,
            phasic_peaks: false,
            mean_eda: true,
            overview: true,
        }
    }
}

/// Immutable configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cell delimiter of the export format
    pub delimiter: char,
    /// File extension of export files in the input directory (without dot)
    pub file_extension: String,
    /// Header name of the sync-position column
    pub position_column: String,
    /// Header name of the skin-conductance column
    pub eda_column: String,
    /// Header names of the two pupil-diameter columns (averaged pairwise)
    pub pupil_columns: [String; 2],
    /// Header name of the event-tag column
    pub event_column: String,

    /// Tonic rolling-mean width in samples
    pub rolling_window: usize,
    /// Width of time bins for time-distribution aggregates, in seconds
    pub time_bin_secs: f64,
    /// Positions-to-seconds scale; the detection bin width is `1 / bin_scale`
    pub bin_scale: f64,
    /// Significance in standard deviations above background for peaks
    pub peak_sigma: f64,
    /// Relative amplitude threshold for peaks, in (0, 1)
    pub peak_amplitude: f64,
    /// Clipping passes of the background estimator; also bounds its widest
    /// smoothing window in detection bins
    pub background_window: usize,
    /// Buffer added to a repeated category marker to catch delayed responses
    pub end_buffer: i64,
    /// Detection-bin widths trimmed off each side of a segment before peak
    /// detection, excluding boundary-sample artifacts
    pub boundary_margin_bins: f64,
    /// Pairing order for boundary markers
    pub boundary_ordering: BoundaryOrdering,

    /// Event-name catalog; every respondent must yield one segment per entry
    pub events: Vec<String>,
    /// Named groups of events overlaid in comparative aggregates
    pub comparison_groups: BTreeMap<String, Vec<String>>,
    /// Which analyses run
    pub analyses: AnalysisSelection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: ';',
            file_extension: "txt".to_string(),
            position_column: "position".to_string(),
            eda_column: "EDA".to_string(),
            pupil_columns: ["PupilLeft".to_string(), "PupilRight".to_string()],
            event_column: "tag__info_StudioEventData".to_string(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
            time_bin_secs: 30.0,
            bin_scale: DEFAULT_BIN_SCALE,
            peak_sigma: 4.0,
            peak_amplitude: 0.05,
            background_window: 20,
            end_buffer: 0,
            boundary_margin_bins: 1.0,
            boundary_ordering: BoundaryOrdering::Chronological,
            events: Vec::new(),
            comparison_groups: BTreeMap::new(),
            analyses: AnalysisSelection::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a configuration from JSON and validate it
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Detection bin width in position units
    pub fn bin_width(&self) -> f64 {
        1.0 / self.bin_scale
    }

    /// Margin trimmed off each segment side before peak detection, in
    /// position units
    pub fn boundary_margin(&self) -> f64 {
        self.boundary_margin_bins * self.bin_width()
    }

    /// All event names appearing in any comparison group
    pub fn compared_events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .comparison_groups
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Validate parameter combinations. Invalid configuration is fatal and
    /// must be rejected before any file is read.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.rolling_window < 2 {
            return Err(PipelineError::Config(format!(
                "rolling_window must be at least 2, got {}",
                self.rolling_window
            )));
        }
        if !(self.bin_scale > 0.0) {
            return Err(PipelineError::Config(format!(
                "bin_scale must be positive, got {}",
                self.bin_scale
            )));
        }
        if !(self.time_bin_secs > 0.0) {
            return Err(PipelineError::Config(format!(
                "time_bin_secs must be positive, got {}",
                self.time_bin_secs
            )));
        }
        if !(self.peak_sigma > 0.0) {
            return Err(PipelineError::Config(format!(
                "peak_sigma must be positive, got {}",
                self.peak_sigma
            )));
        }
        if !(self.peak_amplitude > 0.0 && self.peak_amplitude < 1.0) {
            return Err(PipelineError::Config(format!(
                "peak_amplitude must lie in (0, 1), got {}",
                self.peak_amplitude
            )));
        }
        if self.background_window == 0 {
            return Err(PipelineError::Config(
                "background_window must be at least 1".to_string(),
            ));
        }
        if self.boundary_margin_bins < 0.0 {
            return Err(PipelineError::Config(format!(
                "boundary_margin_bins must be non-negative, got {}",
                self.boundary_margin_bins
            )));
        }
        if self.events.is_empty() {
            return Err(PipelineError::Config(
                "event catalog is empty".to_string(),
            ));
        }
        for (group, members) in &self.comparison_groups {
            if members.is_empty() {
                return Err(PipelineError::Config(format!(
                    "comparison group '{group}' is empty"
                )));
            }
            for member in members {
                if !self.events.contains(member) {
                    return Err(PipelineError::Config(format!(
                        "comparison group '{group}' references unknown event '{member}'"
                    )));
                }
            }
        }
        Ok(())
    }
}
