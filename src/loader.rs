//! Biometric export loading
//!
//! Adapters parse raw delimited exports into per-respondent channel series
//! and the boundary markers the segmenter pairs up. One export file is one
//! respondent; the respondent id is the filename stem.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::BoundaryEvent;
use std::fs;
use std::path::Path;

/// Raw ingestion result for one respondent, before segmentation
#[derive(Debug, Clone)]
pub struct RespondentRecord {
    pub id: String,
    /// Sync positions, one per sample row
    pub positions: Vec<i64>,
    /// Skin-conductance values, forward-filled
    pub eda: Vec<f64>,
    /// Pupil diameter averaged over both eyes, forward-filled
    pub pupil: Vec<f64>,
    /// Boundary markers in file order
    pub boundaries: Vec<BoundaryEvent>,
    /// Sample cells that were empty or non-numeric and carried forward
    pub malformed_rows: usize,
}

/// Trait for biometric export adapters
pub trait BiometricExportAdapter {
    /// Parse raw export text into a respondent record
    fn parse(
        &self,
        raw: &str,
        source_name: &str,
        config: &PipelineConfig,
    ) -> Result<RespondentRecord, PipelineError>;
}

/// Adapter for the delimited ASCII export of the biometric software suite
/// (one header row naming channels, one sample per row, decimal commas).
pub struct DelimitedExportAdapter;

impl DelimitedExportAdapter {
    /// Read and parse one export file
    pub fn parse_file(
        &self,
        path: &Path,
        config: &PipelineConfig,
    ) -> Result<RespondentRecord, PipelineError> {
        let raw = fs::read_to_string(path)?;
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.parse(&raw, &source_name, config)
    }
}

impl BiometricExportAdapter for DelimitedExportAdapter {
    fn parse(
        &self,
        raw: &str,
        source_name: &str,
        config: &PipelineConfig,
    ) -> Result<RespondentRecord, PipelineError> {
        let mut lines = raw.lines();

        let header = lines
            .next()
            .ok_or_else(|| PipelineError::EmptyExport {
                file: source_name.to_string(),
            })?;
        let columns: Vec<&str> = header
            .split(config.delimiter)
            .map(|c| c.trim())
            .collect();

        let lookup = |name: &str| -> Result<usize, PipelineError> {
            columns.iter().position(|c| *c == name).ok_or_else(|| {
                PipelineError::MissingColumn {
                    file: source_name.to_string(),
                    column: name.to_string(),
                }
            })
        };

        let position_col = lookup(&config.position_column)?;
        let eda_col = lookup(&config.eda_column)?;
        let pupil_left_col = lookup(&config.pupil_columns[0])?;
        let pupil_right_col = lookup(&config.pupil_columns[1])?;
        let event_col = lookup(&config.event_column)?;

        let id = Path::new(source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_name.to_string());

        let mut record = RespondentRecord {
            id,
            positions: Vec::new(),
            eda: Vec::new(),
            pupil: Vec::new(),
            boundaries: Vec::new(),
            malformed_rows: 0,
        };

        // Last-observation-carry-forward state, one slot per raw channel.
        let mut last_position: i64 = 0;
        let mut last_eda: f64 = 0.0;
        let mut last_pupil_left: f64 = 0.0;
        let mut last_pupil_right: f64 = 0.0;

        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(config.delimiter).collect();
            let cell = |index: usize| cells.get(index).map(|c| c.trim()).unwrap_or("");

            let position = match parse_numeric(cell(position_col)) {
                Some(v) => v as i64,
                None => {
                    record.malformed_rows += 1;
                    last_position
                }
            };
            last_position = position;

            let eda = match parse_numeric(cell(eda_col)) {
                Some(v) => v,
                None => {
                    record.malformed_rows += 1;
                    last_eda
                }
            };
            last_eda = eda;

            let pupil_left = match parse_numeric(cell(pupil_left_col)) {
                Some(v) => v,
                None => {
                    record.malformed_rows += 1;
                    last_pupil_left
                }
            };
            last_pupil_left = pupil_left;

            let pupil_right = match parse_numeric(cell(pupil_right_col)) {
                Some(v) => v,
                None => {
                    record.malformed_rows += 1;
                    last_pupil_right
                }
            };
            last_pupil_right = pupil_right;

            record.positions.push(position);
            record.eda.push(eda);
            record.pupil.push((pupil_left + pupil_right) / 2.0);

            let tag = cell(event_col);
            if !tag.is_empty() && config.events.iter().any(|e| e == tag) {
                // Boundary positions must be exact integers; anything else
                // invalidates every segment derived from this file.
                let position_cell = cell(position_col);
                let boundary: i64 = position_cell.parse().map_err(|_| {
                    PipelineError::BoundaryParse {
                        file: source_name.to_string(),
                        cell: position_cell.to_string(),
                    }
                })?;
                record.boundaries.push(BoundaryEvent {
                    label: tag.to_string(),
                    position: boundary,
                });
            }
        }

        if record.positions.is_empty() {
            return Err(PipelineError::EmptyExport {
                file: source_name.to_string(),
            });
        }

        if record.malformed_rows > 0 {
            log::warn!(
                "{}: carried forward {} malformed sample cells",
                record.id,
                record.malformed_rows
            );
        }

        Ok(record)
    }
}

/// Parse a sample cell, normalizing decimal commas. Empty and non-numeric
/// cells yield `None` and are carried forward by the caller.
fn parse_numeric(cell: &str) -> Option<f64> {
    if cell.is_empty() {
        return None;
    }
    cell.replace(',', ".").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            events: vec!["A.avi".to_string(), "B.avi".to_string()],
            ..Default::default()
        }
    }

    fn header() -> &'static str {
        "position;EDA;PupilLeft;PupilRight;tag__info_StudioEventData"
    }

    #[test]
    fn test_parses_samples_and_averages_pupils() {
        let raw = format!(
            "{}\n0;1,5;3,0;5,0;\n32;2.5;4.0;6.0;\n",
            header()
        );
        let record = DelimitedExportAdapter
            .parse(&raw, "resp01.txt", &test_config())
            .unwrap();
        assert_eq!(record.id, "resp01");
        assert_eq!(record.positions, vec![0, 32]);
        assert_eq!(record.eda, vec![1.5, 2.5]);
        assert_eq!(record.pupil, vec![4.0, 5.0]);
        assert_eq!(record.malformed_rows, 0);
    }

    #[test]
    fn test_malformed_cell_carries_forward_in_place() {
        let raw = format!(
            "{}\n0;1,0;3;3;\n32;bad;3;3;\n64;;3;3;\n96;4,0;3;3;\n",
            header()
        );
        let record = DelimitedExportAdapter
            .parse(&raw, "resp02.txt", &test_config())
            .unwrap();
        // No row dropped, series length unchanged, previous value carried
        // forward at the exact malformed positions.
        assert_eq!(record.eda, vec![1.0, 1.0, 1.0, 4.0]);
        assert_eq!(record.positions.len(), 4);
        assert_eq!(record.malformed_rows, 2);
    }

    #[test]
    fn test_leading_missing_cell_defaults_to_zero() {
        let raw = format!("{}\n0;;3;3;\n32;2,0;3;3;\n", header());
        let record = DelimitedExportAdapter
            .parse(&raw, "resp03.txt", &test_config())
            .unwrap();
        assert_eq!(record.eda, vec![0.0, 2.0]);
    }

    #[test]
    fn test_extracts_boundary_markers_in_file_order() {
        let raw = format!(
            "{}\n0;1;3;3;\n100;1;3;3;A.avi\n200;1;3;3;\n300;1;3;3;A.avi\n400;1;3;3;B.avi\n500;1;3;3;B.avi\n",
            header()
        );
        let record = DelimitedExportAdapter
            .parse(&raw, "resp04.txt", &test_config())
            .unwrap();
        let labels: Vec<&str> = record.boundaries.iter().map(|b| b.label.as_str()).collect();
        let positions: Vec<i64> = record.boundaries.iter().map(|b| b.position).collect();
        assert_eq!(labels, vec!["A.avi", "A.avi", "B.avi", "B.avi"]);
        assert_eq!(positions, vec![100, 300, 400, 500]);
    }

    #[test]
    fn test_unknown_tags_ignored() {
        let raw = format!("{}\n0;1;3;3;Calibration\n32;1;3;3;A.avi\n", header());
        let record = DelimitedExportAdapter
            .parse(&raw, "resp05.txt", &test_config())
            .unwrap();
        assert_eq!(record.boundaries.len(), 1);
    }

    #[test]
    fn test_non_integer_boundary_position_is_fatal() {
        let raw = format!("{}\n12.5;1;3;3;A.avi\n", header());
        let err = DelimitedExportAdapter
            .parse(&raw, "resp06.txt", &test_config())
            .unwrap_err();
        assert!(matches!(err, PipelineError::BoundaryParse { .. }));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let raw = "position;EDA;PupilLeft;PupilRight\n0;1;3;3\n";
        let err = DelimitedExportAdapter
            .parse(raw, "resp07.txt", &test_config())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_empty_export_rejected() {
        let err = DelimitedExportAdapter
            .parse(&format!("{}\n", header()), "resp08.txt", &test_config())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyExport { .. }));
    }
}
