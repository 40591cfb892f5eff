//! Run reporting
//!
//! Turns the finalized aggregates into one serializable run report with full
//! provenance. Rendering is somebody else's job: a report sink receives the
//! report and decides what to write; the bundled sink dumps one JSON file per
//! aggregate table plus the full report.

use crate::aggregate::{AggregateTable, SegmentOutcome};
use crate::error::PipelineError;
use crate::{GALVANO_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// Who produced the report, when, and under which run id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProvenance {
    pub producer: String,
    pub version: String,
    pub run_id: String,
    pub started_at_utc: String,
    pub computed_at_utc: String,
}

/// Ingestion summary for one included respondent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondentSummary {
    pub id: String,
    pub samples: usize,
    pub segments: usize,
    pub malformed_rows: usize,
}

/// A respondent excluded from all aggregation, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedRespondent {
    pub id: String,
    pub reason: String,
}

/// Complete result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub provenance: RunProvenance,
    pub tables: Vec<AggregateTable>,
    pub respondents: Vec<RespondentSummary>,
    pub excluded: Vec<ExcludedRespondent>,
    /// Respondents with a flat signal, excluded from normalized and mean
    /// aggregates but present everywhere else
    pub degenerate: Vec<String>,
    pub outcomes: Vec<SegmentOutcome>,
}

/// Report builder stamping provenance onto finalized aggregates
pub struct ReportBuilder {
    run_id: String,
    started_at: DateTime<Utc>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    /// Create a builder with a fresh run id
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }

    /// Create a builder with a specific run id
    pub fn with_run_id(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
        }
    }

    pub fn build(
        &self,
        tables: Vec<AggregateTable>,
        respondents: Vec<RespondentSummary>,
        excluded: Vec<ExcludedRespondent>,
        degenerate: Vec<String>,
        outcomes: Vec<SegmentOutcome>,
    ) -> RunReport {
        RunReport {
            provenance: RunProvenance {
                producer: PRODUCER_NAME.to_string(),
                version: GALVANO_VERSION.to_string(),
                run_id: self.run_id.clone(),
                started_at_utc: self.started_at.to_rfc3339(),
                computed_at_utc: Utc::now().to_rfc3339(),
            },
            tables,
            respondents,
            excluded,
            degenerate,
            outcomes,
        }
    }

    /// Encode a report to pretty JSON
    pub fn encode_to_json(&self, report: &RunReport) -> Result<String, PipelineError> {
        serde_json::to_string_pretty(report).map_err(PipelineError::Json)
    }
}

/// Trait for report sinks; rendering backends live behind this seam
pub trait ReportSink {
    fn write(&self, report: &RunReport) -> Result<(), PipelineError>;
}

/// Sink writing `run.json` plus one `results/<table>.json` per aggregate
pub struct JsonDirSink {
    out_dir: PathBuf,
}

impl JsonDirSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl ReportSink for JsonDirSink {
    fn write(&self, report: &RunReport) -> Result<(), PipelineError> {
        let results = self.out_dir.join("results");
        fs::create_dir_all(&results)?;

        for table in &report.tables {
            let path = results.join(format!("{}.json", table.name));
            fs::write(&path, serde_json::to_string_pretty(table)?)?;
        }

        let report_path = self.out_dir.join("run.json");
        fs::write(&report_path, serde_json::to_string_pretty(report)?)?;
        log::info!(
            "wrote {} aggregate tables and run report under {}",
            report.tables.len(),
            self.out_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{TableEntry, TableKind};

    fn sample_table() -> AggregateTable {
        AggregateTable {
            name: "peak_counts_eda".to_string(),
            kind: TableKind::Count,
            bin_secs: None,
            entries: vec![TableEntry {
                key: "A.avi".to_string(),
                bin: None,
                value: 2.0,
            }],
        }
    }

    #[test]
    fn test_report_carries_provenance() {
        let builder = ReportBuilder::with_run_id("run-123".to_string());
        let report = builder.build(
            vec![sample_table()],
            vec![RespondentSummary {
                id: "r1".to_string(),
                samples: 100,
                segments: 4,
                malformed_rows: 0,
            }],
            vec![],
            vec![],
            vec![],
        );

        assert_eq!(report.provenance.producer, PRODUCER_NAME);
        assert_eq!(report.provenance.run_id, "run-123");
        assert_eq!(report.tables.len(), 1);
    }

    #[test]
    fn test_report_json_round_trip() {
        let builder = ReportBuilder::new();
        let report = builder.build(
            vec![sample_table()],
            vec![],
            vec![ExcludedRespondent {
                id: "r9".to_string(),
                reason: "segment integrity failure".to_string(),
            }],
            vec!["r4".to_string()],
            vec![],
        );

        let json = builder.encode_to_json(&report).unwrap();
        let loaded: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.excluded.len(), 1);
        assert_eq!(loaded.degenerate, vec!["r4".to_string()]);
        assert_eq!(loaded.tables[0].entries[0].value, 2.0);
    }
}
