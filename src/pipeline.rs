//! Pipeline orchestration
//!
//! This module provides the public API of galvano. It walks an input
//! directory of biometric exports and runs each respondent through
//! load → segment → mask → decompose → normalize → aggregate, folding
//! everything into one run report. Respondent-level failures are isolated and
//! logged; only configuration errors abort the run.

use crate::aggregate::{
    AggregateTable, MeanAggregation, OverviewAggregation, PeakAggregation, SegmentOutcome,
};
use crate::config::PipelineConfig;
use crate::decompose::decompose;
use crate::error::PipelineError;
use crate::loader::{DelimitedExportAdapter, RespondentRecord};
use crate::normalize::normalize;
use crate::peaks::{SnipPeakFinder, SpectralPeakFinder};
use crate::report::{ExcludedRespondent, ReportBuilder, RespondentSummary, RunReport};
use crate::segmenter::build_segments;
use crate::types::{Channel, Respondent, SignalSeries};
use std::path::{Path, PathBuf};

/// Analyze every export in a directory with the given configuration.
///
/// Convenience wrapper over [`PipelineProcessor`] for one-shot batch runs.
pub fn analyze_directory(
    dir: &Path,
    config: PipelineConfig,
) -> Result<RunReport, PipelineError> {
    PipelineProcessor::new(config)?.process_directory(dir)
}

/// Batch processor holding the validated configuration and the peak finder.
///
/// Construction fails on an invalid configuration, before any file is read.
pub struct PipelineProcessor {
    config: PipelineConfig,
    finder: Box<dyn SpectralPeakFinder>,
}

impl PipelineProcessor {
    /// Create a processor with the default peak finder
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let finder = SnipPeakFinder {
            iterations: config.background_window,
        };
        Self::with_finder(config, Box::new(finder))
    }

    /// Create a processor with a specific peak finder implementation
    pub fn with_finder(
        config: PipelineConfig,
        finder: Box<dyn SpectralPeakFinder>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, finder })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load and segment one export file into a respondent
    pub fn load_respondent(&self, path: &Path) -> Result<Respondent, PipelineError> {
        let record = DelimitedExportAdapter.parse_file(path, &self.config)?;
        self.respondent_from_record(record)
    }

    /// Segment a parsed record and mask samples outside every segment
    pub fn respondent_from_record(
        &self,
        record: RespondentRecord,
    ) -> Result<Respondent, PipelineError> {
        let segments = build_segments(&record.id, &record.boundaries, &self.config)?;

        let mut eda = SignalSeries::from_values(record.positions.clone(), record.eda);
        let mut pupil = SignalSeries::from_values(record.positions, record.pupil);
        eda.mask_outside(&segments);
        pupil.mask_outside(&segments);

        Ok(Respondent {
            id: record.id,
            eda,
            pupil,
            segments,
            malformed_rows: record.malformed_rows,
        })
    }

    /// Walk the input directory and run the full pipeline
    pub fn process_directory(&self, dir: &Path) -> Result<RunReport, PipelineError> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .map(|e| e.to_string_lossy() == self.config.file_extension)
                .unwrap_or(false);
            if path.is_file() && matches {
                files.push(path);
            }
        }
        files.sort();
        log::info!("{} export files to compute in {}", files.len(), dir.display());

        let mut respondents = Vec::new();
        let mut excluded = Vec::new();
        for path in &files {
            match self.load_respondent(path) {
                Ok(respondent) => {
                    log::info!(
                        "{}: {} samples, {} segments, {} malformed cells",
                        respondent.id,
                        respondent.eda.len(),
                        respondent.segments.len(),
                        respondent.malformed_rows
                    );
                    respondents.push(respondent);
                }
                Err(err) => {
                    let id = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    log::warn!("{id}: excluded from aggregation: {err}");
                    excluded.push(ExcludedRespondent {
                        id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(self.process_respondents(respondents, excluded))
    }

    /// Aggregate already-loaded respondents into a run report
    pub fn process_respondents(
        &self,
        respondents: Vec<Respondent>,
        excluded: Vec<ExcludedRespondent>,
    ) -> RunReport {
        let analyses = &self.config.analyses;
        let mut tables: Vec<AggregateTable> = Vec::new();
        let mut outcomes: Vec<SegmentOutcome> = Vec::new();
        let mut degenerate: Vec<String> = Vec::new();

        if analyses.eda_peaks {
            let (mut peak_tables, peak_outcomes) =
                self.peak_analysis(Channel::Eda, &respondents);
            tables.append(&mut peak_tables);
            outcomes.extend(peak_outcomes);
        }

        if analyses.pupil_peaks {
            let (mut peak_tables, peak_outcomes) =
                self.peak_analysis(Channel::Pupil, &respondents);
            tables.append(&mut peak_tables);
            outcomes.extend(peak_outcomes);
        }

        if analyses.phasic_peaks {
            let mut aggregation = PeakAggregation::new(&self.config, "phasic");
            let mut overview = analyses
                .overview
                .then(|| OverviewAggregation::new(&self.config, "phasic"));
            for respondent in &respondents {
                let (_, phasic) = decompose(&respondent.eda, self.config.rolling_window);
                let series = match normalize(&respondent.id, &phasic) {
                    Ok(series) => series,
                    Err(err) => {
                        log::warn!("{err}");
                        mark_degenerate(&mut degenerate, &respondent.id);
                        continue;
                    }
                };
                aggregation.fold_respondent(respondent, &series, self.finder.as_ref());
                if let Some(overview) = overview.as_mut() {
                    overview.fold_respondent(respondent, &series, self.finder.as_ref());
                }
            }
            let (mut peak_tables, peak_outcomes) = aggregation.finalize();
            tables.append(&mut peak_tables);
            outcomes.extend(peak_outcomes);
            if let Some(overview) = overview {
                tables.append(&mut overview.finalize());
            }
        }

        if analyses.mean_eda {
            let mut aggregation = MeanAggregation::new(&self.config, "eda");
            for respondent in &respondents {
                let series = match normalize(&respondent.id, &respondent.eda) {
                    Ok(series) => series,
                    Err(err) => {
                        log::warn!("{err}");
                        mark_degenerate(&mut degenerate, &respondent.id);
                        continue;
                    }
                };
                aggregation.fold_respondent(respondent, &series);
            }
            tables.append(&mut aggregation.finalize());
        }

        let summaries = respondents
            .iter()
            .map(|r| RespondentSummary {
                id: r.id.clone(),
                samples: r.eda.len(),
                segments: r.segments.len(),
                malformed_rows: r.malformed_rows,
            })
            .collect();

        ReportBuilder::new().build(tables, summaries, excluded, degenerate, outcomes)
    }

    /// Raw-channel peak analysis: per-segment aggregation plus the optional
    /// whole-recording overview.
    fn peak_analysis(
        &self,
        channel: Channel,
        respondents: &[Respondent],
    ) -> (Vec<AggregateTable>, Vec<SegmentOutcome>) {
        let mut aggregation = PeakAggregation::new(&self.config, channel.as_str());
        let mut overview = self
            .config
            .analyses
            .overview
            .then(|| OverviewAggregation::new(&self.config, channel.as_str()));

        for respondent in respondents {
            let series = respondent.channel(channel);
            aggregation.fold_respondent(respondent, series, self.finder.as_ref());
            if let Some(overview) = overview.as_mut() {
                overview.fold_respondent(respondent, series, self.finder.as_ref());
            }
        }

        let (mut tables, outcomes) = aggregation.finalize();
        if let Some(overview) = overview {
            tables.append(&mut overview.finalize());
        }
        (tables, outcomes)
    }
}

fn mark_degenerate(degenerate: &mut Vec<String>, id: &str) {
    if !degenerate.iter().any(|d| d == id) {
        degenerate.push(id.to_string());
    }
}
