//! Cross-respondent aggregation
//!
//! Folds per-segment peak detection and per-segment means into category and
//! time-binned tables. Accumulation is append-only: overlapping contributions
//! across respondents are summed, never overwritten, and the tables are
//! finalized exactly once before reporting. Aggregates hold scalar summaries
//! only, never references back to the source series.

use crate::config::PipelineConfig;
use crate::peaks::{BinnedSignal, PeakParams, SpectralPeakFinder};
use crate::types::{Respondent, Segment, SignalSeries};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Processing stage of one (respondent, segment) unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStage {
    Pending,
    Binned,
    PeakDetected,
    Folded,
    Skipped,
}

impl SegmentStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStage::Pending => "pending",
            SegmentStage::Binned => "binned",
            SegmentStage::PeakDetected => "peak_detected",
            SegmentStage::Folded => "folded",
            SegmentStage::Skipped => "skipped",
        }
    }
}

/// Terminal record of one (respondent, segment) unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentOutcome {
    pub respondent: String,
    pub label: String,
    pub stage: SegmentStage,
    pub peak_count: usize,
}

/// Kind of a finalized aggregate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Summed counts per category
    Count,
    /// Mean of per-respondent fills per category
    Mean,
    /// Summed weights per (key, time bin)
    TimeBinned,
}

/// One cell of a finalized table: a category (or series) key, an optional
/// time-bin index, and the accumulated value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin: Option<usize>,
    pub value: f64,
}

/// A finalized, serializable aggregate: everything a rendering backend needs
/// to draw the corresponding histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateTable {
    pub name: String,
    pub kind: TableKind,
    /// Time-bin width in seconds for `TimeBinned` tables
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_secs: Option<f64>,
    pub entries: Vec<TableEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryAccumulator {
    bins: BTreeMap<String, f64>,
}

impl CategoryAccumulator {
    fn fill(&mut self, key: &str, weight: f64) {
        *self.bins.entry(key.to_string()).or_insert(0.0) += weight;
    }

    fn total(&self) -> f64 {
        self.bins.values().sum()
    }

    fn finalize(self, name: &str) -> AggregateTable {
        AggregateTable {
            name: name.to_string(),
            kind: TableKind::Count,
            bin_secs: None,
            entries: self
                .bins
                .into_iter()
                .map(|(key, value)| TableEntry {
                    key,
                    bin: None,
                    value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MeanCategoryAccumulator {
    bins: BTreeMap<String, RunningMean>,
}

impl MeanCategoryAccumulator {
    fn fill(&mut self, key: &str, value: f64) {
        self.bins.entry(key.to_string()).or_default().push(value);
    }

    fn finalize(self, name: &str) -> AggregateTable {
        AggregateTable {
            name: name.to_string(),
            kind: TableKind::Mean,
            bin_secs: None,
            entries: self
                .bins
                .into_iter()
                .filter_map(|(key, acc)| {
                    acc.mean().map(|value| TableEntry {
                        key,
                        bin: None,
                        value,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct TimeAccumulator {
    bin_secs: f64,
    rows: BTreeMap<String, Vec<f64>>,
}

impl TimeAccumulator {
    fn new(bin_secs: f64) -> Self {
        Self {
            bin_secs,
            rows: BTreeMap::new(),
        }
    }

    fn fill(&mut self, key: &str, elapsed_secs: f64, weight: f64) {
        let index = (elapsed_secs.max(0.0) / self.bin_secs).floor() as usize;
        let row = self.rows.entry(key.to_string()).or_default();
        if row.len() <= index {
            row.resize(index + 1, 0.0);
        }
        row[index] += weight;
    }

    fn finalize(self, name: &str) -> AggregateTable {
        let mut entries = Vec::new();
        for (key, row) in self.rows {
            for (bin, value) in row.into_iter().enumerate() {
                entries.push(TableEntry {
                    key: key.clone(),
                    bin: Some(bin),
                    value,
                });
            }
        }
        AggregateTable {
            name: name.to_string(),
            kind: TableKind::TimeBinned,
            bin_secs: Some(self.bin_secs),
            entries,
        }
    }
}

/// Per-segment peak aggregation over one analysis series (raw EDA, pupil, or
/// normalized phasic). Each compared segment walks
/// `Pending → Binned → PeakDetected → Folded`, or terminates `Skipped`.
pub struct PeakAggregation {
    analysis: String,
    bin_scale: f64,
    margin: i64,
    params: PeakParams,
    compared: Vec<String>,
    counts: CategoryAccumulator,
    peak_times: TimeAccumulator,
    tonic_times: TimeAccumulator,
    phasic_times: TimeAccumulator,
    outcomes: Vec<SegmentOutcome>,
}

impl PeakAggregation {
    pub fn new(config: &PipelineConfig, analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            bin_scale: config.bin_scale,
            margin: config.boundary_margin().round() as i64,
            params: PeakParams::from_config(config),
            compared: config
                .compared_events()
                .into_iter()
                .map(str::to_string)
                .collect(),
            counts: CategoryAccumulator::default(),
            peak_times: TimeAccumulator::new(config.time_bin_secs),
            tonic_times: TimeAccumulator::new(config.time_bin_secs),
            phasic_times: TimeAccumulator::new(config.time_bin_secs),
            outcomes: Vec::new(),
        }
    }

    /// Fold every compared segment of one respondent
    pub fn fold_respondent(
        &mut self,
        respondent: &Respondent,
        series: &SignalSeries,
        finder: &dyn SpectralPeakFinder,
    ) {
        for segment in &respondent.segments {
            if !self.compared.iter().any(|e| *e == segment.label) {
                continue;
            }
            let outcome = self.fold_segment(&respondent.id, segment, series, finder);
            log::debug!(
                "{}: segment '{}' [{} {}) -> {} ({} peaks)",
                respondent.id,
                segment.label,
                segment.start,
                segment.end,
                outcome.stage.as_str(),
                outcome.peak_count
            );
            self.outcomes.push(outcome);
        }
    }

    fn fold_segment(
        &mut self,
        respondent: &str,
        segment: &Segment,
        series: &SignalSeries,
        finder: &dyn SpectralPeakFinder,
    ) -> SegmentOutcome {
        let mut outcome = SegmentOutcome {
            respondent: respondent.to_string(),
            label: segment.label.clone(),
            stage: SegmentStage::Pending,
            peak_count: 0,
        };

        // Trim the literal boundary samples off both sides.
        let lo = segment.start + self.margin;
        let hi = segment.end - self.margin;
        let samples = series.samples_in(lo, hi);

        let binned = match BinnedSignal::from_samples(&samples, self.params.bin_width) {
            Some(b) => b,
            None => {
                outcome.stage = SegmentStage::Skipped;
                return outcome;
            }
        };
        outcome.stage = SegmentStage::Binned;

        let peaks = finder.find_peaks(&samples, &self.params);
        outcome.stage = SegmentStage::PeakDetected;
        outcome.peak_count = peaks.count();

        self.counts.fill(&segment.label, peaks.count() as f64);
        for &position in &peaks.positions {
            let elapsed = (position - lo as f64) * self.bin_scale;
            self.peak_times.fill(&segment.label, elapsed, 1.0);
        }
        for (index, &(center, level)) in peaks.background.iter().enumerate() {
            let elapsed = (center - lo as f64) * self.bin_scale;
            self.tonic_times.fill(&segment.label, elapsed, level);
            self.phasic_times.fill(
                &segment.label,
                elapsed,
                binned.contents()[index] - level,
            );
        }

        outcome.stage = SegmentStage::Folded;
        outcome
    }

    /// Sum of folded peak counts across all categories
    pub fn total_peaks(&self) -> f64 {
        self.counts.total()
    }

    pub fn outcomes(&self) -> &[SegmentOutcome] {
        &self.outcomes
    }

    /// Finalize into serializable tables; consumes the aggregation
    pub fn finalize(self) -> (Vec<AggregateTable>, Vec<SegmentOutcome>) {
        let analysis = &self.analysis;
        let tables = vec![
            self.counts.finalize(&format!("peak_counts_{analysis}")),
            self.peak_times.finalize(&format!("peak_times_{analysis}")),
            self.tonic_times.finalize(&format!("tonic_times_{analysis}")),
            self.phasic_times
                .finalize(&format!("phasic_times_{analysis}")),
        ];
        (tables, self.outcomes)
    }
}

/// Whole-recording overview: peaks, tonic, and phasic time distributions over
/// the full first-to-last-boundary range, summed across respondents. The
/// binned signal is scaled to unit integral first so respondents with
/// different absolute conductance contribute comparably.
pub struct OverviewAggregation {
    analysis: String,
    bin_scale: f64,
    margin: i64,
    params: PeakParams,
    peak_times: TimeAccumulator,
    tonic_times: TimeAccumulator,
    phasic_times: TimeAccumulator,
}

impl OverviewAggregation {
    pub fn new(config: &PipelineConfig, analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            bin_scale: config.bin_scale,
            margin: config.boundary_margin().round() as i64,
            params: PeakParams::from_config(config),
            peak_times: TimeAccumulator::new(config.time_bin_secs),
            tonic_times: TimeAccumulator::new(config.time_bin_secs),
            phasic_times: TimeAccumulator::new(config.time_bin_secs),
        }
    }

    pub fn fold_respondent(
        &mut self,
        respondent: &Respondent,
        series: &SignalSeries,
        finder: &dyn SpectralPeakFinder,
    ) {
        let (first, last) = match (respondent.segments.first(), respondent.segments.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return,
        };
        let lo = first.start + self.margin;
        let hi = last.end - self.margin;
        let samples = series.samples_in(lo, hi);

        let total: f64 = samples.iter().map(|&(_, v)| v).sum();
        if total == 0.0 {
            log::warn!(
                "{}: overview skipped, zero integral over [{lo}, {hi})",
                respondent.id
            );
            return;
        }
        // Scaling the samples scales the binned contents identically.
        let scaled: Vec<(i64, f64)> = samples.iter().map(|&(p, v)| (p, v / total)).collect();

        let binned = match BinnedSignal::from_samples(&scaled, self.params.bin_width) {
            Some(b) => b,
            None => return,
        };

        let peaks = finder.find_peaks(&scaled, &self.params);
        for &position in &peaks.positions {
            let elapsed = (position - lo as f64) * self.bin_scale;
            self.peak_times.fill("all", elapsed, 1.0);
        }
        for (index, &(center, level)) in peaks.background.iter().enumerate() {
            let elapsed = (center - lo as f64) * self.bin_scale;
            self.tonic_times.fill("all", elapsed, level);
            self.phasic_times
                .fill("all", elapsed, binned.contents()[index] - level);
        }
    }

    pub fn finalize(self) -> Vec<AggregateTable> {
        let analysis = &self.analysis;
        vec![
            self.peak_times
                .finalize(&format!("overview_peak_times_{analysis}")),
            self.tonic_times
                .finalize(&format!("overview_tonic_times_{analysis}")),
            self.phasic_times
                .finalize(&format!("overview_phasic_times_{analysis}")),
        ]
    }
}

/// Cross-respondent mean aggregation: per-category mean of per-respondent
/// segment means (the grand mean of means, unweighted by segment size), plus
/// time-binned means for compared events.
pub struct MeanAggregation {
    analysis: String,
    bin_scale: f64,
    time_bin_secs: f64,
    compared: Vec<String>,
    per_category: MeanCategoryAccumulator,
    interval: TimeAccumulator,
}

impl MeanAggregation {
    pub fn new(config: &PipelineConfig, analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            bin_scale: config.bin_scale,
            time_bin_secs: config.time_bin_secs,
            compared: config
                .compared_events()
                .into_iter()
                .map(str::to_string)
                .collect(),
            per_category: MeanCategoryAccumulator::default(),
            interval: TimeAccumulator::new(config.time_bin_secs),
        }
    }

    /// Mean of the respondent's non-missing values strictly inside the
    /// segment interval
    pub fn mean_per_segment(series: &SignalSeries, segment: &Segment) -> Option<f64> {
        let samples = series.samples_in(segment.start, segment.end);
        if samples.is_empty() {
            return None;
        }
        let sum: f64 = samples.iter().map(|&(_, v)| v).sum();
        Some(sum / samples.len() as f64)
    }

    pub fn fold_respondent(&mut self, respondent: &Respondent, series: &SignalSeries) {
        for segment in &respondent.segments {
            match Self::mean_per_segment(series, segment) {
                Some(mean) => self.per_category.fill(&segment.label, mean),
                None => {
                    log::warn!(
                        "{}: segment '{}' has no valid samples for mean aggregation",
                        respondent.id,
                        segment.label
                    );
                    continue;
                }
            }

            if !self.compared.iter().any(|e| *e == segment.label) {
                continue;
            }
            let window = self.time_bin_secs / self.bin_scale;
            let windows = ((segment.duration() as f64 * self.bin_scale) / self.time_bin_secs)
                .floor() as usize;
            for k in 0..windows {
                let lo = segment.start + (k as f64 * window).round() as i64;
                let hi = segment.start + ((k + 1) as f64 * window).round() as i64;
                let samples = series.samples_in(lo, hi);
                if samples.is_empty() {
                    continue;
                }
                let mean: f64 =
                    samples.iter().map(|&(_, v)| v).sum::<f64>() / samples.len() as f64;
                self.interval
                    .fill(&segment.label, k as f64 * self.time_bin_secs, mean);
            }
        }
    }

    pub fn finalize(self) -> Vec<AggregateTable> {
        let analysis = &self.analysis;
        vec![
            self.per_category
                .finalize(&format!("mean_{analysis}_per_category")),
            self.interval.finalize(&format!("mean_{analysis}_times")),
        ]
    }
}
