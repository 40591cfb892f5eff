//! Core types for the galvano pipeline
//!
//! This module defines the data that flows through each stage: per-respondent
//! signal series, event-bounded segments, and the ephemeral peak sets folded
//! into the aggregates.

use serde::{Deserialize, Serialize};

/// Signal channel of the biometric export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Skin conductance (electrodermal activity)
    Eda,
    /// Pupil diameter, averaged over both eyes
    Pupil,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Eda => "eda",
            Channel::Pupil => "pupil",
        }
    }
}

/// An ordered sequence of (position, value) samples for one respondent.
///
/// Positions are monotonically non-decreasing timestamps in the export's sync
/// unit. A `None` value marks a sample outside every known event: explicitly
/// flagged rather than dropped, so downstream windows never shift alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalSeries {
    positions: Vec<i64>,
    values: Vec<Option<f64>>,
}

impl SignalSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from parallel position and value vectors.
    ///
    /// Panics if the lengths differ; callers construct both from the same
    /// row scan so a mismatch is a programming error.
    pub fn from_parts(positions: Vec<i64>, values: Vec<Option<f64>>) -> Self {
        assert_eq!(positions.len(), values.len());
        Self { positions, values }
    }

    /// Build a fully-present series from plain values.
    pub fn from_values(positions: Vec<i64>, values: Vec<f64>) -> Self {
        let values = values.into_iter().map(Some).collect();
        Self::from_parts(positions, values)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn push(&mut self, position: i64, value: Option<f64>) {
        self.positions.push(position);
        self.values.push(value);
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    /// Iterate over non-missing samples as (position, value)
    pub fn iter_valid(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.positions
            .iter()
            .zip(self.values.iter())
            .filter_map(|(&p, v)| v.map(|v| (p, v)))
    }

    /// Non-missing samples with positions in the half-open interval
    /// `[start, end)`
    pub fn samples_in(&self, start: i64, end: i64) -> Vec<(i64, f64)> {
        self.iter_valid()
            .filter(|&(p, _)| p >= start && p < end)
            .collect()
    }

    /// Min and max over non-missing values, `None` for an all-missing series
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for (_, v) in self.iter_valid() {
            range = Some(match range {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        range
    }

    /// Replace with `None` every value whose position no segment covers.
    /// Positions and series length are untouched.
    pub fn mask_outside(&mut self, segments: &[Segment]) {
        for (i, &p) in self.positions.iter().enumerate() {
            if !segments.iter().any(|s| s.contains(p)) {
                self.values[i] = None;
            }
        }
    }
}

/// One stimulus occurrence for one respondent: a category label from the
/// event catalog and a `[start, end)` interval in sync-position units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub label: String,
    pub start: i64,
    pub end: i64,
}

impl Segment {
    pub fn new(label: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && position < self.end
    }

    pub fn duration(&self) -> i64 {
        self.end - self.start
    }
}

/// A boundary marker scanned from the export, in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryEvent {
    pub label: String,
    pub position: i64,
}

/// One respondent's data after segmentation: the respondent exclusively owns
/// its channels and segment list. Derived series (tonic, phasic, normalized)
/// are value copies produced on demand, never aliases of these.
#[derive(Debug, Clone)]
pub struct Respondent {
    pub id: String,
    pub eda: SignalSeries,
    pub pupil: SignalSeries,
    pub segments: Vec<Segment>,
    /// Malformed sample cells that were carried forward during ingestion
    pub malformed_rows: usize,
}

impl Respondent {
    pub fn channel(&self, channel: Channel) -> &SignalSeries {
        match channel {
            Channel::Eda => &self.eda,
            Channel::Pupil => &self.pupil,
        }
    }
}

/// Ephemeral result of peak detection over one windowed segment. Owned by the
/// aggregator that requested it and discarded after folding.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSet {
    /// Peak positions in the input's position units (bin centers)
    pub positions: Vec<f64>,
    /// Estimated background curve as (bin center, level)
    pub background: Vec<(f64, f64)>,
}

impl PeakSet {
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_iter_valid_skips_missing() {
        let series = SignalSeries::from_parts(
            vec![0, 32, 64, 96],
            vec![Some(1.0), None, Some(3.0), None],
        );
        let valid: Vec<_> = series.iter_valid().collect();
        assert_eq!(valid, vec![(0, 1.0), (64, 3.0)]);
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn test_samples_in_half_open() {
        let series = SignalSeries::from_values(vec![0, 1, 2, 3], vec![10.0, 11.0, 12.0, 13.0]);
        assert_eq!(series.samples_in(1, 3), vec![(1, 11.0), (2, 12.0)]);
    }

    #[test]
    fn test_value_range() {
        let series = SignalSeries::from_parts(
            vec![0, 1, 2],
            vec![Some(2.0), None, Some(-1.0)],
        );
        assert_eq!(series.value_range(), Some((-1.0, 2.0)));
        assert_eq!(SignalSeries::new().value_range(), None);
    }

    #[test]
    fn test_mask_outside_preserves_alignment() {
        let mut series =
            SignalSeries::from_values(vec![0, 1, 2, 3, 4], vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        series.mask_outside(&[Segment::new("A", 1, 3)]);
        assert_eq!(series.len(), 5);
        assert_eq!(
            series.values(),
            &[None, Some(2.0), Some(3.0), None, None]
        );
    }

    #[test]
    fn test_segment_contains_half_open() {
        let segment = Segment::new("A", 10, 20);
        assert!(segment.contains(10));
        assert!(segment.contains(19));
        assert!(!segment.contains(20));
        assert_eq!(segment.duration(), 10);
    }
}
