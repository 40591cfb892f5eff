//! Event segmentation
//!
//! Pairs boundary markers into event-bounded `[start, end)` segments, one per
//! catalog entry. Markers alternate enter/exit; a marker repeating the
//! immediately preceding category marks a delayed exit and is pushed out by
//! the configured end buffer.

use crate::config::{BoundaryOrdering, PipelineConfig};
use crate::error::PipelineError;
use crate::types::{BoundaryEvent, Segment};

/// Pair boundary markers into segments for one respondent.
///
/// Any inconsistency (odd marker count, a pairing whose two markers carry
/// different labels, an empty or reversed interval, overlapping segments, or
/// a segment count that differs from the event catalog) is a
/// `SegmentIntegrity` error; the caller excludes the respondent and the run
/// continues.
pub fn build_segments(
    respondent: &str,
    boundaries: &[BoundaryEvent],
    config: &PipelineConfig,
) -> Result<Vec<Segment>, PipelineError> {
    let mut markers = apply_end_buffer(boundaries, config.end_buffer);

    if config.boundary_ordering == BoundaryOrdering::CategoryGrouped {
        markers.sort_by(|a, b| a.label.cmp(&b.label));
    }

    let integrity_error = |found: usize| PipelineError::SegmentIntegrity {
        respondent: respondent.to_string(),
        boundaries: markers.len(),
        expected: config.events.len(),
        found,
    };

    if markers.len() % 2 != 0 || markers.len() / 2 != config.events.len() {
        return Err(integrity_error(markers.len() / 2));
    }

    let mut segments = Vec::with_capacity(markers.len() / 2);
    for pair in markers.chunks_exact(2) {
        let (enter, exit) = (&pair[0], &pair[1]);
        if enter.label != exit.label || enter.position >= exit.position {
            return Err(integrity_error(segments.len()));
        }
        segments.push(Segment::new(
            enter.label.clone(),
            enter.position,
            exit.position,
        ));
    }

    // Intervals must be strictly ordered and non-overlapping regardless of
    // the pairing order used above.
    let mut by_start: Vec<&Segment> = segments.iter().collect();
    by_start.sort_by_key(|s| s.start);
    for window in by_start.windows(2) {
        if window[1].start < window[0].end {
            return Err(integrity_error(segments.len()));
        }
    }

    Ok(segments)
}

/// A marker repeating the immediately preceding category extends the exit
/// boundary by the configured buffer, capturing delayed physiological
/// response to the stimulus offset.
fn apply_end_buffer(boundaries: &[BoundaryEvent], end_buffer: i64) -> Vec<BoundaryEvent> {
    let mut previous: Option<&str> = None;
    boundaries
        .iter()
        .map(|b| {
            let position = if previous == Some(b.label.as_str()) {
                b.position + end_buffer
            } else {
                b.position
            };
            previous = Some(b.label.as_str());
            BoundaryEvent {
                label: b.label.clone(),
                position,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn boundary(label: &str, position: i64) -> BoundaryEvent {
        BoundaryEvent {
            label: label.to_string(),
            position,
        }
    }

    fn config_with_events(events: &[&str]) -> PipelineConfig {
        PipelineConfig {
            events: events.iter().map(|e| e.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_four_pairs_yield_four_ordered_segments() {
        let config = config_with_events(&["A", "B", "C", "D"]);
        let boundaries = vec![
            boundary("A", 0),
            boundary("A", 100),
            boundary("B", 100),
            boundary("B", 250),
            boundary("C", 300),
            boundary("C", 420),
            boundary("D", 420),
            boundary("D", 600),
        ];
        let segments = build_segments("r1", &boundaries, &config).unwrap();
        assert_eq!(segments.len(), 4);
        assert_eq!(boundaries.len(), 2 * segments.len());
        for window in segments.windows(2) {
            assert!(window[0].start < window[0].end);
            assert!(window[0].end <= window[1].start);
        }
        assert_eq!(segments[2], Segment::new("C", 300, 420));
    }

    #[test]
    fn test_repeated_category_extends_exit_by_buffer() {
        let mut config = config_with_events(&["A"]);
        config.end_buffer = 500;
        let boundaries = vec![boundary("A", 100), boundary("A", 200)];
        let segments = build_segments("r1", &boundaries, &config).unwrap();
        assert_eq!(segments, vec![Segment::new("A", 100, 700)]);
    }

    #[test]
    fn test_chronological_order_is_authoritative() {
        // Catalog deliberately not in lexicographic order: chronological
        // pairing must follow the file, not the label sort.
        let config = config_with_events(&["B", "A"]);
        let boundaries = vec![
            boundary("B", 0),
            boundary("B", 50),
            boundary("A", 60),
            boundary("A", 120),
        ];
        let segments = build_segments("r1", &boundaries, &config).unwrap();
        assert_eq!(segments[0], Segment::new("B", 0, 50));
        assert_eq!(segments[1], Segment::new("A", 60, 120));
    }

    #[test]
    fn test_category_grouped_order_sorts_labels_first() {
        let mut config = config_with_events(&["B", "A"]);
        config.boundary_ordering = BoundaryOrdering::CategoryGrouped;
        let boundaries = vec![
            boundary("B", 0),
            boundary("B", 50),
            boundary("A", 60),
            boundary("A", 120),
        ];
        let segments = build_segments("r1", &boundaries, &config).unwrap();
        assert_eq!(segments[0], Segment::new("A", 60, 120));
        assert_eq!(segments[1], Segment::new("B", 0, 50));
    }

    #[test]
    fn test_odd_boundary_count_rejected() {
        let config = config_with_events(&["A"]);
        let boundaries = vec![boundary("A", 0), boundary("A", 50), boundary("A", 90)];
        let err = build_segments("r1", &boundaries, &config).unwrap_err();
        assert!(matches!(err, PipelineError::SegmentIntegrity { .. }));
    }

    #[test]
    fn test_catalog_mismatch_rejected() {
        let config = config_with_events(&["A", "B"]);
        let boundaries = vec![boundary("A", 0), boundary("A", 50)];
        let err = build_segments("r1", &boundaries, &config).unwrap_err();
        match err {
            PipelineError::SegmentIntegrity {
                respondent,
                boundaries,
                expected,
                found,
            } => {
                assert_eq!(respondent, "r1");
                assert_eq!(boundaries, 2);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pair_label_mismatch_rejected() {
        let config = config_with_events(&["A", "B"]);
        let boundaries = vec![
            boundary("A", 0),
            boundary("B", 50),
            boundary("A", 60),
            boundary("B", 120),
        ];
        let err = build_segments("r1", &boundaries, &config).unwrap_err();
        assert!(matches!(err, PipelineError::SegmentIntegrity { .. }));
    }

    #[test]
    fn test_overlapping_segments_rejected() {
        let config = config_with_events(&["A", "B"]);
        let boundaries = vec![
            boundary("A", 0),
            boundary("A", 100),
            boundary("B", 50),
            boundary("B", 150),
        ];
        let err = build_segments("r1", &boundaries, &config).unwrap_err();
        assert!(matches!(err, PipelineError::SegmentIntegrity { .. }));
    }
}
