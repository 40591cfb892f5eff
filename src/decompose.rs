//! Tonic/phasic decomposition
//!
//! The tonic component is a trailing rolling mean of the raw signal; the
//! phasic component is the absolute residual, so deviations in either
//! direction show up as positive-going peaks for downstream detection.

use crate::types::SignalSeries;
use std::collections::VecDeque;

/// Decompose a series into its tonic and phasic components.
///
/// `tonic[i]` is the arithmetic mean of the `window` samples ending at `i`;
/// it is missing wherever the window lacks full left history or covers a
/// missing sample, so the first `window - 1` samples of every contiguous run
/// are missing by convention. `phasic[i] = |tonic[i] - series[i]|`.
///
/// Both outputs are fresh series bound to the same position index as the
/// source; the source is never mutated.
pub fn decompose(series: &SignalSeries, window: usize) -> (SignalSeries, SignalSeries) {
    let n = series.len();
    let mut tonic = vec![None; n];
    let mut phasic = vec![None; n];

    let mut buffer: VecDeque<f64> = VecDeque::with_capacity(window);
    let mut sum = 0.0;

    for (i, value) in series.values().iter().enumerate() {
        match value {
            None => {
                buffer.clear();
                sum = 0.0;
            }
            Some(v) => {
                buffer.push_back(*v);
                sum += v;
                while buffer.len() > window {
                    if let Some(oldest) = buffer.pop_front() {
                        sum -= oldest;
                    }
                }
                if buffer.len() == window {
                    let mean = sum / window as f64;
                    tonic[i] = Some(mean);
                    phasic[i] = Some((mean - v).abs());
                }
            }
        }
    }

    let positions = series.positions().to_vec();
    (
        SignalSeries::from_parts(positions.clone(), tonic),
        SignalSeries::from_parts(positions, phasic),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_rolling_mean_matches_hand_computation() {
        // The reference scenario: one spike at position 3, one at position 8.
        let series = SignalSeries::from_values(
            (0..12).collect(),
            vec![0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0],
        );
        let (tonic, phasic) = decompose(&series, 3);

        assert_eq!(tonic.value_at(0), None);
        assert_eq!(tonic.value_at(1), None);
        // Window ending at 5 covers positions 3..=5: (5 + 0 + 0) / 3
        assert_close(tonic.value_at(5).unwrap(), 5.0 / 3.0);
        assert_close(phasic.value_at(5).unwrap(), 5.0 / 3.0);
        // Window ending at 8 covers positions 6..=8
        assert_close(tonic.value_at(8).unwrap(), 10.0 / 3.0);
        assert_close(phasic.value_at(8).unwrap(), (10.0_f64 / 3.0 - 10.0).abs());
    }

    #[test]
    fn test_phasic_is_absolute_residual() {
        let series = SignalSeries::from_values(
            (0..6).collect(),
            vec![1.0, 5.0, 1.0, 1.0, 5.0, 1.0],
        );
        let (tonic, phasic) = decompose(&series, 2);
        for i in 0..series.len() {
            match (tonic.value_at(i), phasic.value_at(i)) {
                (Some(t), Some(p)) => {
                    let raw = series.value_at(i).unwrap();
                    assert!(p >= 0.0);
                    assert_close((t - raw).abs(), p);
                }
                (None, None) => {}
                other => panic!("tonic/phasic defined-ness diverged at {i}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_round_trip_recovers_raw() {
        let series = SignalSeries::from_values(
            (0..8).collect(),
            vec![2.0, 4.0, 8.0, 3.0, 1.0, 9.0, 2.0, 6.0],
        );
        let (tonic, phasic) = decompose(&series, 3);
        for i in 0..series.len() {
            if let (Some(t), Some(p)) = (tonic.value_at(i), phasic.value_at(i)) {
                let raw = series.value_at(i).unwrap();
                let sign = if t >= raw { 1.0 } else { -1.0 };
                assert_close(t - sign * p, raw);
            }
        }
    }

    #[test]
    fn test_missing_sample_resets_window() {
        let series = SignalSeries::from_parts(
            (0..6).collect(),
            vec![Some(1.0), Some(1.0), None, Some(1.0), Some(1.0), Some(1.0)],
        );
        let (tonic, _) = decompose(&series, 2);
        assert_eq!(tonic.value_at(1), Some(1.0));
        // The gap invalidates every window that covers it.
        assert_eq!(tonic.value_at(2), None);
        assert_eq!(tonic.value_at(3), None);
        assert_eq!(tonic.value_at(4), Some(1.0));
    }

    #[test]
    fn test_positions_preserved() {
        let series = SignalSeries::from_values(vec![10, 42, 74], vec![1.0, 2.0, 3.0]);
        let (tonic, phasic) = decompose(&series, 2);
        assert_eq!(tonic.positions(), series.positions());
        assert_eq!(phasic.positions(), series.positions());
    }
}
