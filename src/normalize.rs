//! Per-respondent min/max normalization
//!
//! Each respondent's series is rescaled to [0, 1] against that respondent's
//! own non-missing extrema. A flat signal cannot be rescaled; that condition
//! is surfaced as an explicit error rather than a silent division yielding
//! non-finite values.

use crate::error::PipelineError;
use crate::types::SignalSeries;

/// Rescale a series to [0, 1] using its own non-missing min/max.
///
/// Missing samples stay missing at their positions. A series whose
/// non-missing values are all equal (or absent entirely) is degenerate and
/// excluded from normalized aggregates by the caller.
pub fn normalize(respondent: &str, series: &SignalSeries) -> Result<SignalSeries, PipelineError> {
    let (min, max) = series.value_range().ok_or_else(|| {
        PipelineError::DegenerateNormalization {
            respondent: respondent.to_string(),
            value: 0.0,
        }
    })?;

    if min == max {
        return Err(PipelineError::DegenerateNormalization {
            respondent: respondent.to_string(),
            value: min,
        });
    }

    let span = max - min;
    let values = series
        .values()
        .iter()
        .map(|v| v.map(|v| (v - min) / span))
        .collect();

    Ok(SignalSeries::from_parts(
        series.positions().to_vec(),
        values,
    ))
}
