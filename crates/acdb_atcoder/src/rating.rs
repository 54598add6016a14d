//! Conversions from internal to displayed ratings.
//!
//! Both scales are compressed below 400 so that they never go negative.

/// Displayed performance for an internal performance `perf`.
///
/// ```
/// assert_eq!(acdb_atcoder::adjust_perf(1200), 1200);
/// assert_eq!(acdb_atcoder::adjust_perf(400), 400);
/// assert_eq!(acdb_atcoder::adjust_perf(0), 147);
/// ```
#[must_use]
pub fn adjust_perf(perf: i64) -> i64 {
    if perf < 400 {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let adjusted = (400.0 / ((400 - perf) as f64 / 400.0).exp()) as i64;
        adjusted
    } else {
        perf
    }
}

/// Displayed difficulty for an internal difficulty `diff`, rounded half to
/// even.
#[must_use]
pub fn adjust_diff(diff: f64) -> i64 {
    let shown = if diff < 400.0 {
        400.0 / ((400.0 - diff) / 400.0).exp()
    } else {
        diff
    };
    #[allow(clippy::cast_possible_truncation)]
    let rounded = shown.round_ties_even() as i64;
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_performance_is_compressed() {
        // 400 / e^(300/400) = 188.94...
        assert_eq!(adjust_perf(100), 188);
        assert_eq!(adjust_perf(-400), 54);
        assert_eq!(adjust_perf(399), 399);
    }

    #[test]
    fn low_difficulty_is_compressed() {
        assert_eq!(adjust_diff(100.0), 189);
        assert_eq!(adjust_diff(-1000.0), 12);
        assert_eq!(adjust_diff(1500.0), 1500);
        assert_eq!(adjust_diff(2.5e3), 2500);
    }
}
