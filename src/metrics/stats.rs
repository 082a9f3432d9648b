//! Robust summary statistics over a plain slice of samples.
//!
//! Callers are expected to filter out non-finite values first; ordering
//! uses `f64::total_cmp` so a stray NaN cannot panic the sort.

/// Median of `values`. Even-length input yields the midpoint of the two
/// middle values. Returns `None` for empty input.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation: median of `|x - median(values)|`.
/// Unscaled. Returns `None` for empty input.
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let residuals: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&residuals)
}

/// MAD relative to the median. A zero median means the stream stalled,
/// which is reported as infinitely unstable.
pub fn relative_deviation(median: f64, mad: f64) -> f64 {
    if median == 0.0 {
        return f64::INFINITY;
    }
    (mad / median).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_length_is_middle_value() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }

    #[test]
    fn median_of_two_values_is_midpoint() {
        assert_eq!(median(&[10.0, 12.0]), Some(11.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn empty_input_has_no_statistics() {
        assert_eq!(median(&[]), None);
        assert_eq!(mad(&[]), None);
    }

    #[test]
    fn mad_ignores_a_single_outlier() {
        // deviations from 3: [2, 1, 0, 1, 97] -> median 1
        assert_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 100.0]), Some(1.0));
    }

    #[test]
    fn mad_of_constant_series_is_zero() {
        assert_eq!(mad(&[30.0; 8]), Some(0.0));
    }

    #[test]
    fn relative_deviation_of_stalled_stream_is_infinite() {
        assert!(relative_deviation(0.0, 1.0).is_infinite());
        assert!((relative_deviation(30.0, 0.3) - 0.01).abs() < 1e-12);
    }
}
