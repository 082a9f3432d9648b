use hdrhistogram::Histogram;
use serde::Serialize;

/// CPU readings are stored in tenths of a percent: 1 → 0.1 %, 1000 → 100 %.
const CPU_SCALE: f64 = 10.0;
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 1_000;
const HIST_SIGFIG: u8 = 3;

/// Processor usage summary for one worker, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuUsage {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

impl CpuUsage {
    /// Extract min / mean / max from a CPU histogram.
    /// Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min: hist.min() as f64 / CPU_SCALE,
            mean: hist.mean() / CPU_SCALE,
            max: hist.max() as f64 / CPU_SCALE,
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: 0.0,
            mean: 0.0,
            max: 0.0,
            count: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    /// `min%…mean%…max%`, one decimal each.
    pub fn display(&self) -> String {
        format!("{:.1}%…{:.1}%…{:.1}%", self.min, self.mean, self.max)
    }
}

/// Fresh histogram sized for CPU percentages.
pub fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("histogram creation")
}

/// Record a CPU percentage, clamped into the histogram range.
/// Non-finite readings are skipped.
pub fn record(hist: &mut Histogram<u64>, percent: f64) {
    if !percent.is_finite() {
        return;
    }
    let scaled = (percent * CPU_SCALE).round().clamp(HIST_LOW as f64, HIST_HIGH as f64);
    let _ = hist.record(scaled as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_reports_zeroes() {
        let usage = CpuUsage::from_histogram(&new_histogram());
        assert!(!usage.has_data());
        assert_eq!(usage, CpuUsage::empty());
    }

    #[test]
    fn min_mean_max_in_percent() {
        let mut hist = new_histogram();
        for pct in [20.0, 40.0, 60.0] {
            record(&mut hist, pct);
        }
        let usage = CpuUsage::from_histogram(&hist);
        assert_eq!(usage.count, 3);
        assert!((usage.min - 20.0).abs() < 0.2);
        assert!((usage.max - 60.0).abs() < 0.2);
        assert!((usage.mean - 40.0).abs() < 0.2);
        assert_eq!(usage.display(), format!("{:.1}%…{:.1}%…{:.1}%", usage.min, usage.mean, usage.max));
    }

    #[test]
    fn out_of_range_readings_are_clamped() {
        let mut hist = new_histogram();
        record(&mut hist, 250.0);
        record(&mut hist, -3.0);
        record(&mut hist, f64::NAN);
        let usage = CpuUsage::from_histogram(&hist);
        assert_eq!(usage.count, 2);
        assert!((usage.max - 100.0).abs() < 0.2);
        assert!((usage.min - 0.1).abs() < 0.01);
    }
}
