pub mod collector;
pub mod cpu;
pub mod stats;
pub mod store;

pub use collector::{FpsSummary, MetricsCollector, MonitorSnapshot};
pub use store::SampleStore;

/// Identifies one monitored worker (a stream attempt) within a run.
pub type WorkerId = u32;

/// A single observation pushed by a worker.
/// This is the "write" side — workers create these and push them in.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub worker: WorkerId,
    /// Frames per second observed over the last interval
    pub fps: f64,
    /// Processor usage in percent
    pub cpu: f64,
    /// Microseconds the probe took to answer
    pub probe_us: u64,
}
