use std::collections::{BTreeMap, VecDeque};

use chrono::Local;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::cpu::{self, CpuUsage};
use super::stats;
use super::store::SampleStore;
use super::{Measurement, WorkerId};
use crate::config::StreamSpec;
use crate::error::Result;

// ─── Configuration ───────────────────────────────────────────────

/// How many event lines we keep for the console log pane
const MAX_LOG_LINES: usize = 100;

/// How many recent fps samples each attempt row shows
const LAST_SAMPLES: usize = 5;

const CLOCK_FORMAT: &str = "%H:%M:%S";

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe owner of the sample stores.
/// Workers call `record()`, the dashboard calls `snapshot()`.
pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

/// Robust fps statistics over every worker's settled samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FpsSummary {
    pub median: f64,
    pub mad: f64,
    /// `mad / median`
    pub deviation: f64,
    pub samples: usize,
}

/// One row of the attempt table.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSnapshot {
    pub worker: WorkerId,
    pub fps_in: Option<f64>,
    pub count: u64,
    /// Finite samples currently held in the worker's window
    pub window_fill: usize,
    pub target: f64,
    pub last_samples: Vec<f64>,
    pub cpu_in: Option<f64>,
    pub cpu: CpuUsage,
    pub rtt_first_us: Option<u64>,
    pub rtt_last_us: Option<u64>,
}

/// Complete read-only view shipped to the dashboard on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub run_id: Uuid,
    pub stream: Option<StreamSpec>,
    pub attempts: Vec<AttemptSnapshot>,
    /// `None` until at least one settled sample exists
    pub fps: Option<FpsSummary>,
    pub cpu_median: Option<f64>,
    pub fps_threshold: f64,
    pub complete: bool,
    pub window: usize,
    pub last_stat_at: Option<String>,
    pub events: Vec<String>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    run_id: Uuid,
    fps_threshold: f64,

    fps: SampleStore<WorkerId>,
    cpu: SampleStore<WorkerId>,
    attempts: BTreeMap<WorkerId, AttemptState>,

    stream: Option<StreamSpec>,
    last_stat_at: Option<String>,
    events: VecDeque<String>,
}

/// Per-worker counters that live outside the sample windows.
struct AttemptState {
    count: u64,
    cpu_hist: Histogram<u64>,
    rtt_first_us: Option<u64>,
    rtt_last_us: Option<u64>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            count: 0,
            cpu_hist: cpu::new_histogram(),
            rtt_first_us: None,
            rtt_last_us: None,
        }
    }

    fn clear(&mut self) {
        self.count = 0;
        self.cpu_hist.reset();
        self.rtt_first_us = None;
        self.rtt_last_us = None;
    }
}

// ─── MetricsCollector impl ───────────────────────────────────────

impl MetricsCollector {
    pub fn new(run_id: Uuid, window: usize, fps_threshold: f64) -> Self {
        Self {
            inner: Mutex::new(Inner::new(run_id, window, fps_threshold)),
        }
    }

    /// Start a new measurement epoch for `stream`. Registered workers stay
    /// registered; their windows and counters are wiped.
    pub fn begin_stream(&self, stream: StreamSpec) {
        let mut inner = self.inner.lock();
        inner.reset();
        inner.stream = Some(stream);
    }

    /// Wipe all windows and counters without dropping registrations.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Start tracking a worker.
    pub fn register(&self, worker: WorkerId) {
        self.inner.lock().register(worker);
    }

    /// Stop tracking a worker and clear its windows.
    pub fn unregister(&self, worker: WorkerId) {
        self.inner.lock().unregister(worker);
    }

    /// Record one observation. Measurements from unregistered workers are
    /// dropped; late updates from a torn-down worker are expected.
    pub fn record(&self, m: Measurement) {
        self.inner.lock().record(m);
    }

    /// True once every registered worker has filled its fps window.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().fps.is_complete()
    }

    pub fn summary(&self) -> Result<FpsSummary> {
        self.inner.lock().summary()
    }

    /// Append a timestamped line to the console log pane.
    pub fn log_event(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!("{msg}");
        self.inner.lock().push_event(msg);
    }

    /// Produce a read-only snapshot for the dashboard.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.inner.lock().snapshot()
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl Inner {
    fn new(run_id: Uuid, window: usize, fps_threshold: f64) -> Self {
        Self {
            run_id,
            fps_threshold,
            fps: SampleStore::new(window),
            cpu: SampleStore::new(window),
            attempts: BTreeMap::new(),
            stream: None,
            last_stat_at: None,
            events: VecDeque::with_capacity(MAX_LOG_LINES + 1),
        }
    }

    fn reset(&mut self) {
        self.fps.reset();
        self.cpu.reset();
        for attempt in self.attempts.values_mut() {
            attempt.clear();
        }
        self.last_stat_at = None;
    }

    fn register(&mut self, worker: WorkerId) {
        self.fps.init(worker);
        self.cpu.init(worker);
        self.attempts.entry(worker).or_insert_with(AttemptState::new);
    }

    fn unregister(&mut self, worker: WorkerId) {
        self.fps.delete(&worker);
        self.cpu.delete(&worker);
        self.attempts.remove(&worker);
    }

    fn record(&mut self, m: Measurement) {
        let Some(attempt) = self.attempts.get_mut(&m.worker) else {
            tracing::debug!(worker = m.worker, "dropping measurement from unregistered worker");
            return;
        };

        attempt.count += 1;
        cpu::record(&mut attempt.cpu_hist, m.cpu);
        attempt.rtt_first_us.get_or_insert(m.probe_us);
        attempt.rtt_last_us = Some(m.probe_us);

        self.fps.add(&m.worker, m.fps);
        self.cpu.add(&m.worker, m.cpu);
        self.last_stat_at = Some(Local::now().format(CLOCK_FORMAT).to_string());
    }

    fn summary(&self) -> Result<FpsSummary> {
        let median = self.fps.median()?;
        let mad = self.fps.mad()?;
        Ok(FpsSummary {
            median,
            mad,
            deviation: stats::relative_deviation(median, mad),
            samples: self.fps.all().len(),
        })
    }

    fn push_event(&mut self, msg: String) {
        let stamp = Local::now().format(CLOCK_FORMAT);
        self.events.push_back(format!("{stamp} {msg}"));
        if self.events.len() > MAX_LOG_LINES {
            self.events.pop_front();
        }
    }

    fn snapshot(&self) -> MonitorSnapshot {
        let target = self.stream.as_ref().map_or(0.0, |s| s.framerate);

        let attempts = self
            .attempts
            .iter()
            .map(|(&worker, a)| AttemptSnapshot {
                worker,
                fps_in: self.fps.latest(&worker),
                count: a.count,
                window_fill: self.fps.get(&worker).len(),
                target,
                last_samples: self.fps.recent(&worker, LAST_SAMPLES),
                cpu_in: self.cpu.latest(&worker),
                cpu: CpuUsage::from_histogram(&a.cpu_hist),
                rtt_first_us: a.rtt_first_us,
                rtt_last_us: a.rtt_last_us,
            })
            .collect();

        MonitorSnapshot {
            run_id: self.run_id,
            stream: self.stream.clone(),
            attempts,
            fps: self.summary().ok(),
            cpu_median: self.cpu.median().ok(),
            fps_threshold: self.fps_threshold,
            complete: self.fps.is_complete(),
            window: self.fps.window(),
            last_stat_at: self.last_stat_at.clone(),
            events: self.events.iter().cloned().collect(),
        }
    }
}
