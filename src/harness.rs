use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{HarnessConfig, StreamSpec};
use crate::error::MonitorError;
use crate::metrics::{FpsSummary, Measurement, MetricsCollector, WorkerId};
use crate::timing::{format_duration, Timing};

// ─── Synthetic probe tuning ──────────────────────────────────────

/// Relative fps jitter around the stream's target framerate
const FPS_JITTER: f64 = 0.02;

/// Chance that one interval loses half its frames
const DROP_PROBABILITY: f64 = 0.02;

/// Simulated probe round-trip range (μs)
const PROBE_LATENCY_US: std::ops::RangeInclusive<u64> = 50..=800;

// ─── Public types ────────────────────────────────────────────────

/// Outcome of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Windows filled and the fps deviation stayed under the threshold
    Stable,
    /// Windows filled but the fps deviation exceeded the threshold
    Unstable,
    /// Windows did not fill before `max_stream_secs`
    TimedOut,
    /// Windows filled without a single finite settled sample
    NoSamples,
    /// Run cancelled by the operator
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamResult {
    pub stream: StreamSpec,
    pub verdict: Verdict,
    pub summary: Option<FpsSummary>,
    pub elapsed_secs: f64,
}

/// Progress readout for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    /// 1-based index of the stream under test, 0 before the first one
    pub current: usize,
    pub total: usize,
    pub elapsed: String,
    /// `None` until one stream has finished
    pub remaining: Option<String>,
    pub fraction: f64,
}

/// Tracks run-wide timing; shared between the harness and the dashboard.
pub struct ProgressTracker {
    inner: Mutex<ProgressInner>,
}

struct ProgressInner {
    timing: Timing,
    total: usize,
    current: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(ProgressInner {
                timing: Timing::new(),
                total,
                current: 0,
            }),
        }
    }

    fn start(&self) {
        self.inner.lock().timing.start("global");
    }

    fn advance(&self, current: usize) {
        let mut inner = self.inner.lock();
        inner.current = current;
        inner.timing.start("stream");
    }

    fn stream_elapsed(&self) -> Duration {
        self.inner.lock().timing.elapsed("stream")
    }

    pub fn snapshot(&self) -> Progress {
        let inner = self.inner.lock();
        let elapsed = inner.timing.elapsed("global");
        let done = inner.current.saturating_sub(1);

        let remaining = (done > 0).then(|| {
            let rate = elapsed / done as u32;
            format_duration(rate * (inner.total - done) as u32)
        });

        let fraction = if inner.total == 0 {
            0.0
        } else {
            inner.current as f64 / inner.total as f64
        };

        Progress {
            current: inner.current,
            total: inner.total,
            elapsed: format_duration(elapsed),
            remaining,
            fraction,
        }
    }
}

// ─── Harness ─────────────────────────────────────────────────────

/// Ingestion loop: runs each stream in turn with `workers` concurrent
/// attempts feeding the collector until every window is full.
pub struct Harness {
    config: HarnessConfig,
    streams: Vec<StreamSpec>,
    metrics: Arc<MetricsCollector>,
    progress: Arc<ProgressTracker>,
    running: Arc<AtomicBool>,
}

impl Harness {
    pub fn new(
        config: HarnessConfig,
        streams: Vec<StreamSpec>,
        metrics: Arc<MetricsCollector>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let progress = Arc::new(ProgressTracker::new(streams.len()));
        Self {
            config,
            streams,
            metrics,
            progress,
            running,
        }
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.progress.clone()
    }

    /// Test every stream in order. Stops early once `running` is cleared.
    pub async fn run(&self) -> Vec<StreamResult> {
        self.progress.start();
        let mut results = Vec::with_capacity(self.streams.len());

        for (idx, stream) in self.streams.iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.progress.advance(idx + 1);
            results.push(self.run_stream(idx, stream).await);
        }

        results
    }

    async fn run_stream(&self, idx: usize, stream: &StreamSpec) -> StreamResult {
        self.metrics.begin_stream(stream.clone());
        self.metrics.log_event(format!(
            "stream {}/{}: {}",
            idx + 1,
            self.streams.len(),
            stream.label()
        ));

        let interval = Duration::from_millis(self.config.sample_interval_ms);
        let deadline = Instant::now() + Duration::from_secs(self.config.max_stream_secs);
        let stream_running = Arc::new(AtomicBool::new(true));

        // Register before spawning so completeness never sees a partial set
        let mut handles = Vec::with_capacity(self.config.workers as usize);
        for id in 0..self.config.workers {
            self.metrics.register(id);

            let seed = 1000 * (idx as u64 + 1) + id as u64;
            let probe = SyntheticProbe::new(seed, stream.framerate);
            let active = stream_running.clone();
            let running = self.running.clone();
            let metrics = self.metrics.clone();

            handles.push(tokio::spawn(async move {
                worker(id, probe, interval, active, running, metrics).await;
            }));
        }

        let mut ticker = tokio::time::interval(interval);
        let (verdict, summary) = loop {
            ticker.tick().await;

            if !self.running.load(Ordering::SeqCst) {
                break (Verdict::Aborted, self.metrics.summary().ok());
            }
            if self.metrics.is_complete() {
                break self.judge();
            }
            if Instant::now() >= deadline {
                tracing::warn!(stream = %stream.label(), "stream timed out before windows filled");
                break (Verdict::TimedOut, self.metrics.summary().ok());
            }
        };

        // Signal this stream's workers to stop and wait for them
        stream_running.store(false, Ordering::SeqCst);
        for h in handles {
            let _ = h.await;
        }
        for id in 0..self.config.workers {
            self.metrics.unregister(id);
        }

        let elapsed = self.progress.stream_elapsed();
        self.metrics.log_event(match &summary {
            Some(s) => format!(
                "{verdict:?}: fps m {:.3}, dev {:.3} ({} samples) in {}",
                s.median,
                s.deviation,
                s.samples,
                format_duration(elapsed)
            ),
            None => format!("{verdict:?} in {}", format_duration(elapsed)),
        });

        StreamResult {
            stream: stream.clone(),
            verdict,
            summary,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    fn judge(&self) -> (Verdict, Option<FpsSummary>) {
        match self.metrics.summary() {
            Ok(s) if s.deviation <= self.config.fps_threshold => (Verdict::Stable, Some(s)),
            Ok(s) => (Verdict::Unstable, Some(s)),
            Err(MonitorError::InsufficientSamples) => (Verdict::NoSamples, None),
            Err(e) => {
                tracing::error!("summary failed: {e}");
                (Verdict::NoSamples, None)
            }
        }
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: WorkerId,
    mut probe: SyntheticProbe,
    interval: Duration,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    metrics: Arc<MetricsCollector>,
) {
    let mut ticker = tokio::time::interval(interval);

    while active.load(Ordering::Relaxed) && running.load(Ordering::Relaxed) {
        ticker.tick().await;

        // ── Probe timed section ─────────────────────────────────
        let t0 = Instant::now();
        let (fps, cpu) = probe.sample().await;
        let probe_us = t0.elapsed().as_micros() as u64;
        // ────────────────────────────────────────────────────────

        metrics.record(Measurement {
            worker: id,
            fps,
            cpu,
            probe_us,
        });
    }

    tracing::debug!(worker = id, "worker stopped");
}

// ─── Synthetic probe ─────────────────────────────────────────────

/// Stands in for querying a real stream's statistics endpoint.
struct SyntheticProbe {
    rng: StdRng,
    target_fps: f64,
    base_cpu: f64,
}

impl SyntheticProbe {
    /// Each worker gets its own deterministic RNG seeded uniquely.
    fn new(seed: u64, target_fps: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let base_cpu = rng.gen_range(15.0..35.0);
        Self {
            rng,
            target_fps,
            base_cpu,
        }
    }

    async fn sample(&mut self) -> (f64, f64) {
        let latency = Duration::from_micros(self.rng.gen_range(PROBE_LATENCY_US));
        tokio::time::sleep(latency).await;

        let mut fps = self.target_fps * (1.0 + self.rng.gen_range(-FPS_JITTER..=FPS_JITTER));
        if self.rng.gen_bool(DROP_PROBABILITY) {
            fps *= 0.5;
        }
        let cpu = (self.base_cpu + self.rng.gen_range(-5.0..=5.0)).clamp(0.0, 100.0);
        (fps, cpu)
    }
}
