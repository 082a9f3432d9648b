use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::config::{DashboardConfig, DashboardMode, TargetConfig};
use crate::error::Result;
use crate::harness::{Progress, ProgressTracker};
use crate::metrics::collector::AttemptSnapshot;
use crate::metrics::{MetricsCollector, MonitorSnapshot};

const BAR_WIDTH: usize = 60;
const BAR_FILL: char = '▄';
const US_TO_SEC: f64 = 1e-6;

/// Clear screen + cursor home.
const CLEAR: &str = "\x1b[2J\x1b[H";
const GREEN: &str = "\x1b[32m";
const GREY: &str = "\x1b[90m";
const RESET: &str = "\x1b[0m";

/// Static parts of the frame.
#[derive(Debug, Clone)]
pub struct FrameOptions {
    pub host: String,
    pub ip: String,
    pub log_lines: usize,
}

impl FrameOptions {
    pub fn new(dashboard: &DashboardConfig, target: &TargetConfig) -> Self {
        Self {
            host: target.host.clone(),
            ip: target.ip.clone(),
            log_lines: dashboard.log_lines,
        }
    }
}

/// One line of `json` mode output.
#[derive(Serialize)]
struct JsonFrame<'a> {
    progress: &'a Progress,
    snapshot: &'a MonitorSnapshot,
}

// ─── Refresh loop ────────────────────────────────────────────────

/// Redraws every `refresh_ms` until `active` is cleared, then draws one
/// final frame so the last state stays on screen.
pub async fn run(
    metrics: Arc<MetricsCollector>,
    progress: Arc<ProgressTracker>,
    config: DashboardConfig,
    opts: FrameOptions,
    active: Arc<AtomicBool>,
) -> Result<()> {
    let interval = tokio::time::interval(Duration::from_millis(config.refresh_ms));
    let mut ticks = IntervalStream::new(interval);

    while ticks.next().await.is_some() {
        let keep_going = active.load(Ordering::SeqCst);
        draw(config.mode, &metrics.snapshot(), &progress.snapshot(), &opts)?;
        if !keep_going {
            break;
        }
    }
    Ok(())
}

fn draw(
    mode: DashboardMode,
    snapshot: &MonitorSnapshot,
    progress: &Progress,
    opts: &FrameOptions,
) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match mode {
        DashboardMode::Console => {
            write!(out, "{CLEAR}{}", render_frame(snapshot, progress, opts))?;
        }
        DashboardMode::Json => {
            let line = serde_json::to_string(&JsonFrame { progress, snapshot })?;
            writeln!(out, "{line}")?;
        }
    }
    out.flush()?;
    Ok(())
}

// ─── Frame rendering ─────────────────────────────────────────────

/// Render a full console frame. Pure: reads the snapshot, never the store.
pub fn render_frame(snapshot: &MonitorSnapshot, progress: &Progress, opts: &FrameOptions) -> String {
    let mut f = String::new();

    // ── Progress ────────────────────────────────────────────────
    let filled = ((progress.fraction.clamp(0.0, 1.0)) * BAR_WIDTH as f64).round() as usize;
    let _ = writeln!(
        f,
        "{}{}",
        BAR_FILL.to_string().repeat(filled),
        " ".repeat(BAR_WIDTH - filled)
    );
    let _ = writeln!(
        f,
        "Elapsed time: {}   Remaining time: {}   Stream: {}/{}",
        progress.elapsed,
        progress.remaining.as_deref().unwrap_or("--:--:--"),
        progress.current,
        progress.total,
    );

    // ── Stream info ─────────────────────────────────────────────
    match &snapshot.stream {
        Some(s) => {
            let marker = if s.headless { '▂' } else { '▢' };
            let counts: Vec<String> = snapshot.attempts.iter().map(|a| a.count.to_string()).collect();
            let _ = writeln!(f, "{GREEN}{marker}{}{RESET}   {}", s.label(), counts.join(","));
        }
        None => {
            let _ = writeln!(f, "{GREEN}waiting for first stream{RESET}");
        }
    }

    // ── Host ────────────────────────────────────────────────────
    let _ = writeln!(f, "Host: {}   IP: {}   run {}", opts.host, opts.ip, snapshot.run_id);
    f.push('\n');

    // ── Attempts ────────────────────────────────────────────────
    let _ = writeln!(
        f,
        "{:<7}{:>9}{:>7}{:>8}  {:<34}{:<22}{}",
        "worker", "fps in", "count", "target", "S (last 5)", "CPU", "stat RTT"
    );
    for a in &snapshot.attempts {
        f.push_str(&attempt_row(a));
        f.push('\n');
    }
    f.push('\n');

    // ── Aggregate ───────────────────────────────────────────────
    let (median, dev) = match &snapshot.fps {
        Some(s) => (format!("{:.3}", s.median), format!("{:.3}", s.deviation)),
        None => ("n/a".to_string(), "n/a".to_string()),
    };
    let _ = writeln!(
        f,
        "fps m: {median}   dev: {dev}   threshold: {:.3}   complete: {}   cpu m: {}",
        snapshot.fps_threshold,
        if snapshot.complete { "yes" } else { "no" },
        snapshot
            .cpu_median
            .map_or_else(|| "n/a".to_string(), |c| format!("{c:.1}%")),
    );
    let _ = writeln!(
        f,
        "last stat at: {}",
        snapshot.last_stat_at.as_deref().unwrap_or("never")
    );
    f.push('\n');

    // ── Log pane ────────────────────────────────────────────────
    let skip = snapshot.events.len().saturating_sub(opts.log_lines);
    for line in &snapshot.events[skip..] {
        match line.split_once(' ') {
            Some((stamp, msg)) => {
                let _ = writeln!(f, "{GREY}{stamp}{RESET} {msg}");
            }
            None => {
                let _ = writeln!(f, "{line}");
            }
        }
    }

    f
}

fn attempt_row(a: &AttemptSnapshot) -> String {
    let fps_in = a.fps_in.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    let samples: Vec<String> = a.last_samples.iter().map(|s| format!("{s:.2}")).collect();
    let cpu = if a.cpu.has_data() {
        a.cpu.display()
    } else {
        "-".to_string()
    };
    let rtt = match (a.rtt_first_us, a.rtt_last_us) {
        (Some(first), Some(last)) => format!(
            "{:.3}…{:.3}",
            first as f64 * US_TO_SEC,
            last as f64 * US_TO_SEC
        ),
        _ => "-".to_string(),
    };
    format!(
        "{:<7}{:>9}{:>7}{:>8}  {:<34}{:<22}{}",
        a.worker,
        fps_in,
        a.count,
        a.target,
        samples.join(","),
        cpu,
        rtt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamSpec;
    use crate::metrics::Measurement;
    use uuid::Uuid;

    fn opts() -> FrameOptions {
        FrameOptions {
            host: "encoder-01".into(),
            ip: "10.0.0.7".into(),
            log_lines: 2,
        }
    }

    fn progress(current: usize, total: usize) -> Progress {
        Progress {
            current,
            total,
            elapsed: "00:00:10".into(),
            remaining: None,
            fraction: current as f64 / total as f64,
        }
    }

    #[test]
    fn empty_frame_shows_placeholders() {
        let metrics = MetricsCollector::new(Uuid::nil(), 3, 0.05);
        let frame = render_frame(&metrics.snapshot(), &progress(0, 4), &opts());

        assert!(frame.contains("waiting for first stream"));
        assert!(frame.contains("Host: encoder-01   IP: 10.0.0.7"));
        assert!(frame.contains("fps m: n/a   dev: n/a   threshold: 0.050"));
        assert!(frame.contains("Remaining time: --:--:--   Stream: 0/4"));
        assert!(frame.contains("last stat at: never"));
    }

    #[test]
    fn frame_shows_stream_attempts_and_statistics() {
        let metrics = MetricsCollector::new(Uuid::nil(), 2, 0.05);
        metrics.begin_stream(StreamSpec::default());
        metrics.register(0);
        for fps in [10.0, 12.0, 11.0] {
            metrics.record(Measurement {
                worker: 0,
                fps,
                cpu: 40.0,
                probe_us: 2_000,
            });
        }

        let frame = render_frame(&metrics.snapshot(), &progress(1, 2), &opts());

        assert!(frame.contains("▂generic h264 smpte main 4000000bps 1920x1080@30fps"));
        assert!(frame.contains("10.00,12.00,11.00"));
        assert!(frame.contains("0.002…0.002"));
        assert!(frame.contains("fps m: 11.000   dev: 0.091"));
        assert!(frame.contains("complete: yes"));
        assert!(frame.starts_with(&BAR_FILL.to_string().repeat(BAR_WIDTH / 2)));
    }

    #[test]
    fn log_pane_keeps_the_newest_lines() {
        let metrics = MetricsCollector::new(Uuid::nil(), 2, 0.05);
        for msg in ["evt-a", "evt-b", "evt-c"] {
            metrics.log_event(msg);
        }
        let frame = render_frame(&metrics.snapshot(), &progress(0, 1), &opts());
        assert!(!frame.contains("evt-a"));
        assert!(frame.contains("evt-b"));
        assert!(frame.contains("evt-c"));
    }

    #[test]
    fn json_frame_serializes() {
        let metrics = MetricsCollector::new(Uuid::nil(), 2, 0.05);
        let snap = metrics.snapshot();
        let p = progress(0, 1);
        let line = serde_json::to_string(&JsonFrame {
            progress: &p,
            snapshot: &snap,
        })
        .unwrap();
        assert!(line.contains("\"fps_threshold\":0.05"));
        assert!(line.contains("\"total\":1"));
    }
}
