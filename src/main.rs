//! stream-tester — live fps / CPU monitor for a stream-processing test run.
//!
//! Run with:  `RUST_LOG=info stream-tester [config.toml]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use stream_tester::harness::{Harness, StreamResult};
use stream_tester::{config, dashboard, metrics};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never tear the console frame on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── 1. Configuration ─────────────────────────────────────────
    let path = config::resolve_path(std::env::args().nth(1));
    let cfg = config::load(&path)?;
    cfg.validate()?;

    let run_id = Uuid::new_v4();
    tracing::info!(
        %run_id,
        streams = cfg.streams.len(),
        workers = cfg.harness.workers,
        window = cfg.harness.window,
        "stream-tester v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    // ── 2. Shared state ──────────────────────────────────────────
    let metrics = Arc::new(metrics::MetricsCollector::new(
        run_id,
        cfg.harness.window,
        cfg.harness.fps_threshold,
    ));
    let running = Arc::new(AtomicBool::new(true));
    let harness = Harness::new(
        cfg.harness.clone(),
        cfg.streams.clone(),
        metrics.clone(),
        running.clone(),
    );

    // ── 3. Ctrl-C stops the run after the current tick ───────────
    {
        let running = running.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; stopping run");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    // ── 4. Dashboard ─────────────────────────────────────────────
    let dashboard_active = Arc::new(AtomicBool::new(true));
    let dashboard = tokio::spawn(dashboard::run(
        metrics.clone(),
        harness.progress(),
        cfg.dashboard.clone(),
        dashboard::FrameOptions::new(&cfg.dashboard, &cfg.target),
        dashboard_active.clone(),
    ));

    // ── 5. Run every stream ──────────────────────────────────────
    let results = harness.run().await;

    dashboard_active.store(false, Ordering::SeqCst);
    match dashboard.await {
        Ok(Err(e)) => tracing::error!("dashboard failed: {e}"),
        Err(e) => tracing::error!("dashboard task panicked: {e}"),
        Ok(Ok(())) => {}
    }

    print_summary(&results);
    Ok(())
}

fn print_summary(results: &[StreamResult]) {
    println!();
    println!("{:<10} {:>10} {:>8} {:>8}  stream", "verdict", "fps m", "dev", "secs");
    for r in results {
        let (median, dev) = match &r.summary {
            Some(s) => (format!("{:.3}", s.median), format!("{:.3}", s.deviation)),
            None => ("-".to_string(), "-".to_string()),
        };
        println!(
            "{:<10} {:>10} {:>8} {:>8.1}  {}",
            format!("{:?}", r.verdict),
            median,
            dev,
            r.elapsed_secs,
            r.stream.label()
        );
    }
}
