use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MonitorError, Result};

/// Environment variable consulted when no path is given on the command line.
pub const CONFIG_ENV: &str = "STREAM_TESTER_CONFIG";
const DEFAULT_FILE: &str = "stream-tester.toml";

/// Root configuration parsed from `stream-tester.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub harness: HarnessConfig,
    pub dashboard: DashboardConfig,
    pub target: TargetConfig,
    pub streams: Vec<StreamSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            dashboard: DashboardConfig::default(),
            target: TargetConfig::default(),
            streams: vec![StreamSpec::default()],
        }
    }
}

/// Ingestion loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Concurrent workers (attempts) per stream
    pub workers: u32,
    /// Settled samples kept per worker
    pub window: usize,
    /// Delay between two measurements of one worker
    pub sample_interval_ms: u64,
    /// Give up on a stream that has not filled its windows by then
    pub max_stream_secs: u64,
    /// Highest acceptable `mad / median` of the fps samples
    pub fps_threshold: f64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            window: 20,
            sample_interval_ms: 250,
            max_stream_secs: 60,
            fps_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub mode: DashboardMode,
    /// Redraw period
    pub refresh_ms: u64,
    /// Lines shown in the log pane
    pub log_lines: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            mode: DashboardMode::Console,
            refresh_ms: 200,
            log_lines: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DashboardMode {
    /// Redrawn ANSI frame
    #[default]
    Console,
    /// One JSON snapshot per line
    Json,
}

/// Host under test, shown in the host info box.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub ip: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            ip: "127.0.0.1".into(),
        }
    }
}

/// Attributes of one stream to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSpec {
    pub vendor: String,
    pub format: String,
    pub pattern: String,
    pub profile: String,
    /// Bits per second
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub headless: bool,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            vendor: "generic".into(),
            format: "h264".into(),
            pattern: "smpte".into(),
            profile: "main".into(),
            bitrate: 4_000_000,
            width: 1920,
            height: 1080,
            framerate: 30.0,
            headless: true,
        }
    }
}

impl StreamSpec {
    /// `vendor format pattern profile {bitrate}bps {w}x{h}@{fps}fps`
    pub fn label(&self) -> String {
        format!(
            "{} {} {} {} {}bps {}x{}@{}fps",
            self.vendor,
            self.format,
            self.pattern,
            self.profile,
            self.bitrate,
            self.width,
            self.height,
            self.framerate,
        )
    }
}

impl MonitorConfig {
    /// Reject settings the harness cannot run with.
    pub fn validate(&self) -> Result<()> {
        let h = &self.harness;
        if h.workers == 0 || h.workers > 64 {
            return Err(invalid("harness.workers must be between 1 and 64"));
        }
        if h.window == 0 || h.window > 10_000 {
            return Err(invalid("harness.window must be between 1 and 10000"));
        }
        if h.sample_interval_ms == 0 {
            return Err(invalid("harness.sample_interval_ms must be at least 1"));
        }
        if h.max_stream_secs == 0 || h.max_stream_secs > 3600 {
            return Err(invalid("harness.max_stream_secs must be between 1 and 3600"));
        }
        if !(h.fps_threshold > 0.0 && h.fps_threshold <= 1.0) {
            return Err(invalid("harness.fps_threshold must be in (0, 1]"));
        }
        if self.dashboard.refresh_ms == 0 {
            return Err(invalid("dashboard.refresh_ms must be at least 1"));
        }
        if self.streams.is_empty() {
            return Err(invalid("at least one [[streams]] entry is required"));
        }
        if let Some(s) = self.streams.iter().find(|s| !(s.framerate > 0.0)) {
            return Err(invalid(&format!(
                "stream '{}' must have a positive framerate",
                s.label()
            )));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> MonitorError {
    MonitorError::Config(msg.to_string())
}

/// Load configuration from a TOML file. Returns `MonitorConfig::default()`
/// if the file doesn't exist so the harness always has sensible defaults.
pub fn load(path: impl AsRef<Path>) -> Result<MonitorConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!(
            "Config file not found at '{}'; using defaults.",
            path.display()
        );
        return Ok(MonitorConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| MonitorError::Config(format!("cannot read '{}': {e}", path.display())))?;

    parse(&raw)
}

/// Parse and validate a TOML document.
pub fn parse(raw: &str) -> Result<MonitorConfig> {
    let config: MonitorConfig =
        toml::from_str(raw).map_err(|e| MonitorError::Config(format!("TOML parse error: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// First CLI argument, else `$STREAM_TESTER_CONFIG`, else `./stream-tester.toml`.
pub fn resolve_path(arg: Option<String>) -> PathBuf {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE))
}
