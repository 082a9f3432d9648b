use thiserror::Error;

/// Top-level error type used across the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(String),

    /// The aggregate view is empty: no tracked key has a settled sample yet.
    #[error("insufficient samples for statistics")]
    InsufficientSamples,

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
