//! Live fps / CPU monitoring for a stream-processing test harness.
//!
//! The core is [`metrics::SampleStore`], a multi-key circular sample
//! buffer with cached robust statistics. Around it sit the collector
//! shared by ingestion tasks, the harness loop that drives it, and the
//! console dashboard that reads it.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod timing;

pub use error::{MonitorError, Result};
