use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Named wall-clock markers, e.g. `"global"` for the whole run and
/// `"stream"` for the stream currently under test.
#[derive(Debug, Default)]
pub struct Timing {
    marks: HashMap<String, Instant>,
}

impl Timing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the marker `name`.
    pub fn start(&mut self, name: &str) {
        self.marks.insert(name.to_owned(), Instant::now());
    }

    /// Time since `name` was started; zero for unknown markers.
    pub fn elapsed(&self, name: &str) -> Duration {
        self.marks
            .get(name)
            .map(Instant::elapsed)
            .unwrap_or_default()
    }

    pub fn elapsed_string(&self, name: &str) -> String {
        format_duration(self.elapsed(name))
    }
}

/// `HH:MM:SS`; hours keep counting past 24.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
