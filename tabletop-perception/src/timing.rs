//! Per-stage wall time logging

use std::time::{Duration, Instant};
use tracing::info;

/// Measures one pipeline stage and logs its duration when finished
#[derive(Debug)]
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Log `"{stage} took {ms} ms"` at info level and return the elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        info!("{} took {:.3} ms", self.stage, elapsed.as_secs_f64() * 1000.0);
        elapsed
    }
}
