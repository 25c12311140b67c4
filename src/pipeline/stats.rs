// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::time::{Duration, Instant};

use tracing::debug;

/// Per-second throughput counter for a stage loop.
pub struct StageStats {
    name: &'static str,
    total: u64,
    window: u64,
    window_start: Instant,
    fps: f64,
    last_inference: Duration,
}

impl StageStats {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            total: 0,
            window: 0,
            window_start: Instant::now(),
            fps: 0.0,
            last_inference: Duration::ZERO,
        }
    }

    pub fn record(&mut self, inference: Duration) {
        self.total += 1;
        self.window += 1;
        self.last_inference = inference;

        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.window as f64 / elapsed.as_secs_f64();
            debug!(
                "📊 {} {:.1} fps, inference {:.1} ms, {} frames total",
                self.name,
                self.fps,
                self.last_inference.as_secs_f64() * 1000.0,
                self.total
            );
            self.window = 0;
            self.window_start = Instant::now();
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
