use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Per-frame numbers published to dashboards.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameMetrics {
    /// 1-based index of the frame within its relay.
    pub frame_index: u64,
    pub fps: f64,
    pub read_ms: f64,
    pub transform_ms: f64,
    pub width: u32,
    pub height: u32,
}

/// Frame rate over a sliding time window: frames seen in the last `window`
/// divided by the window length.
pub struct FpsMeter {
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl FpsMeter {
    pub fn new(window: Duration) -> Self {
        let window = if window.is_zero() {
            Duration::from_secs(1)
        } else {
            window
        };
        Self {
            window,
            stamps: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a frame at `now` and return the current rate.
    pub fn record(&mut self, now: Instant) -> f64 {
        self.stamps.push_back(now);
        while let Some(front) = self.stamps.front() {
            if now.saturating_duration_since(*front) > self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
        self.fps()
    }

    pub fn fps(&self) -> f64 {
        self.stamps.len() as f64 / self.window.as_secs_f64()
    }
}

pub(crate) fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
