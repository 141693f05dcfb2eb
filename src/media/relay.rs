//! Frame relay loop: Source -> Transform -> Sink.
//!
//! ```text
//! open Source, open Sink
//! loop:
//!   cancelled?            -> Cancelled
//!   read  -> EndOfStream  -> stop
//!   read  -> error        -> stop
//!   transform
//!   write -> error        -> stop
//! finally: close Sink, close Source
//! ```
//!
//! There is no retry, reconnect or timeout. A stalled source or sink blocks
//! the loop; cancellation is observed between frames only.

use std::time::{Duration, Instant};

use ffmpeg_pipe::{frame::VideoFrame, input::AvInput, output::ProcessOutput};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::media::{
    metrics::{FrameMetrics, elapsed_ms},
    stream::MonitoredFrames,
    transform::FrameTransform,
    types::{RelayError, RelayExit, RelayReport},
};

pub type MetricsSender = watch::Sender<Option<FrameMetrics>>;

/// Origin of frames. `read_frame` blocks; `Ok(None)` is end of stream.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, RelayError>;
    /// Release the handle. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Consumer of frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RelayError>;
    /// Release the handle. Must tolerate repeated calls.
    fn close(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, RelayError> {
        (**self).read_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RelayError> {
        (**self).write_frame(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl FrameSource for AvInput {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, RelayError> {
        AvInput::read_frame(self).map_err(RelayError::from)
    }

    fn close(&mut self) {
        AvInput::close(self)
    }
}

impl FrameSink for ProcessOutput {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RelayError> {
        ProcessOutput::write_frame(self, frame).map_err(RelayError::from)
    }

    fn close(&mut self) {
        let _ = ProcessOutput::close(self);
    }
}

/// Writes every frame to all sinks in order; the first failure fails the write.
#[derive(Default)]
pub struct TeeSink {
    sinks: Vec<Box<dyn FrameSink + Send>>,
}

impl TeeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl FrameSink + Send + 'static) {
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl FrameSink for TeeSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RelayError> {
        for sink in self.sinks.iter_mut() {
            sink.write_frame(frame)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        for sink in self.sinks.iter_mut() {
            sink.close();
        }
    }
}

pub struct Relay {
    cancel: CancellationToken,
    fps_window: Duration,
    metrics: Option<MetricsSender>,
}

impl Relay {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            fps_window: Duration::from_secs(3),
            metrics: None,
        }
    }

    pub fn with_fps_window(mut self, window: Duration) -> Self {
        self.fps_window = window;
        self
    }

    /// Publish metrics for every relayed frame.
    pub fn with_metrics(mut self, sender: MetricsSender) -> Self {
        self.metrics = Some(sender);
        self
    }

    /// Move frames until end of stream, an I/O error or cancellation. Both
    /// handles are closed exactly once before returning, sink first.
    pub fn run<S, K, T>(&self, source: S, mut sink: K, transform: &T) -> RelayReport
    where
        S: FrameSource,
        K: FrameSink,
        T: FrameTransform + ?Sized,
    {
        let mut frames = MonitoredFrames::new(source, self.fps_window);
        let mut relayed = 0u64;

        let exit = loop {
            if self.cancel.is_cancelled() {
                break RelayExit::Cancelled;
            }

            let Some((frame, mut metrics)) = frames.next() else {
                break frames.take_exit().unwrap_or(RelayExit::EndOfStream);
            };

            let started = Instant::now();
            let out = transform.apply(frame);
            metrics.transform_ms = elapsed_ms(started);
            log::trace!("frame {} transformed in {:.2}ms", metrics.frame_index, metrics.transform_ms);
            if let Some(tx) = &self.metrics {
                tx.send_replace(Some(metrics));
            }

            if let Err(e) = sink.write_frame(&out) {
                break RelayExit::SinkFailed(e);
            }
            relayed += 1;
        };

        sink.close();
        frames.close();

        let report = RelayReport {
            frames: relayed,
            exit,
        };
        if report.exit.is_error() {
            log::warn!("relay stopped: {}", report);
        } else {
            log::info!("relay stopped: {}", report);
        }
        report
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod relay_test;
