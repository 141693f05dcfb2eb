use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use bytes::{BufMut, Bytes, BytesMut};
use ffmpeg_pipe::frame::VideoFrame;
use futures::Stream;

use crate::media::{
    codec,
    metrics::{FpsMeter, FrameMetrics, elapsed_ms},
    relay::{FrameSink, FrameSource},
    types::{RelayError, RelayExit},
};

/// Pull-based frame iterator that attaches metrics to every frame.
///
/// Yields `(frame, metrics)` until the source ends or fails, then stays
/// exhausted; the reason is kept in [`MonitoredFrames::exit`]. A new
/// instance is needed to read again.
pub struct MonitoredFrames<S: FrameSource> {
    source: S,
    meter: FpsMeter,
    index: u64,
    exit: Option<RelayExit>,
    done: bool,
    closed: bool,
}

impl<S: FrameSource> MonitoredFrames<S> {
    pub fn new(source: S, fps_window: Duration) -> Self {
        Self {
            source,
            meter: FpsMeter::new(fps_window),
            index: 0,
            exit: None,
            done: false,
            closed: false,
        }
    }

    pub fn exit(&self) -> Option<&RelayExit> {
        self.exit.as_ref()
    }

    pub fn take_exit(&mut self) -> Option<RelayExit> {
        self.exit.take()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Close the source once; later calls do nothing.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.done = true;
            self.source.close();
        }
    }
}

impl<S: FrameSource> Iterator for MonitoredFrames<S> {
    type Item = (VideoFrame, FrameMetrics);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let started = Instant::now();
        match self.source.read_frame() {
            Ok(Some(frame)) => {
                self.index += 1;
                let metrics = FrameMetrics {
                    frame_index: self.index,
                    fps: self.meter.record(Instant::now()),
                    read_ms: elapsed_ms(started),
                    transform_ms: 0.0,
                    width: frame.width(),
                    height: frame.height(),
                };
                Some((frame, metrics))
            }
            Ok(None) => {
                self.done = true;
                self.exit = Some(RelayExit::EndOfStream);
                None
            }
            Err(e) => {
                self.done = true;
                self.exit = Some(RelayExit::SourceFailed(e));
                None
            }
        }
    }
}

impl<S: FrameSource> Drop for MonitoredFrames<S> {
    fn drop(&mut self) {
        self.close();
    }
}

pub const MJPEG_BOUNDARY: &str = "frame";

/// Create the two ends of an MJPEG feed: a blocking sink for the relay
/// thread and a stream for the HTTP body.
pub fn mjpeg_channel(capacity: usize, quality: u8) -> (PartSink, PartStream) {
    let (writer, receiver) = tokio::sync::mpsc::channel(capacity.max(1));
    (
        PartSink {
            writer: Some(writer),
            quality,
        },
        PartStream { inner: receiver },
    )
}

/// Encodes frames as JPEG multipart parts. Must be driven from a blocking
/// thread; a dropped [`PartStream`] fails the next write.
pub struct PartSink {
    writer: Option<tokio::sync::mpsc::Sender<Bytes>>,
    quality: u8,
}

impl FrameSink for PartSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<(), RelayError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| RelayError::SinkWrite("feed closed".to_string()))?;
        let jpeg = codec::encode_jpeg(frame, self.quality)?;
        writer
            .blocking_send(multipart_part(&jpeg))
            .map_err(|_| RelayError::SinkWrite("client disconnected".to_string()))
    }

    fn close(&mut self) {
        self.writer.take();
    }
}

pub struct PartStream {
    inner: tokio::sync::mpsc::Receiver<Bytes>,
}

impl Stream for PartStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_recv(cx).map(|opt| opt.map(Ok))
    }
}

/// One `multipart/x-mixed-replace` part holding a JPEG image.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", MJPEG_BOUNDARY);
    let mut buf = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use ffmpeg_pipe::frame::PixelLayout;
    use futures::StreamExt;

    use super::*;

    struct Frames {
        queue: VecDeque<Result<Option<VideoFrame>, RelayError>>,
        reads: usize,
        closes: usize,
    }

    impl FrameSource for Frames {
        fn read_frame(&mut self) -> Result<Option<VideoFrame>, RelayError> {
            self.reads += 1;
            self.queue.pop_front().unwrap_or(Ok(None))
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::filled(8, 8, PixelLayout::Bgr24, &[1, 2, 3]).unwrap()
    }

    #[test]
    fn test_monitored_frames_yield_metrics_then_stop() {
        let source = Frames {
            queue: VecDeque::from(vec![Ok(Some(frame())), Ok(Some(frame()))]),
            reads: 0,
            closes: 0,
        };
        let mut frames = MonitoredFrames::new(source, Duration::from_secs(3));

        let (_, m1) = frames.next().unwrap();
        let (f2, m2) = frames.next().unwrap();
        assert_eq!(m1.frame_index, 1);
        assert_eq!(m2.frame_index, 2);
        assert_eq!((m2.width, m2.height), (f2.width(), f2.height()));
        assert!(m2.fps > 0.0);

        assert!(frames.next().is_none());
        assert!(matches!(frames.exit(), Some(RelayExit::EndOfStream)));
        // exhausted: no further reads
        assert!(frames.next().is_none());
        assert_eq!(frames.source.reads, 3);

        frames.close();
        frames.close();
        assert_eq!(frames.source.closes, 1);
    }

    #[test]
    fn test_monitored_frames_keep_source_error() {
        let source = Frames {
            queue: VecDeque::from(vec![Err(RelayError::SourceRead("boom".to_string()))]),
            reads: 0,
            closes: 0,
        };
        let mut frames = MonitoredFrames::new(source, Duration::from_secs(1));
        assert!(frames.next().is_none());
        assert!(frames.is_done());
        assert!(matches!(frames.take_exit(), Some(RelayExit::SourceFailed(_))));
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            &b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n"[..]
        );
    }

    #[tokio::test]
    async fn test_part_sink_feeds_stream() {
        let (mut sink, mut stream) = mjpeg_channel(2, 80);
        let writer = tokio::task::spawn_blocking(move || {
            let result = sink.write_frame(&frame());
            sink.close();
            result
        });

        let part = stream.next().await.unwrap().unwrap();
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        writer.await.unwrap().unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_part_sink_fails_after_client_leaves() {
        let (mut sink, stream) = mjpeg_channel(1, 80);
        drop(stream);
        let result = tokio::task::spawn_blocking(move || sink.write_frame(&frame()))
            .await
            .unwrap();
        assert!(matches!(result, Err(RelayError::SinkWrite(_))));
    }
}
