//! Frame relay: one blocking loop per pipeline.
//!
//! Data Flow:
//! ```text
//!                                                        ┌─► ffmpeg (encode, publish)
//! AvInput (decode to BGR) ─► Effect ─► ModelSlot? ─► Tee ┤
//!                                                        ├─► ffplay (preview)
//!                                                        │
//!                                                        └─► PartSink ─► MJPEG body
//! ```
//!
//! Frames are pulled, never pushed: a slow sink slows the whole pipeline
//! down instead of queueing. Cancellation is seen between frames.

pub mod codec;
pub mod metrics;
pub mod pipe;
pub mod relay;
pub mod stream;
pub mod transform;
pub mod types;
