use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The capture address could not be opened or has no decodable video.
    #[error("video source {address:?} unavailable: {reason}")]
    SourceUnavailable { address: String, reason: String },

    /// The downstream process could not be started.
    #[error("failed to start {program}: {source}")]
    SinkUnavailable {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The downstream process rejected a frame (usually because it exited).
    #[error("sink rejected frame: {0}")]
    SinkWrite(#[source] io::Error),

    #[error("sink is closed")]
    SinkClosed,

    #[error("frame buffer is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("failed to read from source: {0}")]
    Read(#[from] ffmpeg_next::Error),
}
