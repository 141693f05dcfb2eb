use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::ModelLoadError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),
    #[error("source read failed: {0}")]
    SourceRead(String),
    #[error("sink write failed: {0}")]
    SinkWrite(String),
    #[error("malformed frame payload: {0}")]
    Decode(String),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

impl From<ffmpeg_pipe::Error> for RelayError {
    fn from(err: ffmpeg_pipe::Error) -> Self {
        use ffmpeg_pipe::Error;
        match err {
            Error::SourceUnavailable { .. } => RelayError::SourceUnavailable(err.to_string()),
            Error::SinkUnavailable { .. } => RelayError::SinkUnavailable(err.to_string()),
            Error::Read(_) => RelayError::SourceRead(err.to_string()),
            Error::SinkWrite(_) | Error::SinkClosed | Error::FrameSize { .. } => {
                RelayError::SinkWrite(err.to_string())
            }
        }
    }
}

/// A relay is either moving frames or done; there is no pause or reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Running,
    Stopped,
}

/// Why a relay loop stopped.
#[derive(Debug)]
pub enum RelayExit {
    EndOfStream,
    Cancelled,
    SourceFailed(RelayError),
    SinkFailed(RelayError),
}

impl RelayExit {
    pub fn is_error(&self) -> bool {
        matches!(self, RelayExit::SourceFailed(_) | RelayExit::SinkFailed(_))
    }
}

impl Display for RelayExit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayExit::EndOfStream => write!(f, "end of stream"),
            RelayExit::Cancelled => write!(f, "cancelled"),
            RelayExit::SourceFailed(e) => write!(f, "source failed: {}", e),
            RelayExit::SinkFailed(e) => write!(f, "sink failed: {}", e),
        }
    }
}

#[derive(Debug)]
pub struct RelayReport {
    pub frames: u64,
    pub exit: RelayExit,
}

impl Display for RelayReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} frames relayed, stopped: {}", self.frames, self.exit)
    }
}

/// Per-frame effect selectable at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    None,
    Gray,
}

impl FromStr for Effect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Effect::None),
            "gray" | "grey" | "grayscale" => Ok(Effect::Gray),
            other => Err(anyhow::anyhow!("unknown effect {:?}", other)),
        }
    }
}

impl Display for Effect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "none"),
            Effect::Gray => write!(f, "gray"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_parse() {
        assert_eq!("none".parse::<Effect>().unwrap(), Effect::None);
        assert_eq!("".parse::<Effect>().unwrap(), Effect::None);
        assert_eq!("GRAY".parse::<Effect>().unwrap(), Effect::Gray);
        assert_eq!("grey".parse::<Effect>().unwrap(), Effect::Gray);
        assert!("sepia".parse::<Effect>().is_err());
    }

    #[test]
    fn test_pipe_error_mapping() {
        let err: RelayError = ffmpeg_pipe::Error::SinkClosed.into();
        assert!(matches!(err, RelayError::SinkWrite(_)));

        let err: RelayError = ffmpeg_pipe::Error::SourceUnavailable {
            address: "0".to_string(),
            reason: "busy".to_string(),
        }
        .into();
        assert!(matches!(err, RelayError::SourceUnavailable(_)));
    }
}
