use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use ffmpeg_pipe::{
    input::AvInput,
    output::{DisplaySettings, EncoderSettings, ProcessOutput},
    stream::StreamInfo,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::media::{
    metrics::FrameMetrics,
    relay::{FrameSink, MetricsSender, Relay, TeeSink},
    transform::FrameTransform,
    types::{Effect, RelayError, RelayReport, RelayState},
};

/// Where relayed frames go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum OutputDest {
    /// Encode and publish, e.g. `rtmp://host/live/key`.
    Network { url: String },
    /// Local preview window.
    Display { title: String },
}

/// Encoder options applied to every network output. Fixed for the life of
/// a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderProfile {
    pub format: String,
    pub codec: String,
    pub pixel_format: String,
    pub preset: Option<String>,
    pub tune: Option<String>,
    pub bitrate: Option<String>,
    pub bufsize: Option<String>,
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            format: "flv".to_string(),
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            preset: Some("ultrafast".to_string()),
            tune: Some("zerolatency".to_string()),
            bitrate: None,
            bufsize: None,
        }
    }
}

impl EncoderProfile {
    pub fn settings(&self, program: &str, url: &str, info: &StreamInfo) -> EncoderSettings {
        let mut settings = EncoderSettings::new(url, info.width, info.height, info.fps);
        settings.program = program.to_string();
        settings.format = self.format.clone();
        settings.codec = self.codec.clone();
        settings.pixel_format = self.pixel_format.clone();
        settings.preset = self.preset.clone();
        settings.tune = self.tune.clone();
        settings.bitrate = self.bitrate.clone();
        settings.bufsize = self.bufsize.clone();
        settings
    }
}

/// External programs used for sinks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffplay: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffplay: "ffplay".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipeConfig {
    /// Camera index, device path, file or stream URL.
    pub input: String,
    pub outputs: Vec<OutputDest>,
    pub effect: Effect,
    pub encoder: EncoderProfile,
    pub tools: ToolPaths,
    pub fps_window: Duration,
}

/// Pipeline: one source relayed to one or more sinks on a blocking thread.
pub struct Pipe {
    config: PipeConfig,
    cancel: CancellationToken,
    started: AtomicBool,
    transform: Option<Arc<dyn FrameTransform>>,
    metrics: MetricsSender,
    last_exit: Mutex<Option<String>>,
}

impl Pipe {
    pub fn new(config: PipeConfig) -> Self {
        Self::with_cancel(config, CancellationToken::new())
    }

    /// Pipe stopped by `cancel`, e.g. a child of the process token.
    pub fn with_cancel(config: PipeConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            started: AtomicBool::new(false),
            transform: None,
            metrics: watch::channel(None).0,
            last_exit: Mutex::new(None),
        }
    }

    /// Run `transform` after the configured effect.
    pub fn with_transform(mut self, transform: Arc<dyn FrameTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn state(&self) -> RelayState {
        if self.is_started() {
            RelayState::Running
        } else {
            RelayState::Stopped
        }
    }

    /// Latest per-frame metrics, `None` before the first frame.
    pub fn metrics(&self) -> Option<FrameMetrics> {
        self.metrics.borrow().clone()
    }

    /// How the last run ended.
    pub fn last_exit(&self) -> Option<String> {
        self.last_exit.lock().clone()
    }

    /// Open the source and sinks and relay until the stream ends, an
    /// endpoint fails or the pipe is cancelled.
    pub async fn start(&self) -> anyhow::Result<RelayReport> {
        if self.started.swap(true, Ordering::Relaxed) {
            anyhow::bail!("pipe already started");
        }

        log::info!("Pipe: starting with input {}", self.config.input);

        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let metrics = self.metrics.clone();
        let transform = self.transform.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_blocking(&config, cancel, Some(metrics), transform.as_deref())
        })
        .await;

        self.started.store(false, Ordering::Relaxed);

        let outcome = match result {
            Ok(Ok(report)) => {
                *self.last_exit.lock() = Some(report.exit.to_string());
                return Ok(report);
            }
            Ok(Err(e)) => anyhow::Error::new(e).context("pipe failed to open"),
            Err(e) => anyhow::Error::new(e).context("relay thread panicked"),
        };
        log::error!("Pipe: {:#}", outcome);
        *self.last_exit.lock() = Some(format!("{:#}", outcome));
        Err(outcome)
    }
}

/// Blocking body of a pipe: open everything, relay, close everything.
///
/// Opening errors are returned before any frame moves. Handles that were
/// already opened are closed first.
pub fn run_blocking(
    config: &PipeConfig,
    cancel: CancellationToken,
    metrics: Option<MetricsSender>,
    extra: Option<&dyn FrameTransform>,
) -> Result<RelayReport, RelayError> {
    let mut source = AvInput::open(&config.input)?;
    let Some(info) = source.info() else {
        return Err(RelayError::SourceUnavailable(format!(
            "{} closed while opening",
            config.input
        )));
    };

    let sink = match open_sinks(config, &info) {
        Ok(sink) => sink,
        Err(e) => {
            source.close();
            return Err(e);
        }
    };

    let mut relay = Relay::new(cancel).with_fps_window(config.fps_window);
    if let Some(tx) = metrics {
        relay = relay.with_metrics(tx);
    }

    let report = match extra {
        Some(extra) => relay.run(source, sink, &(config.effect, extra)),
        None => relay.run(source, sink, &config.effect),
    };
    Ok(report)
}

/// Start every configured output for frames shaped like `info`.
pub fn open_sinks(config: &PipeConfig, info: &StreamInfo) -> Result<TeeSink, RelayError> {
    let mut tee = TeeSink::new();
    for dest in &config.outputs {
        let opened = match dest {
            OutputDest::Network { url } => {
                let settings = config.encoder.settings(&config.tools.ffmpeg, url, info);
                ProcessOutput::encoder(&settings)
            }
            OutputDest::Display { title } => {
                let mut settings = DisplaySettings::new(title, info.width, info.height, info.fps);
                settings.program = config.tools.ffplay.clone();
                ProcessOutput::display(&settings)
            }
        };
        match opened {
            Ok(output) => tee.push(output),
            Err(e) => {
                tee.close();
                return Err(e.into());
            }
        }
    }
    Ok(tee)
}

/// Get destination name for logging.
pub fn dest_name(dest: &OutputDest) -> String {
    match dest {
        OutputDest::Network { url } => url.clone(),
        OutputDest::Display { title } => format!("display:{}", title),
    }
}

impl PipeConfig {
    pub fn builder() -> PipeConfigBuilder {
        PipeConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct PipeConfigBuilder {
    input: Option<String>,
    outputs: Vec<OutputDest>,
    effect: Effect,
    encoder: EncoderProfile,
    tools: ToolPaths,
    fps_window: Option<Duration>,
}

impl PipeConfigBuilder {
    /// Camera index, device path, file or stream URL.
    pub fn input(mut self, address: impl Into<String>) -> Self {
        self.input = Some(address.into());
        self
    }

    /// Encode and publish to `url`.
    pub fn add_network_output(mut self, url: impl Into<String>) -> Self {
        self.outputs.push(OutputDest::Network { url: url.into() });
        self
    }

    /// Show frames in a local preview window.
    pub fn add_display_output(mut self, title: impl Into<String>) -> Self {
        self.outputs.push(OutputDest::Display {
            title: title.into(),
        });
        self
    }

    pub fn add_output(mut self, dest: OutputDest) -> Self {
        self.outputs.push(dest);
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    pub fn encoder(mut self, encoder: EncoderProfile) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn fps_window(mut self, window: Duration) -> Self {
        self.fps_window = Some(window);
        self
    }

    pub fn build(self) -> anyhow::Result<PipeConfig> {
        let input = self
            .input
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("input is required"))?;
        if self.outputs.is_empty() {
            anyhow::bail!("at least one output is required");
        }
        Ok(PipeConfig {
            input,
            outputs: self.outputs,
            effect: self.effect,
            encoder: self.encoder,
            tools: self.tools,
            fps_window: self.fps_window.unwrap_or(Duration::from_secs(3)),
        })
    }
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
