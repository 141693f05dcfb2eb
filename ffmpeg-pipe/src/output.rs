use std::io::Write;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use crate::{
    error::{Error, Result},
    frame::{PixelLayout, VideoFrame},
};

/// Settings for an `ffmpeg` process that encodes raw frames from stdin and
/// publishes them to `url`. Fixed at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub layout: PixelLayout,
    pub url: String,
    // "flv" for rtmp
    pub format: String,
    pub codec: String,
    // "yuv420p"
    pub pixel_format: String,
    pub preset: Option<String>,
    pub tune: Option<String>,
    // "1000k"
    pub bitrate: Option<String>,
    // "500k"
    pub bufsize: Option<String>,
}

impl EncoderSettings {
    pub fn new(url: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            width,
            height,
            fps,
            layout: PixelLayout::Bgr24,
            url: url.into(),
            format: "flv".to_string(),
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            preset: Some("ultrafast".to_string()),
            tune: Some("zerolatency".to_string()),
            bitrate: None,
            bufsize: None,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
        ];
        args.extend(raw_input_args(self.layout, self.width, self.height, self.fps));
        args.extend([
            "-an".into(),
            "-c:v".into(),
            self.codec.clone(),
            "-pix_fmt".into(),
            self.pixel_format.clone(),
            "-r".into(),
            self.fps.to_string(),
        ]);
        if let Some(preset) = &self.preset {
            args.extend(["-preset".into(), preset.clone()]);
        }
        if let Some(tune) = &self.tune {
            args.extend(["-tune".into(), tune.clone()]);
        }
        if let Some(bitrate) = &self.bitrate {
            args.extend(["-b:v".into(), bitrate.clone()]);
        }
        if let Some(bufsize) = &self.bufsize {
            args.extend(["-bufsize".into(), bufsize.clone()]);
        }
        args.extend(["-f".into(), self.format.clone(), self.url.clone()]);
        args
    }
}

/// Settings for an `ffplay` preview window fed with raw frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplaySettings {
    pub program: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub layout: PixelLayout,
    pub title: String,
}

impl DisplaySettings {
    pub fn new(title: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            program: "ffplay".to_string(),
            width,
            height,
            fps,
            layout: PixelLayout::Bgr24,
            title: title.into(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-window_title".into(),
            self.title.clone(),
        ];
        args.extend(raw_input_args(self.layout, self.width, self.height, self.fps));
        args
    }
}

fn raw_input_args(layout: PixelLayout, width: u32, height: u32, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "rawvideo".into(),
        "-pixel_format".into(),
        layout.ffmpeg_name().into(),
        "-video_size".into(),
        format!("{}x{}", width, height),
        "-framerate".into(),
        fps.to_string(),
        "-i".into(),
        "-".into(),
    ]
}

/// An external process consuming raw frames on stdin.
pub struct ProcessOutput {
    program: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    layout: PixelLayout,
    frames_written: u64,
}

impl ProcessOutput {
    pub fn encoder(settings: &EncoderSettings) -> Result<Self> {
        log::info!(
            "starting encoder {}x{}@{} -> {}",
            settings.width,
            settings.height,
            settings.fps,
            settings.url
        );
        Self::spawn(
            &settings.program,
            &settings.args(),
            settings.width,
            settings.height,
            settings.layout,
        )
    }

    pub fn display(settings: &DisplaySettings) -> Result<Self> {
        log::info!(
            "opening preview window {:?} {}x{}",
            settings.title,
            settings.width,
            settings.height
        );
        Self::spawn(
            &settings.program,
            &settings.args(),
            settings.width,
            settings.height,
            settings.layout,
        )
    }

    /// Start `program` with `args`, expecting frames of the given shape on stdin.
    pub fn spawn(
        program: &str,
        args: &[String],
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::SinkUnavailable {
                program: program.to_string(),
                source,
            })?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::SinkUnavailable {
                program: program.to_string(),
                source: std::io::Error::other("stdin not captured"),
            });
        };

        Ok(Self {
            program: program.to_string(),
            child: Some(child),
            stdin: Some(stdin),
            width,
            height,
            layout,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_open(&self) -> bool {
        self.stdin.is_some()
    }

    /// Write exactly one frame worth of bytes.
    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        let expected = VideoFrame::frame_len(self.width, self.height, self.layout);
        if frame.layout() != self.layout
            || frame.width() != self.width
            || frame.height() != self.height
        {
            return Err(Error::FrameSize {
                expected,
                actual: frame.data().len(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or(Error::SinkClosed)?;
        stdin.write_all(frame.data()).map_err(Error::SinkWrite)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close stdin so the process can flush, then reap it. The exit status is
    /// returned by the first call only.
    pub fn close(&mut self) -> Option<ExitStatus> {
        drop(self.stdin.take());
        let mut child = self.child.take()?;
        match child.wait() {
            Ok(status) => {
                log::info!(
                    "{} exited with {} after {} frames",
                    self.program,
                    status,
                    self.frames_written
                );
                Some(status)
            }
            Err(e) => {
                log::warn!("waiting for {} failed: {}", self.program, e);
                None
            }
        }
    }
}

impl Drop for ProcessOutput {
    fn drop(&mut self) {
        self.close();
    }
}
