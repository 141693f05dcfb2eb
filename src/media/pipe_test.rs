// ============================================================================
// Pipeline Tests
// ============================================================================

use std::time::Duration;

use ffmpeg_pipe::stream::StreamInfo;

use super::{EncoderProfile, OutputDest, Pipe, PipeConfig, ToolPaths, dest_name, open_sinks};
use crate::media::types::{Effect, RelayError, RelayState};

fn info() -> StreamInfo {
    StreamInfo {
        index: 0,
        width: 64,
        height: 48,
        fps: 25,
    }
}

// ------------------------------------------------------------------------
// PipeConfigBuilder Tests
// ------------------------------------------------------------------------

#[test]
fn test_builder_defaults() {
    let config = PipeConfig::builder()
        .input("rtsp://localhost:8554/stream")
        .add_network_output("rtmp://localhost/live/test")
        .build()
        .unwrap();

    assert_eq!(config.input, "rtsp://localhost:8554/stream");
    assert_eq!(config.effect, Effect::None);
    assert_eq!(config.encoder, EncoderProfile::default());
    assert_eq!(config.tools, ToolPaths::default());
    assert_eq!(config.fps_window, Duration::from_secs(3));
}

#[test]
fn test_builder_requires_input_and_output() {
    let err = PipeConfig::builder()
        .add_network_output("rtmp://localhost/live/test")
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("input"));

    let err = PipeConfig::builder().input("0").build().unwrap_err();
    assert!(err.to_string().contains("output"));

    assert!(
        PipeConfig::builder()
            .input("  ")
            .add_display_output("preview")
            .build()
            .is_err()
    );
}

#[test]
fn test_builder_multiple_outputs() {
    let config = PipeConfig::builder()
        .input("0")
        .add_network_output("rtmp://localhost/live/1")
        .add_display_output("preview")
        .add_output(OutputDest::Network {
            url: "rtmp://localhost/live/2".to_string(),
        })
        .effect(Effect::Gray)
        .fps_window(Duration::from_secs(1))
        .build()
        .unwrap();

    assert_eq!(config.outputs.len(), 3);
    assert_eq!(dest_name(&config.outputs[0]), "rtmp://localhost/live/1");
    assert_eq!(dest_name(&config.outputs[1]), "display:preview");
    assert_eq!(config.effect, Effect::Gray);
    assert_eq!(config.fps_window, Duration::from_secs(1));
}

#[test]
fn test_output_dest_json() {
    let dest: OutputDest =
        serde_json::from_str(r#"{"t":"network","url":"rtmp://a/live/b"}"#).unwrap();
    assert_eq!(
        dest,
        OutputDest::Network {
            url: "rtmp://a/live/b".to_string()
        }
    );
    let json = serde_json::to_string(&OutputDest::Display {
        title: "w".to_string(),
    })
    .unwrap();
    assert_eq!(json, r#"{"t":"display","title":"w"}"#);
}

// ------------------------------------------------------------------------
// Encoder profile
// ------------------------------------------------------------------------

#[test]
fn test_encoder_profile_settings() {
    let profile = EncoderProfile {
        bitrate: Some("1000k".to_string()),
        ..Default::default()
    };
    let settings = profile.settings("/opt/ffmpeg", "rtmp://host/live/key", &info());

    assert_eq!(settings.program, "/opt/ffmpeg");
    assert_eq!((settings.width, settings.height, settings.fps), (64, 48, 25));
    let args = settings.args();
    let joined = args.join(" ");
    assert!(joined.contains("-video_size 64x48"));
    assert!(joined.contains("-c:v libx264"));
    assert!(joined.contains("-preset ultrafast"));
    assert!(joined.contains("-tune zerolatency"));
    assert!(joined.contains("-b:v 1000k"));
    assert!(joined.ends_with("-f flv rtmp://host/live/key"));
}

// ------------------------------------------------------------------------
// Opening
// ------------------------------------------------------------------------

#[test]
fn test_open_sinks_missing_program() {
    let config = PipeConfig::builder()
        .input("0")
        .add_network_output("rtmp://localhost/live/test")
        .tools(ToolPaths {
            ffmpeg: "/nonexistent/ffmpeg".to_string(),
            ffplay: "ffplay".to_string(),
        })
        .build()
        .unwrap();

    let result = open_sinks(&config, &info());
    assert!(matches!(result, Err(RelayError::SinkUnavailable(_))));
}

#[test]
fn test_open_sinks_one_per_output() {
    // `cat` accepts anything on stdin; stray arguments make it exit early,
    // which only matters once frames are written.
    let config = PipeConfig::builder()
        .input("0")
        .add_network_output("rtmp://localhost/live/test")
        .add_display_output("preview")
        .tools(ToolPaths {
            ffmpeg: "cat".to_string(),
            ffplay: "cat".to_string(),
        })
        .build()
        .unwrap();

    let mut tee = open_sinks(&config, &info()).unwrap();
    assert_eq!(tee.len(), 2);
    crate::media::relay::FrameSink::close(&mut tee);
}

#[tokio::test]
async fn test_start_with_missing_input() {
    let config = PipeConfig::builder()
        .input("/nonexistent/input.mp4")
        .add_network_output("rtmp://localhost/live/test")
        .build()
        .unwrap();
    let pipe = Pipe::new(config);
    assert_eq!(pipe.state(), RelayState::Stopped);

    let err = pipe.start().await.unwrap_err();
    assert!(format!("{:#}", err).contains("source unavailable"));
    assert_eq!(pipe.state(), RelayState::Stopped);
    assert!(!pipe.is_started());
    assert!(pipe.last_exit().is_some());
    assert!(pipe.metrics().is_none());
}

#[test]
fn test_cancel() {
    let config = PipeConfig::builder()
        .input("0")
        .add_display_output("preview")
        .build()
        .unwrap();
    let pipe = Pipe::new(config);
    assert!(!pipe.is_cancelled());
    pipe.cancel();
    assert!(pipe.is_cancelled());
}
