use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::media::types::Effect;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pull video, transform each frame, push it on", long_about = None)]
pub struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// HTTP API: WebSocket frames, MJPEG feed, pipelines
    Serve {
        /// Overrides `listen` from the config file
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Pull a stream, apply an effect and republish it
    Relay {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: String,
        #[arg(short, long, default_value = "gray")]
        effect: Effect,
        /// Also show the relayed frames in a local window
        #[arg(long)]
        preview: bool,
    },
    /// Publish a local camera
    Publish {
        #[arg(long, default_value = "0")]
        camera: String,
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "1000k")]
        bitrate: String,
    },
    /// Show a stream in a local window
    Play {
        #[arg(short, long)]
        input: String,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_relay_defaults_to_gray() {
        let cli = Cli::parse_from([
            "frame-relay",
            "relay",
            "--input",
            "rtmp://src/live/a",
            "--output",
            "rtmp://dst/live/b",
        ]);
        match cli.command {
            Command::Relay {
                effect, preview, ..
            } => {
                assert_eq!(effect, Effect::Gray);
                assert!(!preview);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_publish_and_global_config() {
        let cli = Cli::parse_from([
            "frame-relay",
            "publish",
            "--output",
            "rtmp://dst/live/cam",
            "--config",
            "relay.json",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("relay.json")));
        match cli.command {
            Command::Publish {
                camera, bitrate, ..
            } => {
                assert_eq!(camera, "0");
                assert_eq!(bitrate, "1000k");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_effect_rejected() {
        let result = Cli::try_parse_from([
            "frame-relay",
            "relay",
            "-i",
            "a",
            "-o",
            "b",
            "-e",
            "sepia",
        ]);
        assert!(result.is_err());
    }
}
