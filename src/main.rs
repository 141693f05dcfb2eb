use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    cli::{Cli, Command},
    config::RelayConfig,
    handler::AppState,
    manager::PipeManager,
    media::{
        pipe::{Pipe, PipeConfig},
        transform::SharedEffect,
        types::Effect,
    },
    model::{ModelRegistry, ModelSlot, onnx::OrtLoader},
};

mod api;
mod cli;
mod config;
mod handler;
mod manager;
mod media;
mod model;

fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_pipe", log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    ffmpeg_pipe::init()?;
    let config = RelayConfig::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();

    match cli.command {
        Command::Serve { listen } => serve(config, listen, cancel).await,
        Command::Relay {
            input,
            output,
            effect,
            preview,
        } => {
            let mut builder = base_pipe(&config)
                .input(input)
                .add_network_output(output)
                .effect(effect);
            if preview {
                builder = builder.add_display_output("frame-relay");
            }
            run_pipe(builder.build()?, cancel).await
        }
        Command::Publish {
            camera,
            output,
            bitrate,
        } => {
            let mut encoder = config.encoder.clone();
            encoder.bitrate = Some(bitrate);
            let pipe = base_pipe(&config)
                .input(camera)
                .add_network_output(output)
                .encoder(encoder)
                .build()?;
            run_pipe(pipe, cancel).await
        }
        Command::Play { input } => {
            let pipe = base_pipe(&config)
                .input(input.clone())
                .add_display_output(input)
                .effect(Effect::None)
                .build()?;
            run_pipe(pipe, cancel).await
        }
    }
}

fn base_pipe(config: &RelayConfig) -> crate::media::pipe::PipeConfigBuilder {
    PipeConfig::builder()
        .encoder(config.encoder.clone())
        .tools(config.tools.clone())
        .fps_window(config.fps_window())
}

/// Relay one pipe in the foreground. Ctrl-C stops it at the next frame.
async fn run_pipe(config: PipeConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, stopping after the current frame");
            cancel_clone.cancel();
        }
    });

    let pipe = Pipe::with_cancel(config, cancel);
    let report = pipe.start().await?;
    log::info!("{}", report);
    if report.exit.is_error() {
        anyhow::bail!("relay failed: {}", report.exit);
    }
    Ok(())
}

async fn serve(
    mut config: RelayConfig,
    listen: Option<String>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if let Some(listen) = listen {
        config.listen = listen;
    }

    let registry = ModelRegistry::new(config.models.clone());
    let models = if registry.is_empty() {
        log::warn!("no model presets configured, detection disabled");
        ModelSlot::new(registry, OrtLoader)
    } else {
        match ModelSlot::with_default(registry.clone(), OrtLoader, &config.default_model) {
            Ok(slot) => slot,
            Err(e) => {
                log::warn!("{}, detection disabled until /set_model succeeds", e);
                ModelSlot::new(registry, OrtLoader)
            }
        }
    };

    let state = AppState {
        config: Arc::new(config),
        models: Arc::new(models),
        effect: SharedEffect::default(),
        metrics: watch::channel(None).0,
        pipes: Arc::new(PipeManager::new(cancel.child_token())),
        cancel: cancel.clone(),
    };
    let pipes = state.pipes.clone();

    let cancel_clone = cancel.clone();
    let server = api::start_api_server(state, cancel_clone);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    pipes.cancel_all().await;
    if let Err(e) = server.await {
        log::error!("API server task failed: {}", e);
    }
    Ok(())
}
