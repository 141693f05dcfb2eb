use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::Response,
    routing::get,
};
use ffmpeg_pipe::input::AvInput;
use serde::{Deserialize, Serialize};

use crate::{
    handler::{ApiError, ApiJsonResult, ApiResult, AppState},
    media::{
        metrics::FrameMetrics,
        relay::Relay,
        stream::{MJPEG_BOUNDARY, mjpeg_channel},
        types::{Effect, RelayError},
    },
    model::ModelLoadError,
};

// Parts buffered between the relay thread and the HTTP body.
const FEED_BUFFER: usize = 2;

pub fn detect_router() -> Router<AppState> {
    Router::new()
        .route("/video_feed", get(video_feed))
        .route("/set_model", get(set_model))
        .route("/set_effect", get(set_effect))
        .route("/models", get(list_models))
        .route("/metrics", get(latest_metrics))
}

/// MJPEG of the configured camera through the current effect and model.
/// The relay ends when the client goes away.
async fn video_feed(State(state): State<AppState>) -> ApiResult<Response> {
    let camera = state.config.camera.clone();
    let source = tokio::task::spawn_blocking(move || AvInput::open(&camera))
        .await?
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, RelayError::from(e)))?;

    let (sink, parts) = mjpeg_channel(FEED_BUFFER, state.config.jpeg_quality);
    let relay = Relay::new(state.cancel.child_token())
        .with_fps_window(state.config.fps_window())
        .with_metrics(state.metrics.clone());
    let transform = (state.effect.clone(), state.models.clone());
    tokio::task::spawn_blocking(move || relay.run(source, sink, &transform));

    let response = Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(parts))?;
    Ok(response)
}

#[derive(Deserialize)]
struct SetModelParams {
    name: Option<String>,
}

async fn set_model(
    State(state): State<AppState>,
    Query(params): Query<SetModelParams>,
) -> ApiResult<String> {
    let name = params
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| state.config.default_model.clone());

    let models = state.models.clone();
    let target = name.clone();
    // Loading can be slow and blocks inference; keep it off the runtime.
    tokio::task::spawn_blocking(move || models.swap(&target))
        .await?
        .map_err(|e| match e {
            ModelLoadError::UnknownPreset(_) => ApiError::new(StatusCode::NOT_FOUND, e),
            ModelLoadError::Load { .. } => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e),
        })?;
    Ok(format!("Model switched to {}", name))
}

#[derive(Deserialize)]
struct SetEffectParams {
    effect: Option<String>,
}

async fn set_effect(
    State(state): State<AppState>,
    Query(params): Query<SetEffectParams>,
) -> ApiResult<&'static str> {
    let effect: Effect = params
        .effect
        .as_deref()
        .unwrap_or("none")
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;
    state.effect.set(effect);
    log::info!("effect set to {}", effect);
    Ok("OK")
}

#[derive(Serialize)]
struct ModelList {
    models: Vec<String>,
    active: Option<String>,
    effect: Effect,
}

async fn list_models(State(state): State<AppState>) -> ApiJsonResult<ModelList> {
    Ok(Json(ModelList {
        models: state.models.models(),
        active: state.models.active_name(),
        effect: state.effect.get(),
    }))
}

async fn latest_metrics(State(state): State<AppState>) -> Json<Option<FrameMetrics>> {
    Json(state.metrics.borrow().clone())
}
