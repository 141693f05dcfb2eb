use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    handler::{ApiError, ApiJsonResult, AppState},
    media::{
        metrics::FrameMetrics,
        pipe::{OutputDest, PipeConfig},
        transform::FrameTransform,
        types::{Effect, RelayState},
    },
};

pub fn media_pipe_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/list", get(list_pipes))
        .route("/add", post(add_pipe))
        .route("/remove/{id}", get(remove_pipe))
        .route("/status/{id}", get(get_pipe_status))
}

#[derive(Serialize, Deserialize)]
struct PipeRequest {
    id: String,
    input: String,
    outputs: Vec<OutputDest>,
    #[serde(default)]
    effect: Option<String>,
    /// Run the active detection model on every frame.
    #[serde(default)]
    detect: bool,
    /// Replace a running pipe with the same id.
    #[serde(default)]
    update: bool,
}

#[derive(Serialize)]
struct PipeStatus {
    id: String,
    state: RelayState,
    input: String,
    outputs: Vec<OutputDest>,
    effect: Effect,
    metrics: Option<FrameMetrics>,
    last_exit: Option<String>,
}

async fn index() -> &'static str {
    "pipe route!"
}

async fn list_pipes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipes.list().await)
}

async fn add_pipe(
    State(state): State<AppState>,
    Json(request): Json<PipeRequest>,
) -> ApiJsonResult<String> {
    if request.id.trim().is_empty() {
        return Err(ApiError::bad_request("id is required"));
    }
    let effect: Effect = request
        .effect
        .as_deref()
        .unwrap_or("none")
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;

    let mut builder = PipeConfig::builder()
        .input(request.input)
        .effect(effect)
        .encoder(state.config.encoder.clone())
        .tools(state.config.tools.clone())
        .fps_window(state.config.fps_window());
    for dest in request.outputs {
        builder = builder.add_output(dest);
    }
    let config = builder
        .build()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let transform: Option<Arc<dyn FrameTransform>> = if request.detect {
        Some(state.models.clone())
    } else {
        None
    };
    state
        .pipes
        .add_pipe(&request.id, config, transform, request.update)
        .await
        .map_err(|e| ApiError::new(axum::http::StatusCode::CONFLICT, e))?;
    Ok(Json("success".to_string()))
}

async fn remove_pipe(State(state): State<AppState>, Path(id): Path<String>) -> ApiJsonResult<String> {
    if !state.pipes.remove_pipe(&id).await {
        return Err(ApiError::not_found(format!("pipe {} not found", id)));
    }
    Ok(Json("success".to_string()))
}

async fn get_pipe_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiJsonResult<PipeStatus> {
    let pipe = state
        .pipes
        .get_pipe(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("pipe {} not found", id)))?;
    let config = pipe.config();
    Ok(Json(PipeStatus {
        id,
        state: pipe.state(),
        input: config.input.clone(),
        outputs: config.outputs.clone(),
        effect: config.effect,
        metrics: pipe.metrics(),
        last_exit: pipe.last_exit(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;
    use crate::handler::test_support;

    fn request(id: &str) -> PipeRequest {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "input": "/nonexistent/input.mp4",
            "outputs": [{"t": "network", "url": "rtmp://localhost/live/x"}],
            "effect": "gray",
            "detect": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_list_status_remove() {
        let state = test_support::state();
        add_pipe(State(state.clone()), Json(request("cam1")))
            .await
            .ok()
            .unwrap();

        let Json(ids) = list_pipes(State(state.clone())).await;
        assert_eq!(ids, vec!["cam1"]);

        let Json(status) = get_pipe_status(State(state.clone()), Path("cam1".to_string()))
            .await
            .ok()
            .unwrap();
        assert_eq!(status.effect, Effect::Gray);
        assert_eq!(status.outputs.len(), 1);

        remove_pipe(State(state.clone()), Path("cam1".to_string()))
            .await
            .ok()
            .unwrap();
        let err = remove_pipe(State(state.clone()), Path("cam1".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_requests() {
        let state = test_support::state();

        let mut no_outputs = request("a");
        no_outputs.outputs.clear();
        let err = add_pipe(State(state.clone()), Json(no_outputs)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let mut bad_effect = request("a");
        bad_effect.effect = Some("sepia".to_string());
        let err = add_pipe(State(state.clone()), Json(bad_effect)).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        add_pipe(State(state.clone()), Json(request("a"))).await.ok().unwrap();
        let err = add_pipe(State(state.clone()), Json(request("a"))).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let mut update = request("a");
        update.update = true;
        assert!(add_pipe(State(state), Json(update)).await.is_ok());
    }
}
